//! Result type alias for remora operations

use crate::Error;

/// Result type alias for remora operations
pub type Result<T> = std::result::Result<T, Error>;
