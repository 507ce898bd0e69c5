//! Error types and handling for remora
//!
//! The taxonomy mirrors how errors propagate through the system: connection
//! establishment and unsupported-capability errors are fatal and cross the
//! core boundary; per-file transfer errors are transient and absorbed into
//! the pass outcome; everything else is classified in between.

use crate::types::Protocol;

/// Main error type for remora operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Connection establishment failed (auth failure, unreachable host,
    /// handshake failure)
    #[error("connection failed: {message}")]
    Connect {
        /// Error message from the underlying transport
        message: String,
    },

    /// A network operation on an established session failed
    #[error("network error: {message}")]
    Network {
        /// Error message describing the network issue
        message: String,
    },

    /// Local I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },

    /// Configuration error
    #[error("configuration error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },

    /// The protocol variant does not support the requested operation
    #[error("{operation} is not supported over {protocol}")]
    Unsupported {
        /// The operation that was requested
        operation: String,
        /// The protocol that cannot perform it
        protocol: Protocol,
    },

    /// Operation timed out
    #[error("operation timed out after {seconds} seconds")]
    Timeout {
        /// Number of seconds after which the operation timed out
        seconds: u64,
    },

    /// Generic error with custom message
    #[error("{message}")]
    Other {
        /// Custom error message
        message: String,
    },
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection establishment errors
    Connect,
    /// Network errors on an established session
    Network,
    /// Local I/O errors
    Io,
    /// Configuration errors
    Config,
    /// Capability-unsupported errors
    Unsupported,
    /// Timeout
    Timeout,
    /// Other errors
    Other,
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connect { .. } => ErrorKind::Connect,
            Self::Network { .. } => ErrorKind::Network,
            Self::Io { .. } => ErrorKind::Io,
            Self::Config { .. } => ErrorKind::Config,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Check if this error is fatal to the whole operation rather than to a
    /// single file
    ///
    /// Fatal errors cross the core boundary; transient errors are recorded
    /// into the outcome of the surrounding pass and the pass continues.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Config { .. } | Self::Unsupported { .. }
        )
    }

    /// Check if this error is a transient per-file failure
    pub fn is_transient(&self) -> bool {
        !self.is_fatal()
    }

    /// Create a new connection error
    pub fn connect<S: Into<String>>(message: S) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new capability-unsupported error
    pub fn unsupported<S: Into<String>>(operation: S, protocol: Protocol) -> Self {
        Self::Unsupported {
            operation: operation.into(),
            protocol,
        }
    }

    /// Create a new generic error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_fatal_and_transient_are_exclusive(message in ".*") {
            let errors = vec![
                Error::Connect { message: message.clone() },
                Error::Network { message: message.clone() },
                Error::Io { message: message.clone() },
                Error::Config { message: message.clone() },
                Error::Other { message: message.clone() },
            ];

            for error in errors {
                prop_assert_ne!(error.is_fatal(), error.is_transient());
            }
        }
    }

    #[test]
    fn test_connect_error_is_fatal() {
        let error = Error::connect("authentication failed");
        assert_eq!(error.kind(), ErrorKind::Connect);
        assert!(error.is_fatal());
        assert!(!error.is_transient());
    }

    #[test]
    fn test_network_error_is_transient() {
        let error = Error::network("connection reset by peer");
        assert_eq!(error.kind(), ErrorKind::Network);
        assert!(error.is_transient());
    }

    #[test]
    fn test_unsupported_error_names_protocol() {
        let error = Error::unsupported("content search", Protocol::Ftp);
        assert_eq!(error.kind(), ErrorKind::Unsupported);
        assert!(error.is_fatal());
        assert!(error.to_string().contains("ftp"));
        assert!(error.to_string().contains("content search"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let error = Error::from(io_error);

        assert_eq!(error.kind(), ErrorKind::Io);
        assert!(error.to_string().contains("missing file"));
    }

    #[test]
    fn test_timeout_error_is_transient() {
        let error = Error::Timeout { seconds: 30 };
        assert_eq!(error.kind(), ErrorKind::Timeout);
        assert!(error.is_transient());
        assert!(error.to_string().contains("30"));
    }
}
