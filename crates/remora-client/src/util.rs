//! Remote path helpers
//!
//! Remote paths are `/`-separated strings regardless of the local platform.

use std::path::Path;

/// Join a relative component onto a remote base path
pub fn join_remote(base: &str, rel: &str) -> String {
    let base = base.trim_end_matches('/');
    let rel = rel.trim_start_matches('/');
    if base.is_empty() {
        format!("/{rel}")
    } else if rel.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{rel}")
    }
}

/// Parent of a remote path, `None` at the root
pub fn remote_parent(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    let idx = trimmed.rfind('/')?;
    if idx == 0 {
        if trimmed.len() > 1 {
            Some("/".to_string())
        } else {
            None
        }
    } else {
        Some(trimmed[..idx].to_string())
    }
}

/// Final name component of a remote path
pub fn remote_file_name(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}

/// All ancestor prefixes of a remote path, shortest first, ending with the
/// path itself
///
/// `/a/b/c` yields `/a`, `/a/b`, `/a/b/c`.
pub fn path_prefixes(path: &str) -> Vec<String> {
    let trimmed = path.trim_end_matches('/');
    let mut prefixes = Vec::new();
    let mut current = String::new();
    for segment in trimmed.split('/').filter(|s| !s.is_empty()) {
        current.push('/');
        current.push_str(segment);
        prefixes.push(current.clone());
    }
    prefixes
}

/// Convert a root-relative local path into a `/`-separated remote component
pub fn rel_to_remote(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_join_remote() {
        assert_eq!(join_remote("/srv/www", "a/b.txt"), "/srv/www/a/b.txt");
        assert_eq!(join_remote("/srv/www/", "/a"), "/srv/www/a");
        assert_eq!(join_remote("/", "a"), "/a");
        assert_eq!(join_remote("/srv", ""), "/srv");
    }

    #[test]
    fn test_remote_parent() {
        assert_eq!(remote_parent("/a/b/c").as_deref(), Some("/a/b"));
        assert_eq!(remote_parent("/a").as_deref(), Some("/"));
        assert_eq!(remote_parent("/"), None);
    }

    #[test]
    fn test_remote_file_name() {
        assert_eq!(remote_file_name("/a/b/c.txt"), "c.txt");
        assert_eq!(remote_file_name("/a/dir/"), "dir");
    }

    #[test]
    fn test_path_prefixes() {
        assert_eq!(path_prefixes("/a/b/c"), vec!["/a", "/a/b", "/a/b/c"]);
        assert!(path_prefixes("/").is_empty());
    }

    #[test]
    fn test_rel_to_remote_uses_forward_slashes() {
        let rel: PathBuf = ["docs", "api", "index.md"].iter().collect();
        assert_eq!(rel_to_remote(&rel), "docs/api/index.md");
    }
}
