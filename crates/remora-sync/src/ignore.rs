//! Exclusion pattern matching

/// Exclusion rules applied to root-relative paths
///
/// A path is excluded when a pattern is a substring of its `/`-separated
/// root-relative form, or when a pattern equals one of its segments exactly.
/// Both checks are applied; a match on either triggers exclusion. Excluded
/// paths are invisible to every pass, including deletion reconciliation.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    patterns: Vec<String>,
}

impl IgnoreRules {
    /// Build rules from a pattern list, dropping empty patterns
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(Into::into)
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Whether a root-relative path matches any pattern
    pub fn is_ignored(&self, rel: &str) -> bool {
        self.patterns.iter().any(|pattern| {
            rel.contains(pattern.as_str()) || rel.split('/').any(|segment| segment == pattern)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substring_match() {
        let rules = IgnoreRules::new(["node_modules"]);
        assert!(rules.is_ignored("web/node_modules/react/index.js"));
        assert!(rules.is_ignored("node_modules"));
        assert!(!rules.is_ignored("web/src/index.js"));
    }

    #[test]
    fn test_segment_match() {
        let rules = IgnoreRules::new([".git"]);
        assert!(rules.is_ignored(".git/config"));
        assert!(rules.is_ignored("vendor/.git/config"));
    }

    #[test]
    fn test_substring_matches_inside_names() {
        let rules = IgnoreRules::new([".log"]);
        assert!(rules.is_ignored("build/output.log"));
        assert!(rules.is_ignored("logs/app.log.1"));
    }

    #[test]
    fn test_empty_patterns_never_match() {
        let rules = IgnoreRules::new(Vec::<String>::new());
        assert!(!rules.is_ignored("anything/at/all"));

        let rules = IgnoreRules::new([""]);
        assert!(!rules.is_ignored("anything"));
    }
}
