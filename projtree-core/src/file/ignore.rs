use ignore::gitignore::{Gitignore, GitignoreBuilder};

/// File names whose contents are merged into the import's ignore rules.
pub const IGNORE_FILE_NAMES: [&str; 2] = [".gitignore", ".aiignore"];

/// Version-control metadata directory that is never imported.
pub const VCS_DIR: &str = ".git";

/// Gitignore-syntax matcher compiled from in-memory ignore file text.
#[derive(Clone)]
pub struct IgnoreMatcher {
    matcher: Gitignore,
}

impl IgnoreMatcher {
    /// Compiles one or more ignore file bodies. Later sources may re-include
    /// paths with `!pattern` exactly as a single concatenated file would.
    pub fn new<'a, I>(sources: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut builder = GitignoreBuilder::new(".");
        for source in sources {
            for line in source.lines() {
                builder.add_line(None, line)?;
            }
        }

        let matcher = builder.build()?;
        Ok(Self { matcher })
    }

    pub fn empty() -> Self {
        Self {
            matcher: Gitignore::empty(),
        }
    }

    /// True when `path` (relative, `/`-separated) or any of its parent
    /// directories is ignored.
    pub fn is_ignored(&self, path: &str, is_dir: bool) -> bool {
        if path.is_empty() {
            return false;
        }
        self.matcher
            .matched_path_or_any_parents(path, is_dir)
            .is_ignore()
    }
}

/// Paths dropped from every import regardless of ignore rules: anything under
/// the VCS directory and the ignore files themselves.
pub fn is_always_excluded(path: &str) -> bool {
    let mut segments = path.split('/');
    if segments.clone().any(|segment| segment == VCS_DIR) {
        return true;
    }
    segments
        .next_back()
        .is_some_and(|name| IGNORE_FILE_NAMES.contains(&name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_patterns() {
        let matcher = IgnoreMatcher::new(["target/\n*.log\n# comment\n"]).unwrap();
        assert!(matcher.is_ignored("target/debug/app", false));
        assert!(matcher.is_ignored("logs/app.log", false));
        assert!(!matcher.is_ignored("src/main.rs", false));
    }

    #[test]
    fn test_anchored_pattern() {
        let matcher = IgnoreMatcher::new(["/build\n"]).unwrap();
        assert!(matcher.is_ignored("build/out.js", false));
        assert!(!matcher.is_ignored("src/build/out.js", false));
    }

    #[test]
    fn test_merged_sources_can_negate() {
        let matcher = IgnoreMatcher::new(["*.env\n", "!keep.env\n"]).unwrap();
        assert!(matcher.is_ignored("secret.env", false));
        assert!(!matcher.is_ignored("keep.env", false));
    }

    #[test]
    fn test_empty_matcher() {
        assert!(!IgnoreMatcher::empty().is_ignored("anything", false));
    }

    #[test]
    fn test_always_excluded() {
        assert!(is_always_excluded(".git/config"));
        assert!(is_always_excluded("sub/.git/HEAD"));
        assert!(is_always_excluded(".gitignore"));
        assert!(is_always_excluded("nested/.aiignore"));
        assert!(!is_always_excluded("src/git.rs"));
        assert!(!is_always_excluded(".github/workflows/ci.yml"));
    }
}
