//! Single-wildcard subpath patterns.
//!
//! Pattern exports (`"./utils/*": "./src/utils/*.js"`) carry exactly one `*`.
//! Matching is structural (prefix + capture + suffix), case-sensitive, and never
//! touches the filesystem.

use crate::paths;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Glob metacharacters that turn a subpath into a pattern subpath.
const GLOB_CHARS: &[char] = &['*', '?', '[', ']', '{', '}'];

/// Check whether a subpath string contains glob syntax.
#[must_use]
pub fn is_glob(s: &str) -> bool {
    s.contains(GLOB_CHARS)
}

/// A subpath pattern did not have exactly one `*`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("pattern {pattern:?} must contain exactly one `*` wildcard (found {wildcards})")]
pub struct PatternShapeError {
    pub pattern: String,
    pub wildcards: usize,
}

impl PatternShapeError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        crate::codes::EXPORTS_PATTERN_SHAPE
    }
}

/// A parsed pattern with exactly one `*`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GlobPattern {
    prefix: String,
    suffix: String,
}

impl GlobPattern {
    /// Parse a pattern, rejecting zero or several wildcards.
    pub fn parse(pattern: &str) -> Result<Self, PatternShapeError> {
        let wildcards = pattern.matches('*').count();
        if wildcards != 1 {
            return Err(PatternShapeError {
                pattern: pattern.to_string(),
                wildcards,
            });
        }
        let (prefix, suffix) = pattern
            .split_once('*')
            .ok_or_else(|| PatternShapeError {
                pattern: pattern.to_string(),
                wildcards,
            })?;
        Ok(Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        })
    }

    /// Re-root a manifest-relative pattern onto its package directory.
    pub fn rooted(&self, root: &Path) -> Result<Self, PatternShapeError> {
        let joined = paths::join_normalized(root, &self.to_string());
        Self::parse(&paths::to_slash(&joined))
    }

    /// Match `candidate` and return the text the `*` stands for.
    ///
    /// Empty captures never match: `./utils/*` does not match `./utils/`.
    #[must_use]
    pub fn capture<'a>(&self, candidate: &'a str) -> Option<&'a str> {
        capture_between(&self.prefix, &self.suffix, candidate)
    }

    /// Like [`capture`](Self::capture), but a script source also matches a
    /// pattern naming a different script extension (`src/a.ts` ~ `src/*.js`).
    #[must_use]
    pub fn capture_module<'a>(&self, candidate: &'a str) -> Option<&'a str> {
        if let Some(star) = self.capture(candidate) {
            return Some(star);
        }
        let candidate_ext = paths::script_extension(candidate)?;
        let suffix_ext = paths::script_extension(&self.suffix)?;
        let candidate_base = &candidate[..candidate.len() - candidate_ext.len()];
        let suffix_base = &self.suffix[..self.suffix.len() - suffix_ext.len()];
        capture_between(&self.prefix, suffix_base, candidate_base)
    }

    /// Put a captured value back in place of the `*`.
    #[must_use]
    pub fn substitute(&self, star: &str) -> String {
        format!("{}{star}{}", self.prefix, self.suffix)
    }
}

impl fmt::Display for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}*{}", self.prefix, self.suffix)
    }
}

fn capture_between<'a>(prefix: &str, suffix: &str, candidate: &'a str) -> Option<&'a str> {
    let rest = candidate.strip_prefix(prefix)?;
    let star = rest.strip_suffix(suffix)?;
    if star.is_empty() {
        return None;
    }
    Some(star)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_glob() {
        assert!(is_glob("./utils/*"));
        assert!(is_glob("./a?.js"));
        assert!(!is_glob("./utils/index"));
        assert!(!is_glob("."));
    }

    #[test]
    fn test_parse_rejects_wrong_wildcard_count() {
        let err = GlobPattern::parse("./a/*/b/*").unwrap_err();
        assert_eq!(err.wildcards, 2);
        assert_eq!(err.code(), "EXPORTS_PATTERN_SHAPE");

        let err = GlobPattern::parse("./a?.js").unwrap_err();
        assert_eq!(err.wildcards, 0);
    }

    #[test]
    fn test_capture_simple() {
        let p = GlobPattern::parse("./utils/*").unwrap();
        assert_eq!(p.capture("./utils/format"), Some("format"));
        assert_eq!(p.capture("./utils/deep/format"), Some("deep/format"));
        assert_eq!(p.capture("./other/format"), None);
    }

    #[test]
    fn test_capture_with_suffix() {
        let p = GlobPattern::parse("pkg/src/*.js").unwrap();
        assert_eq!(p.capture("pkg/src/a.js"), Some("a"));
        assert_eq!(p.capture("pkg/src/a.ts"), None);
        assert_eq!(p.capture("pkg/src/.js"), None);
    }

    #[test]
    fn test_capture_is_case_sensitive() {
        let p = GlobPattern::parse("pkg/Src/*.js").unwrap();
        assert_eq!(p.capture("pkg/src/a.js"), None);
    }

    #[test]
    fn test_capture_module_across_extensions() {
        let p = GlobPattern::parse("pkg/src/*.js").unwrap();
        assert_eq!(p.capture_module("pkg/src/a.ts"), Some("a"));
        assert_eq!(p.capture_module("pkg/src/a.tsx"), Some("a"));
        assert_eq!(p.capture_module("pkg/src/a.css"), None);
        assert_eq!(p.capture_module("other/a.ts"), None);
    }

    #[test]
    fn test_substitute() {
        let p = GlobPattern::parse("./features/*").unwrap();
        assert_eq!(p.substitute("search"), "./features/search");
        assert_eq!(p.to_string(), "./features/*");
    }

    #[test]
    fn test_rooted() {
        let p = GlobPattern::parse("./src/*.js").unwrap();
        let rooted = p.rooted(Path::new("packages/ui")).unwrap();
        assert_eq!(rooted.to_string(), "packages/ui/src/*.js");
        assert_eq!(rooted.capture_module("packages/ui/src/button.ts"), Some("button"));
    }
}
