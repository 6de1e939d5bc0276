//! Package manifest (`package.json`) parsing.
//!
//! Only the fields that drive routing are read: `name`, `private`, `type`,
//! `main`, `browser` and `exports`. Anything else is ignored, and fields with
//! an unexpected JSON type are treated as absent.

use crate::exports::{resolve_exports, ExportsMap, ModuleType};
use crate::pattern::PatternShapeError;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Manifest file name scanned for during discovery.
pub const MANIFEST_NAME: &str = "package.json";

/// A manifest could not be turned into a [`Manifest`].
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path} must contain a JSON object")]
    Shape { path: PathBuf },
}

impl ManifestError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Read { .. } => crate::codes::MANIFEST_READ_ERROR,
            Self::Parse { .. } => crate::codes::MANIFEST_PARSE_ERROR,
            Self::Shape { .. } => crate::codes::MANIFEST_SHAPE_ERROR,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Read { path, .. } | Self::Parse { path, .. } | Self::Shape { path } => path,
        }
    }
}

/// The routing-relevant subset of a package manifest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub name: Option<String>,
    pub private: bool,
    pub module_type: ModuleType,
    pub main: Option<String>,
    /// Only the string form of `browser`; the object (replacement map) form is ignored.
    pub browser: Option<String>,
    /// Raw `exports` value; `null` is stored as absent.
    pub exports: Option<serde_json::Value>,
}

impl Manifest {
    /// Parse manifest text. `path` is used for error reporting only.
    pub fn parse(path: &Path, content: &str) -> Result<Self, ManifestError> {
        let value: serde_json::Value =
            serde_json::from_str(content).map_err(|source| ManifestError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_value(value).ok_or_else(|| ManifestError::Shape {
            path: path.to_path_buf(),
        })
    }

    /// Extract fields from an already-parsed value. Returns `None` if it is
    /// not an object.
    #[must_use]
    pub fn from_value(value: serde_json::Value) -> Option<Self> {
        let serde_json::Value::Object(mut obj) = value else {
            return None;
        };
        let string = |v: Option<&serde_json::Value>| v.and_then(|v| v.as_str()).map(String::from);

        Some(Self {
            name: string(obj.get("name")).filter(|n| !n.is_empty()),
            private: obj
                .get("private")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false),
            module_type: ModuleType::from_field(obj.get("type").and_then(|v| v.as_str())),
            main: string(obj.get("main")),
            browser: string(obj.get("browser")),
            exports: obj.remove("exports").filter(|v| !v.is_null()),
        })
    }

    /// Legacy script entry: `main`, falling back to `browser`.
    #[must_use]
    pub fn script_entry(&self) -> Option<&str> {
        self.main.as_deref().or(self.browser.as_deref())
    }

    /// Resolve into a [`Package`] rooted at the manifest's directory.
    ///
    /// Pattern shape errors are returned alongside so the caller can log them;
    /// the offending entries are already dropped from the package.
    #[must_use]
    pub fn into_package(self, manifest_path: &Path) -> (Package, Vec<PatternShapeError>) {
        let root = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let resolution = resolve_exports(&self, &root);
        let package = Package {
            name: self.name,
            private: self.private,
            module_type: self.module_type,
            exports: resolution.exports,
            root,
        };
        (package, resolution.pattern_errors)
    }
}

/// A discovered local package.
///
/// Replaced wholesale when its manifest is reprocessed; never patched in place.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Package {
    /// Required for bundling; unnamed packages stay registered but ineligible.
    pub name: Option<String>,
    pub private: bool,
    #[serde(skip)]
    pub module_type: ModuleType,
    pub exports: ExportsMap,
    /// Directory containing the manifest, project-relative.
    pub root: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exports::ExportCondition;

    #[test]
    fn test_parse_fields() {
        let m = Manifest::parse(
            Path::new("pkg/package.json"),
            r#"{"name":"pkg","private":true,"type":"module","main":"./m.js","browser":{"fs":false}}"#,
        )
        .unwrap();
        assert_eq!(m.name.as_deref(), Some("pkg"));
        assert!(m.private);
        assert_eq!(m.module_type, ModuleType::Module);
        assert_eq!(m.script_entry(), Some("./m.js"));
        assert_eq!(m.browser, None);
        assert!(m.exports.is_none());
    }

    #[test]
    fn test_parse_malformed_json() {
        let err = Manifest::parse(Path::new("broken/package.json"), "{\"name\": ").unwrap_err();
        assert_eq!(err.code(), "MANIFEST_PARSE_ERROR");
        assert_eq!(err.path(), Path::new("broken/package.json"));
    }

    #[test]
    fn test_parse_non_object() {
        let err = Manifest::parse(Path::new("package.json"), "[1, 2]").unwrap_err();
        assert!(matches!(err, ManifestError::Shape { .. }));
    }

    #[test]
    fn test_wrong_field_types_are_absent() {
        let m = Manifest::parse(
            Path::new("package.json"),
            r#"{"name": 7, "private": "yes", "main": false, "exports": null}"#,
        )
        .unwrap();
        assert_eq!(m, Manifest::default());
    }

    #[test]
    fn test_into_package_roots_targets() {
        let m = Manifest::parse(
            Path::new("packages/ui/package.json"),
            r#"{"name":"ui","exports":{"./button":"./src/button.js"}}"#,
        )
        .unwrap();
        let (pkg, errors) = m.into_package(Path::new("packages/ui/package.json"));
        assert!(errors.is_empty());
        assert_eq!(pkg.root, PathBuf::from("packages/ui"));
        assert_eq!(
            pkg.exports.exact["./button"]
                .get(&ExportCondition::Default)
                .unwrap()
                .to_string(),
            "packages/ui/src/button.js"
        );
    }

    #[test]
    fn test_root_manifest_has_empty_root() {
        let m = Manifest::parse(Path::new("package.json"), r#"{"name":"site"}"#).unwrap();
        let (pkg, _) = m.into_package(Path::new("package.json"));
        assert_eq!(pkg.root, PathBuf::new());
        assert_eq!(
            pkg.exports.exact["."]
                .get(&ExportCondition::Default)
                .unwrap()
                .to_string(),
            "index.js"
        );
    }
}
