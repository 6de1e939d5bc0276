//! Package.json exports routing table.
//!
//! Turns a manifest's `exports`/`main`/`browser`/`type` fields into an
//! [`ExportsMap`]: destination subpath -> condition -> target. Supported shapes:
//! - no `exports`, no `main`/`browser`: `"."` -> `./index.js`
//! - `exports: "./path"` (optionally dual-delivered with `main`/`browser`)
//! - `exports: { ".": ..., "./sub": ..., "./pattern/*": ... }`
//! - `exports: { "import": ..., "script": ... }` (root conditions)
//!
//! Targets are joined onto the manifest directory so every path in the map is
//! project-relative. Resolution is permissive: shapes it does not understand
//! are skipped, never fatal.

use crate::manifest::Manifest;
use crate::paths;
use crate::pattern::{is_glob, GlobPattern, PatternShapeError};
use serde::ser::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// How an export target is delivered.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExportCondition {
    /// ES module entry.
    Import,
    /// Legacy non-module script entry.
    Script,
    /// Fallback; stays `default` unless the package is `"type": "module"`.
    Default,
    Types,
    Asset,
    Style,
    Sass,
    /// Any other condition key (`node`, `require`, ...), kept for other consumers.
    Other(String),
}

impl ExportCondition {
    /// Parse a condition key as written in the manifest.
    #[must_use]
    pub fn from_key(key: &str) -> Self {
        match key {
            "import" => Self::Import,
            "script" => Self::Script,
            "default" => Self::Default,
            "types" => Self::Types,
            "asset" => Self::Asset,
            "style" => Self::Style,
            "sass" => Self::Sass,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Import => "import",
            Self::Script => "script",
            Self::Default => "default",
            Self::Types => "types",
            Self::Asset => "asset",
            Self::Style => "style",
            Self::Sass => "sass",
            Self::Other(s) => s,
        }
    }

    /// Apply the module-type remap: `default` becomes `import` for ES packages.
    #[must_use]
    pub fn remap_default(self, module_type: ModuleType) -> Self {
        match (self, module_type) {
            (Self::Default, ModuleType::Module) => Self::Import,
            (other, _) => other,
        }
    }
}

impl fmt::Display for ExportCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ExportCondition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// The manifest's `type` declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModuleType {
    /// `"type": "module"`.
    Module,
    /// Anything else, including absent.
    #[default]
    Classic,
}

impl ModuleType {
    #[must_use]
    pub fn from_field(value: Option<&str>) -> Self {
        if value == Some("module") {
            Self::Module
        } else {
            Self::Classic
        }
    }

    /// Condition an unconditioned target registers under.
    #[must_use]
    pub fn default_condition(self) -> ExportCondition {
        ExportCondition::Default.remap_default(self)
    }
}

/// A resolved export target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportTarget {
    /// Concrete project-relative path.
    Path(PathBuf),
    /// Pattern target; the destination's capture is substituted at match time.
    Pattern(GlobPattern),
}

impl fmt::Display for ExportTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(p) => f.write_str(&paths::to_slash(p)),
            Self::Pattern(p) => write!(f, "{p}"),
        }
    }
}

impl Serialize for ExportTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Serialize for GlobPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Condition -> target for one destination subpath.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct ExportEntry(BTreeMap<ExportCondition, ExportTarget>);

impl ExportEntry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target unless the condition already has one.
    ///
    /// Returns `false` when an earlier registration won.
    pub fn insert_first(&mut self, condition: ExportCondition, target: ExportTarget) -> bool {
        if self.0.contains_key(&condition) {
            return false;
        }
        self.0.insert(condition, target);
        true
    }

    #[must_use]
    pub fn get(&self, condition: &ExportCondition) -> Option<&ExportTarget> {
        self.0.get(condition)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ExportCondition, &ExportTarget)> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn merge_first(&mut self, other: ExportEntry) {
        for (condition, target) in other.0 {
            self.insert_first(condition, target);
        }
    }
}

/// A package's full routing table.
///
/// A destination lives in `exact` or `patterns`, never both: classification
/// is by the presence of glob syntax in the subpath.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ExportsMap {
    pub exact: BTreeMap<String, ExportEntry>,
    pub patterns: BTreeMap<GlobPattern, ExportEntry>,
}

impl ExportsMap {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.patterns.is_empty()
    }

    fn add_exact(&mut self, destination: &str, entry: ExportEntry) {
        if entry.is_empty() {
            return;
        }
        self.exact
            .entry(destination.to_string())
            .or_default()
            .merge_first(entry);
    }

    fn add_pattern(&mut self, destination: GlobPattern, entry: ExportEntry) {
        if entry.is_empty() {
            return;
        }
        self.patterns.entry(destination).or_default().merge_first(entry);
    }
}

/// Result of resolving one manifest.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub exports: ExportsMap,
    /// Pattern entries dropped because of a bad wildcard count.
    pub pattern_errors: Vec<PatternShapeError>,
}

/// Resolve a manifest living in `dir` into its routing table.
#[must_use]
pub fn resolve_exports(manifest: &Manifest, dir: &Path) -> Resolution {
    let mut resolution = Resolution::default();
    let module_type = manifest.module_type;
    let type_condition = module_type.default_condition();
    let script = manifest.script_entry();

    match (&manifest.exports, script) {
        (None, None) => {
            let mut entry = ExportEntry::new();
            entry.insert_first(type_condition, exact_target(dir, "./index.js"));
            resolution.exports.add_exact(".", entry);
        }
        (Some(Value::String(exports)), script) => {
            let mut entry = ExportEntry::new();
            if let Some(script) = script {
                entry.insert_first(ExportCondition::Import, exact_target(dir, exports));
                entry.insert_first(ExportCondition::Script, exact_target(dir, script));
            } else {
                entry.insert_first(ExportCondition::Default, exact_target(dir, exports));
            }
            resolution.exports.add_exact(".", entry);
        }
        (None, Some(script)) => {
            let mut entry = ExportEntry::new();
            entry.insert_first(type_condition, exact_target(dir, script));
            resolution.exports.add_exact(".", entry);
        }
        (Some(Value::Object(map)), _) => {
            resolve_exports_object(map, dir, module_type, &mut resolution);
        }
        (Some(other), _) => {
            debug!(kind = json_kind(other), "Ignoring exports field of unsupported shape");
        }
    }

    resolution
}

fn resolve_exports_object(
    map: &Map<String, Value>,
    dir: &Path,
    module_type: ModuleType,
    resolution: &mut Resolution,
) {
    // Root conditions: `{ "import": "./a.js", "script": "./b.js" }`.
    if !map.is_empty() && !map.keys().any(|k| k.starts_with('.')) {
        let entry = conditions_entry(&Value::Object(map.clone()), module_type, |s| {
            Some(exact_target(dir, s))
        });
        resolution.exports.add_exact(".", entry);
        return;
    }

    for (destination, value) in map {
        if !destination.starts_with('.') {
            debug!(key = %destination, "Skipping exports key that is neither a subpath nor in a conditions object");
            continue;
        }

        if !is_glob(destination) {
            let entry = conditions_entry(value, module_type, |s| Some(exact_target(dir, s)));
            resolution.exports.add_exact(destination, entry);
            continue;
        }

        let pattern = match GlobPattern::parse(destination) {
            Ok(p) => p,
            Err(e) => {
                resolution.pattern_errors.push(e);
                continue;
            }
        };
        let mut target_errors = Vec::new();
        let entry = conditions_entry(value, module_type, |s| match pattern_target(dir, s) {
            Ok(t) => Some(t),
            Err(e) => {
                target_errors.push(e);
                None
            }
        });
        resolution.pattern_errors.extend(target_errors);
        resolution.exports.add_pattern(pattern, entry);
    }
}

/// Build the entry for one destination's value (string or conditions object).
fn conditions_entry<F>(value: &Value, module_type: ModuleType, mut target: F) -> ExportEntry
where
    F: FnMut(&str) -> Option<ExportTarget>,
{
    let mut entry = ExportEntry::new();
    match value {
        Value::Object(conditions) => {
            for (key, value) in conditions {
                let Some(s) = target_str(value) else {
                    if !value.is_null() {
                        debug!(condition = %key, "Skipping condition with unsupported target");
                    }
                    continue;
                };
                let condition = ExportCondition::from_key(key).remap_default(module_type);
                if let Some(t) = target(s) {
                    entry.insert_first(condition, t);
                }
            }
        }
        other => {
            if let Some(t) = target_str(other).and_then(&mut target) {
                entry.insert_first(module_type.default_condition(), t);
            }
        }
    }
    entry
}

/// Pick a target string out of a condition value.
///
/// Arrays use their first usable element; nested condition objects use their
/// `default` branch.
fn target_str(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Array(items) => items.iter().find_map(target_str),
        Value::Object(nested) => nested.get("default").and_then(target_str),
        _ => None,
    }
}

fn exact_target(dir: &Path, target: &str) -> ExportTarget {
    ExportTarget::Path(paths::join_normalized(dir, target))
}

fn pattern_target(dir: &Path, target: &str) -> Result<ExportTarget, PatternShapeError> {
    if !is_glob(target) {
        return Ok(exact_target(dir, target));
    }
    let pattern = GlobPattern::parse(target)?.rooted(dir)?;
    Ok(ExportTarget::Pattern(pattern))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
