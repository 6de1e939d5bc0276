use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How a `default` export condition is delivered when the package does not
/// declare `"type": "module"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultDelivery {
    /// Bundle as an ES module.
    Import,
    /// Bundle and wrap as a classic script.
    Script,
}

/// Output module format passed to the bundler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Esm,
    Cjs,
    Iife,
}

impl Format {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Esm => "esm",
            Self::Cjs => "cjs",
            Self::Iife => "iife",
        }
    }
}

/// Platform the bundle is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Browser,
    Node,
    Neutral,
}

/// Caller-supplied bundler settings; every field set here beats the default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BuildOverrides {
    pub format: Option<Format>,
    pub target: Option<String>,
    pub platform: Option<Platform>,
    pub bundle: Option<bool>,
    pub minify: Option<bool>,
    pub sourcemap: Option<bool>,
}

/// Pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Build root; named buckets write under `<out_dir>/<package>`.
    pub out_dir: PathBuf,

    /// Bundle packages marked `"private": true`.
    pub include_private: bool,

    /// Package-name globs to leave out of bundling.
    pub exclude: Vec<String>,

    /// Treatment of the `default` condition; `None` leaves it unbundled.
    pub exports_default: Option<DefaultDelivery>,

    /// Keep per-bucket bundler caches between passes.
    pub incremental: bool,

    /// Bundler option overrides.
    pub overrides: BuildOverrides,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("_site"),
            include_private: false,
            exclude: Vec::new(),
            exports_default: None,
            incremental: false,
            overrides: BuildOverrides::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    #[must_use]
    pub fn with_out_dir(mut self, out_dir: impl Into<PathBuf>) -> Self {
        self.out_dir = out_dir.into();
        self
    }

    #[must_use]
    pub fn with_include_private(mut self, include: bool) -> Self {
        self.include_private = include;
        self
    }

    #[must_use]
    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    #[must_use]
    pub fn with_exports_default(mut self, delivery: Option<DefaultDelivery>) -> Self {
        self.exports_default = delivery;
        self
    }

    #[must_use]
    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    #[must_use]
    pub fn with_overrides(mut self, overrides: BuildOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}
