//! Bundler seam.
//!
//! The orchestrator never bundles anything itself. It hands each bucket to a
//! [`Bundler`] implementation as a [`BundleRequest`] and gets back the emitted
//! chunks and assets, plus an optional opaque cache token to thread into the
//! next incremental pass.
//!
//! ## Usage
//!
//! ```ignore
//! use localpkg_core::bundler::{Bundler, PassthroughBundler};
//!
//! let bundler = PassthroughBundler::new(".");
//! let output = bundler.bundle(request).await?;
//! ```

mod passthrough;

pub use passthrough::PassthroughBundler;

use crate::config::{BuildOverrides, Format, Platform};
use crate::partition::BucketKey;
use futures::future::BoxFuture;
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Bundle options after defaults and overrides are merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleOptions {
    /// Output module format.
    pub format: Format,
    /// Target environment, passed through to the bundler as-is.
    pub target: String,
    /// Platform the output runs on.
    pub platform: Platform,
    /// Follow imports and inline them.
    pub bundle: bool,
    /// Minify output. Also selects compact nomodule wrapping.
    pub minify: bool,
    /// Emit source maps.
    pub sourcemap: bool,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            format: Format::Esm,
            target: "esnext".to_string(),
            platform: Platform::Browser,
            bundle: true,
            minify: true,
            sourcemap: false,
        }
    }
}

impl BundleOptions {
    /// Merge caller overrides over the defaults.
    ///
    /// `source_maps` is the pass-wide flag from the partition; it can turn
    /// source maps on but never off.
    #[must_use]
    pub fn resolve(overrides: &BuildOverrides, source_maps: bool) -> Self {
        let defaults = Self::default();
        Self {
            format: overrides.format.unwrap_or(defaults.format),
            target: overrides.target.clone().unwrap_or(defaults.target),
            platform: overrides.platform.unwrap_or(defaults.platform),
            bundle: overrides.bundle.unwrap_or(defaults.bundle),
            minify: overrides.minify.unwrap_or(defaults.minify),
            sourcemap: overrides.sourcemap.unwrap_or(defaults.sourcemap) || source_maps,
        }
    }
}

/// Opaque per-bucket bundler state.
///
/// Only the bundler that produced a token knows what is inside it.
pub struct CacheToken(Box<dyn Any + Send + Sync>);

impl CacheToken {
    pub fn new<T: Any + Send + Sync>(state: T) -> Self {
        Self(Box::new(state))
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    /// Take the state back out, or return the token unchanged if `T` is wrong.
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        self.0.downcast::<T>().map(|b| *b).map_err(Self)
    }
}

impl std::fmt::Debug for CacheToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CacheToken(..)")
    }
}

/// One bundler invocation.
#[derive(Debug)]
pub struct BundleRequest {
    pub bucket: BucketKey,
    /// Entry files, project-relative, in deterministic order.
    pub inputs: Vec<PathBuf>,
    /// Output file name reserved for each input. Inputs missing here are
    /// named by the bundler.
    pub output_names: BTreeMap<PathBuf, String>,
    /// Directory this bucket's outputs belong to.
    pub out_dir: PathBuf,
    pub options: BundleOptions,
    /// Token returned by the previous call for the same bucket.
    pub cache: Option<CacheToken>,
}

/// File contents emitted by a bundler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contents {
    Text(String),
    Bytes(Vec<u8>),
}

impl Contents {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(s) => s.as_bytes(),
            Self::Bytes(b) => b,
        }
    }
}

/// An emitted code chunk.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Chunk name (entry stem for entry chunks).
    pub name: String,
    /// Output file name relative to the request's `out_dir`.
    pub file_name: String,
    /// Chunk code.
    pub code: String,
    /// Source map JSON (if enabled).
    pub source_map: Option<String>,
    /// Entry module this chunk was produced for; `None` for shared chunks.
    pub entry: Option<PathBuf>,
}

/// A non-code artifact, passed to the sink verbatim.
#[derive(Debug, Clone)]
pub struct Asset {
    /// Output file name relative to the request's `out_dir`.
    pub file_name: String,
    pub contents: Contents,
}

/// Result of one bundler invocation.
#[derive(Debug, Default)]
pub struct BundleOutput {
    pub chunks: Vec<Chunk>,
    pub assets: Vec<Asset>,
    pub cache: Option<CacheToken>,
}

/// The bundler failed for a bucket.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct BundlerError {
    pub message: String,
    /// File the failure is attributed to, when known.
    pub path: Option<PathBuf>,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl BundlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            source: None,
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        crate::codes::BUNDLER_INVOCATION_FAILED
    }
}

/// An external bundler.
///
/// Implementations must be shareable across concurrently running buckets.
pub trait Bundler: Send + Sync {
    fn bundle(&self, request: BundleRequest) -> BoxFuture<'_, Result<BundleOutput, BundlerError>>;
}
