#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

//! Local package routing and multi-bundle builds.
//!
//! Manifests are resolved into [`ExportsMap`]s and held in a
//! [`PackageRegistry`]. Each pass [`partition`]s its source files into
//! per-package buckets, and the [`Orchestrator`] bundles every bucket through a
//! [`Bundler`] and writes the results to an [`OutputSink`].

pub mod bundler;
pub mod codes;
pub mod config;
pub mod discover;
pub mod error;
pub mod exports;
pub mod importmap;
pub mod manifest;
pub mod orchestrate;
pub mod partition;
pub mod paths;
pub mod pattern;
pub mod pipeline;
pub mod postprocess;
pub mod registry;
pub mod version;

pub use bundler::{BundleOptions, BundleOutput, BundleRequest, Bundler, BundlerError, CacheToken};
pub use config::{BuildOverrides, DefaultDelivery, PipelineConfig};
pub use error::Error;
pub use exports::{ExportCondition, ExportEntry, ExportTarget, ExportsMap, ModuleType};
pub use importmap::ImportMap;
pub use manifest::{Manifest, ManifestError, Package};
pub use orchestrate::{BundleReport, Orchestrator};
pub use partition::{partition, Bucket, BucketKey, Partition, SourceFile};
pub use pipeline::{ManifestSource, PassReport, Pipeline};
pub use postprocess::{wrap_nomodule, OutputFile, OutputSink, SinkError};
pub use registry::{EligibilityPolicy, PackageRegistry, RegistryError};
pub use version::{SCHEMA_VERSION, VERSION};
