//! Split a pass's source files into per-package buckets and one shared bucket.
//!
//! Per candidate file:
//! 1. Exact pass: every eligible package's exact export targets are compared;
//!    each match adds the file to that package's bucket (several packages may
//!    claim the same file).
//! 2. Pattern pass, only when no exact target matched anywhere: the first
//!    package whose pattern targets capture the file claims it, and the
//!    concrete destination (capture substituted into the destination pattern)
//!    is recorded with the file's output name.
//! 3. Unclaimed files land in the shared bucket.
//!
//! Only `import`, `script` and (when configured) `default` conditions are
//! bundled; `types`, `style` and other passthrough conditions are ignored.

use crate::config::DefaultDelivery;
use crate::exports::{ExportCondition, ExportTarget};
use crate::manifest::Package;
use crate::paths;
use crate::registry::{EligibilityPolicy, PackageRegistry};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A candidate source file of the current pass.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SourceFile {
    /// Project-relative path.
    pub path: PathBuf,
    /// The host asked for a source map for this file.
    pub source_map: bool,
}

impl SourceFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            source_map: false,
        }
    }

    #[must_use]
    pub fn with_source_map(mut self, source_map: bool) -> Self {
        self.source_map = source_map;
        self
    }
}

/// Identity of a bucket; also keys the per-bucket bundler cache.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BucketKey {
    /// Files that belong to no package.
    Shared,
    Package(String),
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared => f.write_str("<shared>"),
            Self::Package(name) => f.write_str(name),
        }
    }
}

impl Serialize for BucketKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Shared => serializer.serialize_none(),
            Self::Package(name) => serializer.serialize_some(name),
        }
    }
}

/// Input files for one bundler invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    #[serde(rename = "package")]
    pub key: BucketKey,
    pub inputs: BTreeSet<PathBuf>,
    /// Inputs whose output must be wrapped as a classic script.
    pub nomodule: BTreeSet<PathBuf>,
    /// Output file name -> originating source file.
    pub files_by_output_name: BTreeMap<String, SourceFile>,
    /// Input -> output file name; unique within the bucket.
    #[serde(skip)]
    pub output_names: BTreeMap<PathBuf, String>,
    /// Destination subpath -> condition -> output file name.
    pub delivered: BTreeMap<String, BTreeMap<ExportCondition, String>>,
}

impl Bucket {
    #[must_use]
    pub fn new(key: BucketKey) -> Self {
        Self {
            key,
            inputs: BTreeSet::new(),
            nomodule: BTreeSet::new(),
            files_by_output_name: BTreeMap::new(),
            output_names: BTreeMap::new(),
            delivered: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn package_name(&self) -> Option<&str> {
        match &self.key {
            BucketKey::Shared => None,
            BucketKey::Package(name) => Some(name),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    fn add_input(&mut self, file: &SourceFile, path: &Path) -> String {
        if let Some(output) = self.output_names.get(path) {
            return output.clone();
        }
        let output =
            paths::unique_output_name(path, |name| self.files_by_output_name.contains_key(name));
        if output != paths::output_name(path) {
            debug!(
                bucket = %self.key,
                input = %path.display(),
                output = %output,
                "Output name already taken; numbering"
            );
        }
        self.inputs.insert(path.to_path_buf());
        self.output_names.insert(path.to_path_buf(), output.clone());
        self.files_by_output_name.insert(output.clone(), file.clone());
        output
    }

    fn deliver(
        &mut self,
        file: &SourceFile,
        path: &Path,
        destination: String,
        condition: &ExportCondition,
        delivery: Delivery,
    ) {
        let output = self.add_input(file, path);
        if delivery == Delivery::NoModule {
            self.nomodule.insert(path.to_path_buf());
        }
        self.delivered
            .entry(destination)
            .or_default()
            .entry(condition.clone())
            .or_insert(output);
    }
}

/// Result of partitioning one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    /// One bucket per eligible package, in manifest-location order.
    pub packages: Vec<Bucket>,
    pub shared: Bucket,
    /// Some file in the pass asked for source maps; applies to every bucket.
    pub source_maps: bool,
}

impl Partition {
    /// Package buckets followed by the shared bucket.
    pub fn buckets(&self) -> impl Iterator<Item = &Bucket> {
        self.packages.iter().chain(std::iter::once(&self.shared))
    }

    #[must_use]
    pub fn bucket(&self, key: &BucketKey) -> Option<&Bucket> {
        self.buckets().find(|b| &b.key == key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Module,
    NoModule,
}

fn delivery_for(condition: &ExportCondition, exports_default: Option<DefaultDelivery>) -> Option<Delivery> {
    match condition {
        ExportCondition::Import => Some(Delivery::Module),
        ExportCondition::Script => Some(Delivery::NoModule),
        ExportCondition::Default => exports_default.map(|d| match d {
            DefaultDelivery::Import => Delivery::Module,
            DefaultDelivery::Script => Delivery::NoModule,
        }),
        _ => None,
    }
}

/// Partition `files` against the eligible packages of `registry`.
#[must_use]
pub fn partition(
    registry: &PackageRegistry,
    files: &[SourceFile],
    policy: &EligibilityPolicy,
    exports_default: Option<DefaultDelivery>,
) -> Partition {
    let mut seen_names = BTreeSet::new();
    let mut packages: Vec<(Bucket, &Package)> = Vec::new();
    registry.for_each_eligible(policy, |location, package| {
        let Some(name) = package.name.clone() else {
            return;
        };
        if !seen_names.insert(name.clone()) {
            warn!(
                manifest = %location.display(),
                name = %name,
                "Duplicate package name; keeping the first manifest"
            );
            return;
        }
        packages.push((Bucket::new(BucketKey::Package(name)), package));
    });

    let mut shared = Bucket::new(BucketKey::Shared);
    let mut source_maps = false;

    for file in files {
        source_maps |= file.source_map;
        let path = paths::normalize(&file.path);

        let mut claimed = false;
        for (bucket, package) in &mut packages {
            claimed |= claim_exact(bucket, package, file, &path, exports_default);
        }

        if !claimed {
            let candidate = paths::to_slash(&path);
            for (bucket, package) in &mut packages {
                if claim_pattern(bucket, package, file, &path, &candidate, exports_default) {
                    claimed = true;
                    break;
                }
            }
        }

        if !claimed {
            shared.add_input(file, &path);
        }
    }

    let partition = Partition {
        packages: packages.into_iter().map(|(b, _)| b).collect(),
        shared,
        source_maps,
    };
    debug!(
        packages = partition.packages.len(),
        shared_inputs = partition.shared.inputs.len(),
        source_maps,
        "Partitioned build pass"
    );
    partition
}

fn claim_exact(
    bucket: &mut Bucket,
    package: &Package,
    file: &SourceFile,
    path: &Path,
    exports_default: Option<DefaultDelivery>,
) -> bool {
    let mut claimed = false;
    for (destination, entry) in &package.exports.exact {
        for (condition, target) in entry.iter() {
            let Some(delivery) = delivery_for(condition, exports_default) else {
                continue;
            };
            let ExportTarget::Path(target) = target else {
                continue;
            };
            if paths::same_module(path, target) {
                bucket.deliver(file, path, destination.clone(), condition, delivery);
                claimed = true;
            }
        }
    }
    claimed
}

fn claim_pattern(
    bucket: &mut Bucket,
    package: &Package,
    file: &SourceFile,
    path: &Path,
    candidate: &str,
    exports_default: Option<DefaultDelivery>,
) -> bool {
    let mut claimed = false;
    for (destination, entry) in &package.exports.patterns {
        for (condition, target) in entry.iter() {
            let Some(delivery) = delivery_for(condition, exports_default) else {
                continue;
            };
            let concrete = match target {
                ExportTarget::Pattern(pattern) => pattern
                    .capture_module(candidate)
                    .map(|star| destination.substitute(star)),
                ExportTarget::Path(target) => {
                    paths::same_module(path, target).then(|| destination.to_string())
                }
            };
            if let Some(concrete) = concrete {
                bucket.deliver(file, path, concrete, condition, delivery);
                claimed = true;
            }
        }
    }
    claimed
}
