//! Multi-bucket bundle orchestration.
//!
//! Every non-empty bucket of a partition becomes one [`BundleRequest`]. All
//! requests are issued together and joined; results are then post-processed
//! and written to the sink in bucket order. Each bucket keeps its own cache
//! token, threaded back into the next pass when incremental mode is on.

use crate::bundler::{BundleOptions, BundleOutput, BundleRequest, Bundler, BundlerError, CacheToken};
use crate::config::BuildOverrides;
use crate::partition::{Bucket, BucketKey, Partition};
use crate::postprocess::{process_output, OutputSink, SinkError};
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// A bucket whose bundler call failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketFailure {
    pub bucket: BucketKey,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// An output the sink refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteFailure {
    pub path: PathBuf,
    pub code: &'static str,
    pub message: String,
}

/// Outcome of one orchestration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BundleReport {
    /// Buckets handed to the bundler.
    pub bundled: usize,
    /// Buckets skipped because they had no inputs.
    pub skipped: usize,
    /// Files accepted by the sink.
    pub written: usize,
    pub failures: Vec<BucketFailure>,
    pub write_failures: Vec<WriteFailure>,
}

impl BundleReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.write_failures.is_empty()
    }
}

/// Where one bucket's files go.
struct Target<'a> {
    out_dir: &'a Path,
    minify: bool,
    /// Paths written so far in this run, across buckets.
    emitted: &'a mut BTreeSet<PathBuf>,
}

/// Drives a [`Bundler`] over the buckets of a partition.
pub struct Orchestrator<B> {
    bundler: B,
    out_dir: PathBuf,
    overrides: BuildOverrides,
    incremental: bool,
    caches: HashMap<BucketKey, CacheToken>,
}

impl<B: Bundler> Orchestrator<B> {
    pub fn new(bundler: B, out_dir: impl Into<PathBuf>, overrides: BuildOverrides) -> Self {
        Self {
            bundler,
            out_dir: out_dir.into(),
            overrides,
            incremental: false,
            caches: HashMap::new(),
        }
    }

    /// Turn cache threading on or off. Turning it off drops every held token.
    pub fn set_incremental(&mut self, incremental: bool) {
        self.incremental = incremental;
        if !incremental {
            self.caches.clear();
        }
    }

    #[must_use]
    pub fn is_incremental(&self) -> bool {
        self.incremental
    }

    /// Whether a cache token is currently held for `key`.
    #[must_use]
    pub fn has_cache(&self, key: &BucketKey) -> bool {
        self.caches.contains_key(key)
    }

    #[must_use]
    pub fn bundler(&self) -> &B {
        &self.bundler
    }

    /// Output directory for a bucket.
    #[must_use]
    pub fn bucket_out_dir(&self, key: &BucketKey) -> PathBuf {
        match key {
            BucketKey::Shared => self.out_dir.clone(),
            BucketKey::Package(name) => self.out_dir.join(name),
        }
    }

    /// Bundle every non-empty bucket and write the results to `sink`.
    ///
    /// Failures are per bucket: they are logged, reported, and never stop the
    /// other buckets.
    pub async fn run(&mut self, partition: &Partition, sink: &mut dyn OutputSink) -> BundleReport {
        let mut report = BundleReport::default();
        let options = BundleOptions::resolve(&self.overrides, partition.source_maps);

        let present: BTreeSet<&BucketKey> = partition.buckets().map(|b| &b.key).collect();
        self.caches.retain(|key, _| present.contains(key));

        let mut issued: Vec<(&Bucket, PathBuf)> = Vec::new();
        let mut requests = Vec::new();
        for bucket in partition.buckets() {
            if bucket.is_empty() {
                debug!(bucket = %bucket.key, "no inputs, skipping bundle");
                report.skipped += 1;
                continue;
            }
            let out_dir = self.bucket_out_dir(&bucket.key);
            let cache = if self.incremental {
                self.caches.remove(&bucket.key)
            } else {
                None
            };
            debug!(
                bucket = %bucket.key,
                inputs = bucket.inputs.len(),
                nomodule = bucket.nomodule.len(),
                cached = cache.is_some(),
                "issuing bundle"
            );
            requests.push(BundleRequest {
                bucket: bucket.key.clone(),
                inputs: bucket.inputs.iter().cloned().collect(),
                output_names: bucket.output_names.clone(),
                out_dir: out_dir.clone(),
                options: options.clone(),
                cache,
            });
            issued.push((bucket, out_dir));
        }
        report.bundled = issued.len();

        let bundler = &self.bundler;
        let results = join_all(requests.into_iter().map(|req| bundler.bundle(req))).await;

        let mut emitted = BTreeSet::new();
        for ((bucket, out_dir), result) in issued.into_iter().zip(results) {
            match result {
                Ok(output) => {
                    let target = Target {
                        out_dir: &out_dir,
                        minify: options.minify,
                        emitted: &mut emitted,
                    };
                    self.accept(bucket, output, target, sink, &mut report);
                }
                Err(err) => Self::reject(bucket, &err, &mut report),
            }
        }

        report
    }

    fn accept(
        &mut self,
        bucket: &Bucket,
        mut output: BundleOutput,
        mut target: Target<'_>,
        sink: &mut dyn OutputSink,
        report: &mut BundleReport,
    ) {
        if let Some(token) = output.cache.take() {
            if self.incremental {
                self.caches.insert(bucket.key.clone(), token);
            }
        }

        for file in process_output(bucket, output, target.out_dir, target.minify) {
            let path = file.path.clone();
            let written = if target.emitted.insert(path.clone()) {
                sink.write(file)
            } else {
                Err(SinkError::Rejected {
                    path: path.clone(),
                    reason: "path already written in this pass".into(),
                })
            };
            match written {
                Ok(()) => report.written += 1,
                Err(err) => {
                    warn!(
                        bucket = %bucket.key,
                        path = %path.display(),
                        code = err.code(),
                        error = %err,
                        "output write failed"
                    );
                    report.write_failures.push(WriteFailure {
                        path,
                        code: err.code(),
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    fn reject(bucket: &Bucket, err: &BundlerError, report: &mut BundleReport) {
        error!(
            bucket = %bucket.key,
            code = err.code(),
            path = ?err.path,
            error = %err,
            "bundler failed"
        );
        report.failures.push(BucketFailure {
            bucket: bucket.key.clone(),
            code: err.code(),
            message: err.to_string(),
            path: err.path.clone(),
        });
    }
}

impl<B> std::fmt::Debug for Orchestrator<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("out_dir", &self.out_dir)
            .field("incremental", &self.incremental)
            .field("cached_buckets", &self.caches.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::Chunk;
    use crate::partition::SourceFile;
    use crate::postprocess::{MemorySink, OutputFile, SinkError};
    use futures::future::BoxFuture;
    use std::sync::Mutex;

    /// Emits one chunk per input, records the cache generation it was handed,
    /// and fails for any bucket named in `fail`.
    #[derive(Default)]
    struct FakeBundler {
        seen: Mutex<Vec<(BucketKey, Option<u32>)>>,
        fail: Option<BucketKey>,
    }

    impl Bundler for FakeBundler {
        fn bundle(&self, request: BundleRequest) -> BoxFuture<'_, Result<BundleOutput, BundlerError>> {
            Box::pin(async move {
                let generation = request
                    .cache
                    .and_then(|t| t.downcast::<u32>().ok());
                self.seen
                    .lock()
                    .unwrap()
                    .push((request.bucket.clone(), generation));
                if self.fail.as_ref() == Some(&request.bucket) {
                    return Err(BundlerError::new("syntax error").with_path("src/bad.js"));
                }
                let chunks = request
                    .inputs
                    .iter()
                    .map(|input| Chunk {
                        name: crate::paths::output_name(input).trim_end_matches(".js").into(),
                        file_name: crate::paths::output_name(input),
                        code: "init();\n".into(),
                        source_map: None,
                        entry: Some(input.clone()),
                    })
                    .collect();
                Ok(BundleOutput {
                    chunks,
                    assets: Vec::new(),
                    cache: Some(CacheToken::new(generation.map_or(1, |g| g + 1))),
                })
            })
        }
    }

    fn partition() -> Partition {
        let mut ui = Bucket::new(BucketKey::Package("ui".into()));
        ui.inputs.insert(PathBuf::from("packages/ui/button.js"));
        ui.nomodule.insert(PathBuf::from("packages/ui/button.js"));
        ui.files_by_output_name
            .insert("button.js".into(), SourceFile::new("packages/ui/button.js"));

        let mut core = Bucket::new(BucketKey::Package("core".into()));
        core.inputs.insert(PathBuf::from("packages/core/index.js"));

        let empty = Bucket::new(BucketKey::Package("empty".into()));

        let mut shared = Bucket::new(BucketKey::Shared);
        shared.inputs.insert(PathBuf::from("src/main.js"));

        Partition {
            packages: vec![ui, core, empty],
            shared,
            source_maps: false,
        }
    }

    fn generations(bundler: &FakeBundler) -> Vec<(BucketKey, Option<u32>)> {
        let mut seen = bundler.seen.lock().unwrap().clone();
        seen.sort();
        seen
    }

    #[tokio::test]
    async fn test_run_writes_all_buckets() {
        let mut orch = Orchestrator::new(FakeBundler::default(), "_site", BuildOverrides::default());
        let mut sink = MemorySink::new();
        let report = orch.run(&partition(), &mut sink).await;

        assert!(report.is_clean());
        assert_eq!(report.bundled, 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.written, 3);

        assert_eq!(
            sink.text("_site/ui/button.js"),
            Some("\"use strict\";(function(){init()})()\n")
        );
        assert_eq!(sink.text("_site/core/index.js"), Some("init();\n"));
        assert_eq!(sink.text("_site/main.js"), Some("init();\n"));
        assert_eq!(
            sink.get("_site/ui/button.js").unwrap().origin,
            Some(SourceFile::new("packages/ui/button.js"))
        );
    }

    #[tokio::test]
    async fn test_cache_threaded_per_bucket_when_incremental() {
        let mut orch = Orchestrator::new(FakeBundler::default(), "_site", BuildOverrides::default());
        orch.set_incremental(true);
        let partition = partition();

        orch.run(&partition, &mut MemorySink::new()).await;
        orch.bundler().seen.lock().unwrap().clear();
        orch.run(&partition, &mut MemorySink::new()).await;

        assert_eq!(
            generations(orch.bundler()),
            vec![
                (BucketKey::Shared, Some(1)),
                (BucketKey::Package("core".into()), Some(1)),
                (BucketKey::Package("ui".into()), Some(1)),
            ]
        );
        assert!(orch.has_cache(&BucketKey::Shared));
    }

    #[tokio::test]
    async fn test_cache_dropped_when_not_incremental() {
        let mut orch = Orchestrator::new(FakeBundler::default(), "_site", BuildOverrides::default());
        let partition = partition();
        orch.run(&partition, &mut MemorySink::new()).await;
        orch.run(&partition, &mut MemorySink::new()).await;

        assert!(generations(orch.bundler()).iter().all(|(_, g)| g.is_none()));
        assert!(!orch.has_cache(&BucketKey::Shared));
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let bundler = FakeBundler {
            fail: Some(BucketKey::Package("core".into())),
            ..FakeBundler::default()
        };
        let mut orch = Orchestrator::new(bundler, "_site", BuildOverrides::default());
        orch.set_incremental(true);
        let mut sink = MemorySink::new();
        let report = orch.run(&partition(), &mut sink).await;

        assert_eq!(report.failures.len(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.bucket, BucketKey::Package("core".into()));
        assert_eq!(failure.code, "BUNDLER_INVOCATION_FAILED");
        assert_eq!(failure.path.as_deref(), Some(Path::new("src/bad.js")));

        assert!(sink.get("_site/ui/button.js").is_some());
        assert!(sink.get("_site/main.js").is_some());
        assert!(!orch.has_cache(&BucketKey::Package("core".into())));
        assert!(orch.has_cache(&BucketKey::Package("ui".into())));
    }

    struct RejectingSink;

    impl OutputSink for RejectingSink {
        fn write(&mut self, file: OutputFile) -> Result<(), SinkError> {
            Err(SinkError::Rejected {
                path: file.path,
                reason: "read-only".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_sink_failures_are_counted() {
        let mut orch = Orchestrator::new(FakeBundler::default(), "_site", BuildOverrides::default());
        let report = orch.run(&partition(), &mut RejectingSink).await;
        assert_eq!(report.written, 0);
        assert_eq!(report.write_failures.len(), 3);
        assert_eq!(report.write_failures[0].code, "OUTPUT_WRITE_FAILED");
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn test_clashing_output_paths_are_not_overwritten() {
        let mut shared = Bucket::new(BucketKey::Shared);
        shared.inputs.insert(PathBuf::from("blog/index.js"));
        shared.inputs.insert(PathBuf::from("docs/index.js"));
        let clashing = Partition {
            packages: Vec::new(),
            shared,
            source_maps: false,
        };

        let mut orch = Orchestrator::new(FakeBundler::default(), "_site", BuildOverrides::default());
        let mut sink = MemorySink::new();
        let report = orch.run(&clashing, &mut sink).await;

        assert!(!report.is_clean());
        assert_eq!(report.written, 1);
        assert_eq!(report.write_failures.len(), 1);
        assert_eq!(report.write_failures[0].path, PathBuf::from("_site/index.js"));
        assert_eq!(report.write_failures[0].code, "OUTPUT_WRITE_FAILED");
        assert_eq!(sink.files.len(), 1);
    }

    #[tokio::test]
    async fn test_caches_for_vanished_buckets_are_dropped() {
        let mut orch = Orchestrator::new(FakeBundler::default(), "_site", BuildOverrides::default());
        orch.set_incremental(true);
        orch.run(&partition(), &mut MemorySink::new()).await;
        assert!(orch.has_cache(&BucketKey::Package("core".into())));

        let mut next = partition();
        next.packages.retain(|b| b.key != BucketKey::Package("core".into()));
        orch.run(&next, &mut MemorySink::new()).await;
        assert!(!orch.has_cache(&BucketKey::Package("core".into())));
    }

    #[test]
    fn test_bucket_out_dir() {
        let orch = Orchestrator::new(FakeBundler::default(), "_site", BuildOverrides::default());
        assert_eq!(orch.bucket_out_dir(&BucketKey::Shared), PathBuf::from("_site"));
        assert_eq!(
            orch.bucket_out_dir(&BucketKey::Package("@scope/ui".into())),
            PathBuf::from("_site/@scope/ui")
        );
    }
}
