//! One build pass from manifests to written outputs.
//!
//! ```text
//! discovery ─▶ partition ─▶ orchestrate ─▶ before_save
//! ```
//!
//! Nothing in a pass is fatal: bad manifests, failing buckets and rejected
//! writes are logged and collected in the [`PassReport`].

use crate::bundler::Bundler;
use crate::config::PipelineConfig;
use crate::manifest::{Manifest, ManifestError};
use crate::orchestrate::{BundleReport, Orchestrator};
use crate::partition::{partition, Partition, SourceFile};
use crate::postprocess::OutputSink;
use crate::registry::{EligibilityPolicy, PackageRegistry};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Manifest text as read from disk, with its project-relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSource {
    pub path: PathBuf,
    pub content: String,
}

impl ManifestSource {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// A manifest or export pattern that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestFailure {
    pub path: PathBuf,
    pub code: &'static str,
    pub message: String,
}

impl From<&ManifestError> for ManifestFailure {
    fn from(err: &ManifestError) -> Self {
        Self {
            path: err.path().to_path_buf(),
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// What discovery did with the manifests of a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    /// Manifests parsed and (re)registered.
    pub resolved: usize,
    /// Manifests whose fingerprint matched the previous pass.
    pub unchanged: usize,
    /// Locations dropped because their manifest is gone.
    pub pruned: Vec<PathBuf>,
    /// Unusable manifests and malformed subpath patterns.
    pub failures: Vec<ManifestFailure>,
}

/// Outcome of a full pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub discovery: DiscoveryReport,
    /// Eligible packages seen by the partitioner.
    pub packages: usize,
    pub bundles: BundleReport,
}

impl PassReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.discovery.failures.is_empty() && self.bundles.is_clean()
    }
}

/// Registry, configuration and orchestrator for repeated passes.
#[derive(Debug)]
pub struct Pipeline<B> {
    registry: PackageRegistry,
    config: PipelineConfig,
    policy: EligibilityPolicy,
    orchestrator: Orchestrator<B>,
}

impl<B: Bundler> Pipeline<B> {
    pub fn new(bundler: B, config: PipelineConfig) -> Self {
        let policy = EligibilityPolicy::new(config.include_private, &config.exclude);
        let mut orchestrator =
            Orchestrator::new(bundler, config.out_dir.clone(), config.overrides.clone());
        orchestrator.set_incremental(config.incremental);
        Self {
            registry: PackageRegistry::new(),
            config,
            policy,
            orchestrator,
        }
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &PackageRegistry {
        &self.registry
    }

    /// Mutable access, for subscribing to discovery results.
    pub fn registry_mut(&mut self) -> &mut PackageRegistry {
        &mut self.registry
    }

    #[must_use]
    pub fn policy(&self) -> &EligibilityPolicy {
        &self.policy
    }

    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator<B> {
        &self.orchestrator
    }

    /// Enable per-bucket caches, e.g. once a long-running watch loop starts.
    pub fn set_incremental(&mut self, incremental: bool) {
        self.config.incremental = incremental;
        self.orchestrator.set_incremental(incremental);
    }

    /// Run discovery for a pass and leave the registry in the discovered phase.
    pub fn discover(&mut self, manifests: &[ManifestSource]) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();
        self.registry.begin_discovery();

        let mut present = BTreeSet::new();
        for source in manifests {
            present.insert(source.path.clone());
            let fingerprint = localpkg_util::hash::fingerprint(source.content.as_bytes());
            if self.registry.fingerprint(&source.path) == Some(fingerprint.as_str()) {
                debug!(manifest = %source.path.display(), "Manifest unchanged");
                report.unchanged += 1;
                continue;
            }

            let manifest = match Manifest::parse(&source.path, &source.content) {
                Ok(manifest) => manifest,
                Err(err) => {
                    warn!(
                        manifest = %source.path.display(),
                        code = err.code(),
                        error = %err,
                        "Skipping manifest"
                    );
                    report.failures.push(ManifestFailure::from(&err));
                    // Drop exports left over from the last good parse.
                    if let Err(err) = self.registry.remove(&source.path) {
                        error!(code = err.code(), error = %err, "Registry refused removal");
                    }
                    continue;
                }
            };

            let (package, pattern_errors) = manifest.into_package(&source.path);
            // Without a fingerprint the manifest is resolved, and its broken
            // patterns reported, again on every pass.
            let fingerprint = pattern_errors.is_empty().then_some(fingerprint);
            for err in pattern_errors {
                warn!(
                    manifest = %source.path.display(),
                    code = err.code(),
                    pattern = %err.pattern,
                    "Dropping malformed subpath pattern"
                );
                report.failures.push(ManifestFailure {
                    path: source.path.clone(),
                    code: err.code(),
                    message: err.to_string(),
                });
            }

            match self
                .registry
                .register(source.path.clone(), package, fingerprint)
            {
                Ok(()) => report.resolved += 1,
                Err(err) => error!(code = err.code(), error = %err, "Registry refused package"),
            }
        }

        match self.registry.retain_locations(&present) {
            Ok(pruned) => report.pruned = pruned,
            Err(err) => error!(code = err.code(), error = %err, "Registry refused pruning"),
        }
        self.registry.complete_discovery();
        report
    }

    /// Partition `files` against the current registry.
    #[must_use]
    pub fn plan(&self, files: &[SourceFile]) -> Partition {
        partition(&self.registry, files, &self.policy, self.config.exports_default)
    }

    /// Run one complete pass.
    pub async fn run_pass(
        &mut self,
        manifests: &[ManifestSource],
        files: &[SourceFile],
        sink: &mut dyn OutputSink,
    ) -> PassReport {
        let discovery = self.discover(manifests);
        let plan = self.plan(files);
        let packages = plan.packages.len();
        let bundles = self.orchestrator.run(&plan, sink).await;
        self.registry.before_save();

        info!(
            resolved = discovery.resolved,
            unchanged = discovery.unchanged,
            packages,
            bundled = bundles.bundled,
            written = bundles.written,
            failures = bundles.failures.len() + bundles.write_failures.len(),
            "Build pass complete"
        );

        PassReport {
            discovery,
            packages,
            bundles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::PassthroughBundler;
    use crate::config::DefaultDelivery;
    use crate::postprocess::MemorySink;
    use crate::registry::Phase;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn manifest(path: &str, content: &str) -> ManifestSource {
        ManifestSource::new(path, content)
    }

    const UI: &str = r#"{
        "name": "ui",
        "exports": {
            ".": {"import": "./index.js"},
            "./legacy": {"script": "./legacy.js"}
        }
    }"#;

    #[tokio::test]
    async fn test_full_pass() {
        let dir = tempdir().unwrap();
        write(dir.path(), "ui/index.ts", "export const ui = 1;\n");
        write(dir.path(), "ui/legacy.js", "window.legacy = 1;\n");
        write(dir.path(), "src/main.js", "import 'ui';\n");

        let mut pipeline = Pipeline::new(PassthroughBundler::new(dir.path()), PipelineConfig::default());
        let files: Vec<SourceFile> = ["ui/index.ts", "ui/legacy.js", "src/main.js"]
            .iter()
            .map(|p| SourceFile::new(*p))
            .collect();
        let mut sink = MemorySink::new();
        let report = pipeline
            .run_pass(&[manifest("ui/package.json", UI)], &files, &mut sink)
            .await;

        assert!(report.is_clean());
        assert_eq!(report.discovery.resolved, 1);
        assert_eq!(report.packages, 1);
        assert_eq!(report.bundles.written, 3);
        assert_eq!(sink.text("_site/ui/index.js"), Some("export const ui = 1;\n"));
        assert_eq!(
            sink.text("_site/ui/legacy.js"),
            Some("\"use strict\";(function(){window.legacy = 1})()\n")
        );
        assert_eq!(sink.text("_site/main.js"), Some("import 'ui';\n"));
        assert_eq!(pipeline.registry().phase(), Phase::Idle);
    }

    #[test]
    fn test_unchanged_manifest_is_not_reresolved() {
        let mut pipeline = Pipeline::new(PassthroughBundler::new("."), PipelineConfig::default());
        let first = pipeline.discover(&[manifest("ui/package.json", UI)]);
        assert_eq!(first.resolved, 1);
        pipeline.registry_mut().before_save();

        let second = pipeline.discover(&[manifest("ui/package.json", UI)]);
        assert_eq!(second.resolved, 0);
        assert_eq!(second.unchanged, 1);
        assert!(pipeline.registry().get(Path::new("ui/package.json")).is_some());

        let changed = pipeline.discover(&[manifest("ui/package.json", r#"{"name":"ui2"}"#)]);
        assert_eq!(changed.resolved, 1);
        assert_eq!(
            pipeline
                .registry()
                .get(Path::new("ui/package.json"))
                .unwrap()
                .name
                .as_deref(),
            Some("ui2")
        );
    }

    #[test]
    fn test_malformed_pattern_reported_on_every_pass() {
        const BROKEN: &str = r#"{"name":"p","exports":{"./a/*/*":"./x.js","./ok":"./ok.js"}}"#;
        let mut pipeline = Pipeline::new(PassthroughBundler::new("."), PipelineConfig::default());

        let first = pipeline.discover(&[manifest("p/package.json", BROKEN)]);
        assert_eq!(first.failures.len(), 1);
        assert_eq!(first.failures[0].code, "EXPORTS_PATTERN_SHAPE");
        pipeline.registry_mut().before_save();

        let second = pipeline.discover(&[manifest("p/package.json", BROKEN)]);
        assert_eq!(second.failures, first.failures);
        assert_eq!(second.unchanged, 0);
        let package = pipeline.registry().get(Path::new("p/package.json")).unwrap();
        assert!(package.exports.exact.contains_key("./ok"));
    }

    #[test]
    fn test_bad_manifests_are_reported_and_skipped() {
        let mut pipeline = Pipeline::new(PassthroughBundler::new("."), PipelineConfig::default());
        let report = pipeline.discover(&[
            manifest("bad/package.json", "{ nope"),
            manifest("arr/package.json", "[]"),
            manifest(
                "pat/package.json",
                r#"{"name":"pat","exports":{"./a/*/*": "./a/*/*.js", "./ok": "./ok.js"}}"#,
            ),
        ]);

        let codes: Vec<&str> = report.failures.iter().map(|f| f.code).collect();
        assert_eq!(
            codes,
            vec!["MANIFEST_PARSE_ERROR", "MANIFEST_SHAPE_ERROR", "EXPORTS_PATTERN_SHAPE"]
        );
        assert_eq!(report.resolved, 1);
        let pat = pipeline.registry().get(Path::new("pat/package.json")).unwrap();
        assert!(pat.exports.exact.contains_key("./ok"));
        assert!(pat.exports.patterns.is_empty());
    }

    #[test]
    fn test_broken_manifest_drops_previous_registration() {
        let mut pipeline = Pipeline::new(PassthroughBundler::new("."), PipelineConfig::default());
        pipeline.discover(&[manifest("ui/package.json", UI)]);
        pipeline.registry_mut().before_save();
        pipeline.discover(&[manifest("ui/package.json", "{")]);
        assert!(pipeline.registry().get(Path::new("ui/package.json")).is_none());
    }

    #[test]
    fn test_removed_manifest_is_pruned() {
        let mut pipeline = Pipeline::new(PassthroughBundler::new("."), PipelineConfig::default());
        pipeline.discover(&[
            manifest("a/package.json", r#"{"name":"a"}"#),
            manifest("b/package.json", r#"{"name":"b"}"#),
        ]);
        pipeline.registry_mut().before_save();

        let report = pipeline.discover(&[manifest("a/package.json", r#"{"name":"a"}"#)]);
        assert_eq!(report.pruned, vec![PathBuf::from("b/package.json")]);
        assert_eq!(pipeline.registry().len(), 1);
    }

    #[test]
    fn test_subscribers_see_each_pass_once() {
        let mut pipeline = Pipeline::new(PassthroughBundler::new("."), PipelineConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let policy = pipeline.policy().clone();
        pipeline.registry_mut().subscribe(policy, move |pkg| {
            sink.lock().unwrap().push(pkg.name.clone());
        });

        pipeline.discover(&[manifest("ui/package.json", UI)]);
        assert_eq!(*seen.lock().unwrap(), vec![Some("ui".to_string())]);

        pipeline.registry_mut().before_save();
        pipeline.discover(&[manifest("ui/package.json", UI)]);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_plan_uses_config() {
        let config = PipelineConfig::default().with_exports_default(Some(DefaultDelivery::Script));
        let mut pipeline = Pipeline::new(PassthroughBundler::new("."), config);
        pipeline.discover(&[manifest(
            "old/package.json",
            r#"{"name":"old","main":"./old.js"}"#,
        )]);
        let plan = pipeline.plan(&[SourceFile::new("old/old.js")]);
        assert_eq!(plan.packages[0].nomodule.len(), 1);
    }

    #[tokio::test]
    async fn test_incremental_keeps_bucket_caches() {
        let dir = tempdir().unwrap();
        write(dir.path(), "ui/index.js", "x();\n");
        let config = PipelineConfig::default().with_incremental(true);
        let mut pipeline = Pipeline::new(PassthroughBundler::new(dir.path()), config);
        let files = vec![SourceFile::new("ui/index.js")];

        pipeline
            .run_pass(&[manifest("ui/package.json", UI)], &files, &mut MemorySink::new())
            .await;
        assert!(pipeline
            .orchestrator()
            .has_cache(&crate::partition::BucketKey::Package("ui".into())));
    }
}
