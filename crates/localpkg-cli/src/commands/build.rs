//! `localpkg build` command implementation.
//!
//! Runs one full pass with the passthrough bundler and writes outputs under
//! the working directory.

use super::fail;
use super::project::{PassArgs, Project};
use localpkg_core::bundler::PassthroughBundler;
use localpkg_core::{codes, OutputFile, OutputSink, PassReport, SinkError, SCHEMA_VERSION};
use miette::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Build command action.
#[derive(Debug, Clone)]
pub struct BuildAction {
    pub pass: PassArgs,
    /// `None` keeps the configured or default setting.
    pub minify: Option<bool>,
    pub sourcemap: bool,
}

#[derive(Serialize)]
struct BuildJson<'a> {
    ok: bool,
    schema_version: u32,
    out_dir: String,
    duration_ms: u64,
    report: &'a PassReport,
}

/// Writes outputs below `root`; source maps go to `<file>.map`.
#[derive(Debug)]
pub struct DirSink {
    root: PathBuf,
}

impl DirSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn put(&self, rel: &Path, bytes: &[u8]) -> Result<(), SinkError> {
        let path = self.root.join(rel);
        localpkg_util::fs::write_output(&path, bytes)
            .map_err(|source| SinkError::Io { path, source })
    }
}

impl OutputSink for DirSink {
    fn write(&mut self, file: OutputFile) -> Result<(), SinkError> {
        self.put(&file.path, file.contents.as_bytes())?;
        if let Some(map) = &file.source_map {
            let mut map_path = file.path.into_os_string();
            map_path.push(".map");
            self.put(Path::new(&map_path), map.as_bytes())?;
        }
        Ok(())
    }
}

/// Run the build command.
pub fn run(cwd: &Path, config_path: Option<&Path>, action: BuildAction, json: bool) -> Result<()> {
    let start = Instant::now();
    let mut project = match Project::load(cwd, config_path, &action.pass) {
        Ok(project) => project,
        Err(err) => return fail(json, err.code(), err),
    };
    if let Some(minify) = action.minify {
        project.config.overrides.minify = Some(minify);
    }
    if action.sourcemap {
        project.config.overrides.sourcemap = Some(true);
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => return fail(json, codes::IO_ERROR, err),
    };

    let mut pipeline = project.pipeline(PassthroughBundler::new(&project.root));
    let files = project.source_files();
    let mut sink = DirSink::new(&project.root);
    let mut report =
        runtime.block_on(pipeline.run_pass(&project.manifests, &files, &mut sink));
    report
        .discovery
        .failures
        .extend(project.read_failures.iter().cloned());

    let ok = report.is_clean();
    let out_dir = project.config.out_dir.display().to_string();

    if json {
        let out = BuildJson {
            ok,
            schema_version: SCHEMA_VERSION,
            out_dir,
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            report: &report,
        };
        println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());
    } else {
        println!(
            "Bundled {} bucket(s) into {out_dir}: {} file(s) written, {} skipped",
            report.bundles.bundled, report.bundles.written, report.bundles.skipped
        );
        for failure in &report.discovery.failures {
            println!("error[{}]: {} ({})", failure.code, failure.message, failure.path.display());
        }
        for failure in &report.bundles.failures {
            println!("error[{}]: {}: {}", failure.code, failure.bucket, failure.message);
        }
        for failure in &report.bundles.write_failures {
            println!("error[{}]: {}", failure.code, failure.message);
        }
    }

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
