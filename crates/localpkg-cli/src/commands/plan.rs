//! `localpkg plan` command implementation.
//!
//! Runs discovery and partitioning without bundling.

use super::fail;
use super::project::{PassArgs, Project};
use localpkg_core::bundler::PassthroughBundler;
use localpkg_core::pipeline::DiscoveryReport;
use localpkg_core::{Bucket, Partition, SCHEMA_VERSION};
use miette::Result;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct PlanJson<'a> {
    ok: bool,
    schema_version: u32,
    discovery: &'a DiscoveryReport,
    partition: &'a Partition,
}

/// Discover and partition a project.
pub fn plan_project(project: &Project) -> (DiscoveryReport, Partition) {
    let mut pipeline = project.pipeline(PassthroughBundler::new(&project.root));
    let mut discovery = pipeline.discover(&project.manifests);
    discovery.failures.extend(project.read_failures.iter().cloned());
    let partition = pipeline.plan(&project.source_files());
    (discovery, partition)
}

fn print_bucket(bucket: &Bucket) {
    let label = bucket.package_name().unwrap_or("<shared>");
    println!("{label} ({} inputs)", bucket.inputs.len());
    for input in &bucket.inputs {
        let marker = if bucket.nomodule.contains(input) {
            "  nomodule"
        } else {
            ""
        };
        println!("  {}{marker}", input.display());
    }
    for (destination, conditions) in &bucket.delivered {
        for (condition, output) in conditions {
            println!("  {destination} [{condition}] -> {output}");
        }
    }
}

/// Run the plan command.
pub fn run(cwd: &Path, config_path: Option<&Path>, pass: &PassArgs, json: bool) -> Result<()> {
    let project = match Project::load(cwd, config_path, pass) {
        Ok(project) => project,
        Err(err) => return fail(json, err.code(), err),
    };
    let (discovery, partition) = plan_project(&project);

    if json {
        let out = PlanJson {
            ok: discovery.failures.is_empty(),
            schema_version: SCHEMA_VERSION,
            discovery: &discovery,
            partition: &partition,
        };
        println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());
        return Ok(());
    }

    for failure in &discovery.failures {
        println!("error[{}]: {}", failure.code, failure.message);
    }
    for bucket in partition.buckets() {
        print_bucket(bucket);
    }
    if partition.source_maps {
        println!("source maps: on");
    }
    Ok(())
}
