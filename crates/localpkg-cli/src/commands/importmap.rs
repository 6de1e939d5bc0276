//! `localpkg importmap` command implementation.

use super::fail;
use super::plan::plan_project;
use super::project::{PassArgs, Project};
use localpkg_core::{ImportMap, SCHEMA_VERSION};
use miette::Result;
use std::path::Path;

/// Run the importmap command.
///
/// Without `--json` the bare import map is printed so it can be pasted into a
/// `<script type="importmap">` tag.
pub fn run(
    cwd: &Path,
    config_path: Option<&Path>,
    pass: &PassArgs,
    base_url: &str,
    json: bool,
) -> Result<()> {
    let project = match Project::load(cwd, config_path, pass) {
        Ok(project) => project,
        Err(err) => return fail(json, err.code(), err),
    };
    let (discovery, partition) = plan_project(&project);
    let map = ImportMap::from_partition(&partition, base_url);

    let out = if json {
        serde_json::json!({
            "ok": discovery.failures.is_empty(),
            "schema_version": SCHEMA_VERSION,
            "importmap": map,
        })
    } else {
        serde_json::json!({ "imports": map.imports })
    };
    println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());

    if !json {
        for script in &map.scripts {
            eprintln!("nomodule: {script}");
        }
    }
    Ok(())
}
