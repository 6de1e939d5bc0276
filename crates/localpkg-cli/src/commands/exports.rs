//! `localpkg exports` command implementation.
//!
//! Resolves manifests and prints their routing tables.

use super::fail;
use localpkg_core::discover::scan;
use localpkg_core::{ExportsMap, Manifest, ManifestError, SCHEMA_VERSION};
use miette::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct ExportsJson {
    ok: bool,
    schema_version: u32,
    packages: Vec<PackageJson>,
}

#[derive(Serialize)]
struct PackageJson {
    manifest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    private: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    exports: Option<ExportsMap>,
    errors: Vec<ErrorJson>,
}

#[derive(Serialize)]
struct ErrorJson {
    code: &'static str,
    message: String,
}

fn resolve(cwd: &Path, rel: &Path) -> PackageJson {
    let manifest_name = rel.to_string_lossy().into_owned();
    let parsed = localpkg_util::fs::read_to_string_lossy(&cwd.join(rel))
        .map_err(|source| ManifestError::Read {
            path: rel.to_path_buf(),
            source,
        })
        .and_then(|content| Manifest::parse(rel, &content));

    match parsed {
        Ok(manifest) => {
            let (package, pattern_errors) = manifest.into_package(rel);
            PackageJson {
                manifest: manifest_name,
                name: package.name,
                private: package.private,
                exports: Some(package.exports),
                errors: pattern_errors
                    .iter()
                    .map(|e| ErrorJson {
                        code: e.code(),
                        message: e.to_string(),
                    })
                    .collect(),
            }
        }
        Err(err) => PackageJson {
            manifest: manifest_name,
            name: None,
            private: false,
            exports: None,
            errors: vec![ErrorJson {
                code: err.code(),
                message: err.to_string(),
            }],
        },
    }
}

/// Run the exports command.
pub fn run(cwd: &Path, manifests: &[PathBuf], json: bool) -> Result<()> {
    let manifests = if manifests.is_empty() {
        match scan(cwd, Path::new("")) {
            Ok(set) => set.manifests,
            Err(err) => return fail(json, err.code(), err),
        }
    } else {
        manifests.to_vec()
    };

    let packages: Vec<PackageJson> = manifests.iter().map(|m| resolve(cwd, m)).collect();
    let ok = packages.iter().all(|p| p.errors.is_empty());

    if json {
        let out = ExportsJson {
            ok,
            schema_version: SCHEMA_VERSION,
            packages,
        };
        println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());
        return Ok(());
    }

    if packages.is_empty() {
        println!("No package.json found.");
        return Ok(());
    }

    for pkg in &packages {
        let name = pkg.name.as_deref().unwrap_or("<unnamed>");
        let private = if pkg.private { " (private)" } else { "" };
        println!("{name}{private}  [{}]", pkg.manifest);
        if let Some(exports) = &pkg.exports {
            for (destination, entry) in &exports.exact {
                for (condition, target) in entry.iter() {
                    println!("  {destination:<16} {:<8} {target}", condition.to_string());
                }
            }
            for (destination, entry) in &exports.patterns {
                for (condition, target) in entry.iter() {
                    println!(
                        "  {:<16} {:<8} {target}",
                        destination.to_string(),
                        condition.to_string()
                    );
                }
            }
        }
        for err in &pkg.errors {
            println!("  error[{}]: {}", err.code, err.message);
        }
    }

    Ok(())
}
