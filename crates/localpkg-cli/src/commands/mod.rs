pub mod build;
pub mod exports;
pub mod importmap;
pub mod plan;
pub mod project;
pub mod version;

use localpkg_core::SCHEMA_VERSION;
use miette::Result;

/// Report a command-level failure.
///
/// In JSON mode the error is printed to stdout as `{"ok": false, ...}` and the
/// process exits with status 1; otherwise it becomes a miette diagnostic.
pub fn fail<T>(json: bool, code: &str, err: impl std::fmt::Display) -> Result<T> {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": false,
                "schema_version": SCHEMA_VERSION,
                "error": {
                    "code": code,
                    "message": err.to_string(),
                }
            })
        );
        std::process::exit(1);
    }
    Err(miette::miette!("{code}: {err}"))
}
