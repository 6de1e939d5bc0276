use localpkg_core::version::{version_string, SCHEMA_VERSION, VERSION};
use miette::Result;

pub fn run(json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "schema_version": SCHEMA_VERSION,
                "version": VERSION,
            })
        );
    } else {
        println!("{}", version_string());
    }
    Ok(())
}
