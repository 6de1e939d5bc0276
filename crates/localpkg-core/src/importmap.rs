//! Import map generation from a partition's delivered export names.

use crate::exports::ExportCondition;
use crate::partition::{Bucket, Partition};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// A browser import map plus the classic scripts that cannot be imported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportMap {
    /// Bare specifier -> URL.
    pub imports: BTreeMap<String, String>,
    /// URLs of nomodule outputs, to be loaded with a plain `<script>`.
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub scripts: BTreeSet<String>,
}

impl ImportMap {
    /// Build the map for every named bucket of `partition`.
    ///
    /// Outputs are served from `<base_url>/<package>/<file>`. A destination is
    /// importable when it delivers an `import` or `default` output that is not
    /// wrapped; wrapped outputs are listed under `scripts` instead.
    #[must_use]
    pub fn from_partition(partition: &Partition, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        let mut map = Self::default();
        for bucket in &partition.packages {
            map.add_bucket(bucket, base);
        }
        map
    }

    fn add_bucket(&mut self, bucket: &Bucket, base: &str) {
        let Some(name) = bucket.package_name() else {
            return;
        };
        let url = |output: &str| format!("{base}/{name}/{output}");
        let wrapped = |output: &str| {
            bucket
                .files_by_output_name
                .get(output)
                .is_some_and(|file| bucket.nomodule.contains(&file.path))
        };

        for (destination, conditions) in &bucket.delivered {
            for output in conditions.values() {
                if wrapped(output.as_str()) {
                    self.scripts.insert(url(output.as_str()));
                }
            }

            let module_output = [ExportCondition::Import, ExportCondition::Default]
                .iter()
                .filter_map(|c| conditions.get(c))
                .find(|output| !wrapped(output.as_str()));
            if let Some(output) = module_output {
                self.imports
                    .entry(specifier(name, destination))
                    .or_insert_with(|| url(output.as_str()));
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.imports.is_empty() && self.scripts.is_empty()
    }
}

/// `"."` maps to the bare package name; `"./sub"` to `name/sub`.
fn specifier(name: &str, destination: &str) -> String {
    match destination.strip_prefix("./") {
        Some(sub) if !sub.is_empty() => format!("{name}/{sub}"),
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;
    use crate::partition::{partition, SourceFile};
    use crate::registry::{EligibilityPolicy, PackageRegistry};
    use serde_json::json;
    use std::path::Path;

    fn plan(manifest: serde_json::Value, files: &[&str]) -> Partition {
        let mut registry = PackageRegistry::new();
        registry.begin_discovery();
        let (package, _) = Manifest::from_value(manifest)
            .unwrap()
            .into_package(Path::new("ui/package.json"));
        registry.register("ui/package.json", package, None).unwrap();
        registry.complete_discovery();
        let files: Vec<SourceFile> = files.iter().map(|p| SourceFile::new(*p)).collect();
        partition(&registry, &files, &EligibilityPolicy::default(), None)
    }

    #[test]
    fn test_specifier() {
        assert_eq!(specifier("ui", "."), "ui");
        assert_eq!(specifier("ui", "./button"), "ui/button");
        assert_eq!(specifier("@s/ui", "./a/b"), "@s/ui/a/b");
    }

    #[test]
    fn test_imports_and_scripts() {
        let p = plan(
            json!({"name": "ui", "exports": {
                ".": {"import": "./index.js"},
                "./legacy": {"script": "./legacy.js"},
                "./utils/*": {"import": "./utils/*.js"}
            }}),
            &["ui/index.ts", "ui/legacy.js", "ui/utils/date.ts"],
        );
        let map = ImportMap::from_partition(&p, "/assets/");

        assert_eq!(map.imports["ui"], "/assets/ui/index.js");
        assert_eq!(map.imports["ui/utils/date"], "/assets/ui/date.js");
        assert!(!map.imports.contains_key("ui/legacy"));
        assert_eq!(
            map.scripts.iter().collect::<Vec<_>>(),
            vec!["/assets/ui/legacy.js"]
        );
    }

    #[test]
    fn test_serialized_shape() {
        let p = plan(
            json!({"name": "ui", "exports": {".": {"import": "./index.js"}}}),
            &["ui/index.js"],
        );
        let value = serde_json::to_value(ImportMap::from_partition(&p, "")).unwrap();
        assert_eq!(value, json!({"imports": {"ui": "/ui/index.js"}}));
    }

    #[test]
    fn test_empty_partition() {
        let p = plan(json!({"name": "ui"}), &[]);
        assert!(ImportMap::from_partition(&p, "/").is_empty());
    }
}
