//! A bundler that copies each entry into its own chunk.
//!
//! No transformation happens: imports are left as written. It is enough to run
//! a pass end to end and to exercise the cache and wrapping paths.

use super::{BundleOutput, BundleRequest, Bundler, BundlerError, CacheToken, Chunk};
use crate::paths;
use futures::future::BoxFuture;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// File identity used to decide whether a cached read is still valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    len: u64,
    modified: Option<SystemTime>,
}

impl Stamp {
    fn of(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

#[derive(Debug, Default)]
struct PassthroughCache {
    entries: BTreeMap<PathBuf, (Stamp, String)>,
    hits: usize,
}

/// Copies entry files from `root` into one chunk each.
#[derive(Debug, Clone)]
pub struct PassthroughBundler {
    root: PathBuf,
}

impl PassthroughBundler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn load(
        &self,
        input: &Path,
        previous: &mut PassthroughCache,
        next: &mut PassthroughCache,
    ) -> Result<String, BundlerError> {
        let abs = self.root.join(input);
        let read_err = |e: std::io::Error| {
            BundlerError::new(format!("cannot read entry {}: {e}", paths::to_slash(input)))
                .with_path(input)
        };
        let stamp = Stamp::of(&abs).map_err(read_err)?;

        let code = match previous.entries.remove(input) {
            Some((cached, code)) if cached == stamp => {
                next.hits += 1;
                code
            }
            _ => localpkg_util::fs::read_to_string_lossy(&abs).map_err(read_err)?,
        };
        next.entries.insert(input.to_path_buf(), (stamp, code.clone()));
        Ok(code)
    }

    fn run(&self, request: BundleRequest) -> Result<BundleOutput, BundlerError> {
        let mut previous = request
            .cache
            .and_then(|token| token.downcast::<PassthroughCache>().ok())
            .unwrap_or_default();
        let mut next = PassthroughCache::default();

        let mut taken: BTreeSet<String> = request.output_names.values().cloned().collect();
        let mut chunks = Vec::with_capacity(request.inputs.len());
        for input in &request.inputs {
            let mut code = self.load(input, &mut previous, &mut next)?;
            let file_name = match request.output_names.get(input) {
                Some(name) => name.clone(),
                None => {
                    let name = paths::unique_output_name(input, |n| taken.contains(n));
                    taken.insert(name.clone());
                    name
                }
            };
            let name = file_name.trim_end_matches(".js").to_string();

            if !code.ends_with('\n') {
                code.push('\n');
            }
            let source_map = if request.options.sourcemap {
                code.push_str(&format!("//# sourceMappingURL={file_name}.map\n"));
                Some(
                    serde_json::json!({
                        "version": 3,
                        "file": file_name,
                        "sources": [paths::to_slash(input)],
                        "names": [],
                        "mappings": "",
                    })
                    .to_string(),
                )
            } else {
                None
            };

            chunks.push(Chunk {
                name,
                file_name,
                code,
                source_map,
                entry: Some(input.clone()),
            });
        }

        debug!(
            bucket = %request.bucket,
            chunks = chunks.len(),
            reused = next.hits,
            "passthrough bundle complete"
        );

        Ok(BundleOutput {
            chunks,
            assets: Vec::new(),
            cache: Some(CacheToken::new(next)),
        })
    }
}

impl Bundler for PassthroughBundler {
    fn bundle(&self, request: BundleRequest) -> BoxFuture<'_, Result<BundleOutput, BundlerError>> {
        Box::pin(async move { self.run(request) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::BundleOptions;
    use crate::partition::BucketKey;
    use tempfile::tempdir;

    fn request(inputs: &[&str], options: BundleOptions, cache: Option<CacheToken>) -> BundleRequest {
        BundleRequest {
            bucket: BucketKey::Package("ui".into()),
            inputs: inputs.iter().map(PathBuf::from).collect(),
            output_names: BTreeMap::new(),
            out_dir: PathBuf::from("_site/ui"),
            options,
            cache,
        }
    }

    #[tokio::test]
    async fn test_one_chunk_per_entry() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.ts"), "export const a = 1;").unwrap();
        std::fs::write(dir.path().join("src/b.js"), "export const b = 2;\n").unwrap();

        let bundler = PassthroughBundler::new(dir.path());
        let out = bundler
            .bundle(request(&["src/a.ts", "src/b.js"], BundleOptions::default(), None))
            .await
            .unwrap();

        assert_eq!(out.chunks.len(), 2);
        assert_eq!(out.chunks[0].file_name, "a.js");
        assert_eq!(out.chunks[0].name, "a");
        assert_eq!(out.chunks[0].code, "export const a = 1;\n");
        assert_eq!(out.chunks[0].entry.as_deref(), Some(Path::new("src/a.ts")));
        assert!(out.chunks[1].source_map.is_none());
    }

    #[tokio::test]
    async fn test_same_stem_entries_get_distinct_chunks() {
        let dir = tempdir().unwrap();
        for rel in ["blog/index.js", "docs/index.js", "wiki/index.js"] {
            std::fs::create_dir_all(dir.path().join(rel).parent().unwrap()).unwrap();
            std::fs::write(dir.path().join(rel), "x();\n").unwrap();
        }
        let bundler = PassthroughBundler::new(dir.path());

        let unnamed = bundler
            .bundle(request(&["blog/index.js", "docs/index.js"], BundleOptions::default(), None))
            .await
            .unwrap();
        let names: Vec<_> = unnamed.chunks.iter().map(|c| c.file_name.as_str()).collect();
        assert_eq!(names, vec!["index.js", "index2.js"]);

        let mut req = request(
            &["blog/index.js", "docs/index.js", "wiki/index.js"],
            BundleOptions::default(),
            None,
        );
        req.output_names.insert(PathBuf::from("blog/index.js"), "index2.js".into());
        req.output_names.insert(PathBuf::from("docs/index.js"), "index.js".into());
        let named = bundler.bundle(req).await.unwrap();
        let names: Vec<_> = named.chunks.iter().map(|c| c.file_name.as_str()).collect();
        assert_eq!(names, vec!["index2.js", "index.js", "index3.js"]);
        assert_eq!(named.chunks[0].name, "index2");
    }

    #[tokio::test]
    async fn test_source_map_comment() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.js"), "a();\n").unwrap();

        let options = BundleOptions {
            sourcemap: true,
            ..BundleOptions::default()
        };
        let out = PassthroughBundler::new(dir.path())
            .bundle(request(&["a.js"], options, None))
            .await
            .unwrap();

        let chunk = &out.chunks[0];
        assert_eq!(chunk.code, "a();\n//# sourceMappingURL=a.js.map\n");
        let map: serde_json::Value =
            serde_json::from_str(chunk.source_map.as_deref().unwrap()).unwrap();
        assert_eq!(map["sources"][0], "a.js");
    }

    #[tokio::test]
    async fn test_cache_reuses_unchanged_entries() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.js"), "a();\n").unwrap();
        let bundler = PassthroughBundler::new(dir.path());

        let first = bundler
            .bundle(request(&["a.js"], BundleOptions::default(), None))
            .await
            .unwrap();
        let second = bundler
            .bundle(request(&["a.js"], BundleOptions::default(), first.cache))
            .await
            .unwrap();

        let cache = second.cache.unwrap().downcast::<PassthroughCache>().unwrap();
        assert_eq!(cache.hits, 1);
    }

    #[tokio::test]
    async fn test_missing_entry_fails() {
        let dir = tempdir().unwrap();
        let err = PassthroughBundler::new(dir.path())
            .bundle(request(&["gone.js"], BundleOptions::default(), None))
            .await
            .unwrap_err();
        assert_eq!(err.path.as_deref(), Some(Path::new("gone.js")));
        assert!(err.message.contains("gone.js"));
    }
}
