//! Lexical path helpers.
//!
//! Nothing here touches the filesystem: manifests and candidate files are
//! compared as project-relative paths.

use std::path::{Component, Path, PathBuf};

/// Source extensions treated as script entries.
pub const SCRIPT_EXTENSIONS: &[&str] = &["js", "jsx", "mjs", "ts", "tsx", "mts"];

/// Extension every bundled output is forced to.
pub const BUNDLE_EXTENSION: &str = "js";

/// Lexically normalize a path: drops `.` segments and folds `..` into the
/// preceding segment where there is one.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                );
                if can_pop {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Join a manifest-relative target (`./dist/a.js`) onto the manifest directory.
///
/// Wildcards survive untouched, so this also composes pattern targets.
#[must_use]
pub fn join_normalized(base: &Path, rel: &str) -> PathBuf {
    normalize(&base.join(rel))
}

/// Render a path with `/` separators regardless of platform.
#[must_use]
pub fn to_slash(path: &Path) -> String {
    let mut s = String::new();
    for component in path.components() {
        match component {
            Component::RootDir => s.push('/'),
            Component::Prefix(p) => s.push_str(&p.as_os_str().to_string_lossy()),
            other => {
                if !s.is_empty() && !s.ends_with('/') {
                    s.push('/');
                }
                s.push_str(&other.as_os_str().to_string_lossy());
            }
        }
    }
    s
}

/// Returns the script extension of `path`, if it has one.
#[must_use]
pub fn script_extension(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next().unwrap_or(path);
    let (_, ext) = name.rsplit_once('.')?;
    SCRIPT_EXTENSIONS.contains(&ext).then_some(ext)
}

/// Check whether a path looks like a script source.
#[must_use]
pub fn is_script(path: &Path) -> bool {
    script_extension(&to_slash(path)).is_some()
}

/// Output file name a source file is bundled into: its stem plus `.js`.
#[must_use]
pub fn output_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{stem}.{BUNDLE_EXTENSION}")
}

/// [`output_name`], numbered `<stem>2.js`, `<stem>3.js`, ... while `taken`
/// reports the name as used.
pub fn unique_output_name(path: &Path, taken: impl Fn(&str) -> bool) -> String {
    let base = output_name(path);
    if !taken(&base) {
        return base;
    }
    let suffix = format!(".{BUNDLE_EXTENSION}");
    let stem = base.strip_suffix(&suffix).unwrap_or(&base);
    let mut n = 2u32;
    loop {
        let candidate = format!("{stem}{n}{suffix}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Check whether a candidate source file is the module an export target names.
///
/// Exports usually point at built output (`./src/a.js`) while candidates are
/// sources (`src/a.ts`): two script paths that only differ in extension are the
/// same module.
#[must_use]
pub fn same_module(candidate: &Path, target: &Path) -> bool {
    if candidate == target {
        return true;
    }
    let (c, t) = (to_slash(candidate), to_slash(target));
    match (script_extension(&c), script_extension(&t)) {
        (Some(ce), Some(te)) => c[..c.len() - ce.len()] == t[..t.len() - te.len()],
        _ => false,
    }
}
