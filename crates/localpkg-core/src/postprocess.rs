//! Chunk post-processing and the output sink.

use crate::bundler::{BundleOutput, Contents};
use crate::partition::{Bucket, SourceFile};
use std::path::{Path, PathBuf};
use thiserror::Error;

const STRICT_PROLOGUE: &str = "\"use strict\";(function(){";
const CLOSER: &str = "})()";
const SOURCE_MAP_COMMENT: &str = "\n//# sourceMappingURL";

/// Wrap an ES-module chunk so it runs as a classic script.
///
/// The body is enclosed in a strict-mode IIFE. When the chunk has a source map
/// the closer goes right before the `sourceMappingURL` comment so the comment
/// stays last; if the comment is missing the chunk is treated as map-less.
#[must_use]
pub fn wrap_nomodule(code: &str, has_source_map: bool, minify: bool) -> String {
    let ws = if minify { "" } else { "\n" };
    let mut out = String::with_capacity(code.len() + STRICT_PROLOGUE.len() + CLOSER.len() + 2);
    out.push_str(STRICT_PROLOGUE);
    out.push_str(ws);

    if has_source_map {
        if let Some(at) = code.find(SOURCE_MAP_COMMENT) {
            out.push_str(&code[..at]);
            out.push_str(ws);
            out.push_str(CLOSER);
            out.push_str(&code[at..]);
            return out;
        }
    }

    let (body, had_newline) = match code.strip_suffix('\n') {
        Some(rest) => (rest, true),
        None => (code, false),
    };
    let body = body.strip_suffix(';').unwrap_or(body);
    out.push_str(body);
    out.push_str(ws);
    out.push_str(CLOSER);
    if had_newline {
        out.push('\n');
    }
    out
}

/// A file ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    /// Destination path, including the bucket's output directory.
    pub path: PathBuf,
    pub contents: Contents,
    /// Source map JSON to store next to the file.
    pub source_map: Option<String>,
    /// Source file this output was built from, when it is an entry chunk.
    pub origin: Option<SourceFile>,
}

/// The sink rejected a file.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sink rejected {path}: {reason}")]
    Rejected { path: PathBuf, reason: String },
}

impl SinkError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        crate::codes::OUTPUT_WRITE_FAILED
    }
}

/// Destination for emitted files.
pub trait OutputSink: Send {
    fn write(&mut self, file: OutputFile) -> Result<(), SinkError>;
}

/// Collects files in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub files: Vec<OutputFile>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a written file by path.
    #[must_use]
    pub fn get(&self, path: impl AsRef<Path>) -> Option<&OutputFile> {
        self.files.iter().find(|f| f.path == path.as_ref())
    }

    /// Text contents of a written file.
    #[must_use]
    pub fn text(&self, path: impl AsRef<Path>) -> Option<&str> {
        match &self.get(path)?.contents {
            Contents::Text(s) => Some(s),
            Contents::Bytes(_) => None,
        }
    }
}

impl OutputSink for MemorySink {
    fn write(&mut self, file: OutputFile) -> Result<(), SinkError> {
        self.files.push(file);
        Ok(())
    }
}

/// Turn one bucket's bundler output into sink files.
///
/// Chunks whose entry is in the bucket's nomodule set are wrapped; all other
/// chunks and every asset pass through unchanged.
#[must_use]
pub fn process_output(
    bucket: &Bucket,
    output: BundleOutput,
    out_dir: &Path,
    minify: bool,
) -> Vec<OutputFile> {
    let mut files = Vec::with_capacity(output.chunks.len() + output.assets.len());

    for chunk in output.chunks {
        let nomodule = chunk
            .entry
            .as_ref()
            .is_some_and(|entry| bucket.nomodule.contains(entry));
        let code = if nomodule {
            wrap_nomodule(&chunk.code, chunk.source_map.is_some(), minify)
        } else {
            chunk.code
        };
        files.push(OutputFile {
            path: out_dir.join(&chunk.file_name),
            origin: bucket.files_by_output_name.get(&chunk.file_name).cloned(),
            contents: Contents::Text(code),
            source_map: chunk.source_map,
        });
    }

    for asset in output.assets {
        files.push(OutputFile {
            path: out_dir.join(&asset.file_name),
            contents: asset.contents,
            source_map: None,
            origin: None,
        });
    }

    files
}
