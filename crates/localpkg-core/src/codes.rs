//! Stable error codes.
//!
//! All codes are SCREAMING_SNAKE_CASE and stable across versions; they appear
//! in structured log fields and in the CLI's JSON output.

/// Manifest is not valid JSON.
pub const MANIFEST_PARSE_ERROR: &str = "MANIFEST_PARSE_ERROR";

/// Manifest is valid JSON but not an object.
pub const MANIFEST_SHAPE_ERROR: &str = "MANIFEST_SHAPE_ERROR";

/// Manifest could not be read from disk.
pub const MANIFEST_READ_ERROR: &str = "MANIFEST_READ_ERROR";

/// Subpath pattern does not contain exactly one `*`.
pub const EXPORTS_PATTERN_SHAPE: &str = "EXPORTS_PATTERN_SHAPE";

/// A package was registered after discovery for the pass had completed.
pub const REGISTRY_DISCOVERY_CLOSED: &str = "REGISTRY_DISCOVERY_CLOSED";

/// The external bundler failed for a bucket.
pub const BUNDLER_INVOCATION_FAILED: &str = "BUNDLER_INVOCATION_FAILED";

/// The output sink rejected an emitted file.
pub const OUTPUT_WRITE_FAILED: &str = "OUTPUT_WRITE_FAILED";

/// Configuration file could not be read or parsed.
pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

/// Filesystem error outside of a specific manifest or output.
pub const IO_ERROR: &str = "IO_ERROR";
