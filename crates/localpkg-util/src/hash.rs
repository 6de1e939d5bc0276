/// Hex-encoded BLAKE3 digest of a manifest's raw contents.
///
/// Used as a change stamp: equal fingerprints mean the manifest does not need
/// to be resolved again.
#[must_use]
pub fn fingerprint(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}
