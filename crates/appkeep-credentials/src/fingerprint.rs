//! Content fingerprint for credential blobs.

/// BLAKE3 digest of a credential blob, lowercase hex.
///
/// Two imports of the same PKCS#12 file produce the same fingerprint,
/// which lets the import preview flag duplicates.
#[must_use]
pub fn credential_fingerprint(credential: &[u8]) -> String {
    data_encoding::HEXLOWER.encode(blake3::hash(credential).as_bytes())
}
