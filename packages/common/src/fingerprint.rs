//! Certificate fingerprints
//!
//! Certificates are identified by the SHA-256 digest of their DER encoding.
//! The full hex form is used as a keystore alias; the short form is only for logs.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 digest of a DER-encoded certificate
#[must_use]
pub fn sha256_fingerprint(der: &[u8]) -> String {
    hex::encode(Sha256::digest(der))
}

/// First 12 hex characters of the fingerprint, prefixed with `#`
#[must_use]
pub fn short_fingerprint(der: &[u8]) -> String {
    let full = sha256_fingerprint(der);
    format!("#{}", &full[..12])
}
