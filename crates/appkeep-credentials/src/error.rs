//! Credential error types for `appkeep-credentials`.

use thiserror::Error;

/// Errors produced by credential primitives.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The profile blob is not a property list, or lacks a required key.
    #[error("profile parse error: {0}")]
    ProfileParse(String),

    /// The archive could not be opened or one of its entries could not be read.
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    /// PKCS#12 container could not be decoded.
    #[error("PKCS#12 error: {0}")]
    Pkcs12(String),

    /// I/O error from the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
