//! `appkeep-credentials`: Signing-credential primitives for appkeep.
//!
//! Zero database, zero async. Each collaborator the import pipeline needs
//! (profile parser, password verification, archive extraction) is a trait
//! with one production implementation so callers can substitute their own.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;

pub mod archive;
pub mod fingerprint;
pub mod password;
pub mod profile;

pub use archive::{ArchiveExtractor, ZipExtractor};
pub use error::CredentialError;
pub use fingerprint::credential_fingerprint;
pub use password::{PasswordVerifier, Pkcs12Verifier};
pub use profile::{PlistProfileParser, ProfileParser, ProvisioningProfile};
