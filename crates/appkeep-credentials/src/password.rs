//! Password verification for credential (PKCS#12) files.
//!
//! A credential is accepted when its PKCS#12 container decrypts with the
//! supplied password and, if the profile lists `DeveloperCertificates`,
//! the container's leaf certificate is one of them.

use openssl::pkcs12::Pkcs12;

use crate::profile::{PlistProfileParser, ProfileParser};

/// Checks a credential/profile pair against a password.
pub trait PasswordVerifier: Send + Sync {
    /// Return `true` when `password` unlocks `credential` and the credential
    /// belongs to `profile`.
    fn verify(&self, credential: &[u8], profile: &[u8], password: &str) -> bool;
}

impl<F> PasswordVerifier for F
where
    F: Fn(&[u8], &[u8], &str) -> bool + Send + Sync,
{
    fn verify(&self, credential: &[u8], profile: &[u8], password: &str) -> bool {
        self(credential, profile, password)
    }
}

/// Production verifier backed by OpenSSL.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pkcs12Verifier;

impl PasswordVerifier for Pkcs12Verifier {
    fn verify(&self, credential: &[u8], profile: &[u8], password: &str) -> bool {
        let Ok(container) = Pkcs12::from_der(credential) else {
            return false;
        };
        let Ok(parsed) = container.parse2(password) else {
            return false;
        };

        // Profiles that do not parse, or carry no certificate list, cannot
        // contradict the container; the password check alone decides.
        let authorized = PlistProfileParser
            .parse(profile)
            .map(|p| p.developer_certificates)
            .unwrap_or_default();
        if authorized.is_empty() {
            return true;
        }

        parsed
            .cert
            .and_then(|cert| cert.to_der().ok())
            .is_some_and(|der| authorized.iter().any(|a| *a == der))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_verifiers() {
        let verifier = |_: &[u8], _: &[u8], pw: &str| pw == "open-sesame";
        assert!(verifier.verify(b"", b"", "open-sesame"));
        assert!(!verifier.verify(b"", b"", "nope"));
    }

    #[test]
    fn garbage_credential_never_verifies() {
        assert!(!Pkcs12Verifier.verify(b"not der", b"", "anything"));
        assert!(!Pkcs12Verifier.verify(b"", b"", ""));
    }
}
