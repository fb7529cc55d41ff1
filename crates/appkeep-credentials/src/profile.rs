//! Provisioning profile parsing.
//!
//! A `.mobileprovision` file is a CMS `SignedData` envelope whose payload
//! is an XML property list. We do not verify the envelope signature; we
//! only locate the embedded plist and read the keys the store needs.
//! Bare XML or binary plists are accepted as-is.

use std::io::Cursor;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use plist::{Dictionary, Value};
use serde::Serialize;

use crate::error::CredentialError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const XML_START: &[u8] = b"<?xml";
const PLIST_END: &[u8] = b"</plist>";
const BINARY_PLIST_MAGIC: &[u8] = b"bplist00";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The subset of a provisioning profile the store consumes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningProfile {
    /// Profile display name (`Name`).
    pub name: Option<String>,
    /// Developer team name (`TeamName`).
    pub team_name: Option<String>,
    /// Profile identifier (`UUID`).
    pub profile_uuid: Option<String>,
    /// When the profile was issued (`CreationDate`).
    pub creation_date: Option<DateTime<Utc>>,
    /// When the profile stops being valid (`ExpirationDate`).
    pub expiration_date: DateTime<Utc>,
    /// DER-encoded signing certificates the profile authorizes.
    #[serde(skip)]
    pub developer_certificates: Vec<Vec<u8>>,
}

impl ProvisioningProfile {
    /// Whether the profile has expired relative to `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date <= now
    }
}

/// Parses a profile blob into [`ProvisioningProfile`].
pub trait ProfileParser: Send + Sync {
    /// Parse `blob`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::ProfileParse`] on malformed input.
    fn parse(&self, blob: &[u8]) -> Result<ProvisioningProfile, CredentialError>;
}

/// Production parser backed by the `plist` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlistProfileParser;

impl ProfileParser for PlistProfileParser {
    fn parse(&self, blob: &[u8]) -> Result<ProvisioningProfile, CredentialError> {
        parse_profile(blob)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a provisioning profile blob.
///
/// # Errors
///
/// Returns [`CredentialError::ProfileParse`] if no property list can be
/// located, the plist is not a dictionary, or `ExpirationDate` is missing.
pub fn parse_profile(blob: &[u8]) -> Result<ProvisioningProfile, CredentialError> {
    let payload = locate_plist(blob)
        .ok_or_else(|| CredentialError::ProfileParse("no property list found".into()))?;

    let value = Value::from_reader(Cursor::new(payload))
        .map_err(|e| CredentialError::ProfileParse(format!("invalid property list: {e}")))?;

    let dict = value
        .as_dictionary()
        .ok_or_else(|| CredentialError::ProfileParse("property list root is not a dictionary".into()))?;

    let expiration_date = date_for(dict, "ExpirationDate")
        .ok_or_else(|| CredentialError::ProfileParse("missing ExpirationDate".into()))?;

    let developer_certificates = dict
        .get("DeveloperCertificates")
        .and_then(Value::as_array)
        .map(|certs| {
            certs
                .iter()
                .filter_map(Value::as_data)
                .map(<[u8]>::to_vec)
                .collect()
        })
        .unwrap_or_default();

    Ok(ProvisioningProfile {
        name: string_for(dict, "Name"),
        team_name: string_for(dict, "TeamName"),
        profile_uuid: string_for(dict, "UUID"),
        creation_date: date_for(dict, "CreationDate"),
        expiration_date,
        developer_certificates,
    })
}

/// Find the property list inside `blob`.
///
/// Binary plists are returned whole. Otherwise the slice from the first
/// `<?xml` through the last `</plist>` is returned, which covers both bare
/// XML and the CMS-wrapped form.
fn locate_plist(blob: &[u8]) -> Option<&[u8]> {
    if blob.starts_with(BINARY_PLIST_MAGIC) {
        return Some(blob);
    }
    let start = find(blob, XML_START)?;
    let end = rfind(blob, PLIST_END)?.checked_add(PLIST_END.len())?;
    if end <= start {
        return None;
    }
    blob.get(start..end)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

fn string_for(dict: &Dictionary, key: &str) -> Option<String> {
    dict.get(key).and_then(Value::as_string).map(str::to_string)
}

fn date_for(dict: &Dictionary, key: &str) -> Option<DateTime<Utc>> {
    dict.get(key)
        .and_then(Value::as_date)
        .map(|d| DateTime::<Utc>::from(SystemTime::from(d)))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn xml_profile(body: &str) -> Vec<u8> {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \
             \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n\
             <plist version=\"1.0\"><dict>{body}</dict></plist>"
        )
        .into_bytes()
    }

    #[test]
    fn parses_bare_xml_plist() {
        let blob = xml_profile(
            "<key>Name</key><string>Team Profile</string>\
             <key>TeamName</key><string>Example Team</string>\
             <key>ExpirationDate</key><date>2030-01-02T03:04:05Z</date>",
        );
        let profile = parse_profile(&blob).unwrap();
        assert_eq!(profile.name.as_deref(), Some("Team Profile"));
        assert_eq!(profile.team_name.as_deref(), Some("Example Team"));
        assert_eq!(
            profile.expiration_date,
            Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap()
        );
        assert!(profile.developer_certificates.is_empty());
    }

    #[test]
    fn parses_plist_wrapped_in_binary_envelope() {
        let mut blob = vec![0x30, 0x82, 0x1f, 0x00, 0x06, 0x09];
        blob.extend(xml_profile(
            "<key>ExpirationDate</key><date>2031-05-06T00:00:00Z</date>\
             <key>DeveloperCertificates</key><array><data>AQID</data></array>",
        ));
        blob.extend([0xa0, 0x82, 0x00, 0x00]);

        let profile = parse_profile(&blob).unwrap();
        assert_eq!(profile.developer_certificates, vec![vec![1, 2, 3]]);
    }

    #[test]
    fn missing_expiration_is_a_parse_error() {
        let blob = xml_profile("<key>Name</key><string>x</string>");
        assert!(matches!(
            parse_profile(&blob),
            Err(CredentialError::ProfileParse(_))
        ));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(parse_profile(b"definitely not a profile").is_err());
        assert!(parse_profile(b"").is_err());
    }

    #[test]
    fn expired_relative_to_now() {
        let blob = xml_profile("<key>ExpirationDate</key><date>2001-01-01T00:00:00Z</date>");
        let profile = parse_profile(&blob).unwrap();
        assert!(profile.is_expired_at(Utc::now()));
    }
}
