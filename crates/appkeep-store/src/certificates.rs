//! Certificate records: an imported credential/profile pair.
//!
//! The record keeps both blobs and the credential password alongside the
//! copies written to `certificates/{uuid}/`. `expiration_date` comes from
//! the profile at import and is never updated afterwards (a trigger in the
//! schema rejects any attempt).

use std::fmt;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use zeroize::Zeroizing;

use crate::apps::DeleteOutcome;
use crate::db::{self, from_db_timestamp, to_db_timestamp};
use crate::error::{is_unique_violation, StoreError};
use crate::paths::{self, LibraryPaths};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Certificate metadata, without blobs or password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRecord {
    pub uuid: String,
    pub name: String,
    pub team_name: Option<String>,
    pub fingerprint: Option<String>,
    pub imported_at: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
}

impl CertificateRecord {
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date <= now
    }
}

/// The stored credential material of a certificate.
pub struct CertificateSecrets {
    pub credential: Vec<u8>,
    pub profile: Vec<u8>,
    pub password: Option<Zeroizing<String>>,
}

impl fmt::Debug for CertificateSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateSecrets")
            .field("credential", &format_args!("[{} bytes]", self.credential.len()))
            .field("profile", &format_args!("[{} bytes]", self.profile.len()))
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Input for [`add_certificate`].
pub struct NewCertificate {
    pub uuid: String,
    pub name: String,
    pub team_name: Option<String>,
    pub fingerprint: String,
    pub expiration_date: DateTime<Utc>,
    pub secrets: CertificateSecrets,
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// Insert a certificate record. `imported_at` is set to now.
///
/// # Errors
///
/// - [`StoreError::DuplicateUuid`] if a certificate with this uuid exists
/// - [`StoreError::Database`] if the INSERT fails
pub fn add_certificate(
    conn: &Connection,
    new: &NewCertificate,
) -> Result<CertificateRecord, StoreError> {
    let imported_at = db::now();

    conn.execute(
        "INSERT INTO certificates (uuid, name, credential, profile, password, team_name, \
         imported_at, expiration_date, fingerprint) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            new.uuid,
            new.name,
            new.secrets.credential,
            new.secrets.profile,
            new.secrets.password.as_ref().map(|p| p.as_str()),
            new.team_name,
            to_db_timestamp(&imported_at),
            to_db_timestamp(&new.expiration_date),
            new.fingerprint,
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            StoreError::DuplicateUuid(new.uuid.clone())
        } else {
            StoreError::Database(format!("failed to insert certificate: {e}"))
        }
    })?;

    Ok(CertificateRecord {
        uuid: new.uuid.clone(),
        name: new.name.clone(),
        team_name: new.team_name.clone(),
        fingerprint: Some(new.fingerprint.clone()),
        imported_at,
        expiration_date: new.expiration_date,
    })
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

const SELECT_COLUMNS: &str = "uuid, name, team_name, fingerprint, imported_at, expiration_date";

struct RawCertificate {
    uuid: String,
    name: String,
    team_name: Option<String>,
    fingerprint: Option<String>,
    imported_at: String,
    expiration_date: String,
}

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawCertificate> {
    Ok(RawCertificate {
        uuid: row.get(0)?,
        name: row.get(1)?,
        team_name: row.get(2)?,
        fingerprint: row.get(3)?,
        imported_at: row.get(4)?,
        expiration_date: row.get(5)?,
    })
}

impl TryFrom<RawCertificate> for CertificateRecord {
    type Error = StoreError;

    fn try_from(raw: RawCertificate) -> Result<Self, Self::Error> {
        Ok(Self {
            uuid: raw.uuid,
            name: raw.name,
            team_name: raw.team_name,
            fingerprint: raw.fingerprint,
            imported_at: from_db_timestamp(&raw.imported_at)?,
            expiration_date: from_db_timestamp(&raw.expiration_date)?,
        })
    }
}

/// Look up a certificate by uuid.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if the query fails.
pub fn get_certificate_record(
    conn: &Connection,
    uuid: &str,
) -> Result<Option<CertificateRecord>, StoreError> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM certificates WHERE uuid = ?1"),
        params![uuid],
        read_raw,
    )
    .optional()
    .map_err(|e| StoreError::Database(format!("failed to fetch certificate: {e}")))?
    .map(CertificateRecord::try_from)
    .transpose()
}

/// Whether a certificate with this uuid exists.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if the query fails.
pub fn certificate_exists(conn: &Connection, uuid: &str) -> Result<bool, StoreError> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM certificates WHERE uuid = ?1)",
        params![uuid],
        |row| row.get(0),
    )
    .map_err(|e| StoreError::Database(format!("failed to check certificate: {e}")))
}

/// All certificates, oldest import first.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if the query fails.
pub fn list_certificates(conn: &Connection) -> Result<Vec<CertificateRecord>, StoreError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM certificates ORDER BY imported_at ASC, rowid ASC"
        ))
        .map_err(|e| StoreError::Database(format!("failed to prepare certificate query: {e}")))?;

    let rows = stmt
        .query_map([], read_raw)
        .map_err(|e| StoreError::Database(format!("failed to query certificates: {e}")))?;

    let mut certs = Vec::new();
    for row in rows {
        let raw = row
            .map_err(|e| StoreError::Database(format!("failed to read certificate row: {e}")))?;
        certs.push(CertificateRecord::try_from(raw)?);
    }
    Ok(certs)
}

/// Load the stored blobs and password of a certificate.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if the query fails.
pub fn get_certificate_secrets(
    conn: &Connection,
    uuid: &str,
) -> Result<Option<CertificateSecrets>, StoreError> {
    conn.query_row(
        "SELECT credential, profile, password FROM certificates WHERE uuid = ?1",
        params![uuid],
        |row| {
            Ok(CertificateSecrets {
                credential: row.get(0)?,
                profile: row.get(1)?,
                password: row.get::<_, Option<String>>(2)?.map(Zeroizing::new),
            })
        },
    )
    .optional()
    .map_err(|e| StoreError::Database(format!("failed to fetch certificate secrets: {e}")))
}

/// Uuid of a certificate whose credential has this fingerprint, if any.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if the query fails.
pub fn find_by_fingerprint(
    conn: &Connection,
    fingerprint: &str,
) -> Result<Option<String>, StoreError> {
    conn.query_row(
        "SELECT uuid FROM certificates WHERE fingerprint = ?1 ORDER BY imported_at ASC LIMIT 1",
        params![fingerprint],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| StoreError::Database(format!("failed to look up fingerprint: {e}")))
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

/// Revoke a certificate: remove its directory, clear app references to it,
/// then delete the record.
///
/// Signed apps that referenced it stay, with `certificate_id` NULL.
/// Directory removal is best-effort and reported as a warning.
///
/// # Errors
///
/// Returns [`StoreError::Database`] or [`StoreError::Commit`] if the
/// record changes fail.
pub fn delete_certificate(
    conn: &mut Connection,
    paths: &LibraryPaths,
    uuid: &str,
) -> Result<DeleteOutcome, StoreError> {
    let warning = paths
        .certificate_directory_for(uuid)
        .and_then(|dir| paths::remove_best_effort(&dir));

    let tx = conn
        .transaction()
        .map_err(|e| StoreError::Database(format!("failed to begin transaction: {e}")))?;

    tx.execute(
        "UPDATE apps_signed SET certificate_id = NULL WHERE certificate_id = ?1",
        params![uuid],
    )
    .map_err(|e| StoreError::Database(format!("failed to unlink apps from certificate: {e}")))?;

    let deleted = tx
        .execute("DELETE FROM certificates WHERE uuid = ?1", params![uuid])
        .map_err(|e| StoreError::Database(format!("failed to delete certificate: {e}")))?;

    db::commit(tx)?;

    if deleted > 0 {
        tracing::info!(certificate = uuid, "certificate revoked");
    }

    Ok(DeleteOutcome {
        deleted: deleted > 0,
        warning,
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreDb;
    use chrono::TimeZone;

    fn sample(uuid: &str, credential: &[u8]) -> NewCertificate {
        NewCertificate {
            uuid: uuid.into(),
            name: format!("Cert {uuid}"),
            team_name: Some("Example Team".into()),
            fingerprint: appkeep_credentials::credential_fingerprint(credential),
            expiration_date: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
            secrets: CertificateSecrets {
                credential: credential.to_vec(),
                profile: b"profile".to_vec(),
                password: Some(Zeroizing::new("pw".into())),
            },
        }
    }

    #[test]
    fn add_and_fetch() {
        let db = StoreDb::open_in_memory().unwrap();
        let added = add_certificate(db.connection(), &sample("c1", b"p12")).unwrap();

        assert_eq!(
            get_certificate_record(db.connection(), "c1").unwrap(),
            Some(added)
        );
        let secrets = get_certificate_secrets(db.connection(), "c1").unwrap().unwrap();
        assert_eq!(secrets.credential, b"p12");
        assert_eq!(secrets.password.as_deref().map(String::as_str), Some("pw"));
    }

    #[test]
    fn duplicate_uuid_is_rejected() {
        let db = StoreDb::open_in_memory().unwrap();
        add_certificate(db.connection(), &sample("c1", b"a")).unwrap();
        assert!(matches!(
            add_certificate(db.connection(), &sample("c1", b"b")),
            Err(StoreError::DuplicateUuid(_))
        ));
    }

    #[test]
    fn expiration_date_is_immutable() {
        let db = StoreDb::open_in_memory().unwrap();
        add_certificate(db.connection(), &sample("c1", b"a")).unwrap();

        let result = db.connection().execute(
            "UPDATE certificates SET expiration_date = '2040-01-01T00:00:00Z' WHERE uuid = 'c1'",
            [],
        );
        assert!(result.is_err());

        // Other columns stay editable.
        db.connection()
            .execute("UPDATE certificates SET name = 'renamed' WHERE uuid = 'c1'", [])
            .unwrap();
    }

    #[test]
    fn fingerprint_lookup() {
        let db = StoreDb::open_in_memory().unwrap();
        let new = sample("c1", b"blob");
        add_certificate(db.connection(), &new).unwrap();

        assert_eq!(
            find_by_fingerprint(db.connection(), &new.fingerprint).unwrap(),
            Some("c1".to_string())
        );
        assert_eq!(find_by_fingerprint(db.connection(), "0000").unwrap(), None);
    }

    #[test]
    fn secrets_debug_redacts_password() {
        let secrets = sample("c1", b"blob").secrets;
        let debug = format!("{secrets:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("pw\""));
    }

    #[test]
    fn delete_missing_certificate_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = LibraryPaths::new(dir.path());
        let mut db = StoreDb::open_in_memory().unwrap();
        let outcome = delete_certificate(db.connection_mut(), &paths, "nope").unwrap();
        assert!(!outcome.deleted);
    }
}
