#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Integration tests for the credential primitives: PKCS#12 password
//! verification against real OpenSSL-built containers, and zip extraction
//! order.

use std::fs;
use std::io::Write;
use std::path::Path;

use appkeep_credentials::{ArchiveExtractor, PasswordVerifier, Pkcs12Verifier, ZipExtractor};
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::x509::{X509NameBuilder, X509};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn self_signed(common_name: &str) -> (PKey<Private>, X509) {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let pkey = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", common_name).unwrap();
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&pkey).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(365).unwrap())
        .unwrap();
    builder.sign(&pkey, MessageDigest::sha256()).unwrap();
    (pkey, builder.build())
}

fn pkcs12_der(pkey: &PKey<Private>, cert: &X509, password: &str) -> Vec<u8> {
    Pkcs12::builder()
        .name("appkeep-test")
        .pkey(pkey)
        .cert(cert)
        .build2(password)
        .unwrap()
        .to_der()
        .unwrap()
}

fn profile_listing(certs: &[&X509]) -> Vec<u8> {
    let data: String = certs
        .iter()
        .map(|c| {
            format!(
                "<data>{}</data>",
                data_encoding::BASE64.encode(&c.to_der().unwrap())
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <plist version=\"1.0\"><dict>\
         <key>ExpirationDate</key><date>2035-01-01T00:00:00Z</date>\
         <key>DeveloperCertificates</key><array>{data}</array>\
         </dict></plist>"
    )
    .into_bytes()
}

fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
    let file = fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, data) in files {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

// ---------------------------------------------------------------------------
// Password verification
// ---------------------------------------------------------------------------

#[test]
fn correct_password_verifies() {
    let (pkey, cert) = self_signed("Dev A");
    let credential = pkcs12_der(&pkey, &cert, "hunter2");
    let profile = profile_listing(&[&cert]);

    assert!(Pkcs12Verifier.verify(&credential, &profile, "hunter2"));
}

#[test]
fn wrong_password_is_rejected() {
    let (pkey, cert) = self_signed("Dev A");
    let credential = pkcs12_der(&pkey, &cert, "hunter2");
    let profile = profile_listing(&[&cert]);

    assert!(!Pkcs12Verifier.verify(&credential, &profile, "hunter3"));
}

#[test]
fn certificate_not_listed_in_profile_is_rejected() {
    let (pkey, cert) = self_signed("Dev A");
    let (_, other) = self_signed("Dev B");
    let credential = pkcs12_der(&pkey, &cert, "pw");
    let profile = profile_listing(&[&other]);

    assert!(!Pkcs12Verifier.verify(&credential, &profile, "pw"));
}

#[test]
fn profile_without_certificate_list_only_checks_password() {
    let (pkey, cert) = self_signed("Dev A");
    let credential = pkcs12_der(&pkey, &cert, "pw");

    assert!(Pkcs12Verifier.verify(&credential, b"not a plist", "pw"));
}

// ---------------------------------------------------------------------------
// Zip extraction
// ---------------------------------------------------------------------------

#[test]
fn extraction_preserves_archive_order_and_skips_resource_forks() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("bundle.zip");
    write_zip(
        &archive,
        &[
            ("b/second.p12", b"two"),
            ("__MACOSX/b/._second.p12", b"fork"),
            ("a/first.mobileprovision", b"one"),
            ("password.txt", b"kravasign\n"),
        ],
    );

    let dest = dir.path().join("out");
    fs::create_dir_all(&dest).unwrap();
    let extracted = ZipExtractor.extract(&archive, &dest).unwrap();

    let names: Vec<String> = extracted
        .iter()
        .map(|p| p.strip_prefix(&dest).unwrap().display().to_string())
        .collect();
    assert_eq!(
        names,
        vec!["b/second.p12", "a/first.mobileprovision", "password.txt"]
    );
    assert_eq!(fs::read(&extracted[0]).unwrap(), b"two");
    assert!(!dest.join("__MACOSX").exists());
}
