//! Reference device-side helpers.
//!
//! Real cameras run this logic in firmware against key material delivered
//! out of band; this module is the host-side reference used by the demo
//! generator and the test suites. It produces exactly the wire artifacts
//! the validator consumes.

use crate::certificate::{CertExtension, CertificateBuilder};
use crate::error::Result;
use crate::kdf;
use crate::token::{self, EncryptedToken};
use crate::types::{Fingerprint, SubjectKind};
use ed25519_dalek::SigningKey;
use sha2::{Digest, Sha256};

/// SHA-256 of the hardware-derived secret. Only this digest is ever
/// registered or encrypted; the secret itself stays on the device.
pub fn generate_fingerprint_hash(hardware_secret: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(hardware_secret);
    hasher.finalize().into()
}

/// Build and sign a camera certificate for `serial`.
pub fn camera_certificate(
    serial: &str,
    manufacturer_id: &str,
    routing_endpoint: &str,
    validity: (u32, u32),
    issuer_key: &SigningKey,
) -> Vec<u8> {
    CertificateBuilder::new(SubjectKind::Camera, serial, manufacturer_id)
        .validity(validity.0, validity.1)
        .extension(CertExtension::ManufacturerId(manufacturer_id.to_string()))
        .extension(CertExtension::RoutingEndpoint(routing_endpoint.to_string()))
        .sign(issuer_key)
}

/// Build and sign a software-authority certificate.
pub fn software_certificate(
    subject_id: &str,
    authority_id: &str,
    app_version: &str,
    allowed_versions: &[&str],
    validity: (u32, u32),
    issuer_key: &SigningKey,
) -> Vec<u8> {
    CertificateBuilder::new(SubjectKind::Software, subject_id, authority_id)
        .validity(validity.0, validity.1)
        .extension(CertExtension::AppVersion(app_version.to_string()))
        .extension(CertExtension::AllowedVersions(
            allowed_versions.iter().map(|v| v.to_string()).collect(),
        ))
        .sign(issuer_key)
}

/// Device-side token construction: derive the submission key for
/// `(table, index)` and seal the fingerprint hash under it. The device
/// holds the derived key table, never the master key; taking the master
/// key here stands in for that provisioning step.
pub fn build_token(
    fingerprint_hash: &Fingerprint,
    master_key: &[u8; 32],
    table_id: u16,
    key_index: u16,
) -> Result<EncryptedToken> {
    let key = kdf::derive(master_key, key_index)?;
    Ok(token::seal(fingerprint_hash, &key, table_id, key_index))
}
