//! MA-side authentication decision.
//!
//! The externally observable result is a flat PASS/FAIL; detailed causes go
//! to the audit log only, so the endpoint cannot be used as an oracle for
//! probing certificate structure. The signature takes a certificate, a
//! token and an authority id; there is no parameter through which an image
//! hash could reach this code.

use crate::certificate::{ParsedCertificate, TrustedRoots};
use crate::error::CoreError;
use crate::keytable::KeyTableStore;
use crate::token::{self, EncryptedToken};
use crate::types::{unix_time, SubjectKind};
use crate::kdf;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Flat authentication result crossing the trust boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail(FailReason),
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

/// Coarse failure categories. These are for the MA's own audit trail; the
/// wire serialization collapses everything to FAIL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    /// Parse, signature, expiry or version-allow-list failure.
    Certificate,
    /// Subject serial has no registration.
    Unregistered,
    /// Registration exists but has been revoked.
    Revoked,
    /// Key derivation or AEAD open failed, or the token references a table
    /// outside the device's assignment.
    Token,
}

pub struct Validator {
    store: Arc<KeyTableStore>,
    roots: TrustedRoots,
}

impl Validator {
    pub fn new(store: Arc<KeyTableStore>, roots: TrustedRoots) -> Self {
        Self { store, roots }
    }

    /// Authenticate one submission. `authority_id` is used for routing and
    /// audit logging only and is discarded afterwards; it is never attached
    /// to anything that persists.
    pub fn validate(
        &self,
        certificate_bytes: &[u8],
        token: &EncryptedToken,
        authority_id: &str,
    ) -> Verdict {
        let cert = match self.check_certificate(certificate_bytes) {
            Ok(cert) => cert,
            Err(e) => {
                tracing::debug!(authority = authority_id, error = %e, "certificate rejected");
                return Verdict::Fail(FailReason::Certificate);
            }
        };

        let registration = match self.store.lookup_device(&cert.subject_id) {
            Ok(reg) => reg,
            Err(_) => {
                tracing::debug!(
                    authority = authority_id,
                    subject = %cert.subject_id,
                    "unregistered subject"
                );
                return Verdict::Fail(FailReason::Unregistered);
            }
        };
        if registration.revoked {
            tracing::warn!(
                authority = authority_id,
                subject = %cert.subject_id,
                "revoked subject attempted validation"
            );
            return Verdict::Fail(FailReason::Revoked);
        }

        match self.check_token(&cert, &registration.table_assignment, token, &registration.fingerprint_hash) {
            Ok(()) => {
                tracing::debug!(authority = authority_id, subject = %cert.subject_id, "pass");
                Verdict::Pass
            }
            Err(e) => {
                tracing::debug!(
                    authority = authority_id,
                    subject = %cert.subject_id,
                    error = %e,
                    "token rejected"
                );
                Verdict::Fail(FailReason::Token)
            }
        }
    }

    fn check_certificate(&self, bytes: &[u8]) -> crate::error::Result<ParsedCertificate> {
        let cert = ParsedCertificate::parse(bytes)?;
        cert.verify_signature(&self.roots)?;
        cert.check_validity(unix_time())?;

        if cert.kind == SubjectKind::Software {
            let version = cert
                .app_version()
                .ok_or(CoreError::MalformedCertificate("missing app version"))?;
            let allowed = cert
                .allowed_versions()
                .ok_or(CoreError::MalformedCertificate("missing version allow-list"))?;
            if !allowed.iter().any(|v| v == version) {
                return Err(CoreError::UntrustedIssuer);
            }
        }
        Ok(cert)
    }

    fn check_token(
        &self,
        cert: &ParsedCertificate,
        assignment: &[u16],
        token: &EncryptedToken,
        registered: &[u8; 32],
    ) -> crate::error::Result<()> {
        // A token must use one of the subject's assigned tables, and must
        // agree with the certificate's key reference when one is embedded.
        if !assignment.contains(&token.table_id) {
            return Err(CoreError::UnknownTable(token.table_id));
        }
        if let Some((table_id, key_index)) = cert.key_reference() {
            if table_id != token.table_id || key_index != token.key_index {
                return Err(CoreError::AuthenticationFailed);
            }
        }

        let master = self.store.get_master_key(token.table_id)?;
        let key = Zeroizing::new(kdf::derive(&master, token.key_index)?);
        let fingerprint = Zeroizing::new(token::open(token, &key)?);

        if bool::from(fingerprint[..].ct_eq(&registered[..])) {
            Ok(())
        } else {
            Err(CoreError::AuthenticationFailed)
        }
    }
}
