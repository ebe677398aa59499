//! Submission orchestration.
//!
//! Receive bundle -> route via the certificate -> validator backend ->
//! on PASS, append to the registry -> receipt. The validator call never
//! sees the image hash; the registry append never sees the certificate.

use crate::errors::PipelineError;
use crate::validator_backend::ValidatorBackend;
use birthmark::certificate::ParsedCertificate;
use birthmark::token::EncryptedToken;
use birthmark::types::SubjectKind;
use birthmark_registry::{
    HashRegistry, ImageHash, ImageRecord, NewRecord, RegistryError, SubmissionType,
};
use std::sync::Arc;
use std::time::Duration;

/// The already-deserialized inbound bundle from the capture/client layer.
pub struct SubmissionBundle {
    pub image_hash: ImageHash,
    pub certificate: Vec<u8>,
    pub token: EncryptedToken,
    pub modification_level: u8,
    pub parent_image_hash: Option<ImageHash>,
}

#[derive(Debug)]
pub struct Receipt {
    pub record: ImageRecord,
}

pub struct Pipeline {
    backend: ValidatorBackend,
    registry: Arc<HashRegistry>,
    storage_retries: u32,
    retry_backoff: Duration,
}

impl Pipeline {
    pub fn new(
        backend: ValidatorBackend,
        registry: Arc<HashRegistry>,
        storage_retries: u32,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            backend,
            registry,
            storage_retries,
            retry_backoff,
        }
    }

    pub async fn submit(&self, bundle: SubmissionBundle) -> Result<Receipt, PipelineError> {
        metrics::increment_counter!("birthmark_submissions_total");

        // Routing-only parse. Nothing here is trusted; the validator does
        // its own parse and signature check behind the trust boundary.
        let (authority_id, submission_type) = match ParsedCertificate::parse(&bundle.certificate)
        {
            Ok(cert) => {
                let authority = cert
                    .manufacturer_id()
                    .unwrap_or(&cert.issuer_id)
                    .to_string();
                let kind = match cert.kind {
                    SubjectKind::Camera => SubmissionType::Camera,
                    SubjectKind::Software => SubmissionType::Software,
                };
                (authority, kind)
            }
            Err(_) => {
                metrics::increment_counter!("birthmark_validations_failed_total");
                return Err(PipelineError::ValidationFailed);
            }
        };

        let passed = self
            .backend
            .validate(&bundle.certificate, &bundle.token, &authority_id)
            .await;
        if !passed {
            metrics::increment_counter!("birthmark_validations_failed_total");
            return Err(PipelineError::ValidationFailed);
        }
        metrics::increment_counter!("birthmark_validations_passed_total");

        let record = NewRecord {
            image_hash: bundle.image_hash,
            submission_type,
            modification_level: bundle.modification_level,
            parent_image_hash: bundle.parent_image_hash,
        };
        let sequence = self.append_with_retry(record, &authority_id).await?;

        let record = self
            .registry
            .lookup(&bundle.image_hash)
            .map_err(PipelineError::Registry)?;
        metrics::increment_counter!("birthmark_records_appended_total");
        tracing::info!(sequence, "submission recorded");
        Ok(Receipt { record })
    }

    /// Storage failures are retried with backoff; logical rejections
    /// (unknown parent, monotonicity) are not, since they are
    /// deterministic.
    async fn append_with_retry(
        &self,
        record: NewRecord,
        authority_id: &str,
    ) -> Result<u32, PipelineError> {
        let mut attempt = 0;
        loop {
            match self.registry.append(record.clone(), authority_id) {
                Ok(seq) => return Ok(seq),
                Err(RegistryError::IoError(e)) if attempt < self.storage_retries => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %e, "registry write failed; retrying");
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(RegistryError::IoError(e)) => {
                    tracing::error!(error = %e, "registry write failed; retries exhausted");
                    return Err(PipelineError::StorageUnavailable);
                }
                Err(e) => return Err(PipelineError::Registry(e)),
            }
        }
    }

    pub fn registry(&self) -> &Arc<HashRegistry> {
        &self.registry
    }
}
