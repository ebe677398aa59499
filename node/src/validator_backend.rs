//! Validation backends.
//!
//! The pipeline only ever learns a flat pass/fail. For a remote MA, any
//! transport error or timeout is FAIL; there is no ambiguous third state
//! propagated upward.

use crate::api::{ValidateRequest, ValidateResponse};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use birthmark::token::EncryptedToken;
use birthmark::Validator;
use std::sync::Arc;
use std::time::Duration;

pub enum ValidatorBackend {
    /// MA validator running in this process.
    Local(Arc<Validator>),
    /// MA validator across the trust boundary.
    Remote {
        client: reqwest::Client,
        endpoint: String,
    },
}

impl ValidatorBackend {
    pub fn local(validator: Arc<Validator>) -> Self {
        ValidatorBackend::Local(validator)
    }

    pub fn remote(endpoint: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client construction");
        ValidatorBackend::Remote { client, endpoint }
    }

    /// Flat authentication decision. No image hash is accepted here.
    pub async fn validate(
        &self,
        certificate: &[u8],
        token: &EncryptedToken,
        authority_id: &str,
    ) -> bool {
        match self {
            ValidatorBackend::Local(validator) => {
                validator.validate(certificate, token, authority_id).is_pass()
            }
            ValidatorBackend::Remote { client, endpoint } => {
                let req = ValidateRequest {
                    certificate: BASE64.encode(certificate),
                    token: BASE64.encode(token.to_bytes()),
                    authority_id: authority_id.to_string(),
                };
                let url = format!("{}/v1/validate", endpoint.trim_end_matches('/'));
                match client.post(&url).json(&req).send().await {
                    Ok(resp) => match resp.json::<ValidateResponse>().await {
                        Ok(body) => body.result == "PASS",
                        Err(e) => {
                            tracing::warn!(error = %e, "validator response unreadable; FAIL");
                            false
                        }
                    },
                    // Covers connection errors and the configured timeout.
                    Err(e) => {
                        tracing::warn!(error = %e, "validator unreachable; FAIL");
                        false
                    }
                }
            }
        }
    }
}
