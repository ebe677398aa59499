use crate::api::*;
use crate::errors::PipelineError;
use crate::pipeline::{Pipeline, SubmissionBundle};
use crate::telemetry;
use axum::extract::{Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::middleware::{from_fn_with_state, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{extract::Request as AxumRequest, Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use birthmark::token::EncryptedToken;
use birthmark::Validator;
use birthmark_registry::{HashRegistry, ImageHash};
use std::sync::Arc;
use subtle::ConstantTimeEq;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub registry: Arc<HashRegistry>,
    /// Present when this node also serves the MA role.
    pub validator: Option<Arc<Validator>>,
}

async fn auth_guard(
    State(token): State<Arc<Option<String>>>,
    req: AxumRequest,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(token_str) = &*token {
        let provided = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.strip_prefix("Bearer "));
        // Constant-time comparison; ct_eq handles the length mismatch case.
        let matched = matches!(
            provided,
            Some(p) if bool::from(p.as_bytes().ct_eq(token_str.as_bytes()))
        );
        if !matched {
            return Err(StatusCode::UNAUTHORIZED);
        }
    }
    Ok(next.run(req).await)
}

pub fn build_router(state: AppState, auth_token: Option<String>) -> Router {
    let mut app = Router::new()
        .route("/v1/submit", post(submit))
        .route("/v1/validate", post(validate))
        .route("/v1/verify/:hash", get(verify))
        .route("/v1/provenance/:hash", get(provenance))
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    if let Some(token) = auth_token {
        tracing::info!("Auth Enabled: Bearer token required");
        let auth_state = Arc::new(Some(token));
        app = app.layer(from_fn_with_state(auth_state, auth_guard));
    } else {
        tracing::warn!("Auth Disabled: No token configured");
    }

    app
}

fn parse_image_hash(hex_str: &str) -> Result<ImageHash, PipelineError> {
    let bytes = hex::decode(hex_str)
        .map_err(|_| PipelineError::InvalidInput("image hash is not hex".to_string()))?;
    bytes
        .try_into()
        .map_err(|_| PipelineError::InvalidInput("image hash must be 32 bytes".to_string()))
}

fn parse_token(b64: &str) -> Result<EncryptedToken, PipelineError> {
    let bytes = BASE64
        .decode(b64)
        .map_err(|_| PipelineError::InvalidInput("token is not base64".to_string()))?;
    EncryptedToken::from_bytes(&bytes)
        .map_err(|e| PipelineError::InvalidInput(format!("bad token: {e}")))
}

async fn submit(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, PipelineError> {
    let image_hash = parse_image_hash(&req.image_hash)?;
    let certificate = BASE64
        .decode(&req.certificate)
        .map_err(|_| PipelineError::InvalidInput("certificate is not base64".to_string()))?;
    let token = parse_token(&req.token)?;
    let parent_image_hash = req
        .parent_image_hash
        .as_deref()
        .map(parse_image_hash)
        .transpose()?;

    let receipt = state
        .pipeline
        .submit(SubmissionBundle {
            image_hash,
            certificate,
            token,
            modification_level: req.modification_level,
            parent_image_hash,
        })
        .await?;

    Ok(Json(SubmitResponse {
        result: "PASS".to_string(),
        sequence_number: receipt.record.sequence_number,
        timestamp: receipt.record.timestamp,
    }))
}

/// The MA-facing endpoint. Always answers with a flat PASS/FAIL.
async fn validate(
    State(state): State<AppState>,
    Json(req): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>, StatusCode> {
    let validator = state.validator.as_ref().ok_or(StatusCode::NOT_FOUND)?;

    let fail = Json(ValidateResponse {
        result: "FAIL".to_string(),
    });
    let certificate = match BASE64.decode(&req.certificate) {
        Ok(bytes) => bytes,
        Err(_) => return Ok(fail),
    };
    let token_bytes = match BASE64.decode(&req.token) {
        Ok(bytes) => bytes,
        Err(_) => return Ok(fail),
    };
    let token = match EncryptedToken::from_bytes(&token_bytes) {
        Ok(token) => token,
        Err(_) => return Ok(fail),
    };

    let verdict = validator.validate(&certificate, &token, &req.authority_id);
    Ok(Json(ValidateResponse {
        result: if verdict.is_pass() { "PASS" } else { "FAIL" }.to_string(),
    }))
}

async fn verify(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<VerifyResponse>, PipelineError> {
    let image_hash = parse_image_hash(&hash)?;
    let v = state
        .registry
        .verify(&image_hash)
        .map_err(PipelineError::Registry)?;
    Ok(Json(VerifyResponse {
        verified: v.verified,
        modification_level: v.modification_level,
        timestamp: v.timestamp,
        provenance_chain: v.provenance_chain.iter().map(RecordView::from_record).collect(),
    }))
}

async fn provenance(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<ProvenanceResponse>, PipelineError> {
    let image_hash = parse_image_hash(&hash)?;
    let chain = state
        .registry
        .trace_provenance(&image_hash)
        .map_err(PipelineError::Registry)?;
    Ok(Json(ProvenanceResponse {
        chain: chain.iter().map(RecordView::from_record).collect(),
    }))
}

async fn metrics_handler() -> String {
    telemetry::get_metrics()
}
