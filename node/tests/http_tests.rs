use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use birthmark::certificate::TrustedRoots;
use birthmark::keytable::KeyTableStore;
use birthmark::provision;
use birthmark::types::DeviceRegistration;
use birthmark::Validator;
use birthmark_node::api::{ProvenanceResponse, SubmitResponse, ValidateResponse, VerifyResponse};
use birthmark_node::pipeline::Pipeline;
use birthmark_node::server::{build_router, AppState};
use birthmark_node::validator_backend::ValidatorBackend;
use birthmark_registry::HashRegistry;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tower::ServiceExt; // for oneshot

struct TestNode {
    router: axum::Router,
    cert_b64: String,
    token_b64: String,
}

fn test_node(dir: &std::path::Path, auth_token: Option<String>) -> TestNode {
    let store = Arc::new(KeyTableStore::generate(10));
    let issuer = SigningKey::generate(&mut OsRng);
    let mut roots = TrustedRoots::new();
    roots.add("MFG-01", issuer.verifying_key());

    let serial = "CAM-100";
    let fingerprint = provision::generate_fingerprint_hash(serial.as_bytes());
    let assignment = store.assign_tables(serial).unwrap();
    let cert = provision::camera_certificate(
        serial,
        "MFG-01",
        "http://127.0.0.1:3000",
        (0, u32::MAX),
        &issuer,
    );
    store
        .register_device(DeviceRegistration {
            device_serial: serial.to_string(),
            fingerprint_hash: fingerprint,
            table_assignment: assignment,
            device_certificate: cert.clone(),
            device_family: "pilot".to_string(),
            revoked: false,
        })
        .unwrap();
    let master = store.get_master_key(assignment[0]).unwrap();
    let token = provision::build_token(&fingerprint, &master, assignment[0], 3).unwrap();

    let registry = Arc::new(HashRegistry::open(dir).unwrap());
    let validator = Arc::new(Validator::new(store, roots));
    let pipeline = Arc::new(Pipeline::new(
        ValidatorBackend::local(validator.clone()),
        registry.clone(),
        2,
        Duration::from_millis(5),
    ));

    let router = build_router(
        AppState {
            pipeline,
            registry,
            validator: Some(validator),
        },
        auth_token,
    );
    TestNode {
        router,
        cert_b64: BASE64.encode(&cert),
        token_b64: BASE64.encode(token.to_bytes()),
    }
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

const HASH_A: &str = "0101010101010101010101010101010101010101010101010101010101010101";
const HASH_B: &str = "0202020202020202020202020202020202020202020202020202020202020202";

#[tokio::test]
async fn submit_then_verify() {
    let dir = tempdir().unwrap();
    let node = test_node(dir.path(), None);

    let req = post_json(
        "/v1/submit",
        json!({
            "image_hash": HASH_A,
            "certificate": node.cert_b64,
            "token": node.token_b64,
        }),
    );
    let response = node.router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
    let resp: SubmitResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(resp.result, "PASS");
    assert_eq!(resp.sequence_number, 0);

    let req = Request::builder()
        .uri(format!("/v1/verify/{HASH_A}"))
        .body(Body::empty())
        .unwrap();
    let response = node.router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
    let resp: VerifyResponse = serde_json::from_slice(&body).unwrap();
    assert!(resp.verified);
    assert_eq!(resp.modification_level, 0);
    assert_eq!(resp.provenance_chain.len(), 1);
    assert_eq!(resp.provenance_chain[0].image_hash, HASH_A);
}

#[tokio::test]
async fn submit_with_bad_token_is_flat_fail() {
    let dir = tempdir().unwrap();
    let node = test_node(dir.path(), None);

    let req = post_json(
        "/v1/submit",
        json!({
            "image_hash": HASH_A,
            "certificate": node.cert_b64,
            "token": BASE64.encode([0u8; 64]),
        }),
    );
    let response = node.router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
    let resp: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(resp, json!({ "result": "FAIL" }));
}

#[tokio::test]
async fn submit_rejects_malformed_hash() {
    let dir = tempdir().unwrap();
    let node = test_node(dir.path(), None);

    let req = post_json(
        "/v1/submit",
        json!({
            "image_hash": "not-hex",
            "certificate": node.cert_b64,
            "token": node.token_b64,
        }),
    );
    let response = node.router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn validate_endpoint_is_flat() {
    let dir = tempdir().unwrap();
    let node = test_node(dir.path(), None);

    let req = post_json(
        "/v1/validate",
        json!({
            "certificate": node.cert_b64,
            "token": node.token_b64,
            "authority_id": "MFG-01",
        }),
    );
    let response = node.router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    let resp: ValidateResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(resp.result, "PASS");

    // Undecodable input is still a 200 with a flat FAIL, not a parse error.
    let req = post_json(
        "/v1/validate",
        json!({
            "certificate": "%%not-base64%%",
            "token": node.token_b64,
            "authority_id": "MFG-01",
        }),
    );
    let response = node.router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    let resp: ValidateResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(resp.result, "FAIL");
}

#[tokio::test]
async fn verify_unknown_hash_is_unverified() {
    let dir = tempdir().unwrap();
    let node = test_node(dir.path(), None);

    let req = Request::builder()
        .uri(format!("/v1/verify/{HASH_B}"))
        .body(Body::empty())
        .unwrap();
    let response = node.router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    let resp: VerifyResponse = serde_json::from_slice(&body).unwrap();
    assert!(!resp.verified);
    assert!(resp.provenance_chain.is_empty());
}

#[tokio::test]
async fn provenance_of_unknown_hash_is_404() {
    let dir = tempdir().unwrap();
    let node = test_node(dir.path(), None);

    let req = Request::builder()
        .uri(format!("/v1/provenance/{HASH_B}"))
        .body(Body::empty())
        .unwrap();
    let response = node.router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn provenance_of_recorded_hash() {
    let dir = tempdir().unwrap();
    let node = test_node(dir.path(), None);

    let req = post_json(
        "/v1/submit",
        json!({
            "image_hash": HASH_A,
            "certificate": node.cert_b64,
            "token": node.token_b64,
        }),
    );
    let response = node.router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let req = Request::builder()
        .uri(format!("/v1/provenance/{HASH_A}"))
        .body(Body::empty())
        .unwrap();
    let response = node.router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
    let resp: ProvenanceResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(resp.chain.len(), 1);
    assert_eq!(resp.chain[0].submission_type, "camera");
}

#[tokio::test]
async fn auth_guard_rejects_missing_token() {
    let dir = tempdir().unwrap();
    let node = test_node(dir.path(), Some("sekrit".to_string()));

    let req = Request::builder()
        .uri(format!("/v1/verify/{HASH_A}"))
        .body(Body::empty())
        .unwrap();
    let response = node.router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .uri(format!("/v1/verify/{HASH_A}"))
        .header("Authorization", "Bearer sekrit")
        .body(Body::empty())
        .unwrap();
    let response = node.router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_guard_rejects_wrong_token() {
    let dir = tempdir().unwrap();
    let node = test_node(dir.path(), Some("sekrit".to_string()));

    // Wrong value, and a prefix of the right value; both 401.
    for bad in ["Bearer wrong-token", "Bearer sekri"] {
        let req = Request::builder()
            .uri(format!("/v1/verify/{HASH_A}"))
            .header("Authorization", bad)
            .body(Body::empty())
            .unwrap();
        let response = node.router.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{bad}");
    }
}
