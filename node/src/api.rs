//! HTTP request/response types. Binary fields travel base64-encoded;
//! image hashes travel as 64-char hex.

use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize)]
pub struct SubmitRequest {
    /// SHA-256 of the image, hex.
    pub image_hash: String,
    /// Certificate blob, base64.
    pub certificate: String,
    /// Token wire bytes, base64.
    pub token: String,
    #[serde(default)]
    pub modification_level: u8,
    /// Hex hash of the parent record for edited images.
    #[serde(default)]
    pub parent_image_hash: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct SubmitResponse {
    pub result: String,
    pub sequence_number: u32,
    pub timestamp: u32,
}

#[derive(Deserialize, Serialize)]
pub struct ValidateRequest {
    pub certificate: String,
    pub token: String,
    pub authority_id: String,
}

/// PASS or FAIL only; nothing else crosses the trust boundary.
#[derive(Serialize, Deserialize)]
pub struct ValidateResponse {
    pub result: String,
}

#[derive(Serialize, Deserialize)]
pub struct RecordView {
    pub image_hash: String,
    pub submission_type: String,
    pub modification_level: u8,
    pub parent_image_hash: Option<String>,
    pub timestamp: u32,
    pub sequence_number: u32,
}

#[derive(Serialize, Deserialize)]
pub struct VerifyResponse {
    pub verified: bool,
    pub modification_level: u8,
    pub timestamp: u32,
    pub provenance_chain: Vec<RecordView>,
}

#[derive(Serialize, Deserialize)]
pub struct ProvenanceResponse {
    pub chain: Vec<RecordView>,
}

impl RecordView {
    pub fn from_record(record: &birthmark_registry::ImageRecord) -> Self {
        Self {
            image_hash: hex::encode(record.image_hash),
            submission_type: match record.submission_type {
                birthmark_registry::SubmissionType::Camera => "camera".to_string(),
                birthmark_registry::SubmissionType::Software => "software".to_string(),
            },
            modification_level: record.modification_level,
            parent_image_hash: record.parent_image_hash.map(hex::encode),
            timestamp: record.timestamp,
            sequence_number: record.sequence_number,
        }
    }
}
