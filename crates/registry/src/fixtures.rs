//! Test corpus helpers.

use crate::record::{ImageHash, NewRecord, SubmissionType};

/// Deterministic 32-byte hash for tests; `n` tags which image it stands for.
pub fn hash(n: u8) -> ImageHash {
    let mut h = [0u8; 32];
    h[0] = n;
    h[31] = n ^ 0xFF;
    h
}

pub fn new_record(n: u8, modification_level: u8, parent: Option<ImageHash>) -> NewRecord {
    NewRecord {
        image_hash: hash(n),
        submission_type: if modification_level == 0 {
            SubmissionType::Camera
        } else {
            SubmissionType::Software
        },
        modification_level,
        parent_image_hash: parent,
    }
}
