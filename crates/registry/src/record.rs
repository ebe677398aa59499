//! Image records and their durable encoding.

use crate::error::{RegistryError, Result};
use byteorder::{ByteOrder, LittleEndian};

pub const IMAGE_HASH_LEN: usize = 32;

/// SHA-256 of the image content. The registry's primary key.
pub type ImageHash = [u8; IMAGE_HASH_LEN];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionType {
    Camera,
    Software,
}

impl SubmissionType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(SubmissionType::Camera),
            2 => Some(SubmissionType::Software),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            SubmissionType::Camera => 1,
            SubmissionType::Software => 2,
        }
    }
}

/// Caller-supplied portion of a record. Timestamp and sequence number are
/// assigned by the registry at append time. Carries no authority or device
/// identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub image_hash: ImageHash,
    pub submission_type: SubmissionType,
    /// 0 = raw capture, 1 = minor edit, 2 = heavy edit.
    pub modification_level: u8,
    pub parent_image_hash: Option<ImageHash>,
}

/// The unit stored in the registry. Immutable once written; a new
/// modification level means a new record pointing at this one, never an
/// in-place change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub image_hash: ImageHash,
    pub submission_type: SubmissionType,
    pub modification_level: u8,
    pub parent_image_hash: Option<ImageHash>,
    /// Server processing time, unix seconds.
    pub timestamp: u32,
    pub sequence_number: u32,
}

impl ImageRecord {
    /// hash 32 | type u8 | level u8 | parent flag u8 | [parent 32] |
    /// timestamp u32 LE | seq u32 LE
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32 + 3 + 32 + 8);
        buf.extend_from_slice(&self.image_hash);
        buf.push(self.submission_type.as_u8());
        buf.push(self.modification_level);
        match &self.parent_image_hash {
            Some(parent) => {
                buf.push(1);
                buf.extend_from_slice(parent);
            }
            None => buf.push(0),
        }
        let mut tail = [0u8; 8];
        LittleEndian::write_u32(&mut tail[0..4], self.timestamp);
        LittleEndian::write_u32(&mut tail[4..8], self.sequence_number);
        buf.extend_from_slice(&tail);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        // Minimum: no parent hash present.
        if data.len() < 32 + 3 + 8 {
            return Err(RegistryError::InvalidFormat(format!(
                "record too short: {} bytes",
                data.len()
            )));
        }
        let mut image_hash = [0u8; IMAGE_HASH_LEN];
        image_hash.copy_from_slice(&data[0..32]);
        let submission_type = SubmissionType::from_u8(data[32]).ok_or_else(|| {
            RegistryError::InvalidFormat(format!("unknown submission type {}", data[32]))
        })?;
        let modification_level = data[33];

        let (parent_image_hash, tail_start) = match data[34] {
            0 => (None, 35),
            1 => {
                if data.len() < 35 + 32 + 8 {
                    return Err(RegistryError::InvalidFormat(
                        "record truncated at parent hash".to_string(),
                    ));
                }
                let mut parent = [0u8; IMAGE_HASH_LEN];
                parent.copy_from_slice(&data[35..67]);
                (Some(parent), 67)
            }
            other => {
                return Err(RegistryError::InvalidFormat(format!(
                    "bad parent flag {other}"
                )))
            }
        };

        if data.len() != tail_start + 8 {
            return Err(RegistryError::InvalidFormat(format!(
                "record length {} does not match layout",
                data.len()
            )));
        }
        Ok(Self {
            image_hash,
            submission_type,
            modification_level,
            parent_image_hash,
            timestamp: LittleEndian::read_u32(&data[tail_start..tail_start + 4]),
            sequence_number: LittleEndian::read_u32(&data[tail_start + 4..tail_start + 8]),
        })
    }
}
