//! Shared protocol types and deployment constants.

use std::time::{SystemTime, UNIX_EPOCH};

/// Number of key tables a device is assigned at provisioning. Three tables
/// keep any single table's population large enough that a submission does
/// not identify the device.
pub const TABLES_PER_DEVICE: usize = 3;

/// Keys derivable from one table's master key.
pub const KEYS_PER_TABLE: u16 = 1000;

/// Pilot-scale master table count.
pub const TABLE_COUNT_PILOT: u16 = 10;

/// Target-scale master table count.
pub const TABLE_COUNT_TARGET: u16 = 2500;

/// SHA-256 digest of a hardware- or software-derived secret. This is the
/// value registered at provisioning and the plaintext carried inside an
/// encrypted token; the underlying secret never leaves the device.
pub type Fingerprint = [u8; 32];

/// What kind of subject a certificate vouches for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectKind {
    Camera,
    Software,
}

impl SubjectKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(SubjectKind::Camera),
            2 => Some(SubjectKind::Software),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            SubjectKind::Camera => 1,
            SubjectKind::Software => 2,
        }
    }
}

/// A device's provisioning-time registration. Immutable after creation
/// except for the revocation flag.
#[derive(Debug, Clone)]
pub struct DeviceRegistration {
    pub device_serial: String,
    pub fingerprint_hash: Fingerprint,
    pub table_assignment: [u16; TABLES_PER_DEVICE],
    pub device_certificate: Vec<u8>,
    pub device_family: String,
    pub revoked: bool,
}

/// Seconds since the Unix epoch, compact-encoded as u32 everywhere in the
/// protocol (wire formats, certificates, registry records).
pub fn unix_time() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
