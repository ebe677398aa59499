//! birthmark-registry: append-only store of validated image hashes with
//! tamper-evident provenance chains.

pub mod authority;
pub mod error;
pub mod fixtures;
pub mod log;
pub mod record;
pub mod registry;

pub use error::{RegistryError, Result};
pub use record::{ImageHash, ImageRecord, NewRecord, SubmissionType};
pub use registry::{HashRegistry, Verification};
