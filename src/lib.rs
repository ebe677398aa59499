//! birthmark: camera-authentication protocol core.
//!
//! Proves that an image hash came from a legitimate camera or approved
//! software without the authenticating party seeing the image, and without
//! any single party being able to track a device across submissions.

pub mod certificate;
pub mod error;
pub mod kdf;
pub mod keytable;
pub mod provision;
pub mod token;
pub mod types;
pub mod validator;

pub use error::{CoreError, Result};
pub use validator::{FailReason, Validator, Verdict};
