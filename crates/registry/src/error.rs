use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid magic bytes in header")]
    InvalidMagic,
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),
    #[error("Image hash not recorded")]
    NotFound,
    #[error("Parent image hash not recorded")]
    UnknownParent,
    #[error("Modification level {child} below parent level {parent}")]
    MonotonicityViolation { parent: u8, child: u8 },
    #[error("Provenance traversal revisited a hash")]
    CycleDetected,
    #[error("Authority id space exhausted")]
    AuthoritySpaceExhausted,
}

pub type Result<T> = std::result::Result<T, RegistryError>;
