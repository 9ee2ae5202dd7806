use std::io;
use thiserror::Error;

/// One taxonomy for every failure the engine can surface. Errors are fatal
/// to the operation, never to the engine; the instance stays usable.
#[derive(Error, Debug)]
pub enum VarkError {
    #[error("operation not permitted in this mode: {0}")]
    ModeViolation(&'static str),
    #[error("no such member: {0}")]
    NotFound(String),
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
    #[error("range out of bounds: offset {offset} + length {length} > {size}")]
    OutOfRange { offset: u64, length: u64, size: u64 },
    #[error("corrupt archive: {0}")]
    Corrupt(&'static str),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, VarkError>;
