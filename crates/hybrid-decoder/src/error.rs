use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort session startup. Nothing is left acquired when one of these is returned.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("failed to load backend library {path}: {reason}")]
    LibraryLoad { path: PathBuf, reason: String },
    #[error("backend library is missing capability `{0}`")]
    MissingCapability(&'static str),
    #[error("backend refused to open a session")]
    OpenRejected,
    #[error("backend refused to bind the output pool")]
    InitRejected,
    #[error("padded frame {width}x{height} with border {border} does not fit the output layout")]
    InvalidGeometry { width: u32, height: u32, border: u32 },
    #[error("output pool is empty")]
    EmptyPool,
    #[error("output pool has {count} buffers, negotiated maximum is {max}")]
    PoolTooLarge { count: usize, max: usize },
    #[error("output buffer {index} holds {capacity} bytes, frames need {required}")]
    BufferTooSmall {
        index: usize,
        capacity: usize,
        required: usize,
    },
    #[error("output buffer {0} has no backing memory")]
    NullBuffer(usize),
}

/// Errors returned from a single exchange with the backend.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid buffer: {0}")]
    InvalidBuffer(&'static str),
    #[error("backend rejected the decode submission")]
    BackendRejected,
    #[error("backend reported slot {slot} outside the registered range 0..{count}")]
    BackendContractViolation { slot: i32, count: usize },
    #[error("session faulted after a backend contract violation and must be torn down")]
    Faulted,
}

impl DecodeError {
    /// Whether the session must be torn down after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DecodeError::BackendContractViolation { .. } | DecodeError::Faulted
        )
    }
}

/// Failure reported by a backend entry point.
#[derive(Debug, Error)]
#[error("backend call `{call}` failed")]
pub struct BackendError {
    pub call: &'static str,
}

impl BackendError {
    pub fn new(call: &'static str) -> Self {
        BackendError { call }
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;
