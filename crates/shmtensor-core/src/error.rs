//! Error types for shmtensor

use thiserror::Error;

use crate::tensor::MemLayout;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to create shared memory segment {name}: {reason}")]
    MemCreate { name: String, reason: String },

    #[error("segment {name} has {actual} bytes, need {expected}")]
    MemSet {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("failed to map shared memory segment {name}: {reason}")]
    MemMap { name: String, reason: String },

    #[error("failed to open shared memory segment {name}: {reason}")]
    MemOpen { name: String, reason: String },

    #[error("failed to acquire semaphore {name}")]
    SemAcquire { name: String },

    #[error("failed to release semaphore {name}: {reason}")]
    SemRelease { name: String, reason: String },

    #[error("failed to open semaphore {name}: {reason}")]
    SemOpen { name: String, reason: String },

    #[error("shape mismatch: local ({local_rows}, {local_cols}), published ({published_rows}, {published_cols})")]
    SizeMismatch {
        local_rows: usize,
        local_cols: usize,
        published_rows: usize,
        published_cols: usize,
    },

    #[error("element size mismatch: local element is {local} bytes, server published {published}")]
    DTypeMismatch { local: usize, published: i32 },

    #[error("memory layout mismatch: local {local:?}, server published code {published}")]
    LayoutMismatch { local: MemLayout, published: i32 },

    #[error("{side} {name} is not running")]
    NotRunning { side: &'static str, name: String },

    #[error("condition variable {name}: {reason}")]
    CondVar { name: String, reason: String },

    #[error("trigger counter advanced by {delta}; a trigger was missed or the counter was corrupted")]
    TriggerDeltaInvalid { delta: i64 },
}

pub type Result<T> = std::result::Result<T, Error>;
