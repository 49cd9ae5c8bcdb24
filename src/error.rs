//! Error types for the bake pipeline.
//!
//! Every fallible entry point returns [`BakeResult`]. Configuration problems are
//! reported before any state is mutated, so a failed `begin_bake` always leaves
//! the scheduler in `Waiting`.

use thiserror::Error;

/// Result type used throughout the crate.
pub type BakeResult<T> = Result<T, BakeError>;

/// Errors produced by the bake pipeline.
#[derive(Debug, Error)]
pub enum BakeError {
    #[error("invalid bake settings: {0}")]
    InvalidSettings(String),

    #[error("invalid bake input: {0}")]
    InvalidInput(String),

    #[error("no compatible GPU adapter found")]
    NoAdapter,

    #[error("failed to acquire GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("GPU readback failed: {0}")]
    Readback(String),

    #[error("volume asset format error: {0}")]
    AssetFormat(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
