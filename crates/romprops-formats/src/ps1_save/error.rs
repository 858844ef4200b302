//! Error types for PlayStation save operations

use thiserror::Error;

/// Errors that can occur when reading or building PlayStation saves
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum Ps1SaveError {
    #[error("Save header is truncated: wanted {wanted} bytes, got {got}")]
    Truncated { wanted: usize, got: usize },

    #[error("Not a recognised PlayStation save layout")]
    UnknownFormat,

    #[error("Save file is closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

/// Result type for PlayStation save operations
pub type Ps1SaveResult<T> = Result<T, Ps1SaveError>;
