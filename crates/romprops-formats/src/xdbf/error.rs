//! Error types for XDBF resource file operations

use thiserror::Error;

/// Errors that can occur when reading or building XDBF files
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum XdbfError {
    #[error("Invalid magic: expected 'XDBF', got 0x{0:08X}")]
    InvalidMagic(u32),

    #[error("Unsupported version: 0x{0:08X}")]
    UnsupportedVersion(u32),

    #[error("Entry table length {0} exceeds the 1048576 entry limit")]
    TooManyEntries(u32),

    #[error("Short read at 0x{offset:X}: wanted {wanted} bytes, got {got}")]
    Truncated { offset: u64, wanted: usize, got: usize },

    #[error("{table} resource size {size} is out of range")]
    InvalidSize { table: &'static str, size: u32 },

    #[error("{0} resource has an invalid header")]
    InvalidTable(&'static str),

    #[error("Resource file is closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

/// Result type for XDBF operations
pub type XdbfResult<T> = Result<T, XdbfError>;
