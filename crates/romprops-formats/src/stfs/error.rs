//! Error types for STFS package operations

use thiserror::Error;

/// Errors that can occur when reading STFS packages
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum StfsError {
    #[error("Invalid magic: expected 'CON ', 'PIRS' or 'LIVE', got {0:?}")]
    InvalidMagic([u8; 4]),

    #[error("Console-signed package has invalid console type {0}")]
    InvalidConsoleType(u8),

    #[error("Console-signed package has malformed datestamp")]
    InvalidDatestamp,

    #[error("Microsoft-signed package has non-zero padding")]
    NonZeroPadding,

    #[error("Unknown volume descriptor type {0}")]
    InvalidDescriptorType(u32),

    #[error("Package uses an SVOD volume; no file table")]
    NotStfsVolume,

    #[error("Block number {0} is out of range")]
    BlockOutOfRange(u32),

    #[error("File table block count {0} is invalid")]
    InvalidFileTable(i32),

    #[error("Short read at 0x{offset:X}: wanted {wanted} bytes, got {got}")]
    ShortRead { offset: u64, wanted: usize, got: usize },

    #[error("Package is closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

/// Result type for STFS operations
pub type StfsResult<T> = Result<T, StfsError>;
