//! Error types for XBE executable operations

use thiserror::Error;

use crate::pe::PeError;

/// Errors that can occur when reading or building XBE executables
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum XbeError {
    #[error("Invalid magic: expected 'XBEH', got {0:?}")]
    InvalidMagic([u8; 4]),

    #[error("Short read at 0x{offset:X}: wanted {wanted} bytes, got {got}")]
    Truncated { offset: u64, wanted: usize, got: usize },

    #[error("{what} address 0x{address:08X} is out of range")]
    OutOfRange { what: &'static str, address: u32 },

    #[error("Title image of {0} bytes exceeds the 1 MiB limit")]
    ImageTooLarge(u32),

    #[error("Executable is closed")]
    Closed,

    #[error("PE error: {0}")]
    Pe(#[from] PeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

/// Result type for XBE operations
pub type XbeResult<T> = Result<T, XbeError>;
