//! Error types for XEX executable operations

use thiserror::Error;

use crate::lzx::LzxError;
use crate::pe::PeError;
use crate::xdbf::XdbfError;

/// Errors that can occur when reading or building XEX executables
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum XexError {
    #[error("Invalid magic: expected 'XEX1' or 'XEX2', got {0:?}")]
    InvalidMagic([u8; 4]),

    #[error("Short read at 0x{offset:X}: wanted {wanted} bytes, got {got}")]
    Truncated { offset: u64, wanted: usize, got: usize },

    #[error("Optional header table with {0} entries does not fit in the header")]
    OptionalHeaderTable(u32),

    #[error("Resource size {0} exceeds the 2 MiB limit")]
    ResourceTooLarge(u32),

    #[error("File format info is missing or too small")]
    MissingFileFormatInfo,

    #[error("Compressed block size {0} is invalid")]
    InvalidBlock(u32),

    #[error("De-blocked data does not fit in {0} bytes")]
    DeblockOverflow(usize),

    #[error("Image of {0} bytes is outside the supported range")]
    ImageSize(u64),

    #[error("No candidate key produced a valid MZ image")]
    NotAnExecutable,

    #[error("Executable is closed")]
    Closed,

    #[error("LZX error: {0}")]
    Lzx(#[from] LzxError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] romprops_crypto::CryptoError),

    #[error("PE error: {0}")]
    Pe(#[from] PeError),

    #[error("XDBF error: {0}")]
    Xdbf(#[from] XdbfError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

/// Result type for XEX operations
pub type XexResult<T> = Result<T, XexError>;
