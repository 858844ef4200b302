//! Crate-level error type
//!
//! Each format module has its own error enum; [`FormatError`] wraps them so
//! that format-independent code (detection, the [`RomData`](crate::RomData)
//! trait) can use a single result type.

use thiserror::Error;

use crate::lzx::LzxError;
use crate::pe::PeError;
use crate::ps1_save::Ps1SaveError;
use crate::stfs::StfsError;
use crate::xbe::XbeError;
use crate::xdbf::XdbfError;
use crate::xex::XexError;

/// Error returned by format-independent operations
#[derive(Debug, Error)]
pub enum FormatError {
    /// No parser recognised the file
    #[error("unsupported file format")]
    Unsupported,

    /// The container was closed
    #[error("container is closed")]
    Closed,

    /// LZX codec error
    #[error(transparent)]
    Lzx(#[from] LzxError),

    /// PE header error
    #[error(transparent)]
    Pe(#[from] PeError),

    /// STFS error
    #[error(transparent)]
    Stfs(#[from] StfsError),

    /// XEX error
    #[error(transparent)]
    Xex(#[from] XexError),

    /// XDBF error
    #[error(transparent)]
    Xdbf(#[from] XdbfError),

    /// XBE error
    #[error(transparent)]
    Xbe(#[from] XbeError),

    /// PlayStation save error
    #[error(transparent)]
    Ps1Save(#[from] Ps1SaveError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for format-independent operations
pub type Result<T> = std::result::Result<T, FormatError>;
