//! LZX error types

use thiserror::Error;

/// LZX codec error
#[derive(Debug, Error)]
pub enum LzxError {
    /// Window size is not a supported power of two
    #[error("invalid LZX window size: {0:#x}")]
    InvalidWindowSize(u32),

    /// Destination larger than the codec can address
    #[error("destination too large: {0} bytes")]
    DestinationTooLarge(usize),

    /// Seed dictionary larger than the window
    #[error("seed of {seed} bytes does not fit a {window} byte window")]
    SeedTooLarge {
        /// Seed length
        seed: usize,
        /// Window size
        window: usize,
    },

    /// Compressed input ended early
    #[error("compressed stream truncated")]
    InputOverrun,

    /// Unknown block type
    #[error("invalid block type: {0}")]
    InvalidBlockType(u32),

    /// Huffman code lengths do not form a usable code
    #[error("invalid {tree} tree: {reason}")]
    InvalidTable {
        /// Which tree
        tree: &'static str,
        /// What was wrong
        reason: &'static str,
    },

    /// Bit pattern does not decode to a symbol
    #[error("invalid Huffman symbol")]
    InvalidSymbol,

    /// Match references data before the start of the window
    #[error("match offset {offset} out of range at position {position}")]
    MatchOffsetOutOfRange {
        /// Match offset
        offset: u32,
        /// Bytes decoded so far
        position: u64,
    },

    /// A match ran past the end of its block or frame
    #[error("match overruns block or frame boundary")]
    FrameOverrun,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for LZX operations
pub type LzxResult<T> = Result<T, LzxError>;
