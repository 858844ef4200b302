//! Pick a parser from the first bytes of a file

use std::io::{Read, Seek};

use tracing::debug;

use crate::error::{FormatError, Result};
use crate::options::ParseOptions;
use crate::ps1_save::Ps1Save;
use crate::stfs::Stfs;
use crate::subfile::{read_at, stream_len};
use crate::xbe::Xbe;
use crate::xdbf::Xdbf;
use crate::xex::Xex;
use crate::RomData;

/// Bytes read from the start of the file for detection
pub const DETECT_HEADER_SIZE: usize = 4096;

/// Format recognised by [`detect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedFormat {
    /// Xbox 360 STFS package
    Stfs,
    /// Xbox 360 executable
    Xex,
    /// Xbox 360 XDBF resource
    Xdbf,
    /// Original Xbox executable
    Xbe,
    /// PlayStation save
    Ps1Save,
}

/// Identify a format from the start of a file and its total size
pub fn detect(header: &[u8], file_size: u64) -> Option<DetectedFormat> {
    if Stfs::<std::fs::File>::is_supported(header).is_some() {
        Some(DetectedFormat::Stfs)
    } else if Xex::<std::fs::File>::is_supported(header).is_some() {
        Some(DetectedFormat::Xex)
    } else if Xdbf::<std::fs::File>::is_supported(header).is_some() {
        Some(DetectedFormat::Xdbf)
    } else if Xbe::<std::fs::File>::is_supported(header) {
        Some(DetectedFormat::Xbe)
    } else if Ps1Save::<std::fs::File>::is_supported(header, file_size).is_some() {
        Some(DetectedFormat::Ps1Save)
    } else {
        None
    }
}

/// Detect the format of `reader` and open it with the matching parser
///
/// # Errors
///
/// Returns [`FormatError::Unsupported`] when no parser recognises the file,
/// or the parser's own error when it does but the file is malformed.
pub fn detect_and_open<R>(mut reader: R, options: &ParseOptions) -> Result<Box<dyn RomData>>
where
    R: Read + Seek + 'static,
{
    let file_size = stream_len(&mut reader)?;
    let mut header = vec![0u8; DETECT_HEADER_SIZE];
    let got = read_at(&mut reader, 0, &mut header)?;
    header.truncate(got);

    let format = detect(&header, file_size).ok_or(FormatError::Unsupported)?;
    debug!("Detected {format:?} ({file_size} bytes)");

    let options = options.clone();
    Ok(match format {
        DetectedFormat::Stfs => Box::new(Stfs::open(reader, options)?),
        DetectedFormat::Xex => Box::new(Xex::open(reader, options)?),
        DetectedFormat::Xdbf => Box::new(Xdbf::open(reader, options)?),
        DetectedFormat::Xbe => Box::new(Xbe::open(reader, options)?),
        DetectedFormat::Ps1Save => Box::new(Ps1Save::open(reader, options)?),
    })
}
