//! Parsers and builders for Xbox, Xbox 360 and PlayStation file formats
//!
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_possible_wrap)] // Intentional for binary operations
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::uninlined_format_args)] // Backwards compatibility
#![allow(clippy::doc_markdown)] // Many console-specific terms don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::similar_names)] // Domain-specific naming patterns
#![allow(clippy::needless_pass_by_value)] // Options are passed by value to open()
#![allow(clippy::redundant_clone)] // Binary format handling
#![allow(clippy::unused_self)] // Uniform accessor shape across formats
#![allow(clippy::map_unwrap_or)] // Binary format patterns
#![allow(clippy::derive_partial_eq_without_eq)] // Binary format structs
#![allow(clippy::redundant_closure_for_method_calls)] // Iterator chains
#![allow(clippy::unnecessary_wraps)] // Uniform parser signatures
#![allow(clippy::return_self_not_must_use)] // Builder patterns
#![allow(clippy::use_self)] // Type clarity
#![allow(clippy::clone_on_copy)] // Binary format handling
//! This crate reads the container, executable and save formats of the
//! original Xbox, the Xbox 360 and the PlayStation, and reports their
//! properties as a list of display fields plus an icon. Each format also has
//! a builder that authors valid files, used by the test suite.
//!
//! # Supported Formats
//!
//! - **STFS**: Xbox 360 `CON `/`PIRS`/`LIVE` packages, with the nested
//!   `default.xex` of application packages
//! - **XEX**: Xbox 360 executables (XEX1 and XEX2), including AES-CBC
//!   encrypted and LZX compressed images
//! - **XDBF**: Xbox 360 title resources (SPA) and profile data (GPD)
//! - **XBE**: original Xbox executables
//! - **PS1 save**: PlayStation memory card saves in PSV, block, 54-byte and
//!   raw layouts
//! - **LZX**: the compression codec used by XEX images
//!
//! # Design Principles
//!
//! - **Lazy loading**: headers are read on open, everything else on first use
//!   and cached per container
//! - **Bounded reads**: every size and count read from a file is checked
//!   before it is used to allocate or seek
//! - **Symmetric formats**: every parser has a builder, and
//!   parse(build(x)) reproduces x
//!
//! # Examples
//!
//! ```no_run
//! use romprops_formats::{ParseOptions, detect_and_open};
//!
//! let file = std::fs::File::open("default.xex")?;
//! let mut rom = detect_and_open(file, &ParseOptions::default())?;
//! println!("{}", rom.fields()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]

/// Lookup table of Xbox 360 content types
pub mod content_types;
/// Format detection
pub mod detect;
/// Crate-level error type
pub mod error;
/// Display field records
pub mod fields;
/// Icon images and animations
pub mod image;
/// Xbox 360 display languages
pub mod language;
/// LZX compression codec
pub mod lzx;
/// Options shared by every parser
pub mod options;
/// Minimal PE header reader
pub mod pe;
/// PlayStation memory card saves
pub mod ps1_save;
/// Lookup table of publisher codes
pub mod publishers;
/// Xbox 360 STFS packages
pub mod stfs;
/// Sub-range and shared file views
pub mod subfile;
/// Text decoding helpers
pub mod text;
/// Title IDs and version numbers
pub mod title;
/// Original Xbox executables
pub mod xbe;
/// Xbox 360 title and profile resources
pub mod xdbf;
/// Xbox 360 executables
pub mod xex;

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
pub(crate) mod test_utils;

pub use detect::{DETECT_HEADER_SIZE, detect_and_open};
pub use error::{FormatError, Result};
pub use fields::{Field, FieldFlags, FieldValue, RomFields};
pub use image::{AnimationDelay, IconAnimation, Image};
pub use language::Language;
pub use options::ParseOptions;
pub use title::{TitleId, Version};

/// Which form of a system name to return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemNameKind {
    /// e.g. "Microsoft Xbox 360"
    Long,
    /// e.g. "Xbox 360"
    Short,
    /// e.g. "X360"
    Abbreviation,
}

/// Broad category of a parsed file
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum FileType {
    /// Program image
    Executable,
    /// Patch applied to an executable
    PatchFile,
    /// Installable package
    ApplicationPackage,
    /// Saved game
    SaveFile,
    /// Resource data used by a title
    ResourceFile,
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Executable => "Executable",
            Self::PatchFile => "Patch File",
            Self::ApplicationPackage => "Application Package",
            Self::SaveFile => "Save File",
            Self::ResourceFile => "Resource File",
        })
    }
}

/// A parsed file that can report its properties
///
/// Field and image loading is lazy: the first call reads what it needs from
/// the file and later calls return the cached result. Once
/// [`close`](RomData::close) has been called, anything not already loaded
/// fails with [`FormatError::Closed`].
pub trait RomData {
    /// Name of the system the file belongs to
    fn system_name(&self, kind: SystemNameKind) -> &'static str;

    /// Broad category of the file
    fn file_type(&self) -> FileType;

    /// Display fields
    fn fields(&mut self) -> Result<&RomFields>;

    /// Icon, if the file has one
    fn icon(&mut self) -> Result<Option<Image>>;

    /// All icon frames with timing, for formats with animated icons
    fn icon_animation(&mut self) -> Result<Option<IconAnimation>> {
        Ok(None)
    }

    /// Whether the backing file is still open
    fn is_open(&self) -> bool;

    /// Release the backing file and any nested parsers
    fn close(&mut self);
}

/// Common trait for fixed records that can be parsed and built
///
/// Implemented by the file headers of each format; `parse` applies the same
/// validation the container's `open` does.
pub trait BinaryFormat: Sized {
    /// Parse from bytes
    fn parse(data: &[u8]) -> std::result::Result<Self, Box<dyn std::error::Error>>;

    /// Build to bytes
    fn build(&self) -> std::result::Result<Vec<u8>, Box<dyn std::error::Error>>;

    /// Verify round-trip correctness
    fn verify_round_trip(data: &[u8]) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let parsed = Self::parse(data)?;
        let rebuilt = parsed.build()?;
        if data != rebuilt.as_slice() {
            return Err("Round-trip verification failed".into());
        }
        Ok(())
    }
}

/// Serialize a fixed binrw record
pub(crate) fn write_record<T>(value: &T) -> binrw::BinResult<Vec<u8>>
where
    T: for<'a> binrw::BinWrite<Args<'a> = ()> + binrw::meta::WriteEndian,
{
    let mut cursor = std::io::Cursor::new(Vec::new());
    value.write(&mut cursor)?;
    Ok(cursor.into_inner())
}
