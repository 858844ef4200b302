//! Xbox 360 STFS packages (`CON `, `PIRS`, `LIVE`)
//!
//! An STFS package is a small file system used for saves, downloadable
//! content and title updates. The fixed header is read on open; the
//! metadata, thumbnails, file table and the title's `default.xex` are
//! loaded the first time they are needed and cached until the package is
//! closed.
//!
//! # Examples
//!
//! ```no_run
//! use romprops_formats::{ParseOptions, RomData};
//! use romprops_formats::stfs::Stfs;
//!
//! let file = std::fs::File::open("package.bin")?;
//! let mut stfs = Stfs::open(file, ParseOptions::default())?;
//! println!("{}", stfs.fields()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod builder;
mod error;
pub mod file_table;
pub mod header;
pub mod metadata;

pub use builder::StfsBuilder;
pub use error::{StfsError, StfsResult};
pub use file_table::{DirEntry, block_to_offset, data_block_to_phys};
pub use header::{PackageHeader, StfsType};
pub use metadata::{PackageMetadata, PackageThumbnails, VolumeDescriptor};

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek};

use binrw::BinRead;
use tracing::debug;

use crate::error::{FormatError, Result};
use crate::fields::{FieldFlags, RomFields};
use crate::image::Image;
use crate::language::Language;
use crate::options::ParseOptions;
use crate::subfile::{SharedFile, SubFile, read_at};
use crate::text::trim_nul;
use crate::xex::Xex;
use crate::{FileType, RomData, SystemNameKind};

use file_table::{BLOCK_SIZE, DIR_ENTRY_SIZE};
use header::{CONSOLE_TYPE_DEBUG, CONSOLE_TYPE_RETAIL, PACKAGE_HEADER_SIZE};
use metadata::{METADATA_ADDRESS, METADATA_SIZE, THUMBNAILS_ADDRESS, THUMBNAILS_SIZE};

/// Nested executable type
pub type NestedXex<R> = Xex<SubFile<SharedFile<R>>>;

/// An open STFS package
pub struct Stfs<R> {
    file: Option<SharedFile<R>>,
    options: ParseOptions,
    header: PackageHeader,
    metadata: Option<PackageMetadata>,
    thumbnails: Option<PackageThumbnails>,
    file_table: Option<Vec<DirEntry>>,
    // None: not tried yet; Some(None): not present or failed to open
    xex: Option<Option<NestedXex<R>>>,
    fields: Option<RomFields>,
}

impl<R: Read + Seek> Stfs<R> {
    /// Open a package, reading and validating its header
    pub fn open(mut reader: R, options: ParseOptions) -> StfsResult<Self> {
        let mut buf = [0u8; PACKAGE_HEADER_SIZE];
        let got = read_at(&mut reader, 0, &mut buf)?;
        if got != buf.len() {
            return Err(StfsError::ShortRead {
                offset: 0,
                wanted: buf.len(),
                got,
            });
        }
        let header = PackageHeader::parse(&buf)?;
        debug!("STFS: {:?} package", header.stfs_type());

        Ok(Self {
            file: Some(SharedFile::new(reader)),
            options,
            header,
            metadata: None,
            thumbnails: None,
            file_table: None,
            xex: None,
            fields: None,
        })
    }

    /// Package type if `header` starts with a valid package header
    pub fn is_supported(header: &[u8]) -> Option<StfsType> {
        PackageHeader::detect(header)
    }

    /// Package header
    pub fn header(&self) -> &PackageHeader {
        &self.header
    }

    /// Signing variant
    pub fn stfs_type(&self) -> StfsType {
        self.header.stfs_type()
    }

    fn read_block(&mut self, offset: u64, size: usize) -> StfsResult<Vec<u8>> {
        let file = self.file.as_mut().ok_or(StfsError::Closed)?;
        let mut buf = vec![0u8; size];
        let got = read_at(file, offset, &mut buf)?;
        if got != size {
            return Err(StfsError::ShortRead {
                offset,
                wanted: size,
                got,
            });
        }
        Ok(buf)
    }

    /// Package metadata, loaded on first use
    pub fn metadata(&mut self) -> StfsResult<&PackageMetadata> {
        let metadata = match self.metadata.take() {
            Some(md) => md,
            None => {
                let buf = self.read_block(METADATA_ADDRESS, METADATA_SIZE)?;
                PackageMetadata::read(&mut Cursor::new(&buf))?
            }
        };
        Ok(self.metadata.insert(metadata))
    }

    /// Thumbnail block, loaded on first use
    pub fn thumbnails(&mut self) -> StfsResult<&PackageThumbnails> {
        let thumbnails = match self.thumbnails.take() {
            Some(t) => t,
            None => {
                let buf = self.read_block(THUMBNAILS_ADDRESS, THUMBNAILS_SIZE)?;
                PackageThumbnails::read(&mut Cursor::new(&buf))?
            }
        };
        Ok(self.thumbnails.insert(thumbnails))
    }

    fn data_block_offset(&mut self, block: u32) -> StfsResult<u64> {
        let stfs_type = self.stfs_type();
        let md = self.metadata()?;
        let separation = md
            .volume_descriptor
            .as_stfs()
            .map_or(0, |d| d.block_separation);
        let phys = data_block_to_phys(block, stfs_type, md.header_size, separation);
        block_to_offset(phys, md.header_size).ok_or(StfsError::BlockOutOfRange(phys))
    }

    fn load_file_table(&mut self) -> StfsResult<Vec<DirEntry>> {
        let md = self.metadata()?;
        let desc = md
            .volume_descriptor
            .as_stfs()
            .ok_or(StfsError::NotStfsVolume)?;
        let count = desc.file_table_block_count;
        let start = desc.file_table_block_number;
        if count < 0 || start.0[0] >= 0x80 {
            return Err(StfsError::InvalidFileTable(i32::from(count)));
        }

        let offset = self.data_block_offset(start.get())?;
        let mut size = usize::try_from(count).unwrap_or(0) * BLOCK_SIZE as usize;
        if size % DIR_ENTRY_SIZE != 0 {
            size += DIR_ENTRY_SIZE - size % DIR_ENTRY_SIZE;
        }
        let buf = self.read_block(offset, size)?;

        let mut entries = Vec::new();
        let mut cursor = Cursor::new(&buf);
        for _ in 0..size / DIR_ENTRY_SIZE {
            let entry = DirEntry::read(&mut cursor)?;
            if entry.is_terminator() {
                break;
            }
            entries.push(entry);
        }
        debug!(
            "STFS: file table at 0x{:X}, {} blocks, {} entries",
            offset,
            count,
            entries.len()
        );
        Ok(entries)
    }

    /// Directory entries; empty if the package has no files
    pub fn file_table(&mut self) -> StfsResult<&[DirEntry]> {
        let table = match self.file_table.take() {
            Some(t) => t,
            None => self.load_file_table()?,
        };
        Ok(self.file_table.insert(table))
    }

    fn load_default_xex(&mut self) -> StfsResult<Option<NestedXex<R>>> {
        let Some(entry) = self.file_table()?.iter().find(|e| e.is_default_xex()).cloned() else {
            return Ok(None);
        };
        let offset = self.data_block_offset(entry.block_number.get())?;
        let file = self.file.as_ref().ok_or(StfsError::Closed)?.clone();
        let sub = SubFile::new(file, offset, u64::from(entry.filesize));
        match Xex::open(sub, self.options.clone()) {
            Ok(xex) => Ok(Some(xex)),
            Err(e) => {
                debug!("STFS: {} did not open: {}", entry.name(), e);
                Ok(None)
            }
        }
    }

    /// The title's `default.xex` / `default.xexp`, if present
    pub fn default_xex(&mut self) -> StfsResult<Option<&mut NestedXex<R>>> {
        if self.xex.is_none() {
            let xex = self.load_default_xex()?;
            self.xex = Some(xex);
        }
        Ok(self.xex.as_mut().and_then(Option::as_mut))
    }

    fn default_lc(&self) -> &'static str {
        self.options.language.map_or("en", Language::code)
    }

    fn load_fields(&mut self) -> StfsResult<RomFields> {
        let header = self.header.clone();
        let default_lc = self.default_lc();
        let md = self.metadata()?;

        let mut fields = RomFields::new();
        fields.set_tab_name(0, "STFS");

        let dedupe = md.display_name(Language::English).is_some();
        let mut names = BTreeMap::new();
        let mut descriptions = BTreeMap::new();
        for lang in Language::ALL {
            let name = md.display_name(lang);
            let description = md.display_description(lang);
            if name.is_none() && description.is_none() {
                continue;
            }
            if dedupe && lang != Language::English && md.matches_english(lang) {
                continue;
            }
            if let Some(name) = name {
                names.insert(lang.code().to_string(), name);
            }
            if let Some(description) = description {
                descriptions.insert(lang.code().to_string(), description);
            }
        }
        if names.is_empty() {
            fields.add_string("Name", "Unknown");
        } else {
            fields.add_string_multi("Name", names, default_lc);
        }
        if !descriptions.is_empty() {
            fields.add_string_multi("Description", descriptions, default_lc);
        }

        if let Some(publisher) = md.publisher_name() {
            fields.add_string("Publisher", publisher);
        }
        if let Some(title) = md.title_name() {
            fields.add_string("Title", title);
        }

        fields.add_string("Package Type", header.stfs_type().description());
        fields.add_string(
            "Content Type",
            crate::content_types::display(md.content_type),
        );
        fields.add_string_flags(
            "Media ID",
            format!("{:08X}", md.media_id),
            FieldFlags::MONOSPACE,
        );
        fields.add_string_flags("Title ID", md.title_id.display(4), FieldFlags::MONOSPACE);
        fields.add_string("Version", md.version.to_string());
        fields.add_string("Base Version", md.base_version.to_string());

        if let PackageHeader::Console(sig) = &header {
            fields.add_string_flags(
                "Console ID",
                hex::encode_upper(sig.console_id),
                FieldFlags::MONOSPACE,
            );
            // Latin-1
            let part_number: String = trim_nul(&sig.part_number)
                .iter()
                .map(|&b| char::from(b))
                .collect();
            fields.add_string("Part Number", part_number);
            let console_type = match sig.console_type {
                CONSOLE_TYPE_DEBUG => "Debug".to_string(),
                CONSOLE_TYPE_RETAIL => "Retail".to_string(),
                other => format!("Unknown ({other})"),
            };
            fields.add_string("Console Type", console_type);
        }

        match self.default_xex() {
            Ok(Some(xex)) => match xex.fields() {
                Ok(xex_fields) => fields.add_fields_with_tabs(xex_fields),
                Err(e) => debug!("STFS: no fields from default.xex: {}", e),
            },
            Ok(None) => {}
            Err(e) => debug!("STFS: no default.xex: {}", e),
        }

        Ok(fields)
    }

    fn load_icon(&mut self) -> StfsResult<Option<Image>> {
        let version = self.metadata()?.metadata_version;
        let thumbs = self.thumbnails()?;
        Ok(thumbs
            .title_thumbnail(version)
            .or_else(|| thumbs.thumbnail(version)))
    }
}

impl<R: Read + Seek> RomData for Stfs<R> {
    fn system_name(&self, kind: SystemNameKind) -> &'static str {
        match kind {
            SystemNameKind::Long => "Microsoft Xbox 360",
            SystemNameKind::Short => "Xbox 360",
            SystemNameKind::Abbreviation => "X360",
        }
    }

    fn file_type(&self) -> FileType {
        FileType::ApplicationPackage
    }

    fn fields(&mut self) -> Result<&RomFields> {
        let fields = match self.fields.take() {
            Some(f) => f,
            None if self.file.is_none() => return Err(FormatError::Closed),
            None => self.load_fields()?,
        };
        Ok(self.fields.insert(fields))
    }

    fn icon(&mut self) -> Result<Option<Image>> {
        if self.file.is_none() {
            return Err(FormatError::Closed);
        }
        Ok(self.load_icon()?)
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn close(&mut self) {
        if let Some(Some(mut xex)) = self.xex.take() {
            xex.close();
        }
        self.file = None;
    }
}
