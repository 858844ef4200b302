//! STFS package metadata and thumbnails
//!
//! The metadata block follows the package header at 0x22C and runs to
//! 0x1712; the thumbnail block follows it. Both are read on demand.

use std::io::SeekFrom;

use binrw::{BinRead, BinResult, BinWrite};

use crate::image::{Image, PNG_MAGIC};
use crate::language::Language;
use crate::stfs::error::StfsError;
use crate::text::utf16be_to_string;
use crate::title::{TitleId, Version};

/// File offset of the metadata block
pub const METADATA_ADDRESS: u64 = 0x22C;
/// Size of the metadata block
pub const METADATA_SIZE: usize = 0x1712 - 0x22C;
/// File offset of the thumbnail block
pub const THUMBNAILS_ADDRESS: u64 = 0x1712;
/// Size of the thumbnail block
pub const THUMBNAILS_SIZE: usize = 0x971A - 0x1712;

/// Number of display name slots in the metadata block
pub const DISPLAY_NAME_COUNT: usize = 18;
/// Size in bytes of one display name slot (0x40 UTF-16 units)
pub const DISPLAY_NAME_SIZE: usize = 0x80;

/// Descriptor type: STFS
pub const DESCRIPTOR_STFS: u32 = 0;
/// Descriptor type: SVOD
pub const DESCRIPTOR_SVOD: u32 = 1;

/// License entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct LicenseEntry {
    /// License ID (XUID / console ID)
    pub id: u64,
    /// License bits
    pub bits: u32,
    /// License flags
    pub flags: u32,
}

/// 24-bit big-endian integer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, BinRead, BinWrite)]
pub struct U24Be(pub [u8; 3]);

impl U24Be {
    /// Value
    pub fn get(self) -> u32 {
        (u32::from(self.0[0]) << 16) | (u32::from(self.0[1]) << 8) | u32::from(self.0[2])
    }

    /// Encode the low 24 bits of `value`
    pub fn new(value: u32) -> Self {
        Self([(value >> 16) as u8, (value >> 8) as u8, value as u8])
    }
}

/// STFS volume descriptor
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct StfsVolumeDescriptor {
    /// Descriptor size (0x24)
    pub size: u8,
    /// Reserved
    pub reserved: u8,
    /// Block separation; bit 0 selects the hash block layout
    pub block_separation: u8,
    /// File table block count
    pub file_table_block_count: i16,
    /// File table starting block
    pub file_table_block_number: U24Be,
    /// Top hash table hash
    pub top_hash_table_hash: [u8; 0x14],
    /// Allocated blocks
    pub total_alloc_block_count: u32,
    /// Unallocated blocks
    pub total_unalloc_block_count: u32,
}

/// SVOD volume descriptor
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct SvodVolumeDescriptor {
    /// Descriptor size (0x24)
    pub size: u8,
    /// Block cache element count
    pub block_cache_element_count: u8,
    /// Worker thread processor
    pub worker_thread_processor: u8,
    /// Worker thread priority
    pub worker_thread_priority: u8,
    /// Hash
    pub hash: [u8; 0x14],
    /// Device features
    pub device_features: u8,
    /// Data block count
    pub data_block_count: U24Be,
    /// Data block offset
    pub data_block_offset: U24Be,
    /// Reserved
    pub reserved: [u8; 5],
}

/// Volume descriptor, selected by the metadata's descriptor type
#[derive(Debug, Clone, PartialEq, Eq, BinWrite)]
#[bw(big)]
pub enum VolumeDescriptor {
    /// STFS file system
    Stfs(StfsVolumeDescriptor),
    /// SVOD (secure virtual optical disc)
    Svod(SvodVolumeDescriptor),
}

impl VolumeDescriptor {
    /// Value of the metadata's descriptor type field
    pub fn descriptor_type(&self) -> u32 {
        match self {
            Self::Stfs(_) => DESCRIPTOR_STFS,
            Self::Svod(_) => DESCRIPTOR_SVOD,
        }
    }

    /// The STFS descriptor, if this is one
    pub fn as_stfs(&self) -> Option<&StfsVolumeDescriptor> {
        match self {
            Self::Stfs(d) => Some(d),
            Self::Svod(_) => None,
        }
    }
}

// The descriptor type is stored after the descriptor itself.
#[binrw::parser(reader, endian)]
fn peek_volume_descriptor() -> BinResult<VolumeDescriptor> {
    let start = reader.stream_position()?;
    reader.seek(SeekFrom::Current(0x24 + 12))?;
    let kind = u32::read_options(reader, endian, ())?;
    reader.seek(SeekFrom::Start(start))?;
    match kind {
        DESCRIPTOR_STFS => Ok(VolumeDescriptor::Stfs(StfsVolumeDescriptor::read_options(
            reader,
            endian,
            (),
        )?)),
        DESCRIPTOR_SVOD => Ok(VolumeDescriptor::Svod(SvodVolumeDescriptor::read_options(
            reader,
            endian,
            (),
        )?)),
        other => Err(binrw::Error::Custom {
            pos: start + 0x24 + 12,
            err: Box::new(StfsError::InvalidDescriptorType(other)),
        }),
    }
}

/// Package metadata (0x22C..0x1712)
#[binrw::binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(big)]
pub struct PackageMetadata {
    /// License entries
    pub license_entries: [LicenseEntry; 16],
    /// SHA-1 of the header from 0x344 to the first hash table
    pub header_sha1: [u8; 0x14],
    /// Size of the full header
    pub header_size: u32,
    /// Content type
    pub content_type: u32,
    /// Metadata version (0 or 2)
    pub metadata_version: u32,
    /// Content size
    pub content_size: u64,
    /// Media ID
    pub media_id: u32,
    /// Version
    #[br(map = |v: u32| Version(v))]
    #[bw(map = |v: &Version| v.0)]
    pub version: Version,
    /// Base version
    #[br(map = |v: u32| Version(v))]
    #[bw(map = |v: &Version| v.0)]
    pub base_version: Version,
    /// Title ID
    #[br(map = |v: u32| TitleId(v))]
    #[bw(map = |t: &TitleId| t.0)]
    pub title_id: TitleId,
    /// Platform (2 = Xbox 360, 4 = PC)
    pub platform: u8,
    /// Executable type
    pub executable_type: u8,
    /// Disc number
    pub disc_number: u8,
    /// Discs in set
    pub disc_in_set: u8,
    /// Save game ID
    pub savegame_id: u32,
    /// Console ID
    pub console_id: [u8; 5],
    /// Profile ID
    pub profile_id: u64,
    /// Volume descriptor
    #[br(parse_with = peek_volume_descriptor)]
    pub volume_descriptor: VolumeDescriptor,
    /// Data file count
    pub data_file_count: u32,
    /// Data file combined size
    pub data_file_combined_size: u64,
    #[br(temp)]
    #[bw(calc = volume_descriptor.descriptor_type())]
    descriptor_type: u32,
    /// Reserved
    pub reserved: u32,
    /// Padding (v0) or video series information (v2)
    pub extra: [u8; 0x4C],
    /// Device ID
    pub device_id: [u8; 0x14],
    /// Display names, UTF-16BE, one slot per language
    pub display_name: [[u8; DISPLAY_NAME_SIZE]; DISPLAY_NAME_COUNT],
    /// Display descriptions, UTF-16BE, one slot per language
    pub display_description: [[u8; DISPLAY_NAME_SIZE]; DISPLAY_NAME_COUNT],
    /// Publisher name, UTF-16BE
    pub publisher_name: [u8; 0x80],
    /// Title name, UTF-16BE
    pub title_name: [u8; 0x80],
    /// Transfer flags
    pub transfer_flags: u8,
}

fn slot_is_empty(slot: &[u8]) -> bool {
    slot.len() < 2 || (slot[0] == 0 && slot[1] == 0)
}

fn set_slot(slot: &mut [u8], text: &str) {
    slot.fill(0);
    let bytes = crate::text::string_to_utf16be(text);
    // Keep a terminator
    let n = bytes.len().min(slot.len() - 2);
    slot[..n].copy_from_slice(&bytes[..n]);
}

impl PackageMetadata {
    /// Metadata with the given identity fields and an STFS descriptor
    pub fn new(content_type: u32, title_id: TitleId, header_size: u32) -> Self {
        Self {
            license_entries: [LicenseEntry::default(); 16],
            header_sha1: [0; 0x14],
            header_size,
            content_type,
            metadata_version: 2,
            content_size: 0,
            media_id: 0,
            version: Version::default(),
            base_version: Version::default(),
            title_id,
            platform: 2,
            executable_type: 0,
            disc_number: 0,
            disc_in_set: 0,
            savegame_id: 0,
            console_id: [0; 5],
            profile_id: 0,
            volume_descriptor: VolumeDescriptor::Stfs(StfsVolumeDescriptor {
                size: 0x24,
                reserved: 0,
                block_separation: 0,
                file_table_block_count: 1,
                file_table_block_number: U24Be::new(0),
                top_hash_table_hash: [0; 0x14],
                total_alloc_block_count: 0,
                total_unalloc_block_count: 0,
            }),
            data_file_count: 0,
            data_file_combined_size: 0,
            reserved: 0,
            extra: [0; 0x4C],
            device_id: [0; 0x14],
            display_name: [[0; DISPLAY_NAME_SIZE]; DISPLAY_NAME_COUNT],
            display_description: [[0; DISPLAY_NAME_SIZE]; DISPLAY_NAME_COUNT],
            publisher_name: [0; 0x80],
            title_name: [0; 0x80],
            transfer_flags: 0,
        }
    }

    /// Display name for a language, if set
    pub fn display_name(&self, lang: Language) -> Option<String> {
        let slot = &self.display_name[lang.index()];
        (!slot_is_empty(slot)).then(|| utf16be_to_string(slot))
    }

    /// Display description for a language, if set
    pub fn display_description(&self, lang: Language) -> Option<String> {
        let slot = &self.display_description[lang.index()];
        (!slot_is_empty(slot)).then(|| utf16be_to_string(slot))
    }

    /// Set the display name for a language
    pub fn set_display_name(&mut self, lang: Language, text: &str) {
        set_slot(&mut self.display_name[lang.index()], text);
    }

    /// Set the display description for a language
    pub fn set_display_description(&mut self, lang: Language, text: &str) {
        set_slot(&mut self.display_description[lang.index()], text);
    }

    /// Publisher name, if set
    pub fn publisher_name(&self) -> Option<String> {
        (!slot_is_empty(&self.publisher_name)).then(|| utf16be_to_string(&self.publisher_name))
    }

    /// Title name, if set
    pub fn title_name(&self) -> Option<String> {
        (!slot_is_empty(&self.title_name)).then(|| utf16be_to_string(&self.title_name))
    }

    /// Set the publisher name
    pub fn set_publisher_name(&mut self, text: &str) {
        set_slot(&mut self.publisher_name, text);
    }

    /// Set the title name
    pub fn set_title_name(&mut self, text: &str) {
        set_slot(&mut self.title_name, text);
    }

    /// Whether the English display name and description equal those of `lang`
    pub fn matches_english(&self, lang: Language) -> bool {
        let en = Language::English.index();
        let i = lang.index();
        self.display_name[i] == self.display_name[en]
            && self.display_description[i] == self.display_description[en]
    }
}

/// Thumbnail block (0x1712..0x971A)
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct PackageThumbnails {
    /// Package thumbnail size
    pub thumbnail_size: u32,
    /// Title thumbnail size
    pub title_thumbnail_size: u32,
    /// Both thumbnails; v2 also stores extra display names between them
    pub data: [u8; 0x8000],
}

/// Offset of the title thumbnail inside [`PackageThumbnails::data`]
const TITLE_THUMBNAIL_OFFSET: usize = 0x4000;

impl PackageThumbnails {
    fn max_size(metadata_version: u32) -> usize {
        if metadata_version >= 2 { 0x3D00 } else { 0x4000 }
    }

    fn image_at(&self, offset: usize, size: u32, metadata_version: u32) -> Option<Image> {
        let max = Self::max_size(metadata_version);
        let slot = &self.data[offset..offset + max];
        if slot[..PNG_MAGIC.len()] != PNG_MAGIC {
            return None;
        }
        let len = usize::try_from(size)
            .ok()
            .filter(|&n| n > 0 && n <= max)
            .unwrap_or(max);
        Some(Image::Png(slot[..len].to_vec()))
    }

    /// Package thumbnail
    pub fn thumbnail(&self, metadata_version: u32) -> Option<Image> {
        self.image_at(0, self.thumbnail_size, metadata_version)
    }

    /// Title thumbnail
    pub fn title_thumbnail(&self, metadata_version: u32) -> Option<Image> {
        self.image_at(TITLE_THUMBNAIL_OFFSET, self.title_thumbnail_size, metadata_version)
    }

    /// Thumbnail block holding the given PNG files
    pub fn new(thumbnail: &[u8], title_thumbnail: &[u8], metadata_version: u32) -> Self {
        let max = Self::max_size(metadata_version);
        let mut data = [0u8; 0x8000];
        let a = thumbnail.len().min(max);
        let b = title_thumbnail.len().min(max);
        data[..a].copy_from_slice(&thumbnail[..a]);
        data[TITLE_THUMBNAIL_OFFSET..TITLE_THUMBNAIL_OFFSET + b]
            .copy_from_slice(&title_thumbnail[..b]);
        Self {
            thumbnail_size: a as u32,
            title_thumbnail_size: b as u32,
            data,
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn write<T>(value: &T) -> Vec<u8>
    where
        T: for<'a> BinWrite<Args<'a> = ()>,
    {
        let mut cursor = Cursor::new(Vec::new());
        value.write_be(&mut cursor).expect("write");
        cursor.into_inner()
    }

    #[test]
    fn test_metadata_layout() {
        let mut md = PackageMetadata::new(0x000D_0000, TitleId(0x5841_07D1), 0x971A);
        md.set_display_name(Language::English, "Arcade Game");
        md.set_title_name("Arcade Game");
        let data = write(&md);
        assert_eq!(data.len(), METADATA_SIZE);

        // Absolute offsets minus the metadata address
        let at = |abs: usize| abs - METADATA_ADDRESS as usize;
        assert_eq!(&data[at(0x344)..at(0x348)], &0x000D_0000u32.to_be_bytes());
        assert_eq!(&data[at(0x360)..at(0x364)], &0x5841_07D1u32.to_be_bytes());
        assert_eq!(&data[at(0x3A9)..at(0x3AD)], &DESCRIPTOR_STFS.to_be_bytes());
        assert_eq!(&data[at(0x411)..at(0x413)], &[0, b'A']);

        let parsed = PackageMetadata::read_be(&mut Cursor::new(&data)).expect("parse");
        assert_eq!(parsed, md);
        assert_eq!(parsed.display_name(Language::English).as_deref(), Some("Arcade Game"));
        assert_eq!(parsed.display_name(Language::French), None);
    }

    #[test]
    fn test_svod_descriptor_selected_by_type() {
        let mut md = PackageMetadata::new(0x0000_4000, TitleId(0), 0x971A);
        md.volume_descriptor = VolumeDescriptor::Svod(SvodVolumeDescriptor {
            size: 0x24,
            block_cache_element_count: 0,
            worker_thread_processor: 0,
            worker_thread_priority: 0,
            hash: [0; 0x14],
            device_features: 0,
            data_block_count: U24Be::new(0x1234),
            data_block_offset: U24Be::new(0),
            reserved: [0; 5],
        });
        let data = write(&md);
        let parsed = PackageMetadata::read_be(&mut Cursor::new(&data)).expect("parse");
        assert!(parsed.volume_descriptor.as_stfs().is_none());
        assert_eq!(parsed.volume_descriptor.descriptor_type(), DESCRIPTOR_SVOD);
    }

    #[test]
    fn test_unknown_descriptor_type() {
        let md = PackageMetadata::new(0, TitleId(0), 0x971A);
        let mut data = write(&md);
        let off = 0x3A9 - METADATA_ADDRESS as usize;
        data[off..off + 4].copy_from_slice(&7u32.to_be_bytes());
        assert!(PackageMetadata::read_be(&mut Cursor::new(&data)).is_err());
    }

    #[test]
    fn test_thumbnails_prefer_png() {
        let mut png = PNG_MAGIC.to_vec();
        png.extend_from_slice(&[1, 2, 3, 4]);
        let thumbs = PackageThumbnails::new(&png, &[], 2);
        assert_eq!(thumbs.thumbnail(2), Some(Image::Png(png.clone())));
        assert_eq!(thumbs.title_thumbnail(2), None);
        assert_eq!(write(&thumbs).len(), THUMBNAILS_SIZE);
    }
}
