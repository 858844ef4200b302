//! XDBF header, entry table and resource records
//!
//! Everything is big-endian. Resource offsets in the entry table are
//! relative to the end of the free space table.

use binrw::{BinRead, BinWrite};

use crate::xdbf::error::{XdbfError, XdbfResult};
use crate::{BinaryFormat, write_record};

/// `XDBF`
pub const XDBF_MAGIC: u32 = 0x5844_4246;
/// Supported file version
pub const XDBF_VERSION: u32 = 0x0001_0000;
/// Size of [`XdbfHeader`]
pub const XDBF_HEADER_SIZE: usize = 24;
/// Size of [`XdbfEntry`]
pub const XDBF_ENTRY_SIZE: usize = 18;
/// Size of a free space table entry
pub const XDBF_FREE_SPACE_ENTRY_SIZE: usize = 8;
/// Entry tables at least this long are rejected
pub const MAX_ENTRY_TABLE_LENGTH: u32 = 1_048_576;

/// SPA namespace: metadata records (`XSTC`, `XTHD`, `XACH`, ...)
pub const SPA_NAMESPACE_METADATA: u16 = 1;
/// SPA namespace: PNG images
pub const SPA_NAMESPACE_IMAGE: u16 = 2;
/// SPA namespace: string tables, one per language ID
pub const SPA_NAMESPACE_STRING_TABLE: u16 = 3;

/// GPD namespace: one achievement per entry
pub const GPD_NAMESPACE_ACHIEVEMENT: u16 = 1;
/// GPD namespace: PNG images
pub const GPD_NAMESPACE_IMAGE: u16 = 2;
/// GPD namespace: settings
pub const GPD_NAMESPACE_SETTING: u16 = 3;
/// GPD namespace: titles played
pub const GPD_NAMESPACE_TITLE: u16 = 4;
/// GPD namespace: one UTF-16BE string per entry
pub const GPD_NAMESPACE_STRING: u16 = 5;
/// GPD namespace: avatar awards
pub const GPD_NAMESPACE_AVATAR_AWARD: u16 = 6;

/// GPD sync list entry, present in every namespace
pub const GPD_SYNC_LIST_ENTRY: u64 = 0x1_0000_0000;
/// GPD sync data entry, present in every namespace
pub const GPD_SYNC_DATA_ENTRY: u64 = 0x2_0000_0000;

/// String and image ID of the title
pub const XDBF_ID_TITLE: u16 = 0x8000;

/// `XSTC`: default language
pub const XSTC_MAGIC: u32 = 0x5853_5443;
/// `XSRC`: compressed XLAST source
pub const XSRC_MAGIC: u32 = 0x5853_5243;
/// `XSTR`: string table
pub const XSTR_MAGIC: u32 = 0x5853_5452;
/// `XACH`: achievement table
pub const XACH_MAGIC: u32 = 0x5841_4348;
/// `XTHD`: title header
pub const XTHD_MAGIC: u32 = 0x5854_4844;
/// `XGAA`: avatar award table
pub const XGAA_MAGIC: u32 = 0x5847_4141;

/// Version of every SPA record header
pub const RECORD_VERSION: u32 = 1;

/// File header
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct XdbfHeader {
    /// `XDBF`
    pub magic: u32,
    /// [`XDBF_VERSION`]
    pub version: u32,
    /// Allocated entry table slots
    pub entry_table_length: u32,
    /// Used entry table slots
    pub entry_count: u32,
    /// Allocated free space table slots
    pub free_space_table_length: u32,
    /// Used free space table slots
    pub free_space_table_count: u32,
}

impl XdbfHeader {
    /// Parse and validate the header
    pub fn parse(data: &[u8]) -> XdbfResult<Self> {
        let header = Self::read(&mut std::io::Cursor::new(data))?;
        if header.magic != XDBF_MAGIC {
            return Err(XdbfError::InvalidMagic(header.magic));
        }
        if header.version != XDBF_VERSION {
            return Err(XdbfError::UnsupportedVersion(header.version));
        }
        if header.entry_table_length >= MAX_ENTRY_TABLE_LENGTH {
            return Err(XdbfError::TooManyEntries(header.entry_table_length));
        }
        Ok(header)
    }

    /// Offset of the first resource
    pub fn data_offset(&self) -> u64 {
        (XDBF_HEADER_SIZE as u64)
            + u64::from(self.entry_table_length) * XDBF_ENTRY_SIZE as u64
            + u64::from(self.free_space_table_length) * XDBF_FREE_SPACE_ENTRY_SIZE as u64
    }
}

impl BinaryFormat for XdbfHeader {
    fn parse(data: &[u8]) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self::parse(data)?)
    }

    fn build(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        Ok(write_record(self)?)
    }
}

/// Entry table slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct XdbfEntry {
    /// Namespace ID
    pub namespace_id: u16,
    /// Resource ID within the namespace
    pub resource_id: u64,
    /// Offset relative to the data start
    pub offset: u32,
    /// Length in bytes
    pub length: u32,
}

impl XdbfEntry {
    /// Whether this is a GPD sync list or sync data entry
    pub fn is_sync_entry(&self) -> bool {
        self.resource_id == GPD_SYNC_LIST_ENTRY || self.resource_id == GPD_SYNC_DATA_ENTRY
    }
}

/// `XSTC` record: default language
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
#[allow(missing_docs)]
pub struct Xstc {
    pub magic: u32,
    pub version: u32,
    /// Size of the rest of the record
    pub size: u32,
    pub default_language: u32,
}

/// Size of [`Xstc`]
pub const XSTC_SIZE: usize = 16;

/// Header of an `XSTR` string table; followed by `(id, length, UTF-8)` entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
#[allow(missing_docs)]
pub struct XstrHeader {
    pub magic: u32,
    pub version: u32,
    pub size: u32,
    pub string_count: u16,
}

/// Size of [`XstrHeader`]
pub const XSTR_HEADER_SIZE: usize = 14;
/// Size of a string entry header
pub const XSTR_ENTRY_HEADER_SIZE: usize = 4;
/// Largest string table loaded
pub const MAX_STRING_TABLE_SIZE: u32 = 1024 * 1024;

/// `XTHD` record: title header
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
#[allow(missing_docs)]
pub struct Xthd {
    pub magic: u32,
    pub version: u32,
    pub size: u32,
    pub title_id: u32,
    pub title_type: u32,
    pub version_major: u16,
    pub version_minor: u16,
    pub version_build: u16,
    pub version_revision: u16,
    pub reserved: [u8; 16],
}

/// Size of [`Xthd`]
pub const XTHD_SIZE: usize = 44;

/// Display name of an `XTHD` title type
pub fn title_type_name(title_type: u32) -> Option<&'static str> {
    const NAMES: [&str; 4] = ["System Title", "Full Game", "Demo", "Download"];
    NAMES.get(title_type as usize).copied()
}

/// Header shared by the `XACH` and `XGAA` tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
#[allow(missing_docs)]
pub struct TableHeader {
    pub magic: u32,
    pub version: u32,
    pub size: u32,
    pub count: u16,
}

/// Size of [`TableHeader`]
pub const TABLE_HEADER_SIZE: usize = 14;

/// `XACH` table row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
#[allow(missing_docs)]
pub struct SpaAchievement {
    pub achievement_id: u16,
    pub name_id: u16,
    pub unlocked_desc_id: u16,
    /// `0xFFFF` if the achievement has no locked description
    pub locked_desc_id: u16,
    pub image_id: u32,
    pub gamerscore: u16,
    pub reserved: u16,
    pub flags: u32,
    pub unknown: [u8; 16],
}

/// Size of [`SpaAchievement`]
pub const SPA_ACHIEVEMENT_SIZE: usize = 36;
/// Rows of an `XACH` table beyond this are ignored
pub const MAX_ACHIEVEMENTS: usize = 512;

/// `XGAA` table row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
#[allow(missing_docs)]
pub struct AvatarAward {
    pub unknown_00: u32,
    pub avatar_award_id: u16,
    pub unknown_06: u16,
    pub unknown_08: [u8; 4],
    pub title_id: u32,
    pub name_id: u16,
    pub unlocked_desc_id: u16,
    /// `0xFFFF` if the award has no locked description
    pub locked_desc_id: u16,
    pub unknown_16: u16,
    pub image_id: u32,
    pub unknown_1c: [u8; 8],
}

/// Size of [`AvatarAward`]
pub const AVATAR_AWARD_SIZE: usize = 36;
/// Rows of an `XGAA` table beyond this are ignored
pub const MAX_AVATAR_AWARDS: usize = 16;

/// Header of a GPD achievement entry; followed by three UTF-16BE strings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
#[allow(missing_docs)]
pub struct GpdAchievementHeader {
    /// Always [`GPD_ACHIEVEMENT_HEADER_SIZE`]
    pub size: u32,
    pub achievement_id: u32,
    pub image_id: u32,
    pub gamerscore: u32,
    pub flags: u32,
    /// FILETIME
    pub unlock_time: u64,
}

/// Size of [`GpdAchievementHeader`]
pub const GPD_ACHIEVEMENT_HEADER_SIZE: usize = 28;
/// GPD achievement entries larger than this are skipped
pub const MAX_GPD_ACHIEVEMENT_SIZE: u32 = 4096;

/// GPD strings outside `2..=4096` bytes or of odd length are skipped
pub const MAX_GPD_STRING_SIZE: u32 = 4096;

/// Images outside `16..=1 MiB` are rejected
pub const MIN_IMAGE_SIZE: u32 = 16;
/// Largest image loaded
pub const MAX_IMAGE_SIZE: u32 = 1024 * 1024;

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{assert_invalid_data_rejected, assert_round_trip};

    fn size_of<T>(value: &T) -> usize
    where
        T: for<'a> BinWrite<Args<'a> = ()> + binrw::meta::WriteEndian,
    {
        write_record(value).expect("write").len()
    }

    #[test]
    fn test_record_sizes() {
        assert_eq!(size_of(&XdbfEntry::default()), XDBF_ENTRY_SIZE);
        assert_eq!(size_of(&SpaAchievement::default()), SPA_ACHIEVEMENT_SIZE);
        assert_eq!(size_of(&AvatarAward::default()), AVATAR_AWARD_SIZE);
        assert_eq!(
            size_of(&GpdAchievementHeader::default()),
            GPD_ACHIEVEMENT_HEADER_SIZE
        );
    }

    #[test]
    fn test_header_validation() {
        let mut data = Vec::new();
        for v in [XDBF_MAGIC, XDBF_VERSION, 4, 2, 1, 1] {
            data.extend_from_slice(&v.to_be_bytes());
        }
        let header = XdbfHeader::parse(&data).expect("parse");
        assert_eq!(header.data_offset(), 24 + 4 * 18 + 8);

        data[8..12].copy_from_slice(&MAX_ENTRY_TABLE_LENGTH.to_be_bytes());
        assert!(matches!(
            XdbfHeader::parse(&data),
            Err(XdbfError::TooManyEntries(MAX_ENTRY_TABLE_LENGTH))
        ));

        data[..4].copy_from_slice(b"XDBG");
        assert!(matches!(
            XdbfHeader::parse(&data),
            Err(XdbfError::InvalidMagic(0x5844_4247))
        ));
    }

    #[test]
    fn test_header_round_trip() {
        let header = XdbfHeader {
            magic: XDBF_MAGIC,
            version: XDBF_VERSION,
            entry_table_length: 16,
            entry_count: 3,
            free_space_table_length: 16,
            free_space_table_count: 1,
        };
        assert_round_trip!(header);

        let mut data = write_record(&header).expect("write");
        data[4..8].copy_from_slice(&0x0002_0000u32.to_be_bytes());
        assert_invalid_data_rejected!(XdbfHeader, &data);
        assert_invalid_data_rejected!(XdbfHeader, &data[..20]);
    }

    #[test]
    fn test_title_type_names() {
        assert_eq!(title_type_name(1), Some("Full Game"));
        assert_eq!(title_type_name(4), None);
    }
}
