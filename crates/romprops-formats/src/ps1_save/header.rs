//! PlayStation memory card save structures
//!
//! A save is an optional container header followed by the 512-byte `SC`
//! block that holds the title and icon. Multi-byte values are
//! little-endian except the PSV magic.

use binrw::{BinRead, BinWrite};

use crate::ps1_save::error::{Ps1SaveError, Ps1SaveResult};
use crate::{BinaryFormat, write_record};

/// `\0VSP\0\0\0\0`
pub const PSV_MAGIC: [u8; 8] = *b"\0VSP\0\0\0\0";
/// `SC`
pub const SC_MAGIC: [u8; 2] = *b"SC";
/// First block of a save in a memory card directory
pub const BLOCK_ALLOC_FIRST: u32 = 0x51;

/// Size of [`PsvHeader`]
pub const PSV_HEADER_SIZE: usize = 0x84;
/// Size of [`BlockEntry`]
pub const BLOCK_ENTRY_SIZE: usize = 128;
/// Size of [`Ps54Header`]
pub const PS54_HEADER_SIZE: usize = 54;
/// Size of [`ScHeader`]
pub const SC_SIZE: usize = 512;
/// Memory card block size
pub const BLOCK_SIZE: u64 = 8192;

/// Filenames are decoded from at most this many bytes
pub const FILENAME_LEN: usize = 20;

/// Icon flag: no icon
pub const ICON_NONE: u8 = 0x00;
/// Icon flag: one frame
pub const ICON_STATIC: u8 = 0x11;
/// Icon flag: two frames
pub const ICON_ANIM_2: u8 = 0x12;
/// Icon flag: three frames
pub const ICON_ANIM_3: u8 = 0x13;
/// Icon flag: one frame (alternate)
pub const ICON_ALT_STATIC: u8 = 0x16;
/// Icon flag: two frames (alternate)
pub const ICON_ALT_ANIM_2: u8 = 0x17;
/// Icon flag: three frames (alternate)
pub const ICON_ALT_ANIM_3: u8 = 0x18;

/// Icon delays are counted in PAL frames
pub const PAL_RATE_HZ: u16 = 50;

/// Container layout around the `SC` block
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum SaveType {
    /// PS1 save exported by a PS3 (`.psv`)
    Psv,
    /// Memory card directory entry followed by the save (`.mcs`, `.ps1`)
    Block,
    /// 54-byte header (`.mcb`, `.mcx`, `.pda`, `.psx`)
    Ps54,
    /// Bare save data
    Raw,
}

impl SaveType {
    /// Offset of the `SC` block
    pub fn sc_offset(self) -> usize {
        match self {
            Self::Psv => PSV_HEADER_SIZE,
            Self::Block => BLOCK_ENTRY_SIZE,
            Self::Ps54 => PS54_HEADER_SIZE,
            Self::Raw => 0,
        }
    }

    /// Identify the layout from the start of a file
    ///
    /// Raw and 54-byte saves are told apart by the file size, which is a
    /// whole number of card blocks plus the header.
    pub fn detect(header: &[u8], file_size: u64) -> Option<Self> {
        let sc_at = |offset: usize| {
            header.len() >= offset + SC_SIZE && header[offset..offset + 2] == SC_MAGIC
        };

        if sc_at(PSV_HEADER_SIZE) {
            return (header[..8] == PSV_MAGIC).then_some(Self::Psv);
        }

        if sc_at(BLOCK_ENTRY_SIZE) {
            if header[..4] != BLOCK_ALLOC_FIRST.to_le_bytes() {
                return None;
            }
            let checksum = header[..BLOCK_ENTRY_SIZE].iter().fold(0u8, |acc, b| acc ^ b);
            return (checksum == 0).then_some(Self::Block);
        }

        if sc_at(PS54_HEADER_SIZE) {
            return (file_size % BLOCK_SIZE == PS54_HEADER_SIZE as u64).then_some(Self::Ps54);
        }

        (sc_at(0) && file_size % BLOCK_SIZE == 0).then_some(Self::Raw)
    }
}

/// Frame count and per-frame delay (PAL frames) for an icon flag
pub fn icon_frames(icon_flag: u8) -> Option<(usize, u16)> {
    match icon_flag {
        ICON_STATIC | ICON_ALT_STATIC => Some((1, 0)),
        ICON_ANIM_2 | ICON_ALT_ANIM_2 => Some((2, 16)),
        ICON_ANIM_3 | ICON_ALT_ANIM_3 => Some((3, 11)),
        _ => None,
    }
}

/// PSV header
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
#[allow(missing_docs)]
pub struct PsvHeader {
    pub magic: [u8; 8],
    pub key_seed: [u8; 20],
    pub sha1_hmac: [u8; 20],
    pub reserved1: [u8; 8],
    pub unknown: [u32; 2],
    pub save_size: u32,
    pub data_offset: u32,
    pub reserved2: [u8; 28],
    /// CP1252 or Shift-JIS, NUL-padded
    pub filename: [u8; 20],
    pub reserved3: [u8; 12],
}

impl Default for PsvHeader {
    fn default() -> Self {
        Self {
            magic: PSV_MAGIC,
            key_seed: [0; 20],
            sha1_hmac: [0; 20],
            reserved1: [0; 8],
            unknown: [0x14, 0x01],
            save_size: 0,
            data_offset: PSV_HEADER_SIZE as u32,
            reserved2: [0; 28],
            filename: [0; 20],
            reserved3: [0; 12],
        }
    }
}

/// Memory card directory entry
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
#[allow(missing_docs)]
pub struct BlockEntry {
    pub alloc_flag: u32,
    pub size: u32,
    pub next_block: u16,
    pub filename: [u8; 21],
    pub padding: [u8; 96],
    /// XOR of the preceding 127 bytes
    pub checksum: u8,
}

impl Default for BlockEntry {
    fn default() -> Self {
        Self {
            alloc_flag: BLOCK_ALLOC_FIRST,
            size: BLOCK_SIZE as u32,
            next_block: 0xFFFF,
            filename: [0; 21],
            padding: [0; 96],
            checksum: 0,
        }
    }
}

/// 54-byte header
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
#[allow(missing_docs)]
pub struct Ps54Header {
    pub filename: [u8; 21],
    pub reserved: [u8; 33],
}

impl Default for Ps54Header {
    fn default() -> Self {
        Self {
            filename: [0; 21],
            reserved: [0; 33],
        }
    }
}

/// `SC` block: title and icon
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
#[allow(missing_docs)]
pub struct ScHeader {
    pub magic: [u8; 2],
    pub icon_flag: u8,
    pub blocks: u8,
    /// Shift-JIS, NUL-padded
    pub title: [u8; 64],
    pub reserved1: [u8; 12],
    pub pocket_mcicon: u16,
    pub pocket_magic: [u8; 4],
    pub pocket_apicon: u8,
    pub pocket_unknown: u8,
    pub reserved2: [u8; 8],
    /// BGR555
    pub palette: [u16; 16],
    /// 16x16, 4 bits per pixel
    pub icon_data: [[u8; 128]; 3],
}

impl Default for ScHeader {
    fn default() -> Self {
        Self {
            magic: SC_MAGIC,
            icon_flag: ICON_NONE,
            blocks: 1,
            title: [0; 64],
            reserved1: [0; 12],
            pocket_mcicon: 0,
            pocket_magic: [0; 4],
            pocket_apicon: 0,
            pocket_unknown: 0,
            reserved2: [0; 8],
            palette: [0; 16],
            icon_data: [[0; 128]; 3],
        }
    }
}

impl ScHeader {
    /// Parse an `SC` block and check its magic
    pub fn parse(data: &[u8]) -> Ps1SaveResult<Self> {
        let sc = Self::read(&mut std::io::Cursor::new(data))?;
        if sc.magic != SC_MAGIC {
            return Err(Ps1SaveError::UnknownFormat);
        }
        Ok(sc)
    }
}

impl BinaryFormat for ScHeader {
    fn parse(data: &[u8]) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self::parse(data)?)
    }

    fn build(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        Ok(write_record(self)?)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{assert_invalid_data_rejected, assert_round_trip};
    use std::io::Cursor;

    fn size_of<T>(value: &T) -> usize
    where
        T: for<'a> BinWrite<Args<'a> = ()> + binrw::meta::WriteEndian,
    {
        write_record(value).expect("write").len()
    }

    #[test]
    fn test_record_sizes() {
        assert_eq!(size_of(&PsvHeader::default()), PSV_HEADER_SIZE);
        assert_eq!(size_of(&BlockEntry::default()), BLOCK_ENTRY_SIZE);
        assert_eq!(size_of(&Ps54Header::default()), PS54_HEADER_SIZE);
        assert_eq!(size_of(&ScHeader::default()), SC_SIZE);
    }

    #[test]
    fn test_sc_round_trip() {
        let mut sc = ScHeader {
            icon_flag: ICON_ANIM_3,
            ..ScHeader::default()
        };
        sc.title[..4].copy_from_slice(&[0x82, 0x60, 0x82, 0x61]);
        sc.palette[1] = 0x7FFF;
        sc.icon_data[2][0] = 0x21;
        assert_round_trip!(sc.clone());

        let mut data = write_record(&sc).expect("write");
        data[1] = b'D';
        assert_invalid_data_rejected!(ScHeader, &data);
        assert_invalid_data_rejected!(ScHeader, &data[..SC_SIZE - 1]);
    }

    #[test]
    fn test_psv_filename_offset() {
        let mut psv = PsvHeader::default();
        psv.filename[0] = b'B';
        let mut cursor = Cursor::new(Vec::new());
        psv.write(&mut cursor).expect("write");
        assert_eq!(cursor.into_inner()[0x64], b'B');
    }

    #[test]
    fn test_detect() {
        let mut data = vec![0u8; 1024];
        data[..2].copy_from_slice(&SC_MAGIC);
        assert_eq!(SaveType::detect(&data, 8192), Some(SaveType::Raw));
        assert_eq!(SaveType::detect(&data, 8193), None);

        let mut data = vec![0u8; 1024];
        data[54..56].copy_from_slice(&SC_MAGIC);
        assert_eq!(SaveType::detect(&data, 8192 + 54), Some(SaveType::Ps54));
        assert_eq!(SaveType::detect(&data, 8192), None);

        // SC after a PSV-sized header commits to PSV
        let mut data = vec![0u8; 1024];
        data[0x84..0x86].copy_from_slice(&SC_MAGIC);
        data[..2].copy_from_slice(&SC_MAGIC);
        assert_eq!(SaveType::detect(&data, 8192), None);
        data[..8].copy_from_slice(&PSV_MAGIC);
        assert_eq!(SaveType::detect(&data, 8192), Some(SaveType::Psv));
    }

    #[test]
    fn test_detect_block_checksum() {
        let mut data = vec![0u8; 1024];
        data[0] = 0x51;
        data[10] = b'A';
        data[127] = 0x51 ^ b'A';
        data[128..130].copy_from_slice(&SC_MAGIC);
        assert_eq!(SaveType::detect(&data, 8320), Some(SaveType::Block));
        data[127] ^= 1;
        assert_eq!(SaveType::detect(&data, 8320), None);
        data[0] = 0x52;
        assert_eq!(SaveType::detect(&data, 8320), None);
    }

    #[test]
    fn test_icon_frames() {
        assert_eq!(icon_frames(ICON_NONE), None);
        assert_eq!(icon_frames(ICON_ALT_STATIC), Some((1, 0)));
        assert_eq!(icon_frames(ICON_ANIM_2), Some((2, 16)));
        assert_eq!(icon_frames(ICON_ALT_ANIM_3), Some((3, 11)));
        assert_eq!(icon_frames(0x14), None);
    }
}
