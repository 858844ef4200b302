//! STFS block addressing and directory entries
//!
//! Data blocks are numbered without the hash blocks that are interleaved
//! with them on disk. [`data_block_to_phys`] adds the hash blocks back at
//! the three hash table levels; [`block_to_offset`] turns the physical
//! block number into a file offset.

use binrw::{BinRead, BinWrite};

use crate::stfs::header::StfsType;
use crate::text::trim_nul;

/// Size of an STFS block
pub const BLOCK_SIZE: u64 = 4096;
/// Size of a directory entry
pub const DIR_ENTRY_SIZE: usize = 0x40;

/// Data blocks covered by one level-0 hash table
pub const HASH_LEVEL0_SPAN: u32 = 0xAA;
/// Data blocks covered by one level-1 hash table
pub const HASH_LEVEL1_SPAN: u32 = 0x70E4;
/// Data blocks covered by one level-2 hash table
pub const HASH_LEVEL2_SPAN: u32 = 0x4A_F768;

/// Highest addressable block
pub const MAX_BLOCK: u32 = 0xFF_FFFF;

/// Start of block 0: the header size rounded up to a 4 KiB boundary
///
/// Only the low 16 bits of the rounded size are kept.
pub fn header_alignment(header_size: u32) -> u64 {
    u64::from(header_size.wrapping_add(0xFFF) & 0xF000)
}

/// File offset of a physical block, or `None` past the 24-bit block range
pub fn block_to_offset(block: u32, header_size: u32) -> Option<u64> {
    if block > MAX_BLOCK {
        return None;
    }
    Some(header_alignment(header_size) + u64::from(block) * BLOCK_SIZE)
}

/// Convert a data block number to a physical block number
///
/// Console-signed packages store two copies of each hash table unless the
/// header is 0xB000-aligned or bit 0 of `block_separation` is set, so their
/// hash block counts are doubled. The same shift is applied at all three
/// levels.
pub fn data_block_to_phys(
    block: u32,
    stfs_type: StfsType,
    header_size: u32,
    block_separation: u8,
) -> u32 {
    let shift = if header_alignment(header_size) == 0xB000 {
        1
    } else if block_separation & 1 == 1 {
        0
    } else {
        1
    };
    let scale = |span: u32| {
        let base = (block + span) / span;
        if stfs_type == StfsType::Con {
            base << shift
        } else {
            base
        }
    };

    let mut phys = block + scale(HASH_LEVEL0_SPAN);
    if block > HASH_LEVEL0_SPAN {
        phys += scale(HASH_LEVEL1_SPAN);
        if block > HASH_LEVEL1_SPAN {
            phys += scale(HASH_LEVEL2_SPAN);
        }
    }
    phys
}

/// 24-bit little-endian integer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, BinRead, BinWrite)]
pub struct U24Le(pub [u8; 3]);

impl U24Le {
    /// Value
    pub fn get(self) -> u32 {
        (u32::from(self.0[2]) << 16) | (u32::from(self.0[1]) << 8) | u32::from(self.0[0])
    }

    /// Encode the low 24 bits of `value`
    pub fn new(value: u32) -> Self {
        Self([value as u8, (value >> 8) as u8, (value >> 16) as u8])
    }
}

/// Flag in [`DirEntry::flags_len`]: entry is a directory
pub const DIR_FLAG_DIRECTORY: u8 = 0x80;
/// Flag in [`DirEntry::flags_len`]: blocks are consecutive
pub const DIR_FLAG_CONSECUTIVE: u8 = 0x40;

/// Directory entry
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct DirEntry {
    /// NUL-padded file name
    pub filename: [u8; 0x28],
    /// Flags (high two bits) and name length (low six bits)
    pub flags_len: u8,
    /// Allocated block count
    pub blocks: U24Le,
    /// Copy of the block count
    pub blocks2: U24Le,
    /// First data block
    pub block_number: U24Le,
    /// Parent directory index (-1 = root)
    pub path: i16,
    /// File size in bytes
    pub filesize: u32,
    /// Last update time (FAT format)
    pub update_time: u32,
    /// Last access time (FAT format)
    pub access_time: u32,
}

impl DirEntry {
    /// File entry in the root directory
    pub fn new_file(name: &str, block_number: u32, filesize: u32) -> Self {
        let mut filename = [0u8; 0x28];
        let n = name.len().min(filename.len());
        filename[..n].copy_from_slice(&name.as_bytes()[..n]);
        let blocks = u32::try_from(u64::from(filesize).div_ceil(BLOCK_SIZE)).unwrap_or(MAX_BLOCK);
        Self {
            filename,
            flags_len: DIR_FLAG_CONSECUTIVE | (n as u8 & 0x3F),
            blocks: U24Le::new(blocks),
            blocks2: U24Le::new(blocks),
            block_number: U24Le::new(block_number),
            path: -1,
            filesize,
            update_time: 0,
            access_time: 0,
        }
    }

    /// Whether this entry marks the end of the table
    pub fn is_terminator(&self) -> bool {
        self.filename[0] == 0
    }

    /// Whether this entry is a directory
    pub fn is_directory(&self) -> bool {
        self.flags_len & DIR_FLAG_DIRECTORY != 0
    }

    /// Length of the name
    pub fn name_len(&self) -> usize {
        usize::from(self.flags_len & 0x3F)
    }

    /// File name
    pub fn name(&self) -> String {
        String::from_utf8_lossy(trim_nul(&self.filename)).into_owned()
    }

    /// Whether this is the title's main executable (`default.xex` or `default.xexp`)
    pub fn is_default_xex(&self) -> bool {
        if self.is_directory() {
            return false;
        }
        let want: &[u8] = match self.name_len() {
            11 => b"default.xex",
            12 => b"default.xexp",
            _ => return false,
        };
        let name = trim_nul(&self.filename);
        name.eq_ignore_ascii_case(want)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    #[test]
    fn test_live_block_zero() {
        assert_eq!(data_block_to_phys(0, StfsType::Live, 0xAD0E, 0), 1);
        assert_eq!(block_to_offset(1, 0xAD0E), Some(0xC000));
        assert_eq!(block_to_offset(MAX_BLOCK + 1, 0xAD0E), None);
    }

    #[test]
    fn test_level0_boundary() {
        // Blocks 0..0xAA share the first hash block
        assert_eq!(data_block_to_phys(0xA9, StfsType::Live, 0x971A, 0), 0xAA);
        // Block 0xAA is after the second level-0 hash block
        assert_eq!(data_block_to_phys(0xAA, StfsType::Live, 0x971A, 0), 0xAC);
        // Level-1 tables start past 0xAA
        assert_eq!(data_block_to_phys(0xAB, StfsType::Live, 0x971A, 0), 0xAE);
    }

    #[test]
    fn test_console_shift() {
        // 0xB000-aligned header: shift regardless of block separation
        assert_eq!(data_block_to_phys(0, StfsType::Con, 0xAD0E, 1), 2);
        // Otherwise bit 0 of the separation disables the shift
        assert_eq!(data_block_to_phys(0, StfsType::Con, 0x971A, 1), 1);
        assert_eq!(data_block_to_phys(0, StfsType::Con, 0x971A, 0), 2);
    }

    #[test]
    fn test_dir_entry_layout() {
        let entry = DirEntry::new_file("default.xex", 0x010203, 0x1234);
        let mut cursor = Cursor::new(Vec::new());
        entry.write(&mut cursor).expect("write");
        let data = cursor.into_inner();
        assert_eq!(data.len(), DIR_ENTRY_SIZE);
        assert_eq!(data[0x28], 0x40 | 11);
        assert_eq!(&data[0x2F..0x32], &[0x03, 0x02, 0x01]);
        assert_eq!(&data[0x32..0x34], &[0xFF, 0xFF]);
        assert_eq!(&data[0x34..0x38], &0x1234u32.to_be_bytes());

        let parsed = DirEntry::read(&mut Cursor::new(&data)).expect("parse");
        assert_eq!(parsed.block_number.get(), 0x010203);
        assert!(parsed.is_default_xex());
    }

    #[test]
    fn test_default_xex_match() {
        assert!(DirEntry::new_file("DEFAULT.XEX", 0, 0).is_default_xex());
        assert!(DirEntry::new_file("default.xexp", 0, 0).is_default_xex());
        assert!(!DirEntry::new_file("default.xe", 0, 0).is_default_xex());
        let mut dir = DirEntry::new_file("default.xex", 0, 0);
        dir.flags_len |= DIR_FLAG_DIRECTORY;
        assert!(!dir.is_default_xex());
    }

    /// (type, header size, block separation, copies of each hash table)
    const LAYOUTS: [(StfsType, u32, u8, u32); 4] = [
        (StfsType::Live, 0x971A, 0, 1),
        (StfsType::Con, 0xAD0E, 1, 2),
        (StfsType::Con, 0x971A, 0, 2),
        (StfsType::Con, 0x971A, 1, 1),
    ];

    /// Hash blocks between data blocks `n - 1` and `n`
    fn hash_blocks_before(n: u32, copies: u32) -> u32 {
        // Level 1 and 2 tables are first counted one block past their span
        if n == HASH_LEVEL0_SPAN + 1 || n == HASH_LEVEL1_SPAN + 1 {
            return copies;
        }
        let tables = [HASH_LEVEL0_SPAN, HASH_LEVEL1_SPAN, HASH_LEVEL2_SPAN]
            .iter()
            .filter(|&&span| n % span == 0)
            .count() as u32;
        tables * copies
    }

    fn assert_hash_gaps(n: u32) {
        for (ty, header_size, sep, copies) in LAYOUTS {
            let prev = data_block_to_phys(n - 1, ty, header_size, sep);
            let phys = data_block_to_phys(n, ty, header_size, sep);
            assert_eq!(
                phys - prev - 1,
                hash_blocks_before(n, copies),
                "{ty:?} header {header_size:#X} separation {sep} block {n:#X}"
            );
        }
    }

    #[test]
    fn test_level_boundaries() {
        let blocks = [
            0, 0xA9, 0xAA, 0xAB, 0x70E3, 0x70E4, 0x70E5, 0x4A_F767, 0x4A_F768, 0x4A_F769,
        ];
        let live = [
            0x1, 0xAA, 0xAC, 0xAE, 0x718E, 0x7191, 0x7193, 0x4B_68F6, 0x4B_68FA, 0x4B_68FB,
        ];
        let con_doubled = [
            0x2, 0xAB, 0xAE, 0xB1, 0x7239, 0x723E, 0x7241, 0x4B_DA85, 0x4B_DA8C, 0x4B_DA8D,
        ];
        for (i, &n) in blocks.iter().enumerate() {
            assert_eq!(data_block_to_phys(n, StfsType::Live, 0x971A, 0), live[i]);
            assert_eq!(data_block_to_phys(n, StfsType::Live, 0xAD0E, 0), live[i]);
            assert_eq!(data_block_to_phys(n, StfsType::Con, 0x971A, 1), live[i]);
            // The level-2 count is doubled too, like the lower levels
            assert_eq!(data_block_to_phys(n, StfsType::Con, 0xAD0E, 1), con_doubled[i]);
            assert_eq!(data_block_to_phys(n, StfsType::Con, 0x971A, 0), con_doubled[i]);
        }
    }

    #[test]
    fn test_data_blocks_skip_hash_slots() {
        for n in 1..=HASH_LEVEL1_SPAN * 2 + 2 {
            assert_hash_gaps(n);
        }
        for n in HASH_LEVEL2_SPAN - 2..=HASH_LEVEL2_SPAN + 2 {
            assert_hash_gaps(n);
        }
    }

    proptest! {
        #[test]
        fn prop_hash_slots_at_group_starts(group in 1u32..0x9000, delta in 0u32..3) {
            assert_hash_gaps(group * HASH_LEVEL0_SPAN + delta);
        }

        #[test]
        fn prop_phys_strictly_increasing(
            n in 0u32..0x60_0000,
            con in any::<bool>(),
            sep in 0u8..2,
        ) {
            let ty = if con { StfsType::Con } else { StfsType::Live };
            let a = data_block_to_phys(n, ty, 0x971A, sep);
            let b = data_block_to_phys(n + 1, ty, 0x971A, sep);
            prop_assert!(b > a);
            prop_assert!(a > n);
        }
    }
}
