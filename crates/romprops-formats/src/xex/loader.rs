//! Locating the PE image inside an executable
//!
//! The image may be encrypted with a per-title key, which is itself
//! encrypted with a retail or an all-zero debug key. Both candidates are
//! tried: for uncompressed and basic images the first candidate that
//! yields an `MZ` signature wins; for LZX images the block chain is walked
//! and an implausible block size switches to the other candidate and
//! starts over.

use std::io::{Cursor, Read, Seek, SeekFrom};

use binrw::BinRead;
use romprops_crypto::aes128::decrypt_cbc;
use romprops_crypto::{CbcReader, KeyProvider};
use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use crate::xex::error::{XexError, XexResult};
use crate::xex::header::{BLOCK_HEADER_SIZE, BasicSegment, BlockHeader, IMAGE_FLAG_CARDEA_KEY};

/// Key name for XEX1 (Cardea) executables
pub const XEX1_KEY_NAME: &str = "xbox360-xex1";
/// Key name for XEX2 executables
pub const XEX2_KEY_NAME: &str = "xbox360-xex2";

/// Verification block for the XEX1 key
pub const XEX1_VERIFY_DATA: [u8; 16] = [
    0xB9, 0x41, 0x44, 0x80, 0xA4, 0xE1, 0x94, 0x82, 0xA2, 0x9B, 0xCD, 0x7E, 0xC4, 0x68, 0xB8, 0xF0,
];
/// Verification block for the XEX2 key
pub const XEX2_VERIFY_DATA: [u8; 16] = [
    0xAC, 0xA0, 0xC9, 0xE3, 0x78, 0xD3, 0xC6, 0x54, 0xA3, 0x1D, 0x65, 0x67, 0x38, 0xAB, 0xB0, 0x6B,
];

/// Key used on development kits
pub const DEBUG_KEY: [u8; 16] = [0; 16];

/// Largest plausible LZX block
pub const MAX_BLOCK_SIZE: u32 = 65536;
/// Largest compressed file or decompressed image handled
pub const MAX_LZX_IMAGE: u64 = 64 * 1024 * 1024;
/// Bytes of the image handed to the PE header reader
pub const PE_HEADER_SIZE: usize = 8192;

/// Which key decrypted the image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySlot {
    /// Retail common key
    Retail,
    /// All-zero debug key
    Debug,
}

impl KeySlot {
    fn from_index(index: usize) -> Self {
        if index == 0 { Self::Retail } else { Self::Debug }
    }
}

/// Key name and verification block for an executable's image flags
///
/// Only the Cardea flag picks the XEX1 key, whatever the header magic.
pub fn key_for(image_flags: u32) -> (&'static str, &'static [u8; 16]) {
    if image_flags & IMAGE_FLAG_CARDEA_KEY != 0 {
        (XEX1_KEY_NAME, &XEX1_VERIFY_DATA)
    } else {
        (XEX2_KEY_NAME, &XEX2_VERIFY_DATA)
    }
}

/// Decrypt the title key with a common key
pub fn decrypt_title_key(common_key: &[u8; 16], title_key: &[u8; 16]) -> XexResult<[u8; 16]> {
    let mut key = *title_key;
    decrypt_cbc(common_key, &[0u8; 16], &mut key)?;
    Ok(key)
}

/// Candidate image readers: `[retail or plain, debug]`
pub type Candidates<R> = [Option<CbcReader<R>>; 2];

/// Build the candidate readers over `[pe_offset, pe_offset + pe_length)`
///
/// Unencrypted images get a single pass-through reader. Encrypted images
/// get a retail candidate when the provider has a verified key, and always
/// a debug candidate.
pub fn candidate_readers<R: Read + Seek + Clone>(
    file: &R,
    pe_offset: u64,
    pe_length: u64,
    encrypted: bool,
    encrypted_title_key: &[u8; 16],
    key: (&str, &[u8; 16]),
    keys: &dyn KeyProvider,
) -> XexResult<Candidates<R>> {
    if !encrypted {
        return Ok([
            Some(CbcReader::new(file.clone(), pe_offset, pe_length, None, None)),
            None,
        ]);
    }

    let (name, verify_data) = key;
    let retail = match keys.get_and_verify(name, verify_data) {
        Ok(common) => Some(common),
        Err(result) => {
            debug!("XEX: {name}: {result}, trying the debug key only");
            None
        }
    };

    let mut candidates: Candidates<R> = [None, None];
    for (slot, common) in [retail, Some(DEBUG_KEY)].into_iter().enumerate() {
        let Some(common) = common else {
            continue;
        };
        let title_key = decrypt_title_key(&common, encrypted_title_key)?;
        candidates[slot] = Some(CbcReader::new(
            file.clone(),
            pe_offset,
            pe_length,
            Some(&title_key),
            None,
        ));
    }
    Ok(candidates)
}

/// Index of the first candidate whose stream starts with `MZ`
pub fn find_mz<R: Read + Seek>(candidates: &mut [Option<R>; 2]) -> Option<usize> {
    candidates.iter_mut().enumerate().find_map(|(i, reader)| {
        let reader = reader.as_mut()?;
        let mut mz = [0u8; 2];
        reader.seek(SeekFrom::Start(0)).ok()?;
        reader.read_exact(&mut mz).ok()?;
        (&mz == b"MZ").then_some(i)
    })
}

/// Walk the LZX block chain, returning the candidate used and the joined chunks
///
/// Each block starts with the header of the next block; the rest is a
/// sequence of big-endian 16-bit chunk sizes followed by chunk data. A
/// next-block size above [`MAX_BLOCK_SIZE`] means the candidate key is
/// wrong: the other candidate is tried from the first block.
pub fn deblock<R: Read + Seek>(
    candidates: &mut [Option<R>; 2],
    first_block: BlockHeader,
    capacity: usize,
) -> XexResult<(usize, Vec<u8>)> {
    let mut idx = if candidates[0].is_some() { 0 } else { 1 };
    'restart: loop {
        let Some(reader) = candidates[idx].as_mut() else {
            return Err(XexError::NotAnExecutable);
        };
        reader.seek(SeekFrom::Start(0))?;
        let mut out = Vec::new();
        let mut current = first_block;

        while current.block_size != 0 {
            if current.block_size as usize <= BLOCK_HEADER_SIZE
                || current.block_size > MAX_BLOCK_SIZE
            {
                return Err(XexError::InvalidBlock(current.block_size));
            }
            let mut block = vec![0u8; current.block_size as usize];
            reader.read_exact(&mut block)?;

            let next = BlockHeader::read(&mut Cursor::new(&block[..BLOCK_HEADER_SIZE]))?;
            if next.block_size > MAX_BLOCK_SIZE {
                if idx == 1 || candidates[1].is_none() {
                    return Err(XexError::InvalidBlock(next.block_size));
                }
                debug!(
                    "XEX: block size {} with the retail key, restarting with the debug key",
                    next.block_size
                );
                candidates[0] = None;
                idx = 1;
                continue 'restart;
            }

            let digest: [u8; 20] = Sha1::digest(&block).into();
            if digest != current.sha1 {
                warn!("XEX: SHA-1 mismatch in compressed block at 0x{:X}", out.len());
            }

            let mut rest = &block[BLOCK_HEADER_SIZE..];
            while rest.len() > 2 {
                let chunk = usize::from(u16::from_be_bytes([rest[0], rest[1]]));
                rest = &rest[2..];
                if chunk == 0 || chunk > rest.len() {
                    break;
                }
                if out.len() + chunk >= capacity {
                    return Err(XexError::DeblockOverflow(capacity));
                }
                out.extend_from_slice(&rest[..chunk]);
                rest = &rest[chunk..];
            }
            current = next;
        }
        return Ok((idx, out));
    }
}

/// Map an image offset to the stored data of a basic-compressed image
pub fn basic_physical_address(segments: &[BasicSegment], addr: u32) -> u32 {
    segments
        .iter()
        .find(|s| addr >= s.vaddr && addr < s.vaddr.wrapping_add(s.length))
        .map_or(addr, |s| addr - (s.vaddr - s.physaddr))
}

/// What was recovered from the image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeImage {
    /// Key that decrypted the image; `None` if it is not encrypted
    pub key: Option<KeySlot>,
    /// Start of the image, for the PE header reader
    pub header: Vec<u8>,
    /// Embedded XDBF resource, if one was found
    pub xdbf: Option<Vec<u8>>,
}

impl PeImage {
    /// Record which candidate won
    pub fn key_from(encrypted: bool, index: usize) -> Option<KeySlot> {
        encrypted.then(|| KeySlot::from_index(index))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Block chain of `payloads`, one chunk per block, returning the first header
    fn chain(payloads: &[&[u8]]) -> (BlockHeader, Vec<u8>) {
        let mut next = BlockHeader::default();
        let mut blocks: Vec<Vec<u8>> = Vec::new();
        for payload in payloads.iter().rev() {
            let mut block = Vec::new();
            block.extend_from_slice(&next.block_size.to_be_bytes());
            block.extend_from_slice(&next.sha1);
            block.extend_from_slice(&(payload.len() as u16).to_be_bytes());
            block.extend_from_slice(payload);
            next = BlockHeader {
                block_size: block.len() as u32,
                sha1: Sha1::digest(&block).into(),
            };
            blocks.push(block);
        }
        blocks.reverse();
        (next, blocks.concat())
    }

    #[test]
    fn test_deblock_joins_chunks() {
        let (first, data) = chain(&[b"hello ", b"world"]);
        let mut candidates = [Some(Cursor::new(data)), None];
        let (idx, out) = deblock(&mut candidates, first, 1024).expect("deblock");
        assert_eq!(idx, 0);
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn test_deblock_restarts_with_other_candidate() {
        let (first, good) = chain(&[b"first block", b"second block"]);

        // Same first block size, but the embedded next header claims 70000 bytes
        let mut bad = good.clone();
        bad[..4].copy_from_slice(&70000u32.to_be_bytes());

        let mut candidates = [Some(Cursor::new(bad)), Some(Cursor::new(good))];
        let (idx, out) = deblock(&mut candidates, first, 1024).expect("deblock");
        assert_eq!(idx, 1);
        assert!(candidates[0].is_none());
        assert_eq!(out, b"first blocksecond block");
    }

    #[test]
    fn test_deblock_fails_without_fallback() {
        let (first, mut data) = chain(&[b"abc", b"def"]);
        data[..4].copy_from_slice(&70000u32.to_be_bytes());
        let mut candidates = [Some(Cursor::new(data)), None];
        assert!(matches!(
            deblock(&mut candidates, first, 1024),
            Err(XexError::InvalidBlock(70000))
        ));
    }

    #[test]
    fn test_deblock_capacity() {
        let (first, data) = chain(&[&[7u8; 64]]);
        let mut candidates = [Some(Cursor::new(data)), None];
        assert!(matches!(
            deblock(&mut candidates, first, 64),
            Err(XexError::DeblockOverflow(64))
        ));
    }

    #[test]
    fn test_find_mz() {
        let mut candidates = [
            Some(Cursor::new(b"XX..".to_vec())),
            Some(Cursor::new(b"MZ..".to_vec())),
        ];
        assert_eq!(find_mz(&mut candidates), Some(1));
        let mut none: [Option<Cursor<Vec<u8>>>; 2] = [None, Some(Cursor::new(vec![b'M']))];
        assert_eq!(find_mz(&mut none), None);
    }

    #[test]
    fn test_basic_physical_address() {
        let segments = [
            BasicSegment {
                vaddr: 0,
                physaddr: 0,
                length: 0x1000,
            },
            BasicSegment {
                vaddr: 0x3000,
                physaddr: 0x1000,
                length: 0x2000,
            },
        ];
        assert_eq!(basic_physical_address(&segments, 0x10), 0x10);
        assert_eq!(basic_physical_address(&segments, 0x3800), 0x1800);
        // Inside a zero run: left as-is
        assert_eq!(basic_physical_address(&segments, 0x2000), 0x2000);
    }

    #[test]
    fn test_key_selection() {
        assert_eq!(key_for(0).0, XEX2_KEY_NAME);
        assert_eq!(key_for(IMAGE_FLAG_CARDEA_KEY).0, XEX1_KEY_NAME);
        assert_eq!(key_for(IMAGE_FLAG_CARDEA_KEY | 1).1, &XEX1_VERIFY_DATA);
    }
}
