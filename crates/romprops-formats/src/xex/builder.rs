//! Builder for XEX2 (and XEX1) executables
//!
//! The image is a minimal PE header padded to 8 KiB, optionally followed by
//! an XDBF resource. It can be stored plain, with zero pages removed
//! (basic) or LZX-compressed in hashed blocks (normal), and optionally
//! encrypted with a title key. Signatures and page descriptors are left
//! zeroed.

use std::io::Cursor;

use binrw::BinWrite;
use romprops_crypto::aes128::encrypt_cbc;
use sha1::{Digest, Sha1};

use crate::lzx::lzx_compress;
use crate::pe::{MACHINE_POWERPC_BE, PeHeader, Subsystem};
use crate::title::{TitleId, Version};
use crate::xex::error::XexResult;
use crate::xex::header::{
    BLOCK_HEADER_SIZE, BlockHeader, COMPRESSION_BASIC, COMPRESSION_NONE, COMPRESSION_NORMAL,
    ENCRYPTION_NONE, ENCRYPTION_NORMAL, ExecutionId, MODULE_FLAG_TITLE, OPT_DISC_PROFILE_ID,
    OPT_EXECUTION_ID, OPT_FILE_FORMAT_INFO, OPT_GAME_RATINGS, OPT_IMPORT_LIBRARIES,
    OPT_ORIGINAL_PE_NAME, OPT_RESOURCE_INFO, OptionalHeader, REGION_FREE, ResourceInfo,
    SecurityInfoXex1, SecurityInfoXex2, XEX_HEADER_SIZE, XexHeader, XexType,
};
use crate::xex::loader::PE_HEADER_SIZE;

/// Load address used for built images
pub const BUILDER_LOAD_ADDRESS: u32 = 0x8200_0000;

const PAGE_SIZE: usize = 0x1000;
const MAX_CHUNK: usize = 0x8000;

/// How the image is encrypted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XexEncryption {
    /// Stored in the clear
    None,
    /// AES-128-CBC with `title_key`, which is stored encrypted with `common_key`
    Normal {
        /// Retail or debug common key
        common_key: [u8; 16],
        /// Plain title key
        title_key: [u8; 16],
    },
}

/// How the image is compressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XexCompression {
    /// Stored as-is
    None,
    /// All-zero pages removed
    Basic,
    /// LZX in hashed blocks
    Normal {
        /// LZX window size
        window_size: u32,
    },
}

/// Builder for XEX2 executables
#[derive(Debug, Clone)]
pub struct XexBuilder {
    xex_type: XexType,
    module_flags: u32,
    execution_id: ExecutionId,
    security: SecurityInfoXex2,
    pe_header: PeHeader,
    original_pe_name: Option<String>,
    ratings: Option<[u8; 64]>,
    disc_profile_id: Option<[u8; 16]>,
    import_min_versions: Vec<Version>,
    xdbf: Option<Vec<u8>>,
    encryption: XexEncryption,
    compression: XexCompression,
}

impl XexBuilder {
    /// Unencrypted, uncompressed title executable
    pub fn new(title_id: TitleId) -> Self {
        let security = SecurityInfoXex2 {
            load_address: BUILDER_LOAD_ADDRESS,
            region_code: REGION_FREE,
            ..SecurityInfoXex2::default()
        };
        Self {
            xex_type: XexType::Xex2,
            module_flags: MODULE_FLAG_TITLE,
            execution_id: ExecutionId {
                media_id: 0,
                version: Version(0),
                base_version: Version(0),
                title_id,
                platform: 0,
                exec_type: 0,
                disc_number: 1,
                disc_count: 1,
                savegame_id: 0,
            },
            security,
            pe_header: PeHeader {
                machine: MACHINE_POWERPC_BE,
                number_of_sections: 1,
                timestamp: 0,
                characteristics: 0x0102,
                subsystem: Some(Subsystem {
                    magic: 0x10B,
                    id: 14,
                    major: 2,
                    minor: 0,
                }),
            },
            original_pe_name: None,
            ratings: None,
            disc_profile_id: None,
            import_min_versions: Vec::new(),
            xdbf: None,
            encryption: XexEncryption::None,
            compression: XexCompression::None,
        }
    }

    /// Write an `XEX1` header and security info instead of `XEX2`
    pub fn xex_type(mut self, xex_type: XexType) -> Self {
        self.xex_type = xex_type;
        self
    }

    /// Set the module flags
    pub fn module_flags(mut self, flags: u32) -> Self {
        self.module_flags = flags;
        self
    }

    /// Set the version and base version
    pub fn version(mut self, version: Version, base_version: Version) -> Self {
        self.execution_id.version = version;
        self.execution_id.base_version = base_version;
        self
    }

    /// Set the disc number and count
    pub fn disc(mut self, number: u8, count: u8) -> Self {
        self.execution_id.disc_number = number;
        self.execution_id.disc_count = count;
        self
    }

    /// Set the image flags
    pub fn image_flags(mut self, flags: u32) -> Self {
        self.security.image_flags = flags;
        self
    }

    /// Set the region code
    pub fn region_code(mut self, region: u32) -> Self {
        self.security.region_code = region;
        self
    }

    /// Set the allowed media types
    pub fn allowed_media_types(mut self, media: u32) -> Self {
        self.security.allowed_media_types = media;
        self
    }

    /// Set the XGD2 media ID
    pub fn media_id(mut self, media_id: [u8; 16]) -> Self {
        self.security.xgd2_media_id = media_id;
        self
    }

    /// Set the disc profile ID
    pub fn disc_profile_id(mut self, id: [u8; 16]) -> Self {
        self.disc_profile_id = Some(id);
        self
    }

    /// Set the original PE file name
    pub fn original_pe_name(mut self, name: &str) -> Self {
        self.original_pe_name = Some(name.to_string());
        self
    }

    /// Set the rating bytes (one per board, 0xFF = unrated)
    pub fn ratings(mut self, ratings: &[u8]) -> Self {
        let mut all = [0xFFu8; 64];
        let n = ratings.len().min(all.len());
        all[..n].copy_from_slice(&ratings[..n]);
        self.ratings = Some(all);
        self
    }

    /// Add an import library with the given minimum version
    pub fn import_library(mut self, version_min: Version) -> Self {
        self.import_min_versions.push(version_min);
        self
    }

    /// Replace the PE header
    pub fn pe_header(mut self, header: PeHeader) -> Self {
        self.pe_header = header;
        self
    }

    /// Embed an XDBF resource named after the title ID
    pub fn xdbf(mut self, data: Vec<u8>) -> Self {
        self.xdbf = Some(data);
        self
    }

    /// Set the encryption
    pub fn encryption(mut self, encryption: XexEncryption) -> Self {
        self.encryption = encryption;
        self
    }

    /// Set the compression
    pub fn compression(mut self, compression: XexCompression) -> Self {
        self.compression = compression;
        self
    }

    fn build_image(&self) -> XexResult<(Vec<u8>, Option<ResourceInfo>)> {
        let mut image = self.pe_header.to_bytes()?;
        image.resize(PE_HEADER_SIZE, 0);
        let resource = match &self.xdbf {
            Some(xdbf) => {
                let offset = image.len();
                image.extend_from_slice(xdbf);
                let mut resource_id = [0u8; 8];
                resource_id
                    .copy_from_slice(format!("{:08X}", self.execution_id.title_id.0).as_bytes());
                Some(ResourceInfo {
                    resource_id,
                    vaddr: self.security.load_address + offset as u32,
                    size: xdbf.len() as u32,
                })
            }
            None => None,
        };
        image.resize(image.len().div_ceil(PAGE_SIZE) * PAGE_SIZE, 0);
        Ok((image, resource))
    }

    /// Stored data and the compression-specific part of the file format info
    fn compress(&self, image: &[u8]) -> XexResult<(Vec<u8>, u16, Vec<u8>)> {
        match self.compression {
            XexCompression::None => Ok((image.to_vec(), COMPRESSION_NONE, Vec::new())),
            XexCompression::Basic => {
                let mut stored = Vec::new();
                let mut segments: Vec<(u32, u32)> = Vec::new();
                for page in image.chunks(PAGE_SIZE) {
                    let len = page.len() as u32;
                    if page.iter().all(|&b| b == 0) {
                        match segments.last_mut() {
                            Some(last) => last.1 += len,
                            None => segments.push((0, len)),
                        }
                    } else {
                        segments.push((len, 0));
                        stored.extend_from_slice(page);
                    }
                }
                let info = segments
                    .iter()
                    .flat_map(|&(d, z)| d.to_be_bytes().into_iter().chain(z.to_be_bytes()))
                    .collect();
                Ok((stored, COMPRESSION_BASIC, info))
            }
            XexCompression::Normal { window_size } => {
                let compressed = lzx_compress(image, window_size, None)?;
                let (first, stored) = chain_blocks(&compressed);
                let mut info = window_size.to_be_bytes().to_vec();
                info.extend_from_slice(&first.block_size.to_be_bytes());
                info.extend_from_slice(&first.sha1);
                Ok((stored, COMPRESSION_NORMAL, info))
            }
        }
    }

    /// Serialize the executable
    pub fn build(&self) -> XexResult<Vec<u8>> {
        let (image, resource) = self.build_image()?;
        let (mut stored, compression_type, compression_info) = self.compress(&image)?;

        let mut security = self.security.clone();
        security.image_size = image.len() as u32;
        let encryption_type = match self.encryption {
            XexEncryption::None => ENCRYPTION_NONE,
            XexEncryption::Normal {
                common_key,
                title_key,
            } => {
                stored.resize(stored.len().div_ceil(16) * 16, 0);
                encrypt_cbc(&title_key, &[0u8; 16], &mut stored)?;
                let mut wrapped = title_key;
                encrypt_cbc(&common_key, &[0u8; 16], &mut wrapped)?;
                security.title_key = wrapped;
                ENCRYPTION_NORMAL
            }
        };

        let mut ffi = Vec::new();
        ffi.extend_from_slice(&((8 + compression_info.len()) as u32).to_be_bytes());
        ffi.extend_from_slice(&encryption_type.to_be_bytes());
        ffi.extend_from_slice(&compression_type.to_be_bytes());
        ffi.extend_from_slice(&compression_info);

        let mut blobs: Vec<(u32, Vec<u8>)> = vec![(OPT_FILE_FORMAT_INFO, ffi)];
        let mut exec = Cursor::new(Vec::new());
        self.execution_id.write(&mut exec)?;
        blobs.push((OPT_EXECUTION_ID, exec.into_inner()));
        if let Some(resource) = resource {
            let mut data = Cursor::new(Vec::new());
            20u32.write_be(&mut data)?;
            resource.write(&mut data)?;
            blobs.push((OPT_RESOURCE_INFO, data.into_inner()));
        }
        if let Some(name) = &self.original_pe_name {
            let mut data = vec![0u8; 4];
            data.extend_from_slice(name.as_bytes());
            data.push(0);
            data.resize(data.len().div_ceil(4) * 4, 0);
            let len = data.len() as u32;
            data[..4].copy_from_slice(&len.to_be_bytes());
            blobs.push((OPT_ORIGINAL_PE_NAME, data));
        }
        if !self.import_min_versions.is_empty() {
            blobs.push((OPT_IMPORT_LIBRARIES, self.import_libraries()));
        }
        if let Some(ratings) = self.ratings {
            blobs.push((OPT_GAME_RATINGS, ratings.to_vec()));
        }
        if let Some(id) = self.disc_profile_id {
            blobs.push((OPT_DISC_PROFILE_ID, id.to_vec()));
        }
        blobs.sort_by_key(|(id, _)| *id);

        // Header, table, security info, optional header data, image
        let table_end = XEX_HEADER_SIZE + blobs.len() * 8;
        let sec_info_offset = table_end.div_ceil(16) * 16;
        let sec_info_size = self.xex_type.security_info_size();
        let mut data_offset = sec_info_offset + sec_info_size;
        let mut table = Vec::with_capacity(blobs.len());
        let mut data_area = Vec::new();
        for (id, blob) in &blobs {
            table.push(OptionalHeader {
                id: *id,
                value: data_offset as u32,
            });
            data_area.extend_from_slice(blob);
            data_area.resize(data_area.len().div_ceil(4) * 4, 0);
            data_offset = sec_info_offset + sec_info_size + data_area.len();
        }
        let pe_offset = data_offset.div_ceil(PAGE_SIZE) * PAGE_SIZE;
        security.header_size = pe_offset as u32;

        let header = XexHeader {
            magic: self.xex_type.magic(),
            module_flags: self.module_flags,
            pe_offset: pe_offset as u32,
            reserved: 0,
            sec_info_offset: sec_info_offset as u32,
            opt_header_count: table.len() as u32,
        };

        let mut out = Cursor::new(Vec::new());
        header.write(&mut out)?;
        for entry in &table {
            entry.write(&mut out)?;
        }
        let mut out = out.into_inner();
        out.resize(sec_info_offset, 0);
        let mut cursor = Cursor::new(out);
        cursor.set_position(sec_info_offset as u64);
        match self.xex_type {
            XexType::Xex1 => SecurityInfoXex1::from(&security).write(&mut cursor)?,
            XexType::Xex2 => security.write(&mut cursor)?,
        }
        let mut out = cursor.into_inner();
        out.extend_from_slice(&data_area);
        out.resize(pe_offset, 0);
        out.extend_from_slice(&stored);
        Ok(out)
    }

    fn import_libraries(&self) -> Vec<u8> {
        let names = b"xboxkrnl.exe\0\0\0\0";
        let mut data = vec![0u8; 12];
        data[4..8].copy_from_slice(&(names.len() as u32).to_be_bytes());
        data[8..12].copy_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(names);
        for version in &self.import_min_versions {
            let mut entry = vec![0u8; 0x28];
            entry[..4].copy_from_slice(&0x28u32.to_be_bytes());
            entry[0x1C..0x20].copy_from_slice(&version.0.to_be_bytes());
            entry[0x20..0x24].copy_from_slice(&version.0.to_be_bytes());
            data.extend_from_slice(&entry);
        }
        // The last entry is never inspected
        data.extend_from_slice(&[0u8; 0x28]);
        let len = data.len() as u32;
        data[..4].copy_from_slice(&len.to_be_bytes());
        data
    }
}

/// Split `compressed` into a chain of hashed blocks, one chunk each
///
/// Returns the header of the first block and the blocks.
fn chain_blocks(compressed: &[u8]) -> (BlockHeader, Vec<u8>) {
    let mut next = BlockHeader::default();
    let mut blocks: Vec<Vec<u8>> = Vec::new();
    for chunk in compressed.chunks(MAX_CHUNK).rev() {
        let mut block = Vec::with_capacity(BLOCK_HEADER_SIZE + 2 + chunk.len());
        block.extend_from_slice(&next.block_size.to_be_bytes());
        block.extend_from_slice(&next.sha1);
        block.extend_from_slice(&(chunk.len() as u16).to_be_bytes());
        block.extend_from_slice(chunk);
        next = BlockHeader {
            block_size: block.len() as u32,
            sha1: Sha1::digest(&block).into(),
        };
        blocks.push(block);
    }
    blocks.reverse();
    (next, blocks.concat())
}

