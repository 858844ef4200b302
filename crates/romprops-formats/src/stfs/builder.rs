//! Builder for STFS packages
//!
//! Produces a package with a 0xB000-aligned header, the file table at data
//! block 0 and each file in the data blocks that follow. Hash tables are
//! left zeroed and the signature is not computed.

use std::io::Cursor;

use binrw::BinWrite;

use crate::language::Language;
use crate::stfs::error::{StfsError, StfsResult};
use crate::stfs::file_table::{
    BLOCK_SIZE, DIR_ENTRY_SIZE, DirEntry, block_to_offset, data_block_to_phys, header_alignment,
};
use crate::stfs::header::{
    CONSOLE_TYPE_RETAIL, ConsoleSignature, MsSignature, PackageHeader, StfsType,
};
use crate::stfs::metadata::{
    PackageMetadata, PackageThumbnails, THUMBNAILS_ADDRESS, U24Be, VolumeDescriptor,
};
use crate::title::{TitleId, Version};

/// Header size used for built packages; rounds up to 0xB000
pub const BUILDER_HEADER_SIZE: u32 = 0xAD0E;

/// Builder for STFS packages
#[derive(Debug, Clone)]
pub struct StfsBuilder {
    header: PackageHeader,
    metadata: PackageMetadata,
    thumbnails: PackageThumbnails,
    files: Vec<(String, Vec<u8>)>,
}

impl StfsBuilder {
    /// Start a package of the given type
    ///
    /// Console-signed packages get a retail certificate with a fixed
    /// datestamp.
    pub fn new(stfs_type: StfsType, content_type: u32, title_id: TitleId) -> Self {
        let header = match stfs_type {
            StfsType::Con => PackageHeader::Console(ConsoleSignature::new(
                [0; 5],
                "X000000-000",
                CONSOLE_TYPE_RETAIL,
                *b"01-01-10",
            )),
            StfsType::Pirs => PackageHeader::Pirs(MsSignature::default()),
            StfsType::Live => PackageHeader::Live(MsSignature::default()),
        };
        Self {
            header,
            metadata: PackageMetadata::new(content_type, title_id, BUILDER_HEADER_SIZE),
            thumbnails: PackageThumbnails::new(&[], &[], 2),
            files: Vec::new(),
        }
    }

    /// Replace the package header
    pub fn header(mut self, header: PackageHeader) -> Self {
        self.header = header;
        self
    }

    /// Direct access to the metadata
    pub fn metadata_mut(&mut self) -> &mut PackageMetadata {
        &mut self.metadata
    }

    /// Set a display name
    pub fn display_name(mut self, lang: Language, name: &str) -> Self {
        self.metadata.set_display_name(lang, name);
        self
    }

    /// Set a display description
    pub fn display_description(mut self, lang: Language, text: &str) -> Self {
        self.metadata.set_display_description(lang, text);
        self
    }

    /// Set the title name
    pub fn title_name(mut self, name: &str) -> Self {
        self.metadata.set_title_name(name);
        self
    }

    /// Set the publisher name
    pub fn publisher_name(mut self, name: &str) -> Self {
        self.metadata.set_publisher_name(name);
        self
    }

    /// Set the version
    pub fn version(mut self, version: Version) -> Self {
        self.metadata.version = version;
        self
    }

    /// Set the media ID
    pub fn media_id(mut self, media_id: u32) -> Self {
        self.metadata.media_id = media_id;
        self
    }

    /// Set the package and title thumbnails (PNG files)
    pub fn thumbnails(mut self, thumbnail: &[u8], title_thumbnail: &[u8]) -> Self {
        self.thumbnails =
            PackageThumbnails::new(thumbnail, title_thumbnail, self.metadata.metadata_version);
        self
    }

    /// Add a file to the root directory
    pub fn add_file(mut self, name: &str, data: Vec<u8>) -> Self {
        self.files.push((name.to_string(), data));
        self
    }

    fn blocks_for(len: usize) -> u32 {
        u32::try_from((len as u64).div_ceil(BLOCK_SIZE)).unwrap_or(u32::MAX)
    }

    /// Serialize the package
    pub fn build(&self) -> StfsResult<Vec<u8>> {
        let stfs_type = self.header.stfs_type();
        let table_blocks = Self::blocks_for((self.files.len() + 1) * DIR_ENTRY_SIZE).max(1);

        // Lay out data blocks: file table first, then each file
        let mut entries = Vec::with_capacity(self.files.len());
        let mut next_block = table_blocks;
        let mut content_size = 0u64;
        for (name, data) in &self.files {
            let filesize =
                u32::try_from(data.len()).map_err(|_| StfsError::BlockOutOfRange(u32::MAX))?;
            entries.push(DirEntry::new_file(name, next_block, filesize));
            next_block += Self::blocks_for(data.len());
            content_size += data.len() as u64;
        }

        let mut metadata = self.metadata.clone();
        metadata.header_size = BUILDER_HEADER_SIZE;
        metadata.content_size = content_size;
        metadata.volume_descriptor = match metadata.volume_descriptor {
            VolumeDescriptor::Stfs(mut desc) => {
                desc.file_table_block_count = i16::try_from(table_blocks)
                    .map_err(|_| StfsError::InvalidFileTable(table_blocks as i32))?;
                desc.file_table_block_number = U24Be::new(0);
                desc.total_alloc_block_count = next_block;
                VolumeDescriptor::Stfs(desc)
            }
            svod @ VolumeDescriptor::Svod(_) => svod,
        };
        let separation = metadata
            .volume_descriptor
            .as_stfs()
            .map_or(0, |d| d.block_separation);

        let mut cursor = Cursor::new(Vec::new());
        self.header.write(&mut cursor)?;
        metadata.write(&mut cursor)?;
        debug_assert_eq!(cursor.position(), THUMBNAILS_ADDRESS);
        self.thumbnails.write(&mut cursor)?;
        let mut out = cursor.into_inner();
        out.resize(header_alignment(BUILDER_HEADER_SIZE) as usize, 0);

        let mut table = Cursor::new(Vec::new());
        for entry in &entries {
            entry.write(&mut table)?;
        }
        let mut table = table.into_inner();
        table.resize(table_blocks as usize * BLOCK_SIZE as usize, 0);
        let mut data_blocks: Vec<(u32, &[u8])> = Vec::new();
        push_blocks(&mut data_blocks, 0, &table);
        for (entry, (_, data)) in entries.iter().zip(&self.files) {
            push_blocks(&mut data_blocks, entry.block_number.get(), data);
        }

        for (block, chunk) in data_blocks {
            let phys = data_block_to_phys(block, stfs_type, BUILDER_HEADER_SIZE, separation);
            let offset = block_to_offset(phys, BUILDER_HEADER_SIZE)
                .ok_or(StfsError::BlockOutOfRange(phys))?;
            let start = usize::try_from(offset).map_err(|_| StfsError::BlockOutOfRange(phys))?;
            let end = start + BLOCK_SIZE as usize;
            if out.len() < end {
                out.resize(end, 0);
            }
            out[start..start + chunk.len()].copy_from_slice(chunk);
        }
        Ok(out)
    }
}

fn push_blocks<'a>(blocks: &mut Vec<(u32, &'a [u8])>, first: u32, data: &'a [u8]) {
    for (i, chunk) in data.chunks(BLOCK_SIZE as usize).enumerate() {
        blocks.push((first + i as u32, chunk));
    }
}
