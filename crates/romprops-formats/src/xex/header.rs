//! XEX header, optional header table and security info
//!
//! All structures are big-endian. The header is followed by the optional
//! header table; the security info lives at `sec_info_offset` and has a
//! different layout for XEX1 and XEX2.

use binrw::{BinRead, BinWrite};

use crate::title::{TitleId, Version};
use crate::{BinaryFormat, write_record};
use crate::xex::error::{XexError, XexResult};

/// Size of the fixed header
pub const XEX_HEADER_SIZE: usize = 24;
/// Bytes read from the start of the file on open
pub const HEADER_READ_SIZE: usize = 2048;
/// Optional headers beyond this count are ignored
pub const MAX_OPTIONAL_HEADERS: u32 = 64;
/// Size of an optional header table entry
pub const OPTIONAL_HEADER_SIZE: usize = 8;

/// Module flag: title module
pub const MODULE_FLAG_TITLE: u32 = 0x0000_0001;
/// Module flag: exports to title
pub const MODULE_FLAG_EXPORTS_TO_TITLE: u32 = 0x0000_0002;
/// Module flag: system debugger
pub const MODULE_FLAG_SYSTEM_DEBUGGER: u32 = 0x0000_0004;
/// Module flag: DLL
pub const MODULE_FLAG_DLL: u32 = 0x0000_0008;
/// Module flag: module patch
pub const MODULE_FLAG_MODULE_PATCH: u32 = 0x0000_0010;
/// Module flag: full patch
pub const MODULE_FLAG_PATCH_FULL: u32 = 0x0000_0020;
/// Module flag: delta patch
pub const MODULE_FLAG_PATCH_DELTA: u32 = 0x0000_0040;
/// Module flag: user mode
pub const MODULE_FLAG_USER_MODE: u32 = 0x0000_0080;

/// Image flag: XGD2 media only
pub const IMAGE_FLAG_XGD2_MEDIA_ONLY: u32 = 1 << 3;
/// Image flag: title uses the XEX1 (Cardea) key
pub const IMAGE_FLAG_CARDEA_KEY: u32 = 1 << 8;

/// Region code: North America
pub const REGION_NTSC_U: u32 = 0x0000_00FF;
/// Region code: Japan
pub const REGION_NTSC_J_JAPAN: u32 = 0x0000_0100;
/// Region code: China
pub const REGION_NTSC_J_CHINA: u32 = 0x0000_0200;
/// Region code: rest of Asia
pub const REGION_NTSC_J_OTHER: u32 = 0x0000_FC00;
/// Region code: Australia and New Zealand
pub const REGION_PAL_AU_NZ: u32 = 0x0001_0000;
/// Region code: rest of Europe
pub const REGION_PAL_OTHER: u32 = 0x00FE_0000;
/// All regions
pub const REGION_FREE: u32 = 0xFFFF_FFFF;

/// Optional header: resource table
pub const OPT_RESOURCE_INFO: u32 = 0x0000_02FF;
/// Optional header: encryption and compression parameters
pub const OPT_FILE_FORMAT_INFO: u32 = 0x0000_03FF;
/// Optional header: delta patch descriptor
pub const OPT_DELTA_PATCH_DESCRIPTOR: u32 = 0x0000_05FF;
/// Optional header: disc profile ID
pub const OPT_DISC_PROFILE_ID: u32 = 0x0000_4304;
/// Optional header: import libraries
pub const OPT_IMPORT_LIBRARIES: u32 = 0x0001_03FF;
/// Optional header: original PE file name
pub const OPT_ORIGINAL_PE_NAME: u32 = 0x0001_83FF;
/// Optional header: execution ID
pub const OPT_EXECUTION_ID: u32 = 0x0004_0006;
/// Optional header: game ratings
pub const OPT_GAME_RATINGS: u32 = 0x0004_0310;

/// Encryption type: none
pub const ENCRYPTION_NONE: u16 = 0;
/// Encryption type: AES-128-CBC with the title key
pub const ENCRYPTION_NORMAL: u16 = 1;

/// Compression type: none
pub const COMPRESSION_NONE: u16 = 0;
/// Compression type: zero runs removed
pub const COMPRESSION_BASIC: u16 = 1;
/// Compression type: LZX
pub const COMPRESSION_NORMAL: u16 = 2;
/// Compression type: delta patch
pub const COMPRESSION_DELTA: u16 = 3;

/// Executable format revision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XexType {
    /// Early (2005) executables
    Xex1,
    /// Retail executables
    Xex2,
}

impl XexType {
    /// Magic number
    pub fn magic(self) -> [u8; 4] {
        match self {
            Self::Xex1 => *b"XEX1",
            Self::Xex2 => *b"XEX2",
        }
    }

    /// `XEX1` or `XEX2`
    pub fn name(self) -> &'static str {
        match self {
            Self::Xex1 => "XEX1",
            Self::Xex2 => "XEX2",
        }
    }

    /// Size of the security info
    pub fn security_info_size(self) -> usize {
        match self {
            Self::Xex1 => 0x168,
            Self::Xex2 => 0x184,
        }
    }

    /// Type for a magic number
    pub fn from_magic(magic: &[u8]) -> Option<Self> {
        match magic {
            b"XEX1" => Some(Self::Xex1),
            b"XEX2" => Some(Self::Xex2),
            _ => None,
        }
    }
}

/// Fixed file header
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct XexHeader {
    /// `XEX1` or `XEX2`
    pub magic: [u8; 4],
    /// `MODULE_FLAG_*`
    pub module_flags: u32,
    /// Offset of the (possibly encrypted and compressed) PE image
    pub pe_offset: u32,
    /// Reserved
    pub reserved: u32,
    /// Offset of the security info
    pub sec_info_offset: u32,
    /// Number of optional header table entries
    pub opt_header_count: u32,
}

impl XexHeader {
    /// Parse the header and check its magic
    pub fn parse(data: &[u8]) -> XexResult<Self> {
        let header = Self::read(&mut std::io::Cursor::new(data))?;
        if header.xex_type().is_none() {
            return Err(XexError::InvalidMagic(header.magic));
        }
        Ok(header)
    }

    /// Format revision, `None` if the magic is not recognised
    pub fn xex_type(&self) -> Option<XexType> {
        XexType::from_magic(&self.magic)
    }

    /// Whether the module is any kind of patch
    pub fn is_patch(&self) -> bool {
        self.module_flags
            & (MODULE_FLAG_MODULE_PATCH | MODULE_FLAG_PATCH_FULL | MODULE_FLAG_PATCH_DELTA)
            != 0
    }

    /// Whether the module is a delta patch
    pub fn is_delta_patch(&self) -> bool {
        self.module_flags & MODULE_FLAG_PATCH_DELTA != 0
    }
}

impl BinaryFormat for XexHeader {
    fn parse(data: &[u8]) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self::parse(data)?)
    }

    fn build(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        Ok(write_record(self)?)
    }
}

/// Optional header table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct OptionalHeader {
    /// `OPT_*` identifier
    pub id: u32,
    /// Immediate value or file offset, depending on the ID
    pub value: u32,
}

/// How an optional header's data is stored, from the low byte of its ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionalHeaderKind {
    /// The table value is the data
    Immediate,
    /// One DWORD at the table offset
    Dword,
    /// A blob of this many bytes at the table offset
    Fixed(usize),
    /// A blob whose first DWORD is its size (including the DWORD)
    SizePrefixed,
}

impl OptionalHeaderKind {
    /// Storage kind for an optional header ID
    pub fn of(id: u32) -> Self {
        match id & 0xFF {
            0x00 => Self::Immediate,
            0x01 => Self::Dword,
            0xFF => Self::SizePrefixed,
            n => Self::Fixed(n as usize * 4),
        }
    }
}

/// XEX1 security info (0x168 bytes)
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
#[allow(missing_docs)]
pub struct SecurityInfoXex1 {
    pub header_size: u32,
    pub image_size: u32,
    pub rsa_signature: [u8; 0x100],
    pub unknown_108: u32,
    pub image_flags: u32,
    pub unknown_110: [u8; 32],
    pub load_address: u32,
    pub title_key: [u8; 16],
    pub xgd2_media_id: [u8; 16],
    pub region_code: u32,
    pub unknown_158: u32,
    pub unknown_vaddr: u32,
    pub allowed_media_types: u32,
    pub page_descriptor_count: u32,
}

/// XEX2 security info (0x184 bytes)
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
#[allow(missing_docs)]
pub struct SecurityInfoXex2 {
    pub header_size: u32,
    pub image_size: u32,
    pub rsa_signature: [u8; 0x100],
    pub unknown_108: u32,
    pub image_flags: u32,
    pub load_address: u32,
    pub section_sha1: [u8; 20],
    pub import_table_count: u32,
    pub import_table_sha1: [u8; 20],
    pub xgd2_media_id: [u8; 16],
    pub title_key: [u8; 16],
    pub export_table: u32,
    pub header_sha1: [u8; 20],
    pub region_code: u32,
    pub allowed_media_types: u32,
    pub page_descriptor_count: u32,
}

impl Default for SecurityInfoXex2 {
    fn default() -> Self {
        Self {
            header_size: 0,
            image_size: 0,
            rsa_signature: [0; 0x100],
            unknown_108: 0,
            image_flags: 0,
            load_address: 0,
            section_sha1: [0; 20],
            import_table_count: 0,
            import_table_sha1: [0; 20],
            xgd2_media_id: [0; 16],
            title_key: [0; 16],
            export_table: 0,
            header_sha1: [0; 20],
            region_code: 0,
            allowed_media_types: 0,
            page_descriptor_count: 0,
        }
    }
}

impl From<&SecurityInfoXex2> for SecurityInfoXex1 {
    fn from(info: &SecurityInfoXex2) -> Self {
        Self {
            header_size: info.header_size,
            image_size: info.image_size,
            rsa_signature: info.rsa_signature,
            unknown_108: info.unknown_108,
            image_flags: info.image_flags,
            unknown_110: [0; 32],
            load_address: info.load_address,
            title_key: info.title_key,
            xgd2_media_id: info.xgd2_media_id,
            region_code: info.region_code,
            unknown_158: 0,
            unknown_vaddr: 0,
            allowed_media_types: info.allowed_media_types,
            page_descriptor_count: info.page_descriptor_count,
        }
    }
}

/// Security info, selected by the header magic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityInfo {
    /// XEX1 layout
    Xex1(Box<SecurityInfoXex1>),
    /// XEX2 layout
    Xex2(Box<SecurityInfoXex2>),
}

impl SecurityInfo {
    /// Parse the layout for `xex_type` from the start of `data`
    pub fn parse(xex_type: XexType, data: &[u8]) -> XexResult<Self> {
        let mut cursor = std::io::Cursor::new(data);
        Ok(match xex_type {
            XexType::Xex1 => Self::Xex1(Box::new(SecurityInfoXex1::read(&mut cursor)?)),
            XexType::Xex2 => Self::Xex2(Box::new(SecurityInfoXex2::read(&mut cursor)?)),
        })
    }

    /// Uncompressed image size
    pub fn image_size(&self) -> u32 {
        match self {
            Self::Xex1(s) => s.image_size,
            Self::Xex2(s) => s.image_size,
        }
    }

    /// Image flags, at 0x10C in both layouts
    pub fn image_flags(&self) -> u32 {
        match self {
            Self::Xex1(s) => s.image_flags,
            Self::Xex2(s) => s.image_flags,
        }
    }

    /// Virtual address the image is loaded at
    pub fn load_address(&self) -> u32 {
        match self {
            Self::Xex1(s) => s.load_address,
            Self::Xex2(s) => s.load_address,
        }
    }

    /// Encrypted title key
    pub fn title_key(&self) -> &[u8; 16] {
        match self {
            Self::Xex1(s) => &s.title_key,
            Self::Xex2(s) => &s.title_key,
        }
    }

    /// XGD2 media ID
    pub fn media_id(&self) -> &[u8; 16] {
        match self {
            Self::Xex1(s) => &s.xgd2_media_id,
            Self::Xex2(s) => &s.xgd2_media_id,
        }
    }

    /// `REGION_*` bits
    pub fn region_code(&self) -> u32 {
        match self {
            Self::Xex1(s) => s.region_code,
            Self::Xex2(s) => s.region_code,
        }
    }

    /// Bit `n` set allows media type `n`
    pub fn allowed_media_types(&self) -> u32 {
        match self {
            Self::Xex1(s) => s.allowed_media_types,
            Self::Xex2(s) => s.allowed_media_types,
        }
    }
}

/// Execution ID optional header (24 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
#[allow(missing_docs)]
pub struct ExecutionId {
    pub media_id: u32,
    #[br(map = |v: u32| Version(v))]
    #[bw(map = |v: &Version| v.0)]
    pub version: Version,
    #[br(map = |v: u32| Version(v))]
    #[bw(map = |v: &Version| v.0)]
    pub base_version: Version,
    #[br(map = |v: u32| TitleId(v))]
    #[bw(map = |v: &TitleId| v.0)]
    pub title_id: TitleId,
    pub platform: u8,
    pub exec_type: u8,
    pub disc_number: u8,
    pub disc_count: u8,
    pub savegame_id: u32,
}

/// Size of [`ExecutionId`]
pub const EXECUTION_ID_SIZE: usize = 24;

/// Header of an LZX block: size of the block and SHA-1 of its contents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct BlockHeader {
    /// Size of the block, including the next block's header
    pub block_size: u32,
    /// SHA-1 of the block
    pub sha1: [u8; 20],
}

/// Size of [`BlockHeader`]
pub const BLOCK_HEADER_SIZE: usize = 24;

/// A run of stored bytes in a basic-compressed image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicSegment {
    /// Offset in the uncompressed image
    pub vaddr: u32,
    /// Offset in the stored data
    pub physaddr: u32,
    /// Stored bytes
    pub length: u32,
}

/// Compression parameters from the file format info
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compression {
    /// Stored as-is
    None,
    /// Zero runs removed
    Basic(Vec<BasicSegment>),
    /// LZX in hashed blocks
    Normal {
        /// LZX window size
        window_size: u32,
        /// Header of the first block
        first_block: BlockHeader,
    },
    /// Delta patch
    Delta,
    /// Unrecognised compression type
    Unknown(u16),
}

/// File format info optional header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFormatInfo {
    /// Size of the optional header
    pub size: u32,
    /// `ENCRYPTION_*`
    pub encryption_type: u16,
    /// `COMPRESSION_*`
    pub compression_type: u16,
    /// Compression parameters
    pub compression: Compression,
}

impl FileFormatInfo {
    /// Parse the optional header data, including its size DWORD
    pub fn parse(data: &[u8]) -> XexResult<Self> {
        if data.len() < 8 {
            return Err(XexError::MissingFileFormatInfo);
        }
        let size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let encryption_type = u16::from_be_bytes([data[4], data[5]]);
        let compression_type = u16::from_be_bytes([data[6], data[7]]);
        let body = &data[8..data.len().min(size as usize).max(8)];

        let compression = match compression_type {
            COMPRESSION_NONE => Compression::None,
            COMPRESSION_BASIC => {
                if body.is_empty() {
                    return Err(XexError::MissingFileFormatInfo);
                }
                let mut segments = Vec::with_capacity(body.len() / 8);
                let (mut vaddr, mut physaddr) = (0u32, 0u32);
                for pair in body.chunks_exact(8) {
                    let data_size = u32::from_be_bytes([pair[0], pair[1], pair[2], pair[3]]);
                    let zero_size = u32::from_be_bytes([pair[4], pair[5], pair[6], pair[7]]);
                    segments.push(BasicSegment {
                        vaddr,
                        physaddr,
                        length: data_size,
                    });
                    vaddr = vaddr.wrapping_add(data_size).wrapping_add(zero_size);
                    physaddr = physaddr.wrapping_add(data_size);
                }
                Compression::Basic(segments)
            }
            COMPRESSION_NORMAL => {
                if body.len() < 4 + BLOCK_HEADER_SIZE {
                    return Err(XexError::MissingFileFormatInfo);
                }
                let window_size = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
                let first_block = BlockHeader::read(&mut std::io::Cursor::new(&body[4..]))?;
                Compression::Normal {
                    window_size,
                    first_block,
                }
            }
            COMPRESSION_DELTA => Compression::Delta,
            other => Compression::Unknown(other),
        };

        Ok(Self {
            size,
            encryption_type,
            compression_type,
            compression,
        })
    }

    /// Whether the image is encrypted
    pub fn is_encrypted(&self) -> bool {
        self.encryption_type != ENCRYPTION_NONE
    }

    /// Display name of the compression type
    pub fn compression_name(&self) -> String {
        match self.compression_type {
            COMPRESSION_NONE => "None".to_string(),
            COMPRESSION_BASIC => "Basic (Sparse)".to_string(),
            COMPRESSION_NORMAL => "Normal (LZX)".to_string(),
            COMPRESSION_DELTA => "Delta".to_string(),
            other => format!("Unknown (0x{other:02X})"),
        }
    }
}

/// Resource table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct ResourceInfo {
    /// NUL-padded resource name, usually the title ID in hex
    pub resource_id: [u8; 8],
    /// Virtual address of the resource
    pub vaddr: u32,
    /// Size in bytes
    pub size: u32,
}

/// Size of [`ResourceInfo`]
pub const RESOURCE_INFO_SIZE: usize = 16;

impl ResourceInfo {
    /// Compare the first 8 bytes of `id`, with NUL standing in past its end
    pub fn matches(&self, id: &str) -> bool {
        let id = id.as_bytes();
        for (i, &b) in self.resource_id.iter().enumerate() {
            let want = id.get(i).copied().unwrap_or(0);
            if want != b {
                return false;
            }
            if want == 0 {
                return true;
            }
        }
        true
    }
}

/// Size of the import library table header
pub const IMPORT_LIBRARIES_HEADER_SIZE: usize = 12;
/// Size of an import library entry, excluding its import list
pub const IMPORT_LIBRARY_ENTRY_SIZE: usize = 0x28;

/// Highest `version_min` among the import libraries, or 0
///
/// `data` is the whole optional header including its size DWORD.
pub fn min_kernel_version(data: &[u8]) -> Version {
    if data.len() < IMPORT_LIBRARIES_HEADER_SIZE + IMPORT_LIBRARY_ENTRY_SIZE * 2 {
        return Version(0);
    }
    let be32 = |at: usize| -> Option<u32> {
        data.get(at..at + 4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    };

    let str_tbl_size = be32(4).unwrap_or(0) as usize;
    let mut pos = IMPORT_LIBRARIES_HEADER_SIZE.saturating_add(str_tbl_size);
    let end = data.len() - IMPORT_LIBRARY_ENTRY_SIZE;
    let mut max = 0u32;
    while pos < end {
        let (Some(size), Some(vmin)) = (be32(pos), be32(pos + 0x20)) else {
            break;
        };
        max = max.max(vmin);
        if size == 0 {
            break;
        }
        pos = pos.saturating_add(size as usize);
    }
    Version(max)
}

/// Format a media or disc profile ID as hex with `-` before the last 4 bytes
pub fn format_media_id(id: &[u8; 16]) -> String {
    format!(
        "{}-{}",
        hex::encode_upper(&id[..12]),
        hex::encode_upper(&id[12..])
    )
}
