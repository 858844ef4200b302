//! XBE on-disk structures
//!
//! Unlike the Xbox 360 formats everything here is little-endian. Addresses
//! are virtual; subtracting the header's base address gives a file offset.

use binrw::{BinRead, BinWrite};

use crate::title::TitleId;
use crate::xbe::error::{XbeError, XbeResult};
use crate::{BinaryFormat, write_record};

/// `XBEH`
pub const XBE_MAGIC: [u8; 4] = *b"XBEH";
/// Size of [`XbeHeader`]
pub const XBE_HEADER_SIZE: usize = 0x178;
/// Size of [`XbeCertificate`]
pub const XBE_CERTIFICATE_SIZE: usize = 0x1D0;
/// Size of [`XbeSectionHeader`]
pub const XBE_SECTION_HEADER_SIZE: usize = 0x38;
/// Section names are compared on at most this many bytes
pub const SECTION_NAME_LEN: usize = 15;
/// Section headers must lie in this many bytes from the start of the file
pub const SECTION_SCAN_SIZE: usize = 64 * 1024;

/// Name of the title image section
pub const SECTION_TITLE_IMAGE: &str = "$$XTIMAGE";

/// Region: North America
pub const REGION_NORTH_AMERICA: u32 = 0x0000_0001;
/// Region: Japan
pub const REGION_JAPAN: u32 = 0x0000_0002;
/// Region: rest of world
pub const REGION_REST_OF_WORLD: u32 = 0x0000_0004;
/// Region: manufacturing
pub const REGION_MANUFACTURING: u32 = 0x8000_0000;

/// Init flag: mount the utility drive
pub const INIT_MOUNT_UTILITY_DRIVE: u32 = 0x0000_0001;
/// Init flag: format the utility drive
pub const INIT_FORMAT_UTILITY_DRIVE: u32 = 0x0000_0002;
/// Init flag: limit RAM to 64 MB
pub const INIT_LIMIT_64MB: u32 = 0x0000_0004;
/// Init flag: do not set up the hard disk
pub const INIT_DONT_SETUP_HDD: u32 = 0x0000_0008;

/// XBE image header
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[br(little)]
#[bw(little)]
#[allow(missing_docs)]
pub struct XbeHeader {
    pub magic: [u8; 4],
    pub signature: [u8; 256],
    pub base_address: u32,
    pub headers_size: u32,
    pub image_size: u32,
    pub image_header_size: u32,
    pub timestamp: u32,
    pub cert_address: u32,
    pub section_count: u32,
    pub section_headers_address: u32,
    pub init_flags: u32,
    pub entry_point: u32,
    pub tls_address: u32,
    pub pe_stack_commit: u32,
    pub pe_heap_reserve: u32,
    pub pe_heap_commit: u32,
    pub pe_base_address: u32,
    pub pe_size_of_image: u32,
    pub pe_checksum: u32,
    pub pe_timestamp: u32,
    pub debug_pathname_address: u32,
    pub debug_filename_address: u32,
    pub debug_filename_w_address: u32,
    pub kernel_thunk_address: u32,
    pub non_kernel_import_dir_address: u32,
    pub library_version_count: u32,
    pub library_version_address: u32,
    pub kernel_library_version_address: u32,
    pub xapi_library_version_address: u32,
    pub logo_bitmap_address: u32,
    pub logo_bitmap_size: u32,
}

impl Default for XbeHeader {
    fn default() -> Self {
        Self {
            magic: XBE_MAGIC,
            signature: [0; 256],
            base_address: 0,
            headers_size: 0,
            image_size: 0,
            image_header_size: XBE_HEADER_SIZE as u32,
            timestamp: 0,
            cert_address: 0,
            section_count: 0,
            section_headers_address: 0,
            init_flags: 0,
            entry_point: 0,
            tls_address: 0,
            pe_stack_commit: 0,
            pe_heap_reserve: 0,
            pe_heap_commit: 0,
            pe_base_address: 0,
            pe_size_of_image: 0,
            pe_checksum: 0,
            pe_timestamp: 0,
            debug_pathname_address: 0,
            debug_filename_address: 0,
            debug_filename_w_address: 0,
            kernel_thunk_address: 0,
            non_kernel_import_dir_address: 0,
            library_version_count: 0,
            library_version_address: 0,
            kernel_library_version_address: 0,
            xapi_library_version_address: 0,
            logo_bitmap_address: 0,
            logo_bitmap_size: 0,
        }
    }
}

impl XbeHeader {
    /// Parse the header and check its magic
    pub fn parse(data: &[u8]) -> XbeResult<Self> {
        let header = Self::read(&mut std::io::Cursor::new(data))?;
        if header.magic != XBE_MAGIC {
            return Err(XbeError::InvalidMagic(header.magic));
        }
        Ok(header)
    }

    /// File offset of a virtual address, if it lies past the base
    ///
    /// The base address itself holds the magic, so it never points at data.
    pub fn file_offset(&self, address: u32) -> Option<u32> {
        (address > self.base_address).then(|| address - self.base_address)
    }
}

impl BinaryFormat for XbeHeader {
    fn parse(data: &[u8]) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self::parse(data)?)
    }

    fn build(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        Ok(write_record(self)?)
    }
}

/// XBE certificate
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[br(little)]
#[bw(little)]
#[allow(missing_docs)]
pub struct XbeCertificate {
    pub size: u32,
    pub timestamp: u32,
    #[br(map = |v: u32| TitleId(v))]
    #[bw(map = |v: &TitleId| v.0)]
    pub title_id: TitleId,
    /// UTF-16LE, NUL-padded
    pub title_name: [u16; 40],
    pub alt_title_ids: [u32; 16],
    pub allowed_media_types: u32,
    pub region_code: u32,
    pub ratings: u32,
    pub disc_number: u32,
    pub version: u32,
    pub lan_key: [u8; 16],
    pub signature_key: [u8; 16],
    pub alt_signature_keys: [[u8; 16]; 16],
}

impl Default for XbeCertificate {
    fn default() -> Self {
        Self {
            size: XBE_CERTIFICATE_SIZE as u32,
            timestamp: 0,
            title_id: TitleId(0),
            title_name: [0; 40],
            alt_title_ids: [0; 16],
            allowed_media_types: 0,
            region_code: 0,
            ratings: 0,
            disc_number: 0,
            version: 0,
            lan_key: [0; 16],
            signature_key: [0; 16],
            alt_signature_keys: [[0; 16]; 16],
        }
    }
}

impl XbeCertificate {
    /// Title name
    pub fn title(&self) -> String {
        let end = self
            .title_name
            .iter()
            .position(|&u| u == 0)
            .unwrap_or(self.title_name.len());
        String::from_utf16_lossy(&self.title_name[..end])
    }
}

/// Section header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, BinRead, BinWrite)]
#[br(little)]
#[bw(little)]
#[allow(missing_docs)]
pub struct XbeSectionHeader {
    pub flags: u32,
    pub vaddr: u32,
    pub vsize: u32,
    /// Absolute file offset
    pub paddr: u32,
    pub psize: u32,
    pub section_name_address: u32,
    pub section_name_refcount: u32,
    pub head_shared_page_refcount_address: u32,
    pub tail_shared_page_refcount_address: u32,
    pub sha1_digest: [u8; 20],
}
