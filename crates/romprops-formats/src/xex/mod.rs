//! Xbox 360 executables (`XEX1`, `XEX2`)
//!
//! The fixed header, optional header table and security info are read on
//! open. The PE image is located lazily: it may be encrypted with a title
//! key and stored plain, with zero runs removed, or LZX-compressed in a
//! chain of hashed blocks. Only the first 8 KiB of the image and the
//! embedded XDBF resource are kept.
//!
//! # Examples
//!
//! ```no_run
//! use romprops_formats::{ParseOptions, RomData};
//! use romprops_formats::xex::Xex;
//!
//! let file = std::fs::File::open("default.xex")?;
//! let mut xex = Xex::open(file, ParseOptions::default())?;
//! println!("{}", xex.fields()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod builder;
mod error;
pub mod header;
pub mod loader;
pub mod ratings;

pub use builder::{BUILDER_LOAD_ADDRESS, XexBuilder, XexCompression, XexEncryption};
pub use error::{XexError, XexResult};
pub use header::{
    Compression, ExecutionId, FileFormatInfo, ResourceInfo, SecurityInfo, XexHeader, XexType,
};
pub use loader::{KeySlot, PeImage};

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};

use binrw::BinRead;
use tracing::{debug, warn};

use crate::error::{FormatError, Result};
use crate::fields::{FieldFlags, RomFields};
use crate::image::Image;
use crate::lzx::lzx_decompress;
use crate::options::ParseOptions;
use crate::pe::PeHeader;
use crate::subfile::{SharedFile, read_at, stream_len};
use crate::text::cp1252_to_string;
use crate::xdbf::Xdbf;
use crate::{FileType, RomData, SystemNameKind};

use header::{
    EXECUTION_ID_SIZE, HEADER_READ_SIZE, IMAGE_FLAG_CARDEA_KEY, IMAGE_FLAG_XGD2_MEDIA_ONLY,
    MAX_OPTIONAL_HEADERS, OPT_DISC_PROFILE_ID, OPT_EXECUTION_ID, OPT_FILE_FORMAT_INFO,
    OPT_GAME_RATINGS, OPT_IMPORT_LIBRARIES, OPT_ORIGINAL_PE_NAME, OPT_RESOURCE_INFO,
    OPTIONAL_HEADER_SIZE, OptionalHeader, OptionalHeaderKind, REGION_NTSC_J_CHINA,
    REGION_NTSC_J_JAPAN, REGION_NTSC_J_OTHER, REGION_NTSC_U, REGION_PAL_AU_NZ, REGION_PAL_OTHER,
    RESOURCE_INFO_SIZE, XEX_HEADER_SIZE, format_media_id, min_kernel_version,
};
use loader::{
    MAX_LZX_IMAGE, PE_HEADER_SIZE, basic_physical_address, candidate_readers, deblock, find_mz,
    key_for,
};
use ratings::{RATING_BOARDS, convert_game_ratings};

/// Embedded resource type
pub type NestedXdbf = Xdbf<Cursor<Vec<u8>>>;

/// Largest embedded resource that is loaded
pub const MAX_RESOURCE_SIZE: u32 = 2 * 1024 * 1024;

/// Longest original PE name, excluding the size DWORD
const MAX_PE_NAME: usize = 260;

const MODULE_FLAGS_NAMES: [&str; 8] = [
    "Title",
    "Exports",
    "Debugger",
    "DLL",
    "Module Patch",
    "Full Patch",
    "Delta Patch",
    "User Mode",
];

// Allowed media type bits; unnamed bits print their index
const MEDIA_TYPE_NAMES: [Option<&str>; 29] = [
    Some("Hard Disk"),
    Some("XGD1"),
    Some("DVD/CD"),
    Some("DVD-ROM SL"),
    Some("DVD-ROM DL"),
    Some("System Flash Memory"),
    None,
    Some("Memory Unit"),
    Some("USB Mass Storage Device"),
    Some("Network"),
    Some("Direct from RAM"),
    Some("RAM Drive"),
    Some("Secure Virtual Optical Device"),
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    Some("Insecure Package"),
    Some("Savegame Package"),
    Some("Locally Signed Package"),
    Some("Xbox Live Signed Package"),
    Some("Xbox Package"),
];

const REGION_NAMES: [&str; 7] = [
    "USA",
    "Japan",
    "China",
    "Asia",
    "Europe",
    "Australia",
    "New Zealand",
];

/// An open XEX executable
pub struct Xex<R> {
    file: Option<SharedFile<R>>,
    file_size: u64,
    options: ParseOptions,
    xex_type: XexType,
    header: XexHeader,
    security: SecurityInfo,
    opt_headers: Vec<OptionalHeader>,
    // None: not tried yet; Some(None): not present or failed to load
    execution_id: Option<Option<ExecutionId>>,
    resources: HashMap<String, Option<ResourceInfo>>,
    file_format: Option<FileFormatInfo>,
    image: Option<Option<PeImage>>,
    pe: Option<Option<PeHeader>>,
    xdbf: Option<Option<NestedXdbf>>,
    fields: Option<RomFields>,
}

impl<R: Read + Seek> Xex<R> {
    /// Open an executable, reading the header, optional header table and
    /// security info
    pub fn open(reader: R, options: ParseOptions) -> XexResult<Self> {
        let mut file = SharedFile::new(reader);
        let file_size = stream_len(&mut file)?;

        let mut buf = vec![0u8; file_size.min(HEADER_READ_SIZE as u64) as usize];
        let got = read_at(&mut file, 0, &mut buf)?;
        if got < XEX_HEADER_SIZE {
            return Err(XexError::Truncated {
                offset: 0,
                wanted: XEX_HEADER_SIZE,
                got,
            });
        }
        buf.truncate(got);

        let mut header = XexHeader::parse(&buf)?;
        let xex_type = header
            .xex_type()
            .ok_or(XexError::InvalidMagic(header.magic))?;

        if header.opt_header_count > MAX_OPTIONAL_HEADERS {
            warn!(
                "XEX: {} optional headers, only reading the first {}",
                header.opt_header_count, MAX_OPTIONAL_HEADERS
            );
            header.opt_header_count = MAX_OPTIONAL_HEADERS;
        }
        let table_end =
            XEX_HEADER_SIZE + header.opt_header_count as usize * OPTIONAL_HEADER_SIZE;
        if table_end > buf.len() {
            return Err(XexError::OptionalHeaderTable(header.opt_header_count));
        }
        let mut cursor = Cursor::new(&buf[XEX_HEADER_SIZE..table_end]);
        let opt_headers = (0..header.opt_header_count)
            .map(|_| OptionalHeader::read(&mut cursor))
            .collect::<binrw::BinResult<Vec<_>>>()?;

        let sec_offset = header.sec_info_offset as usize;
        let sec_size = xex_type.security_info_size();
        let security = match buf.get(sec_offset..sec_offset.saturating_add(sec_size)) {
            Some(data) => SecurityInfo::parse(xex_type, data)?,
            None => {
                let mut data = vec![0u8; sec_size];
                let got = read_at(&mut file, sec_offset as u64, &mut data)?;
                if got != sec_size {
                    return Err(XexError::Truncated {
                        offset: sec_offset as u64,
                        wanted: sec_size,
                        got,
                    });
                }
                SecurityInfo::parse(xex_type, &data)?
            }
        };
        debug!(
            "XEX: {}, {} optional headers, image at 0x{:X}",
            xex_type.name(),
            opt_headers.len(),
            header.pe_offset
        );

        Ok(Self {
            file: Some(file),
            file_size,
            options,
            xex_type,
            header,
            security,
            opt_headers,
            execution_id: None,
            resources: HashMap::new(),
            file_format: None,
            image: None,
            pe: None,
            xdbf: None,
            fields: None,
        })
    }

    /// Format revision if `header` starts with a XEX header
    pub fn is_supported(header: &[u8]) -> Option<XexType> {
        if header.len() < XEX_HEADER_SIZE {
            return None;
        }
        XexType::from_magic(&header[..4])
    }

    /// Format revision
    pub fn xex_type(&self) -> XexType {
        self.xex_type
    }

    /// Fixed header
    pub fn header(&self) -> &XexHeader {
        &self.header
    }

    /// Security info
    pub fn security_info(&self) -> &SecurityInfo {
        &self.security
    }

    /// Optional header table
    pub fn optional_headers(&self) -> &[OptionalHeader] {
        &self.opt_headers
    }

    /// Data of the first optional header with this ID
    ///
    /// Immediate values are returned as their four big-endian bytes.
    /// Size-prefixed blobs include the size DWORD.
    pub fn opt_header_data(&mut self, id: u32) -> XexResult<Option<Vec<u8>>> {
        let Some(entry) = self.opt_headers.iter().find(|h| h.id == id).copied() else {
            return Ok(None);
        };
        let file_size = self.file_size;
        let file = self.file.as_mut().ok_or(XexError::Closed)?;
        let offset = u64::from(entry.value);

        let size = match OptionalHeaderKind::of(id) {
            OptionalHeaderKind::Immediate => return Ok(Some(entry.value.to_be_bytes().to_vec())),
            OptionalHeaderKind::Dword => 4,
            OptionalHeaderKind::Fixed(n) => n,
            OptionalHeaderKind::SizePrefixed => {
                let mut size = [0u8; 4];
                let got = read_at(file, offset, &mut size)?;
                if got != size.len() {
                    return Err(XexError::Truncated {
                        offset,
                        wanted: size.len(),
                        got,
                    });
                }
                (u32::from_be_bytes(size) as usize).max(4)
            }
        };

        let available = file_size.saturating_sub(offset);
        if size as u64 > available {
            return Err(XexError::Truncated {
                offset,
                wanted: size,
                got: usize::try_from(available).unwrap_or(usize::MAX),
            });
        }
        let mut data = vec![0u8; size];
        let got = read_at(file, offset, &mut data)?;
        if got != size {
            return Err(XexError::Truncated {
                offset,
                wanted: size,
                got,
            });
        }
        Ok(Some(data))
    }

    /// Value of a DWORD or immediate optional header
    pub fn opt_header_u32(&mut self, id: u32) -> XexResult<Option<u32>> {
        Ok(self
            .opt_header_data(id)?
            .and_then(|d| d.get(..4).map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))))
    }

    /// Execution ID, if present
    pub fn execution_id(&mut self) -> XexResult<Option<ExecutionId>> {
        if let Some(id) = self.execution_id {
            return Ok(id);
        }
        let id = match self.opt_header_data(OPT_EXECUTION_ID)? {
            Some(data) if data.len() == EXECUTION_ID_SIZE => {
                Some(ExecutionId::read(&mut Cursor::new(&data))?)
            }
            _ => None,
        };
        self.execution_id = Some(id);
        Ok(id)
    }

    /// Resource table entry named `id`, or the title's XDBF resource
    ///
    /// The default name is the title ID in uppercase hex.
    pub fn resource_info(&mut self, id: Option<&str>) -> XexResult<Option<ResourceInfo>> {
        let key = match id {
            Some(id) => id.to_string(),
            None => match self.execution_id()? {
                Some(exec) => format!("{:08X}", exec.title_id.0),
                None => return Ok(None),
            },
        };
        if let Some(cached) = self.resources.get(&key) {
            return Ok(*cached);
        }

        let Some(data) = self.opt_header_data(OPT_RESOURCE_INFO)? else {
            self.resources.insert(key, None);
            return Ok(None);
        };
        let count = data.len().saturating_sub(4) / RESOURCE_INFO_SIZE;
        let mut cursor = Cursor::new(data.get(4..).unwrap_or_default());
        let mut found = None;
        for _ in 0..count {
            let res = ResourceInfo::read(&mut cursor)?;
            if res.matches(&key) {
                found = Some(res);
                break;
            }
        }

        let found = match found {
            Some(res) if res.vaddr == 0 => None,
            Some(res) if res.size > MAX_RESOURCE_SIZE => {
                return Err(XexError::ResourceTooLarge(res.size));
            }
            other => other,
        };
        self.resources.insert(key, found);
        Ok(found)
    }

    /// File format info
    pub fn file_format_info(&mut self) -> XexResult<&FileFormatInfo> {
        let info = match self.file_format.take() {
            Some(info) => info,
            None => {
                let data = self
                    .opt_header_data(OPT_FILE_FORMAT_INFO)?
                    .ok_or(XexError::MissingFileFormatInfo)?;
                FileFormatInfo::parse(&data)?
            }
        };
        Ok(self.file_format.insert(info))
    }

    fn load_image(&mut self) -> XexResult<PeImage> {
        let ffi = self.file_format_info()?.clone();
        let resource = match self.resource_info(None) {
            Ok(res) => res,
            Err(e) => {
                debug!("XEX: no XDBF resource: {e}");
                None
            }
        };
        let file = self.file.clone().ok_or(XexError::Closed)?;
        let encrypted = ffi.is_encrypted();
        let load_address = self.security.load_address();
        let pe_offset = u64::from(self.header.pe_offset);
        let pe_length = self.file_size.saturating_sub(pe_offset);

        let mut candidates = candidate_readers(
            &file,
            pe_offset,
            pe_length,
            encrypted,
            self.security.title_key(),
            key_for(self.security.image_flags()),
            self.options.keys.as_ref(),
        )?;

        if let Compression::Normal {
            window_size,
            first_block,
        } = ffi.compression
        {
            let image_size = u64::from(self.security.image_size());
            if image_size < PE_HEADER_SIZE as u64 || image_size > MAX_LZX_IMAGE {
                return Err(XexError::ImageSize(image_size));
            }
            if self.file_size > MAX_LZX_IMAGE {
                return Err(XexError::ImageSize(self.file_size));
            }
            let (idx, compressed) = deblock(&mut candidates, first_block, pe_length as usize)?;
            let mut image = vec![0u8; image_size as usize];
            lzx_decompress(&compressed, &mut image, window_size, None)?;
            if !image.starts_with(b"MZ") {
                return Err(XexError::NotAnExecutable);
            }

            let xdbf = resource.and_then(|res| {
                let start = res.vaddr.checked_sub(load_address)? as usize;
                let end = start.checked_add(res.size as usize)?;
                image.get(start..end).map(<[u8]>::to_vec)
            });
            image.truncate(PE_HEADER_SIZE);
            return Ok(PeImage {
                key: PeImage::key_from(encrypted, idx),
                header: image,
                xdbf,
            });
        }

        let idx = find_mz(&mut candidates).ok_or(XexError::NotAnExecutable)?;
        let mut reader = candidates[idx].take().ok_or(XexError::NotAnExecutable)?;
        let mut header = vec![0u8; PE_HEADER_SIZE];
        let got = read_at(&mut reader, 0, &mut header)?;
        header.truncate(got);

        let mut xdbf = None;
        if let Some(res) = resource
            && let Some(addr) = res.vaddr.checked_sub(load_address)
        {
            let phys = match &ffi.compression {
                Compression::Basic(segments) => basic_physical_address(segments, addr),
                _ => addr,
            };
            let mut data = vec![0u8; res.size as usize];
            let got = read_at(&mut reader, u64::from(phys), &mut data)?;
            if got == data.len() {
                xdbf = Some(data);
            } else {
                debug!("XEX: XDBF resource truncated: {got} of {} bytes", data.len());
            }
        }

        Ok(PeImage {
            key: PeImage::key_from(encrypted, idx),
            header,
            xdbf,
        })
    }

    /// The recovered image, if it could be decrypted and decompressed
    pub fn pe_image(&mut self) -> Option<&PeImage> {
        if self.image.is_none() {
            let image = match self.load_image() {
                Ok(image) => Some(image),
                Err(e) => {
                    debug!("XEX: image not loaded: {e}");
                    None
                }
            };
            self.image = Some(image);
        }
        self.image.as_ref().and_then(Option::as_ref)
    }

    /// Key that decrypted the image, if it is encrypted and was decrypted
    pub fn key_in_use(&mut self) -> Option<KeySlot> {
        self.pe_image().and_then(|image| image.key)
    }

    /// PE header of the image
    pub fn pe_header(&mut self) -> Option<&PeHeader> {
        if self.pe.is_none() {
            let pe = self.pe_image().and_then(|image| {
                PeHeader::parse(&image.header)
                    .map_err(|e| debug!("XEX: PE header: {e}"))
                    .ok()
            });
            self.pe = Some(pe);
        }
        self.pe.as_ref().and_then(Option::as_ref)
    }

    /// Embedded XDBF resource
    pub fn xdbf(&mut self) -> Option<&mut NestedXdbf> {
        if self.xdbf.is_none() {
            let options = self.options.clone();
            let xdbf = self
                .pe_image()
                .and_then(|image| image.xdbf.clone())
                .and_then(|data| {
                    Xdbf::open_in_xex(Cursor::new(data), options)
                        .map_err(|e| debug!("XEX: embedded XDBF: {e}"))
                        .ok()
                });
            self.xdbf = Some(xdbf);
        }
        self.xdbf.as_mut().and_then(Option::as_mut)
    }

    /// Media types allowed to run the executable
    fn media_types(&self) -> String {
        if self.security.image_flags() & IMAGE_FLAG_XGD2_MEDIA_ONLY != 0 {
            return "Xbox Game Disc only".to_string();
        }
        let media = self.security.allowed_media_types();
        let mut out = String::new();
        let mut found = 0;
        for (bit, name) in MEDIA_TYPE_NAMES.iter().enumerate() {
            if media & (1 << bit) == 0 {
                continue;
            }
            if found > 0 {
                out.push_str(if found % 4 == 0 { ",\n" } else { ", " });
            }
            found += 1;
            match name {
                Some(name) => out.push_str(name),
                None => out.push_str(&bit.to_string()),
            }
        }
        if found == 0 { "None".to_string() } else { out }
    }

    fn region_bits(&self) -> u32 {
        let code = self.security.region_code();
        let mut bits = 0;
        if code & REGION_NTSC_U != 0 {
            bits |= 1 << 0;
        }
        if code & REGION_NTSC_J_JAPAN != 0 {
            bits |= 1 << 1;
        }
        if code & REGION_NTSC_J_CHINA != 0 {
            bits |= 1 << 2;
        }
        if code & REGION_NTSC_J_OTHER != 0 {
            bits |= 1 << 3;
        }
        if code & REGION_PAL_OTHER != 0 {
            bits |= 1 << 4;
        }
        if code & REGION_PAL_AU_NZ != 0 {
            bits |= (1 << 5) | (1 << 6);
        }
        bits
    }

    fn load_fields(&mut self) -> XexResult<RomFields> {
        let mut fields = RomFields::new();
        fields.set_tab_name(0, self.xex_type.name());

        let image_flags = self.security.image_flags();
        let is_delta = self.header.is_delta_patch();
        let encrypted = self
            .file_format_info()
            .map(FileFormatInfo::is_encrypted)
            .unwrap_or(false);

        let loaded = self.pe_image().is_some();
        let key = self.key_in_use();
        if (!loaded || (encrypted && key.is_none())) && !is_delta {
            let key_id = if image_flags & IMAGE_FLAG_CARDEA_KEY != 0 {
                "XEX1"
            } else {
                "XEX2"
            };
            fields.add_warning(format!(
                "The Xbox 360 {key_id} encryption key is not available."
            ));
        }

        if let Some(xdbf) = self.xdbf()
            && let Err(e) = xdbf.add_string_fields(&mut fields)
        {
            debug!("XEX: XDBF strings: {e}");
        }

        let pe_name = self.opt_header_data(OPT_ORIGINAL_PE_NAME);
        if let Some(data) = logged("original PE name", pe_name)
            && data.len() > 4
            && data.len() <= MAX_PE_NAME + 4
        {
            let name = cp1252_to_string(&data[4..]);
            fields.add_string("PE Filename", name.trim_end());
        }

        let imports = self.opt_header_data(OPT_IMPORT_LIBRARIES);
        let min_kernel = logged("import libraries", imports)
            .map(|data| min_kernel_version(&data))
            .filter(|v| v.0 != 0);
        let mut s_min_kernel = min_kernel.map_or_else(|| "Unknown".to_string(), |v| v.to_string());
        if self.xex_type == XexType::Xex1 {
            s_min_kernel.push_str(" (XEX1)");
        }
        fields.add_string("Min. Kernel", s_min_kernel);

        fields.add_bitfield("Module Flags", &MODULE_FLAGS_NAMES, 4, self.header.module_flags);
        fields.add_string("Media Types", self.media_types());
        fields.add_bitfield("Region Code", &REGION_NAMES, 4, self.region_bits());
        fields.add_string_flags(
            "Media ID",
            format_media_id(self.security.media_id()),
            FieldFlags::MONOSPACE,
        );

        let profile = self.opt_header_data(OPT_DISC_PROFILE_ID);
        if let Some(data) = logged("disc profile ID", profile)
            && let Ok(id) = <[u8; 16]>::try_from(data.as_slice())
        {
            fields.add_string_flags("Disc Profile ID", format_media_id(&id), FieldFlags::MONOSPACE);
        }

        let exec = self.execution_id();
        if let Some(exec) = logged("execution ID", exec) {
            fields.add_string_flags("Title ID", exec.title_id.display(4), FieldFlags::MONOSPACE);
            fields.add_string("Publisher", exec.title_id.publisher());
            if exec.disc_number != 0 && exec.disc_count > 1 {
                fields.add_string(
                    "Disc #",
                    format!("{} of {}", exec.disc_number, exec.disc_count),
                );
            }
        }

        if let Ok(ffi) = self.file_format_info() {
            let compression = ffi.compression_name();
            let s_key = if !ffi.is_encrypted() {
                "None"
            } else {
                match key {
                    Some(KeySlot::Retail) => "Retail",
                    Some(KeySlot::Debug) => "Debug",
                    None if is_delta => "Cannot Determine",
                    None => "Unknown",
                }
            };
            fields.add_string("Encryption Key", s_key);
            fields.add_string("Compression", compression);
        }

        let ratings = self.opt_header_data(OPT_GAME_RATINGS);
        if let Some(data) = logged("game ratings", ratings)
            && let Some(raw) = data.get(..RATING_BOARDS)
            && let Ok(raw) = <&[u8; RATING_BOARDS]>::try_from(raw)
        {
            fields.add_age_ratings("Age Ratings", convert_game_ratings(raw));
        }

        // Delta patches carry no usable image
        if !is_delta {
            if let Some(pe) = self.pe_header() {
                let pe_fields = pe.fields();
                fields.add_fields_with_tabs(&pe_fields);
            }
            if let Some(xdbf) = self.xdbf() {
                match xdbf.fields() {
                    Ok(xdbf_fields) => fields.add_fields_with_tabs(xdbf_fields),
                    Err(e) => debug!("XEX: XDBF fields: {e}"),
                }
            }
        }

        Ok(fields)
    }
}

/// Optional header data, with read errors logged and dropped
fn logged<T>(what: &str, result: XexResult<Option<T>>) -> Option<T> {
    result
        .map_err(|e| debug!("XEX: {what}: {e}"))
        .ok()
        .flatten()
}

impl<R: Read + Seek> RomData for Xex<R> {
    fn system_name(&self, kind: SystemNameKind) -> &'static str {
        match kind {
            SystemNameKind::Long => "Microsoft Xbox 360",
            SystemNameKind::Short => "Xbox 360",
            SystemNameKind::Abbreviation => "X360",
        }
    }

    fn file_type(&self) -> FileType {
        if self.header.is_patch() {
            FileType::PatchFile
        } else {
            FileType::Executable
        }
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
        match self.xdbf() {
            Some(xdbf) => xdbf.icon(),
            None => Ok(None),
        }
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn close(&mut self) {
        if let Some(Some(mut xdbf)) = self.xdbf.take() {
            xdbf.close();
        }
        self.image = None;
        self.file = None;
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fields::FieldValue;
    use crate::language::Language;
    use crate::title::{TitleId, Version};
    use crate::xdbf::{XDBF_ID_TITLE, XdbfBuilder};
    use header::{MODULE_FLAG_PATCH_DELTA, MODULE_FLAG_TITLE, REGION_FREE};
    use loader::{DEBUG_KEY, XEX1_KEY_NAME, XEX2_KEY_NAME};
    use pretty_assertions::assert_eq;
    use romprops_crypto::{CryptoError, KeyProvider, NamedKey, VerifyResult};
    use std::sync::Arc;

    const TITLE_ID: TitleId = TitleId(0x4D53_0819);
    const RETAIL_KEY: [u8; 16] = [0x5A; 16];
    const TITLE_KEY: [u8; 16] = [
        0x10, 0x21, 0x32, 0x43, 0x54, 0x65, 0x76, 0x87, 0x98, 0xA9, 0xBA, 0xCB, 0xDC, 0xED, 0xFE,
        0x0F,
    ];

    /// Hands out one key for every name without checking it
    struct FixedProvider(Option<[u8; 16]>);

    impl KeyProvider for FixedProvider {
        fn get_key(&self, _name: &str) -> std::result::Result<Option<[u8; 16]>, CryptoError> {
            Ok(self.0)
        }

        fn add_key(&mut self, _key: NamedKey) -> std::result::Result<(), CryptoError> {
            Ok(())
        }

        fn remove_key(
            &mut self,
            _name: &str,
        ) -> std::result::Result<Option<[u8; 16]>, CryptoError> {
            Ok(None)
        }

        fn key_count(&self) -> std::result::Result<usize, CryptoError> {
            Ok(usize::from(self.0.is_some()))
        }

        fn get_and_verify(
            &self,
            _name: &str,
            _verify_data: &[u8; 16],
        ) -> std::result::Result<[u8; 16], VerifyResult> {
            self.0.ok_or(VerifyResult::KeyNotFound)
        }
    }

    /// Hands out one key under one name only
    struct NamedProvider(&'static str, [u8; 16]);

    impl KeyProvider for NamedProvider {
        fn get_key(&self, name: &str) -> std::result::Result<Option<[u8; 16]>, CryptoError> {
            Ok((name == self.0).then_some(self.1))
        }

        fn add_key(&mut self, _key: NamedKey) -> std::result::Result<(), CryptoError> {
            Ok(())
        }

        fn remove_key(
            &mut self,
            _name: &str,
        ) -> std::result::Result<Option<[u8; 16]>, CryptoError> {
            Ok(None)
        }

        fn key_count(&self) -> std::result::Result<usize, CryptoError> {
            Ok(1)
        }

        fn get_and_verify(
            &self,
            name: &str,
            _verify_data: &[u8; 16],
        ) -> std::result::Result<[u8; 16], VerifyResult> {
            (name == self.0).then_some(self.1).ok_or(VerifyResult::KeyNotFound)
        }
    }

    fn options_with(key: Option<[u8; 16]>) -> ParseOptions {
        ParseOptions {
            keys: Arc::new(FixedProvider(key)),
            language: None,
        }
    }

    fn spa() -> Vec<u8> {
        XdbfBuilder::spa(TITLE_ID.0)
            .title_type(1)
            .string(Language::English, XDBF_ID_TITLE, "Halo 3")
            .string(Language::Japanese, XDBF_ID_TITLE, "ヘイロー 3")
            .build()
            .expect("spa")
    }

    fn builder() -> XexBuilder {
        XexBuilder::new(TITLE_ID)
            .version(Version::new(1, 0, 12, 0), Version(0))
            .original_pe_name("halo3.exe")
            .import_library(Version::new(2, 0, 1746, 0))
            .allowed_media_types(0b1101)
            .xdbf(spa())
    }

    fn open(data: Vec<u8>, options: ParseOptions) -> Xex<Cursor<Vec<u8>>> {
        Xex::open(Cursor::new(data), options).expect("open")
    }

    #[test]
    fn test_plain_fields() {
        let data = builder().disc(2, 3).build().expect("build");
        let mut xex = open(data, ParseOptions::default());
        assert_eq!(xex.xex_type(), XexType::Xex2);
        assert_eq!(xex.file_type(), FileType::Executable);

        let fields = xex.fields().expect("fields");
        assert_eq!(fields.tabs(), ["XEX2", "PE", "XDBF"]);
        assert_eq!(fields.warnings().count(), 0);
        assert_eq!(fields.get_str("PE Filename"), Some("halo3.exe"));
        assert_eq!(fields.get_str("Min. Kernel"), Some("2.0.1746.0"));
        assert_eq!(
            fields.get_str("Media Types"),
            Some("Hard Disk, DVD/CD, DVD-ROM SL")
        );
        assert_eq!(fields.get_str("Title ID"), Some("4D530819 (MS-2073)"));
        assert_eq!(fields.get_str("Publisher"), Some("Microsoft Game Studios"));
        assert_eq!(fields.get_str("Disc #"), Some("2 of 3"));
        assert_eq!(fields.get_str("Encryption Key"), Some("None"));
        assert_eq!(fields.get_str("Compression"), Some("None"));

        // Embedded title strings land on the first tab
        let title = fields.get("Title").expect("title");
        assert_eq!(title.tab, 0);
        let FieldValue::StringMulti { strings, .. } = &title.value else {
            panic!("Title should be multi-language");
        };
        assert_eq!(strings.get("ja").map(String::as_str), Some("ヘイロー 3"));

        let Some(FieldValue::Bitfield { value, .. }) = fields.get("Region Code").map(|f| &f.value)
        else {
            panic!("Region Code should be a bitfield");
        };
        assert_eq!(*value, 0x7F);
    }

    #[test]
    fn test_media_types_wrap_and_unnamed_bits() {
        let data = builder()
            .allowed_media_types(0b1_1111 | (1 << 6))
            .build()
            .expect("build");
        let mut xex = open(data, ParseOptions::default());
        assert_eq!(
            xex.fields().expect("fields").get_str("Media Types"),
            Some("Hard Disk, XGD1, DVD/CD, DVD-ROM SL,\nDVD-ROM DL, 6")
        );

        let data = builder()
            .allowed_media_types(0)
            .image_flags(IMAGE_FLAG_XGD2_MEDIA_ONLY)
            .build()
            .expect("build");
        let mut xex = open(data, ParseOptions::default());
        assert_eq!(
            xex.fields().expect("fields").get_str("Media Types"),
            Some("Xbox Game Disc only")
        );
    }

    #[test]
    fn test_retail_key_from_provider() {
        let data = builder()
            .encryption(XexEncryption::Normal {
                common_key: RETAIL_KEY,
                title_key: TITLE_KEY,
            })
            .build()
            .expect("build");
        let mut xex = open(data, options_with(Some(RETAIL_KEY)));
        assert_eq!(xex.key_in_use(), Some(KeySlot::Retail));
        let fields = xex.fields().expect("fields");
        assert_eq!(fields.get_str("Encryption Key"), Some("Retail"));
        assert_eq!(fields.warnings().count(), 0);
        assert!(xex.icon().expect("icon").is_none());
    }

    #[test]
    fn test_debug_key_fallback() {
        let data = builder()
            .encryption(XexEncryption::Normal {
                common_key: DEBUG_KEY,
                title_key: TITLE_KEY,
            })
            .compression(XexCompression::Basic)
            .build()
            .expect("build");

        // A wrong retail key: the debug candidate still finds the image
        let mut xex = open(data.clone(), options_with(Some(RETAIL_KEY)));
        assert_eq!(xex.key_in_use(), Some(KeySlot::Debug));
        assert!(xex.xdbf().is_some());

        // No retail key at all
        let mut xex = open(data, ParseOptions::default());
        let fields = xex.fields().expect("fields");
        assert_eq!(fields.get_str("Encryption Key"), Some("Debug"));
        assert_eq!(fields.get_str("Compression"), Some("Basic (Sparse)"));
        assert_eq!(fields.warnings().count(), 0);
    }

    #[test]
    fn test_missing_key_warning() {
        let data = builder()
            .encryption(XexEncryption::Normal {
                common_key: RETAIL_KEY,
                title_key: TITLE_KEY,
            })
            .build()
            .expect("build");
        let mut xex = open(data, ParseOptions::default());
        let fields = xex.fields().expect("fields");
        let warnings: Vec<_> = fields.warnings().filter_map(|f| f.as_str()).collect();
        assert_eq!(
            warnings,
            ["The Xbox 360 XEX2 encryption key is not available."]
        );
        assert_eq!(fields.get_str("Encryption Key"), Some("Unknown"));
        assert_eq!(fields.tabs(), ["XEX2"]);
        assert_eq!(fields.get("Title"), None);
    }

    #[test]
    fn test_xex1_key_follows_cardea_flag() {
        let xex1 = || {
            builder()
                .xex_type(XexType::Xex1)
                .encryption(XexEncryption::Normal {
                    common_key: RETAIL_KEY,
                    title_key: TITLE_KEY,
                })
        };
        let xex1_key_only = || ParseOptions {
            keys: Arc::new(NamedProvider(XEX1_KEY_NAME, RETAIL_KEY)),
            language: None,
        };

        let data = xex1()
            .image_flags(IMAGE_FLAG_CARDEA_KEY | IMAGE_FLAG_XGD2_MEDIA_ONLY)
            .build()
            .expect("build");
        let mut xex = open(data, xex1_key_only());
        assert_eq!(xex.xex_type(), XexType::Xex1);
        assert_eq!(xex.key_in_use(), Some(KeySlot::Retail));
        let fields = xex.fields().expect("fields");
        assert_eq!(fields.get_str("Media Types"), Some("Xbox Game Disc only"));
        assert_eq!(fields.get_str("Encryption Key"), Some("Retail"));
        assert_eq!(fields.warnings().count(), 0);

        // Without the Cardea flag an XEX1 image wants the XEX2 key
        let data = xex1().build().expect("build");
        let mut xex = open(data, xex1_key_only());
        assert_eq!(xex.key_in_use(), None);
        let fields = xex.fields().expect("fields");
        assert_eq!(
            fields.get_str("Media Types"),
            Some("Hard Disk, DVD/CD, DVD-ROM SL")
        );
        let warnings: Vec<_> = fields.warnings().filter_map(|f| f.as_str()).collect();
        assert_eq!(
            warnings,
            ["The Xbox 360 XEX2 encryption key is not available."]
        );
    }

    #[test]
    fn test_lzx_image() {
        let data = builder()
            .compression(XexCompression::Normal {
                window_size: 0x8000,
            })
            .encryption(XexEncryption::Normal {
                common_key: DEBUG_KEY,
                title_key: TITLE_KEY,
            })
            .build()
            .expect("build");
        let mut xex = open(data, options_with(Some(RETAIL_KEY)));
        let image = xex.pe_image().expect("image");
        assert_eq!(image.key, Some(KeySlot::Debug));
        assert_eq!(image.header.len(), PE_HEADER_SIZE);
        assert_eq!(image.xdbf.as_deref(), Some(spa().as_slice()));

        let fields = xex.fields().expect("fields");
        assert_eq!(fields.get_str("Compression"), Some("Normal (LZX)"));
        assert_eq!(fields.tabs(), ["XEX2", "PE", "XDBF"]);
    }

    #[test]
    fn test_delta_patch() {
        let data = XexBuilder::new(TITLE_ID)
            .module_flags(MODULE_FLAG_TITLE | MODULE_FLAG_PATCH_DELTA)
            .encryption(XexEncryption::Normal {
                common_key: RETAIL_KEY,
                title_key: TITLE_KEY,
            })
            .build()
            .expect("build");
        let mut xex = open(data, ParseOptions::default());
        assert_eq!(xex.file_type(), FileType::PatchFile);
        let fields = xex.fields().expect("fields");
        assert_eq!(fields.warnings().count(), 0);
        assert_eq!(fields.get_str("Encryption Key"), Some("Cannot Determine"));
        assert_eq!(fields.tabs(), ["XEX2"]);
    }

    #[test]
    fn test_region_and_ids() {
        let data = XexBuilder::new(TITLE_ID)
            .region_code(REGION_NTSC_J_JAPAN | REGION_PAL_AU_NZ)
            .media_id([0xAB; 16])
            .disc_profile_id([0x01; 16])
            .build()
            .expect("build");
        let mut xex = open(data, ParseOptions::default());
        let fields = xex.fields().expect("fields");
        let Some(FieldValue::Bitfield { value, .. }) = fields.get("Region Code").map(|f| &f.value)
        else {
            panic!("Region Code should be a bitfield");
        };
        assert_eq!(*value, 0b110_0010);
        assert_eq!(
            fields.get_str("Media ID"),
            Some("ABABABABABABABABABABABAB-ABABABAB")
        );
        assert_eq!(
            fields.get_str("Disc Profile ID"),
            Some("010101010101010101010101-01010101")
        );
        assert_eq!(fields.get_str("Min. Kernel"), Some("Unknown"));
        assert_eq!(fields.get_str("Disc #"), None);
        assert_ne!(REGION_FREE, 0);
    }

    #[test]
    fn test_resource_lookup() {
        let data = builder().build().expect("build");
        let mut xex = open(data, ParseOptions::default());
        let res = xex.resource_info(None).expect("lookup").expect("resource");
        assert!(res.matches("4D530819"));
        assert_eq!(res.size as usize, spa().len());
        assert_eq!(xex.resource_info(Some("missing")).expect("lookup"), None);
    }

    #[test]
    fn test_bad_magic_and_truncation() {
        let mut data = XexBuilder::new(TITLE_ID).build().expect("build");
        assert!(matches!(
            Xex::open(Cursor::new(data[..20].to_vec()), ParseOptions::default()),
            Err(XexError::Truncated { got: 20, .. })
        ));
        data[..4].copy_from_slice(b"XEX?");
        assert!(matches!(
            Xex::open(Cursor::new(data), ParseOptions::default()),
            Err(XexError::InvalidMagic(m)) if &m == b"XEX?"
        ));
        assert_eq!(Xex::<Cursor<Vec<u8>>>::is_supported(b"XEX2"), None);
    }

    #[test]
    fn test_closed() {
        let data = XexBuilder::new(TITLE_ID).build().expect("build");
        let mut xex = open(data, ParseOptions::default());
        assert!(xex.is_open());
        xex.close();
        assert!(!xex.is_open());
        assert!(matches!(xex.fields(), Err(FormatError::Closed)));
        assert!(matches!(
            xex.opt_header_data(OPT_EXECUTION_ID),
            Err(XexError::Closed)
        ));
        assert_eq!(XEX2_KEY_NAME, "xbox360-xex2");
    }
}
