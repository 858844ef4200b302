//! Original Xbox executables (`XBEH`)
//!
//! The image header and certificate are read on open. Section headers, the
//! wrapped PE header and the `$$XTIMAGE` title image are looked up when
//! first needed.
//!
//! # Examples
//!
//! ```no_run
//! use romprops_formats::{ParseOptions, RomData};
//! use romprops_formats::xbe::Xbe;
//!
//! let file = std::fs::File::open("default.xbe")?;
//! let mut xbe = Xbe::open(file, ParseOptions::default())?;
//! println!("{}", xbe.fields()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod builder;
mod error;
pub mod header;

pub use builder::{BUILDER_BASE_ADDRESS, XbeBuilder};
pub use error::{XbeError, XbeResult};
pub use header::{XbeCertificate, XbeHeader, XbeSectionHeader};

use std::io::{Cursor, Read, Seek};

use binrw::BinRead;
use tracing::debug;

use crate::error::{FormatError, Result};
use crate::fields::{FieldFlags, RomFields};
use crate::image::{Image, PNG_MAGIC};
use crate::options::ParseOptions;
use crate::pe::PeHeader;
use crate::subfile::{SubFile, read_at, stream_len};
use crate::text::{trim_nul, utf16le_to_string};
use crate::{FileType, RomData, SystemNameKind};

use header::{
    REGION_MANUFACTURING, SECTION_NAME_LEN, SECTION_SCAN_SIZE, SECTION_TITLE_IMAGE,
    XBE_CERTIFICATE_SIZE, XBE_HEADER_SIZE, XBE_MAGIC, XBE_SECTION_HEADER_SIZE,
};

/// Largest title image that is loaded
pub const MAX_TITLE_IMAGE_SIZE: u32 = 1024 * 1024;

// UTF-16 units read for the debug file name, terminator included
const DEBUG_FILENAME_UNITS: usize = 260;

const MEDIA_TYPE_NAMES: [&str; 10] = [
    "Hard Disk",
    "XGD1",
    "DVD/CD",
    "CD-ROM",
    "DVD-ROM SL",
    "DVD-ROM DL",
    "DVD-RW SL",
    "DVD-RW DL",
    "Dongle",
    "Media Board",
];

const INIT_FLAGS_NAMES: [&str; 4] = [
    "Mount Utility Drive",
    "Format Utility Drive",
    "Limit RAM to 64 MB",
    "Don't Setup HDD",
];

const REGION_NAMES: [&str; 4] = ["North America", "Japan", "Rest of World", "Manufacturing"];

/// An open XBE executable
pub struct Xbe<R> {
    file: Option<R>,
    file_size: u64,
    header: XbeHeader,
    certificate: XbeCertificate,
    pe: Option<Option<PeHeader>>,
    title_image: Option<Option<Image>>,
    fields: Option<RomFields>,
}

impl<R: Read + Seek> Xbe<R> {
    /// Open an executable, reading the header and certificate
    ///
    /// An unreadable certificate is not fatal: it is left zeroed.
    pub fn open(mut reader: R, _options: ParseOptions) -> XbeResult<Self> {
        let file_size = stream_len(&mut reader)?;
        let mut buf = [0u8; XBE_HEADER_SIZE];
        let got = read_at(&mut reader, 0, &mut buf)?;
        if got != XBE_HEADER_SIZE {
            return Err(XbeError::Truncated {
                offset: 0,
                wanted: XBE_HEADER_SIZE,
                got,
            });
        }
        let header = XbeHeader::parse(&buf)?;

        let mut certificate = XbeCertificate {
            size: 0,
            ..XbeCertificate::default()
        };
        if let Some(offset) = header.file_offset(header.cert_address) {
            let mut data = [0u8; XBE_CERTIFICATE_SIZE];
            let got = read_at(&mut reader, u64::from(offset), &mut data)?;
            if got == XBE_CERTIFICATE_SIZE {
                certificate = XbeCertificate::read(&mut Cursor::new(&data))?;
            } else {
                debug!("XBE: certificate at 0x{offset:X} is truncated");
            }
        }

        Ok(Self {
            file: Some(reader),
            file_size,
            header,
            certificate,
            pe: None,
            title_image: None,
            fields: None,
        })
    }

    /// Whether `header` starts with an XBE header
    pub fn is_supported(header: &[u8]) -> bool {
        header.len() >= XBE_HEADER_SIZE && header[..4] == XBE_MAGIC
    }

    /// Image header
    pub fn header(&self) -> &XbeHeader {
        &self.header
    }

    /// Certificate
    pub fn certificate(&self) -> &XbeCertificate {
        &self.certificate
    }

    /// Find a section by name
    ///
    /// Section headers must lie in the first 64 KiB of the file; a header
    /// table running past that is cut short.
    pub fn find_section(&mut self, name: &'static str) -> XbeResult<Option<XbeSectionHeader>> {
        let shdr_offset = self
            .header
            .file_offset(self.header.section_headers_address)
            .filter(|&off| (off as usize) < SECTION_SCAN_SIZE)
            .ok_or(XbeError::OutOfRange {
                what: "Section headers",
                address: self.header.section_headers_address,
            })? as usize;

        let file = self.file.as_mut().ok_or(XbeError::Closed)?;
        let mut first = vec![0u8; SECTION_SCAN_SIZE.min(self.file_size as usize)];
        let got = read_at(file, 0, &mut first)?;
        first.truncate(got);

        let fits = first.len().saturating_sub(shdr_offset) / XBE_SECTION_HEADER_SIZE;
        let count = (self.header.section_count as usize).min(fits);
        let mut cursor = Cursor::new(first.get(shdr_offset..).unwrap_or_default());
        for _ in 0..count {
            let shdr = XbeSectionHeader::read(&mut cursor)?;
            let Some(name_offset) = self.header.file_offset(shdr.section_name_address) else {
                continue;
            };
            let mut section_name = [0u8; SECTION_NAME_LEN + 1];
            let got = read_at(file, u64::from(name_offset), &mut section_name)?;
            if got != section_name.len() {
                return Err(XbeError::Truncated {
                    offset: u64::from(name_offset),
                    wanted: section_name.len(),
                    got,
                });
            }
            if trim_nul(&section_name[..SECTION_NAME_LEN]) == name.as_bytes() {
                return Ok(Some(shdr));
            }
        }
        Ok(None)
    }

    fn load_title_image(&mut self) -> XbeResult<Option<Image>> {
        let Some(section) = self.find_section(SECTION_TITLE_IMAGE)? else {
            return Ok(None);
        };
        if section.psize > MAX_TITLE_IMAGE_SIZE {
            return Err(XbeError::ImageTooLarge(section.psize));
        }
        let file = self.file.as_mut().ok_or(XbeError::Closed)?;
        let mut data = vec![0u8; section.psize as usize];
        let got = read_at(file, u64::from(section.paddr), &mut data)?;
        if got != data.len() {
            return Err(XbeError::Truncated {
                offset: u64::from(section.paddr),
                wanted: data.len(),
                got,
            });
        }
        Ok(if data.starts_with(b"XPR0") {
            Some(Image::Xpr0(data))
        } else if data.starts_with(&PNG_MAGIC[..4]) {
            // Some titles store a PNG here
            Some(Image::Png(data))
        } else {
            debug!("XBE: unrecognised title image format");
            None
        })
    }

    /// The `$$XTIMAGE` title image
    pub fn title_image(&mut self) -> Option<&Image> {
        if self.title_image.is_none() {
            let image = self
                .load_title_image()
                .map_err(|e| debug!("XBE: title image: {e}"))
                .ok()
                .flatten();
            self.title_image = Some(image);
        }
        self.title_image.as_ref().and_then(Option::as_ref)
    }

    /// PE header at the PE base address
    pub fn pe_header(&mut self) -> Option<&PeHeader> {
        if self.pe.is_none() {
            let pe = self.load_pe();
            self.pe = Some(pe);
        }
        self.pe.as_ref().and_then(Option::as_ref)
    }

    fn load_pe(&mut self) -> Option<PeHeader> {
        let offset = u64::from(
            self.header
                .pe_base_address
                .checked_sub(self.header.base_address)?,
        );
        if offset < XBE_HEADER_SIZE as u64 || offset >= self.file_size {
            return None;
        }
        let file = self.file.as_mut()?;
        let mut sub = SubFile::new(file, offset, self.file_size - offset);
        PeHeader::read_from(&mut sub)
            .map_err(|e| debug!("XBE: PE header: {e}"))
            .ok()
    }

    fn debug_filename(&mut self) -> XbeResult<Option<String>> {
        let Some(offset) = self
            .header
            .file_offset(self.header.debug_filename_w_address)
        else {
            return Ok(Some("Unknown".to_string()));
        };
        let file = self.file.as_mut().ok_or(XbeError::Closed)?;
        let mut data = [0u8; DEBUG_FILENAME_UNITS * 2];
        let got = read_at(file, u64::from(offset), &mut data)?;
        if got != data.len() {
            return Ok(None);
        }
        let name = utf16le_to_string(&data[..data.len() - 2]);
        Ok(Some(if name.is_empty() {
            "Unknown".to_string()
        } else {
            name
        }))
    }

    fn media_types(&self) -> String {
        let media = self.certificate.allowed_media_types;
        let names: Vec<&str> = MEDIA_TYPE_NAMES
            .iter()
            .enumerate()
            .filter(|(bit, _)| media & (1 << bit) != 0)
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            return "None".to_string();
        }
        names
            .chunks(4)
            .map(|row| row.join(", "))
            .collect::<Vec<_>>()
            .join(",\n")
    }

    fn load_fields(&mut self) -> XbeResult<RomFields> {
        let mut fields = RomFields::new();
        fields.set_tab_name(0, "XBE");

        let cert = self.certificate.clone();
        fields.add_string("Title", cert.title());

        if let Some(name) = self.debug_filename()? {
            fields.add_string("PE Filename", name);
        }

        fields.add_string_flags("Title ID", cert.title_id.display(3), FieldFlags::MONOSPACE);
        fields.add_string("Publisher", cert.title_id.publisher());

        if self.header.timestamp == 0 {
            fields.add_string("Timestamp", "Not set");
        } else {
            fields.add_date_time("Timestamp", i64::from(self.header.timestamp));
        }

        fields.add_string("Media Types", self.media_types());
        fields.add_bitfield("Init Flags", &INIT_FLAGS_NAMES, 2, self.header.init_flags);

        let mut region = cert.region_code;
        if region & REGION_MANUFACTURING != 0 {
            region = (region & !REGION_MANUFACTURING) | (1 << 3);
        }
        fields.add_bitfield("Region Code", &REGION_NAMES, 3, region);

        if let Some(pe) = self.pe_header() {
            let pe_fields = pe.fields();
            fields.add_fields_with_tabs(&pe_fields);
        }
        Ok(fields)
    }
}

impl<R: Read + Seek> RomData for Xbe<R> {
    fn system_name(&self, kind: SystemNameKind) -> &'static str {
        match kind {
            SystemNameKind::Long => "Microsoft Xbox",
            SystemNameKind::Short | SystemNameKind::Abbreviation => "Xbox",
        }
    }

    fn file_type(&self) -> FileType {
        FileType::Executable
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
        if self.file.is_none() && self.title_image.is_none() {
            return Err(FormatError::Closed);
        }
        Ok(self.title_image().cloned())
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn close(&mut self) {
        self.file = None;
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fields::FieldValue;
    use crate::title::TitleId;
    use header::{INIT_LIMIT_64MB, INIT_MOUNT_UTILITY_DRIVE, REGION_JAPAN, REGION_NORTH_AMERICA};
    use pretty_assertions::assert_eq;

    const TITLE_ID: TitleId = TitleId(0x4D53_0004);

    fn open(data: Vec<u8>) -> Xbe<Cursor<Vec<u8>>> {
        Xbe::open(Cursor::new(data), ParseOptions::default()).expect("open")
    }

    fn bitfield(fields: &RomFields, name: &str) -> u32 {
        match fields.get(name).map(|f| &f.value) {
            Some(FieldValue::Bitfield { value, .. }) => *value,
            other => panic!("{name} should be a bitfield, got {other:?}"),
        }
    }

    #[test]
    fn test_fields() {
        let data = XbeBuilder::new(TITLE_ID)
            .title("Halo")
            .debug_filename("halo.exe")
            .timestamp(1_004_572_800)
            .allowed_media_types(0b11_1111)
            .init_flags(INIT_MOUNT_UTILITY_DRIVE | INIT_LIMIT_64MB)
            .region_code(REGION_NORTH_AMERICA | REGION_JAPAN | REGION_MANUFACTURING)
            .build()
            .expect("build");
        let mut xbe = open(data);
        let fields = xbe.fields().expect("fields");

        assert_eq!(fields.tabs(), ["XBE", "PE"]);
        assert_eq!(fields.get_str("Title"), Some("Halo"));
        assert_eq!(fields.get_str("PE Filename"), Some("halo.exe"));
        assert_eq!(fields.get_str("Title ID"), Some("4D530004 (MS-004)"));
        assert_eq!(fields.get_str("Publisher"), Some("Microsoft Game Studios"));
        assert_eq!(
            fields.get("Timestamp").map(|f| &f.value),
            Some(&FieldValue::DateTime(1_004_572_800))
        );
        assert_eq!(
            fields.get_str("Media Types"),
            Some("Hard Disk, XGD1, DVD/CD, CD-ROM,\nDVD-ROM SL, DVD-ROM DL")
        );
        assert_eq!(bitfield(fields, "Init Flags"), 0b101);
        assert_eq!(bitfield(fields, "Region Code"), 0b1011);
        assert_eq!(fields.get_str("PE Machine"), Some("Intel i386"));
    }

    #[test]
    fn test_unset_fields() {
        let data = XbeBuilder::new(TitleId(0x0102_0003))
            .pe_header(None)
            .build()
            .expect("build");
        let mut xbe = open(data);
        let fields = xbe.fields().expect("fields");
        assert_eq!(fields.tabs(), ["XBE"]);
        assert_eq!(fields.get_str("PE Filename"), Some("Unknown"));
        assert_eq!(fields.get_str("Timestamp"), Some("Not set"));
        assert_eq!(fields.get_str("Media Types"), Some("None"));
        assert_eq!(fields.get_str("Title ID"), Some("01020003 (\\x01\\x02-003)"));
        assert_eq!(fields.get_str("Publisher"), Some("Unknown (01 02)"));
    }

    #[test]
    fn test_title_image() {
        let mut xpr = b"XPR0".to_vec();
        xpr.extend_from_slice(&[0u8; 60]);
        let data = XbeBuilder::new(TITLE_ID)
            .section(".text", vec![0x90; 32])
            .title_image(xpr.clone())
            .build()
            .expect("build");
        let mut xbe = open(data);
        let section = xbe
            .find_section(SECTION_TITLE_IMAGE)
            .expect("scan")
            .expect("section");
        assert_eq!(section.psize, 64);
        assert_eq!(xbe.find_section("$$XSIMAGE").expect("scan"), None);
        assert_eq!(xbe.icon().expect("icon"), Some(Image::Xpr0(xpr)));

        let mut png = PNG_MAGIC.to_vec();
        png.extend_from_slice(&[0u8; 24]);
        let data = XbeBuilder::new(TITLE_ID)
            .title_image(png.clone())
            .build()
            .expect("build");
        assert_eq!(open(data).icon().expect("icon"), Some(Image::Png(png)));
    }

    #[test]
    fn test_no_title_image() {
        let data = XbeBuilder::new(TITLE_ID).build().expect("build");
        let mut xbe = open(data);
        assert_eq!(xbe.icon().expect("icon"), None);
    }

    #[test]
    fn test_invalid() {
        let mut data = XbeBuilder::new(TITLE_ID).build().expect("build");
        assert!(Xbe::<Cursor<Vec<u8>>>::is_supported(&data));
        assert!(matches!(
            Xbe::open(Cursor::new(data[..0x100].to_vec()), ParseOptions::default()),
            Err(XbeError::Truncated { .. })
        ));
        data[..4].copy_from_slice(b"XBEX");
        assert!(!Xbe::<Cursor<Vec<u8>>>::is_supported(&data));
        assert!(matches!(
            Xbe::open(Cursor::new(data), ParseOptions::default()),
            Err(XbeError::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_section_headers_out_of_range() {
        let mut data = XbeBuilder::new(TITLE_ID).build().expect("build");
        // section_headers_address = base
        data[0x120..0x124].copy_from_slice(&BUILDER_BASE_ADDRESS.to_le_bytes());
        let mut xbe = open(data);
        assert!(matches!(
            xbe.find_section(SECTION_TITLE_IMAGE),
            Err(XbeError::OutOfRange { .. })
        ));
        assert_eq!(xbe.icon().expect("icon"), None);
    }

    #[test]
    fn test_closed() {
        let data = XbeBuilder::new(TITLE_ID).build().expect("build");
        let mut xbe = open(data);
        xbe.close();
        assert!(!xbe.is_open());
        assert!(matches!(xbe.fields(), Err(FormatError::Closed)));
        assert!(matches!(xbe.icon(), Err(FormatError::Closed)));
        assert_eq!(xbe.system_name(SystemNameKind::Long), "Microsoft Xbox");
    }
}
