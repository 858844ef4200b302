//! Builder for XBE executables
//!
//! Produces the header, certificate, section headers and names, the debug
//! file name, a minimal PE header one page in, and optionally a
//! `$$XTIMAGE` section. Signatures, digests and code are left zeroed.

use std::io::Cursor;

use binrw::BinWrite;

use crate::pe::{MACHINE_I386, PeHeader, Subsystem};
use crate::text::string_to_utf16le;
use crate::title::TitleId;
use crate::xbe::error::XbeResult;
use crate::xbe::header::{
    SECTION_TITLE_IMAGE, XBE_CERTIFICATE_SIZE, XBE_HEADER_SIZE, XBE_SECTION_HEADER_SIZE,
    XbeCertificate, XbeHeader, XbeSectionHeader,
};

/// Base address used for built images
pub const BUILDER_BASE_ADDRESS: u32 = 0x0001_0000;

const PAGE_SIZE: usize = 0x1000;

/// Builder for XBE executables
#[derive(Debug, Clone)]
pub struct XbeBuilder {
    header: XbeHeader,
    certificate: XbeCertificate,
    debug_filename: Option<String>,
    pe_header: Option<PeHeader>,
    sections: Vec<(String, Vec<u8>)>,
}

impl XbeBuilder {
    /// Executable for `title_id` with an i386 PE header and no sections
    pub fn new(title_id: TitleId) -> Self {
        Self {
            header: XbeHeader {
                base_address: BUILDER_BASE_ADDRESS,
                ..XbeHeader::default()
            },
            certificate: XbeCertificate {
                title_id,
                ..XbeCertificate::default()
            },
            debug_filename: None,
            pe_header: Some(PeHeader {
                machine: MACHINE_I386,
                number_of_sections: 1,
                timestamp: 0,
                characteristics: 0x0102,
                subsystem: Some(Subsystem {
                    magic: 0x10B,
                    id: 14,
                    major: 1,
                    minor: 0,
                }),
            }),
            sections: Vec::new(),
        }
    }

    /// Set the title, truncated to 40 UTF-16 units
    pub fn title(mut self, title: &str) -> Self {
        self.certificate.title_name = [0; 40];
        for (slot, unit) in self
            .certificate
            .title_name
            .iter_mut()
            .zip(title.encode_utf16())
        {
            *slot = unit;
        }
        self
    }

    /// Set the header timestamp
    pub fn timestamp(mut self, timestamp: u32) -> Self {
        self.header.timestamp = timestamp;
        self
    }

    /// Set the allowed media types
    pub fn allowed_media_types(mut self, media: u32) -> Self {
        self.certificate.allowed_media_types = media;
        self
    }

    /// Set the region code
    pub fn region_code(mut self, region: u32) -> Self {
        self.certificate.region_code = region;
        self
    }

    /// Set the init flags
    pub fn init_flags(mut self, flags: u32) -> Self {
        self.header.init_flags = flags;
        self
    }

    /// Set the debug Unicode file name
    pub fn debug_filename(mut self, name: &str) -> Self {
        self.debug_filename = Some(name.to_string());
        self
    }

    /// Replace the PE header, or leave the PE area out with `None`
    pub fn pe_header(mut self, header: Option<PeHeader>) -> Self {
        self.pe_header = header;
        self
    }

    /// Add a section with raw contents
    pub fn section(mut self, name: &str, data: Vec<u8>) -> Self {
        self.sections.push((name.to_string(), data));
        self
    }

    /// Add a `$$XTIMAGE` section
    pub fn title_image(self, data: Vec<u8>) -> Self {
        self.section(SECTION_TITLE_IMAGE, data)
    }

    /// Serialize the executable
    pub fn build(&self) -> XbeResult<Vec<u8>> {
        let base = self.header.base_address;
        let cert_offset = XBE_HEADER_SIZE;
        let shdr_offset = cert_offset + XBE_CERTIFICATE_SIZE;
        let mut names_offset = shdr_offset + self.sections.len() * XBE_SECTION_HEADER_SIZE;

        // Names, then the debug file name, packed after the section headers
        let mut strings = Vec::new();
        let mut name_addrs = Vec::with_capacity(self.sections.len());
        for (name, _) in &self.sections {
            name_addrs.push(base + (names_offset + strings.len()) as u32);
            strings.extend_from_slice(name.as_bytes());
            strings.push(0);
        }
        strings.resize(strings.len().div_ceil(2) * 2, 0);
        let filename_w_address = match &self.debug_filename {
            Some(name) => {
                let addr = base + (names_offset + strings.len()) as u32;
                strings.extend_from_slice(&string_to_utf16le(name));
                strings.extend_from_slice(&[0, 0]);
                addr
            }
            None => 0,
        };
        names_offset += strings.len();

        let pe_offset = names_offset.div_ceil(PAGE_SIZE) * PAGE_SIZE;
        let mut body = match &self.pe_header {
            Some(pe) => pe.to_bytes()?,
            None => Vec::new(),
        };
        body.resize(body.len().div_ceil(PAGE_SIZE) * PAGE_SIZE, 0);

        let mut section_headers = Vec::with_capacity(self.sections.len());
        for ((_, data), name_addr) in self.sections.iter().zip(&name_addrs) {
            let paddr = pe_offset + body.len();
            section_headers.push(XbeSectionHeader {
                flags: 0,
                vaddr: base + paddr as u32,
                vsize: data.len() as u32,
                paddr: paddr as u32,
                psize: data.len() as u32,
                section_name_address: *name_addr,
                ..XbeSectionHeader::default()
            });
            body.extend_from_slice(data);
            body.resize(body.len().div_ceil(PAGE_SIZE) * PAGE_SIZE, 0);
        }

        let mut header = self.header.clone();
        header.cert_address = base + cert_offset as u32;
        header.section_count = self.sections.len() as u32;
        header.section_headers_address = base + shdr_offset as u32;
        header.debug_filename_w_address = filename_w_address;
        header.headers_size = pe_offset as u32;
        header.image_size = (pe_offset + body.len()) as u32;
        if self.pe_header.is_some() {
            header.pe_base_address = base + pe_offset as u32;
        }

        let mut out = Cursor::new(Vec::new());
        header.write(&mut out)?;
        self.certificate.write(&mut out)?;
        for shdr in &section_headers {
            shdr.write(&mut out)?;
        }
        let mut out = out.into_inner();
        out.extend_from_slice(&strings);
        out.resize(pe_offset, 0);
        out.extend_from_slice(&body);
        Ok(out)
    }
}
