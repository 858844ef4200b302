//! Minimal PE header reader
//!
//! Xbox and Xbox 360 executables wrap a PE image. Only the DOS stub, the
//! COFF file header and the start of the optional header are read, which is
//! enough to report the target machine, link timestamp and subsystem.

use std::io::{Cursor, Read, Seek, SeekFrom};

use binrw::{BinRead, BinWrite};
use thiserror::Error;

use crate::BinaryFormat;
use crate::fields::RomFields;
use crate::subfile::read_at;

/// Bytes read from the start of an image when looking for the headers
pub const PE_HEADER_READ_SIZE: usize = 8192;

/// COFF machine: Intel 386
pub const MACHINE_I386: u16 = 0x014C;
/// COFF machine: big-endian PowerPC (Xbox 360)
pub const MACHINE_POWERPC_BE: u16 = 0x01F2;

/// Errors from the PE header reader
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum PeError {
    #[error("e_lfanew 0x{0:08X} is outside the header area")]
    HeaderOutOfRange(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

/// Result type for PE operations
pub type PeResult<T> = Result<T, PeError>;

/// DOS stub header; only the fields used to find the PE header
#[derive(Debug, Clone, BinRead, BinWrite)]
#[br(little)]
#[bw(little)]
pub struct DosHeader {
    /// `MZ`
    #[br(assert(magic == *b"MZ", "Invalid MZ magic"))]
    pub magic: [u8; 2],
    /// File offset of the `PE\0\0` signature
    #[br(pad_before = 0x3A)]
    #[bw(pad_before = 0x3A)]
    pub e_lfanew: u32,
}

/// COFF file header, preceded by the `PE\0\0` signature
#[derive(Debug, Clone, BinRead, BinWrite)]
#[br(little)]
#[bw(little)]
pub struct CoffHeader {
    /// `PE\0\0`
    #[br(assert(signature == *b"PE\0\0", "Invalid PE signature"))]
    pub signature: [u8; 4],
    /// Target machine
    pub machine: u16,
    /// Section count
    pub number_of_sections: u16,
    /// Link time, Unix seconds
    pub time_date_stamp: u32,
    /// Symbol table offset
    pub pointer_to_symbol_table: u32,
    /// Symbol count
    pub number_of_symbols: u32,
    /// Size of the optional header that follows
    pub size_of_optional_header: u16,
    /// `IMAGE_FILE_*` flags
    pub characteristics: u16,
}

// Offsets are the same for PE32 and PE32+.
#[derive(Debug, Clone, BinRead)]
#[br(little)]
struct OptionalHeaderPrefix {
    magic: u16,
    #[br(pad_before = 46)]
    major_subsystem_version: u16,
    minor_subsystem_version: u16,
    #[br(pad_before = 16)]
    subsystem: u16,
}

const OPTIONAL_HEADER_MIN: u16 = 70;
const OPTIONAL_HEADER_PE32: u16 = 0xE0;

/// Subsystem information from the optional header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subsystem {
    /// Optional header magic (`0x10B` PE32, `0x20B` PE32+)
    pub magic: u16,
    /// `IMAGE_SUBSYSTEM_*` value
    pub id: u16,
    /// Major subsystem version
    pub major: u16,
    /// Minor subsystem version
    pub minor: u16,
}

/// The parts of a PE header reported as fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeHeader {
    /// Target machine
    pub machine: u16,
    /// Section count
    pub number_of_sections: u16,
    /// Link time, Unix seconds
    pub timestamp: u32,
    /// `IMAGE_FILE_*` flags
    pub characteristics: u16,
    /// Present when the optional header is long enough
    pub subsystem: Option<Subsystem>,
}

impl PeHeader {
    /// Parse the headers at the start of `data`
    pub fn parse(data: &[u8]) -> PeResult<Self> {
        let mut cursor = Cursor::new(data);
        let dos = DosHeader::read(&mut cursor)?;
        if u64::from(dos.e_lfanew) + 24 > data.len() as u64 {
            return Err(PeError::HeaderOutOfRange(dos.e_lfanew));
        }
        cursor.seek(SeekFrom::Start(u64::from(dos.e_lfanew)))?;
        let coff = CoffHeader::read(&mut cursor)?;

        let opt_start = u64::from(dos.e_lfanew) + 24;
        let subsystem = if coff.size_of_optional_header >= OPTIONAL_HEADER_MIN
            && opt_start + u64::from(OPTIONAL_HEADER_MIN) <= data.len() as u64
        {
            let opt = OptionalHeaderPrefix::read(&mut cursor)?;
            Some(Subsystem {
                magic: opt.magic,
                id: opt.subsystem,
                major: opt.major_subsystem_version,
                minor: opt.minor_subsystem_version,
            })
        } else {
            None
        };

        Ok(Self {
            machine: coff.machine,
            number_of_sections: coff.number_of_sections,
            timestamp: coff.time_date_stamp,
            characteristics: coff.characteristics,
            subsystem,
        })
    }

    /// Read the first [`PE_HEADER_READ_SIZE`] bytes of `reader` and parse them
    pub fn read_from<R: Read + Seek>(reader: &mut R) -> PeResult<Self> {
        let mut buf = vec![0u8; PE_HEADER_READ_SIZE];
        let n = read_at(reader, 0, &mut buf)?;
        buf.truncate(n);
        Self::parse(&buf)
    }

    /// Serialize as a minimal header image (DOS stub, COFF, PE32 optional header)
    pub fn to_bytes(&self) -> PeResult<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        DosHeader {
            magic: *b"MZ",
            e_lfanew: 0x40,
        }
        .write(&mut cursor)?;
        CoffHeader {
            signature: *b"PE\0\0",
            machine: self.machine,
            number_of_sections: self.number_of_sections,
            time_date_stamp: self.timestamp,
            pointer_to_symbol_table: 0,
            number_of_symbols: 0,
            size_of_optional_header: if self.subsystem.is_some() {
                OPTIONAL_HEADER_PE32
            } else {
                0
            },
            characteristics: self.characteristics,
        }
        .write(&mut cursor)?;

        let mut out = cursor.into_inner();
        if let Some(sub) = self.subsystem {
            let mut opt = vec![0u8; usize::from(OPTIONAL_HEADER_PE32)];
            opt[0..2].copy_from_slice(&sub.magic.to_le_bytes());
            opt[48..50].copy_from_slice(&sub.major.to_le_bytes());
            opt[50..52].copy_from_slice(&sub.minor.to_le_bytes());
            opt[68..70].copy_from_slice(&sub.id.to_le_bytes());
            out.extend_from_slice(&opt);
        }
        Ok(out)
    }

    /// Whether the image is a DLL
    pub fn is_dll(&self) -> bool {
        self.characteristics & 0x2000 != 0
    }

    /// Field list, in a tab named "PE"
    pub fn fields(&self) -> RomFields {
        let mut fields = RomFields::new();
        fields.set_tab_name(0, "PE");

        let machine = match machine_name(self.machine) {
            Some(name) => name.to_string(),
            None => format!("Unknown (0x{:04X})", self.machine),
        };
        fields.add_string("PE Machine", machine);

        if self.timestamp == 0 {
            fields.add_string("PE Timestamp", "Not set");
        } else {
            fields.add_date_time("PE Timestamp", i64::from(self.timestamp));
        }

        if let Some(sub) = self.subsystem {
            let name = subsystem_name(sub.id)
                .map_or_else(|| format!("Unknown ({})", sub.id), str::to_string);
            fields.add_string("PE Subsystem", format!("{name} {}.{:02}", sub.major, sub.minor));
        }

        fields.add_string(
            "PE Type",
            if self.is_dll() { "DLL" } else { "Executable" },
        );
        fields
    }
}

impl BinaryFormat for PeHeader {
    fn parse(data: &[u8]) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self::parse(data)?)
    }

    fn build(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        Ok(self.to_bytes()?)
    }
}

/// Name of a COFF machine type
pub fn machine_name(machine: u16) -> Option<&'static str> {
    Some(match machine {
        MACHINE_I386 => "Intel i386",
        0x0166 => "MIPS R4000",
        0x01C0 => "ARM",
        0x01F0 => "PowerPC",
        MACHINE_POWERPC_BE => "PowerPC (big-endian)",
        0x8664 => "AMD64",
        0xAA64 => "ARM64",
        _ => return None,
    })
}

/// Name of an `IMAGE_SUBSYSTEM_*` value
pub fn subsystem_name(subsystem: u16) -> Option<&'static str> {
    Some(match subsystem {
        1 => "Native",
        2 => "Windows GUI",
        3 => "Windows Console",
        9 => "Windows CE GUI",
        10 => "EFI Application",
        14 => "Xbox",
        _ => return None,
    })
}
