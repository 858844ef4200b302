//! STFS package header
//!
//! The first 0x22C bytes of a package: a magic number followed by either a
//! console certificate and signature (`CON `) or a Microsoft RSA signature
//! and padding (`PIRS`, `LIVE`).

use std::io::Cursor;

use binrw::{BinRead, BinWrite};

use crate::stfs::error::{StfsError, StfsResult};
use crate::{BinaryFormat, write_record};

/// Size of the package header
pub const PACKAGE_HEADER_SIZE: usize = 0x22C;

/// Console type: debug kit
pub const CONSOLE_TYPE_DEBUG: u8 = 1;
/// Console type: retail console
pub const CONSOLE_TYPE_RETAIL: u8 = 2;

/// Package signing variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StfsType {
    /// Signed by a console
    Con,
    /// Signed by Microsoft, not from Xbox Live (e.g. system updates)
    Pirs,
    /// Signed by Microsoft, from Xbox Live (e.g. title updates)
    Live,
}

impl StfsType {
    /// Magic number
    pub fn magic(self) -> [u8; 4] {
        match self {
            Self::Con => *b"CON ",
            Self::Pirs => *b"PIRS",
            Self::Live => *b"LIVE",
        }
    }

    /// Human-readable package type
    pub fn description(self) -> &'static str {
        match self {
            Self::Con => "Console-Specific Package",
            Self::Pirs => "Non-Xbox Live Package",
            Self::Live => "Xbox Live Package",
        }
    }
}

/// Certificate of a console-signed package
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct ConsoleSignature {
    /// Public key certificate size
    pub pubkey_cert_size: u16,
    /// Certificate owner console ID
    pub console_id: [u8; 5],
    /// Certificate owner part number
    pub part_number: [u8; 20],
    /// Certificate owner console type (1 = debug, 2 = retail)
    pub console_type: u8,
    /// Certificate date, `MM-DD-YY`
    pub datestamp: [u8; 8],
    /// RSA public exponent
    pub pub_exponent: u32,
    /// RSA public modulus
    pub pub_modulus: [u8; 0x80],
    /// Certificate signature
    pub cert_signature: [u8; 0x100],
    /// Package signature
    pub signature: [u8; 0x80],
}

impl ConsoleSignature {
    /// Certificate with the given owner fields and empty key material
    pub fn new(
        console_id: [u8; 5],
        part_number: &str,
        console_type: u8,
        datestamp: [u8; 8],
    ) -> Self {
        let mut pn = [0u8; 20];
        let src = part_number.as_bytes();
        let n = src.len().min(pn.len());
        pn[..n].copy_from_slice(&src[..n]);
        Self {
            pubkey_cert_size: 0x1A8,
            console_id,
            part_number: pn,
            console_type,
            datestamp,
            pub_exponent: 0x0001_0001,
            pub_modulus: [0; 0x80],
            cert_signature: [0; 0x100],
            signature: [0; 0x80],
        }
    }
}

/// Signature block of a Microsoft-signed package
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct MsSignature {
    /// RSA-2048 signature
    pub signature: [u8; 0x100],
    /// Padding, always zero
    pub padding: [u8; 0x128],
}

impl Default for MsSignature {
    fn default() -> Self {
        Self {
            signature: [0; 0x100],
            padding: [0; 0x128],
        }
    }
}

/// STFS package header
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub enum PackageHeader {
    /// `CON `
    #[brw(magic = b"CON ")]
    Console(ConsoleSignature),
    /// `PIRS`
    #[brw(magic = b"PIRS")]
    Pirs(MsSignature),
    /// `LIVE`
    #[brw(magic = b"LIVE")]
    Live(MsSignature),
}

impl PackageHeader {
    /// Parse and validate a header
    pub fn parse(data: &[u8]) -> StfsResult<Self> {
        if data.len() >= 4 && !matches!(&data[..4], b"CON " | b"PIRS" | b"LIVE") {
            return Err(StfsError::InvalidMagic([data[0], data[1], data[2], data[3]]));
        }
        let header = Self::read(&mut Cursor::new(data))?;
        header.validate()?;
        Ok(header)
    }

    /// Signing variant
    pub fn stfs_type(&self) -> StfsType {
        match self {
            Self::Console(_) => StfsType::Con,
            Self::Pirs(_) => StfsType::Pirs,
            Self::Live(_) => StfsType::Live,
        }
    }

    /// Check the fields that tell a real package apart from other files
    /// sharing the magic (a Nintendo DS title begins with "Live")
    pub fn validate(&self) -> StfsResult<()> {
        match self {
            Self::Console(sig) => {
                if !matches!(sig.console_type, CONSOLE_TYPE_DEBUG | CONSOLE_TYPE_RETAIL) {
                    return Err(StfsError::InvalidConsoleType(sig.console_type));
                }
                if sig.datestamp[2] != b'-' || sig.datestamp[5] != b'-' {
                    return Err(StfsError::InvalidDatestamp);
                }
            }
            Self::Pirs(sig) | Self::Live(sig) => {
                if sig.padding.iter().any(|&b| b != 0) {
                    return Err(StfsError::NonZeroPadding);
                }
            }
        }
        Ok(())
    }

    /// Detect a package from the first bytes of a file
    pub fn detect(data: &[u8]) -> Option<StfsType> {
        if data.len() < PACKAGE_HEADER_SIZE {
            return None;
        }
        Self::parse(&data[..PACKAGE_HEADER_SIZE])
            .ok()
            .map(|h| h.stfs_type())
    }
}

impl BinaryFormat for PackageHeader {
    fn parse(data: &[u8]) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self::parse(data)?)
    }

    fn build(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        Ok(write_record(self)?)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{assert_invalid_data_rejected, assert_round_trip};

    fn to_bytes(header: &PackageHeader) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        header.write(&mut cursor).expect("write");
        cursor.into_inner()
    }

    #[test]
    fn test_header_size() {
        let live = to_bytes(&PackageHeader::Live(MsSignature::default()));
        assert_eq!(live.len(), PACKAGE_HEADER_SIZE);
        let con = to_bytes(&PackageHeader::Console(ConsoleSignature::new(
            [1, 2, 3, 4, 5],
            "X800000-001",
            CONSOLE_TYPE_RETAIL,
            *b"08-15-09",
        )));
        assert_eq!(con.len(), PACKAGE_HEADER_SIZE);
        assert_eq!(PackageHeader::detect(&con), Some(StfsType::Con));
    }

    #[test]
    fn test_live_padding_must_be_zero() {
        let mut data = to_bytes(&PackageHeader::Live(MsSignature::default()));
        assert_eq!(PackageHeader::detect(&data), Some(StfsType::Live));
        data[0x104] = 1;
        assert!(matches!(
            PackageHeader::parse(&data),
            Err(StfsError::NonZeroPadding)
        ));
    }

    #[test]
    fn test_console_checks() {
        let mut sig = ConsoleSignature::new([0; 5], "", 0, *b"08-15-09");
        let data = to_bytes(&PackageHeader::Console(sig.clone()));
        assert!(matches!(
            PackageHeader::parse(&data),
            Err(StfsError::InvalidConsoleType(0))
        ));

        sig.console_type = CONSOLE_TYPE_DEBUG;
        sig.datestamp = *b"20090815";
        let data = to_bytes(&PackageHeader::Console(sig));
        assert!(matches!(
            PackageHeader::parse(&data),
            Err(StfsError::InvalidDatestamp)
        ));
    }

    #[test]
    fn test_header_round_trip() {
        assert_round_trip!(PackageHeader::Live(MsSignature::default()));
        assert_round_trip!(PackageHeader::Console(ConsoleSignature::new(
            [0x0F; 5],
            "X803395-001",
            CONSOLE_TYPE_DEBUG,
            *b"02-28-06",
        )));

        let mut pirs = to_bytes(&PackageHeader::Pirs(MsSignature::default()));
        PackageHeader::verify_round_trip(&pirs).expect("round trip");
        pirs[PACKAGE_HEADER_SIZE - 1] = 0xFF;
        assert_invalid_data_rejected!(PackageHeader, &pirs);
        assert_invalid_data_rejected!(PackageHeader, &pirs[..0x100]);
    }

    #[test]
    fn test_bad_magic() {
        let mut data = vec![0u8; PACKAGE_HEADER_SIZE];
        data[..4].copy_from_slice(b"NOPE");
        assert!(matches!(
            PackageHeader::parse(&data),
            Err(StfsError::InvalidMagic(m)) if &m == b"NOPE"
        ));
    }
}
