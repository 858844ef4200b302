//! Title ID and version numbers shared by the Xbox and Xbox 360 formats

use std::fmt;

use crate::publishers;

/// Xbox / Xbox 360 title ID
///
/// The high two bytes are the publisher code, the low 16 bits the game
/// number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TitleId(pub u32);

impl TitleId {
    /// First publisher character
    pub fn a(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Second publisher character
    pub fn b(self) -> u8 {
        (self.0 >> 16) as u8
    }

    /// Game number
    pub fn number(self) -> u16 {
        self.0 as u16
    }

    /// Publisher name, or `Unknown (..)`
    pub fn publisher(self) -> String {
        publishers::display(self.a(), self.b())
    }

    /// `XXXXXXXX (PP-NNNN)`, with the game number zero-padded to `digits`
    pub fn display(self, digits: usize) -> String {
        format!(
            "{:08X} ({}-{:0digits$})",
            self.0,
            publishers::title_id_prefix(self.a(), self.b()),
            self.number()
        )
    }
}

/// Xbox 360 version number: `major.minor.build.qfe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Version(pub u32);

impl Version {
    /// Pack the four components
    pub fn new(major: u8, minor: u8, build: u16, qfe: u8) -> Self {
        Self(
            (u32::from(major & 0xF) << 28)
                | (u32::from(minor & 0xF) << 24)
                | (u32::from(build) << 8)
                | u32::from(qfe),
        )
    }

    /// Bits 28..32
    pub fn major(self) -> u32 {
        self.0 >> 28
    }

    /// Bits 24..28
    pub fn minor(self) -> u32 {
        (self.0 >> 24) & 0xF
    }

    /// Bits 8..24
    pub fn build(self) -> u32 {
        (self.0 >> 8) & 0xFFFF
    }

    /// Bits 0..8
    pub fn qfe(self) -> u32 {
        self.0 & 0xFF
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major(),
            self.minor(),
            self.build(),
            self.qfe()
        )
    }
}
