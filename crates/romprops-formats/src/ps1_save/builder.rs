//! Builder for PlayStation saves
//!
//! Writes the container header, the `SC` block and zero-filled save data up
//! to one card block. The PSV signature is left zeroed.

use std::io::Cursor;

use binrw::BinWrite;
use encoding_rs::SHIFT_JIS;

use crate::ps1_save::error::Ps1SaveResult;
use crate::ps1_save::header::{
    BLOCK_ENTRY_SIZE, BLOCK_SIZE, BlockEntry, PSV_HEADER_SIZE, Ps54Header, PsvHeader, SaveType,
    ScHeader,
};

/// Builder for PlayStation saves
#[derive(Debug, Clone)]
pub struct Ps1SaveBuilder {
    save_type: SaveType,
    filename: Vec<u8>,
    sc: ScHeader,
}

impl Ps1SaveBuilder {
    /// Empty save with no icon in the given layout
    pub fn new(save_type: SaveType) -> Self {
        Self {
            save_type,
            filename: Vec::new(),
            sc: ScHeader::default(),
        }
    }

    /// Set the card filename, stored as raw bytes
    pub fn filename(mut self, name: &[u8]) -> Self {
        self.filename = name.to_vec();
        self
    }

    /// Set the title, encoded as Shift-JIS and truncated to 64 bytes
    pub fn title(mut self, title: &str) -> Self {
        let (bytes, _, _) = SHIFT_JIS.encode(title);
        self.sc.title = [0; 64];
        let len = bytes.len().min(self.sc.title.len());
        self.sc.title[..len].copy_from_slice(&bytes[..len]);
        self
    }

    /// Set the icon flag
    pub fn icon_flag(mut self, flag: u8) -> Self {
        self.sc.icon_flag = flag;
        self
    }

    /// Set the BGR555 palette
    pub fn palette(mut self, palette: [u16; 16]) -> Self {
        self.sc.palette = palette;
        self
    }

    /// Set the pixels of icon frame `index` (0..3)
    pub fn frame(mut self, index: usize, data: [u8; 128]) -> Self {
        if let Some(slot) = self.sc.icon_data.get_mut(index) {
            *slot = data;
        }
        self
    }

    fn copy_filename(&self, dest: &mut [u8]) {
        let len = self.filename.len().min(dest.len());
        dest[..len].copy_from_slice(&self.filename[..len]);
    }

    /// Serialize the save
    pub fn build(&self) -> Ps1SaveResult<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        match self.save_type {
            SaveType::Psv => {
                let mut header = PsvHeader {
                    save_size: BLOCK_SIZE as u32,
                    ..PsvHeader::default()
                };
                self.copy_filename(&mut header.filename);
                header.write(&mut out)?;
            }
            SaveType::Block => {
                let mut entry = BlockEntry::default();
                self.copy_filename(&mut entry.filename);
                let mut raw = Cursor::new(Vec::with_capacity(BLOCK_ENTRY_SIZE));
                entry.write(&mut raw)?;
                entry.checksum = raw.into_inner()[..BLOCK_ENTRY_SIZE - 1]
                    .iter()
                    .fold(0u8, |acc, b| acc ^ b);
                entry.write(&mut out)?;
            }
            SaveType::Ps54 => {
                let mut header = Ps54Header::default();
                self.copy_filename(&mut header.filename);
                header.write(&mut out)?;
            }
            SaveType::Raw => {}
        }
        let header_len = out.get_ref().len();
        debug_assert!(header_len <= PSV_HEADER_SIZE);
        self.sc.write(&mut out)?;

        let mut data = out.into_inner();
        data.resize(header_len + BLOCK_SIZE as usize, 0);
        Ok(data)
    }
}
