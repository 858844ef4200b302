//! LZX decompressor
//!
//! Decodes the Xbox 360 / CAB flavour of LZX: a one-time E8 translation
//! header, then blocks of type verbatim, aligned-offset or uncompressed,
//! each with a 24-bit uncompressed length. Output is produced in 32 KiB
//! frames and the bit stream is realigned to a 16-bit word after every
//! frame. Code lengths are delta-coded against the previous block.

use tracing::trace;

use super::bitstream::BitReader;
use super::error::{LzxError, LzxResult};
use super::huffman::Decoder;
use super::tables::{
    ALIGNED_SYMBOLS, BLOCK_ALIGNED, BLOCK_UNCOMPRESSED, BLOCK_VERBATIM, EXTRA_BITS, FRAME_SIZE,
    MAX_WINDOW_BITS, MIN_MATCH, MIN_WINDOW_BITS, NUM_CHARS, NUM_PRIMARY_LENGTHS,
    NUM_SECONDARY_LENGTHS, POSITION_BASE, PRETREE_SYMBOLS, main_tree_size,
};

/// E8 translation stops after this many frames
const E8_MAX_FRAMES: u32 = 32768;

#[derive(Debug)]
enum Block {
    Compressed {
        aligned: Option<Decoder>,
        main: Decoder,
        length: Option<Decoder>,
    },
    Uncompressed,
}

#[derive(Debug)]
struct BlockState {
    block: Block,
    length: usize,
    remaining: usize,
}

/// Streaming LZX decoder state
#[derive(Debug)]
pub struct LzxDecoder {
    window: Vec<u8>,
    window_pos: usize,
    main_lengths: Vec<u8>,
    length_lengths: Vec<u8>,
    r: [u32; 3],
    header_read: bool,
    intel_filesize: i32,
    intel_started: bool,
    intel_curpos: i32,
    frame: u32,
    block: Option<BlockState>,
    decoded: u64,
    ref_data_size: usize,
}

impl LzxDecoder {
    /// Create a decoder for a window of `1 << window_bits` bytes
    pub fn new(window_bits: u32) -> LzxResult<Self> {
        if !(MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(&window_bits) {
            return Err(LzxError::InvalidWindowSize(1u32 << window_bits.min(31)));
        }
        Ok(Self {
            window: vec![0u8; 1 << window_bits],
            window_pos: 0,
            main_lengths: vec![0u8; main_tree_size(window_bits)],
            length_lengths: vec![0u8; NUM_SECONDARY_LENGTHS],
            r: [1, 1, 1],
            header_read: false,
            intel_filesize: 0,
            intel_started: false,
            intel_curpos: 0,
            frame: 0,
            block: None,
            decoded: 0,
            ref_data_size: 0,
        })
    }

    /// Window size in bytes
    pub fn window_size(&self) -> usize {
        self.window.len()
    }

    /// Preload the window with history data
    ///
    /// The data is placed at the end of the window so that it sits
    /// directly behind the first output byte.
    pub fn set_reference_data(&mut self, data: &[u8]) -> LzxResult<()> {
        let window = self.window.len();
        if data.len() > window {
            return Err(LzxError::SeedTooLarge {
                seed: data.len(),
                window,
            });
        }
        self.window.fill(0);
        self.window[window - data.len()..].copy_from_slice(data);
        self.ref_data_size = data.len();
        Ok(())
    }

    /// Decompress `input` until `output` is full
    pub fn decompress(&mut self, input: &[u8], output: &mut [u8]) -> LzxResult<()> {
        let mut reader = BitReader::new(input);

        if !self.header_read {
            if reader.read_bit()? == 1 {
                let hi = reader.read_bits(16)?;
                let lo = reader.read_bits(16)?;
                self.intel_filesize = ((hi << 16) | lo) as i32;
            }
            self.header_read = true;
        }

        let mut out_pos = 0;
        while out_pos < output.len() {
            let frame_size = FRAME_SIZE.min(output.len() - out_pos);
            let frame_start = self.window_pos;
            let frame_end = frame_start + frame_size;

            while self.window_pos < frame_end {
                let needs_header = self.block.as_ref().is_none_or(|b| b.remaining == 0);
                if needs_header {
                    self.read_block_header(&mut reader)?;
                }
                let Some(mut state) = self.block.take() else {
                    return Err(LzxError::InputOverrun);
                };
                let run = state.remaining.min(frame_end - self.window_pos);
                let result = match &state.block {
                    Block::Uncompressed => {
                        let end = self.window_pos + run;
                        reader.read_raw(&mut self.window[self.window_pos..end])?;
                        self.window_pos = end;
                        self.decoded += run as u64;
                        Ok(())
                    }
                    Block::Compressed {
                        aligned,
                        main,
                        length,
                    } => self.decode_run(&mut reader, run, main, length.as_ref(), aligned.as_ref()),
                };
                state.remaining -= run;
                self.block = Some(state);
                result?;
            }

            let out = &mut output[out_pos..out_pos + frame_size];
            out.copy_from_slice(&self.window[frame_start..frame_end]);
            if self.intel_started
                && self.intel_filesize != 0
                && self.frame < E8_MAX_FRAMES
                && frame_size > 10
            {
                e8_translate(out, self.intel_curpos, self.intel_filesize);
            }
            self.intel_curpos = self.intel_curpos.wrapping_add(frame_size as i32);
            self.frame += 1;
            out_pos += frame_size;

            if self.window_pos == self.window.len() {
                self.window_pos = 0;
            }
            reader.align_word();
        }
        Ok(())
    }

    fn read_block_header(&mut self, reader: &mut BitReader<'_>) -> LzxResult<()> {
        if let Some(prev) = &self.block
            && matches!(prev.block, Block::Uncompressed)
            && prev.length & 1 == 1
        {
            reader.skip_raw(1)?;
        }

        let block_type = reader.read_bits(3)?;
        let hi = reader.read_bits(16)?;
        let lo = reader.read_bits(8)?;
        let length = ((hi << 8) | lo) as usize;
        trace!("LZX block type {block_type}, {length} bytes");

        let block = match block_type {
            BLOCK_VERBATIM | BLOCK_ALIGNED => {
                let aligned = if block_type == BLOCK_ALIGNED {
                    let mut lens = [0u8; ALIGNED_SYMBOLS];
                    for l in &mut lens {
                        *l = reader.read_bits(3)? as u8;
                    }
                    Some(Decoder::new(&lens, "aligned")?.ok_or(LzxError::InvalidTable {
                        tree: "aligned",
                        reason: "empty",
                    })?)
                } else {
                    None
                };

                read_lengths(reader, &mut self.main_lengths[..NUM_CHARS])?;
                read_lengths(reader, &mut self.main_lengths[NUM_CHARS..])?;
                let main = Decoder::new(&self.main_lengths, "main")?.ok_or(LzxError::InvalidTable {
                    tree: "main",
                    reason: "empty",
                })?;
                if self.main_lengths[0xE8] != 0 {
                    self.intel_started = true;
                }
                read_lengths(reader, &mut self.length_lengths)?;
                let length_tree = Decoder::new(&self.length_lengths, "length")?;
                Block::Compressed {
                    aligned,
                    main,
                    length: length_tree,
                }
            }
            BLOCK_UNCOMPRESSED => {
                self.intel_started = true;
                reader.begin_raw()?;
                let mut regs = [0u8; 12];
                reader.read_raw(&mut regs)?;
                for (r, b) in self.r.iter_mut().zip(regs.chunks_exact(4)) {
                    *r = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                }
                Block::Uncompressed
            }
            other => return Err(LzxError::InvalidBlockType(other)),
        };

        self.block = Some(BlockState {
            block,
            length,
            remaining: length,
        });
        Ok(())
    }

    fn decode_run(
        &mut self,
        reader: &mut BitReader<'_>,
        run: usize,
        main: &Decoder,
        length: Option<&Decoder>,
        aligned: Option<&Decoder>,
    ) -> LzxResult<()> {
        let window_size = self.window.len();
        let end = self.window_pos + run;
        while self.window_pos < end {
            let sym = usize::from(main.decode(reader)?);
            if sym < NUM_CHARS {
                self.window[self.window_pos] = sym as u8;
                self.window_pos += 1;
                self.decoded += 1;
                continue;
            }

            let sym = sym - NUM_CHARS;
            let mut match_len = sym & NUM_PRIMARY_LENGTHS;
            if match_len == NUM_PRIMARY_LENGTHS {
                let tree = length.ok_or(LzxError::InvalidSymbol)?;
                match_len += usize::from(tree.decode(reader)?);
            }
            match_len += MIN_MATCH;

            let slot = sym >> 3;
            let offset = match slot {
                0 => self.r[0],
                1 => {
                    self.r.swap(0, 1);
                    self.r[0]
                }
                2 => {
                    self.r.swap(0, 2);
                    self.r[0]
                }
                _ => {
                    let offset = read_offset(reader, slot, aligned)?;
                    self.r[2] = self.r[1];
                    self.r[1] = self.r[0];
                    self.r[0] = offset;
                    offset
                }
            };

            if match_len > end - self.window_pos {
                return Err(LzxError::FrameOverrun);
            }
            let available = self.decoded + self.ref_data_size as u64;
            if offset == 0 || offset as usize > window_size || u64::from(offset) > available {
                return Err(LzxError::MatchOffsetOutOfRange {
                    offset,
                    position: self.decoded,
                });
            }

            let offset = offset as usize;
            for _ in 0..match_len {
                let src = (self.window_pos + window_size - offset) % window_size;
                self.window[self.window_pos] = self.window[src];
                self.window_pos += 1;
            }
            self.decoded += match_len as u64;
        }
        Ok(())
    }
}

fn read_offset(
    reader: &mut BitReader<'_>,
    slot: usize,
    aligned: Option<&Decoder>,
) -> LzxResult<u32> {
    let extra = u32::from(*EXTRA_BITS.get(slot).ok_or(LzxError::InvalidSymbol)?);
    let mut offset = POSITION_BASE[slot] - 2;
    match aligned {
        Some(tree) if extra >= 3 => {
            if extra > 3 {
                offset += reader.read_bits(extra - 3)? << 3;
            }
            offset += u32::from(tree.decode(reader)?);
        }
        _ => offset += reader.read_bits(extra)?,
    }
    Ok(offset)
}

/// Read pretree-coded length deltas into `lens`
fn read_lengths(reader: &mut BitReader<'_>, lens: &mut [u8]) -> LzxResult<()> {
    let mut pre = [0u8; PRETREE_SYMBOLS];
    for l in &mut pre {
        *l = reader.read_bits(4)? as u8;
    }
    let pretree = Decoder::new(&pre, "pretree")?.ok_or(LzxError::InvalidTable {
        tree: "pretree",
        reason: "empty",
    })?;

    let delta = |old: u8, z: u16| -> LzxResult<u8> {
        if z > 16 {
            return Err(LzxError::InvalidSymbol);
        }
        Ok(((u16::from(old) + 17 - z) % 17) as u8)
    };

    let mut x = 0;
    while x < lens.len() {
        match pretree.decode(reader)? {
            17 => {
                let run = reader.read_bits(4)? as usize + 4;
                let stop = (x + run).min(lens.len());
                lens[x..stop].fill(0);
                x = stop;
            }
            18 => {
                let run = reader.read_bits(5)? as usize + 20;
                let stop = (x + run).min(lens.len());
                lens[x..stop].fill(0);
                x = stop;
            }
            19 => {
                let run = reader.read_bits(1)? as usize + 4;
                let value = delta(lens[x], pretree.decode(reader)?)?;
                let stop = (x + run).min(lens.len());
                lens[x..stop].fill(value);
                x = stop;
            }
            z => {
                lens[x] = delta(lens[x], z)?;
                x += 1;
            }
        }
    }
    Ok(())
}

/// Undo the x86 CALL translation on one output frame
pub(crate) fn e8_translate(frame: &mut [u8], base: i32, filesize: i32) {
    let end = frame.len().saturating_sub(10);
    let mut i = 0;
    while i < end {
        if frame[i] != 0xE8 {
            i += 1;
            continue;
        }
        let curpos = base.wrapping_add(i as i32);
        let abs = i32::from_le_bytes([frame[i + 1], frame[i + 2], frame[i + 3], frame[i + 4]]);
        if abs >= curpos.wrapping_neg() && abs < filesize {
            let rel = if abs >= 0 {
                abs - curpos
            } else {
                abs.wrapping_add(filesize)
            };
            frame[i + 1..i + 5].copy_from_slice(&rel.to_le_bytes());
        }
        i += 5;
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::lzx::bitstream::BitWriter;

    #[test]
    fn test_uncompressed_block() {
        // header bit, block type 3, length 5, raw data, R0..R2
        let mut w = BitWriter::new();
        w.write_bits(0, 1);
        w.write_bits(BLOCK_UNCOMPRESSED, 3);
        w.write_bits(0, 16);
        w.write_bits(5, 8);
        w.begin_raw();
        for r in [1u32, 1, 1] {
            w.write_raw(&r.to_le_bytes());
        }
        w.write_raw(b"hello");
        let data = w.finish();

        let mut dec = LzxDecoder::new(15).expect("Test operation should succeed");
        let mut out = [0u8; 5];
        dec.decompress(&data, &mut out).expect("Test operation should succeed");
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn test_rejects_bad_block_type() {
        let mut w = BitWriter::new();
        w.write_bits(0, 1);
        w.write_bits(5, 3);
        w.write_bits(0, 24);
        let data = w.finish();
        let mut dec = LzxDecoder::new(16).expect("Test operation should succeed");
        let mut out = [0u8; 4];
        assert!(matches!(
            dec.decompress(&data, &mut out),
            Err(LzxError::InvalidBlockType(5))
        ));
    }

    #[test]
    fn test_window_bits_range() {
        assert!(LzxDecoder::new(14).is_err());
        assert!(LzxDecoder::new(22).is_err());
        assert_eq!(LzxDecoder::new(17).expect("valid").window_size(), 1 << 17);
    }

    #[test]
    fn test_e8_translation() {
        // CALL at position 0x20 with absolute target 0x120 becomes relative 0x100
        let mut frame = vec![0u8; 64];
        frame[0x20] = 0xE8;
        frame[0x21..0x25].copy_from_slice(&0x120i32.to_le_bytes());
        e8_translate(&mut frame, 0, 0x10000);
        assert_eq!(&frame[0x21..0x25], &0x100i32.to_le_bytes());

        // Targets outside the file are left alone
        let mut frame = vec![0u8; 64];
        frame[0] = 0xE8;
        frame[1..5].copy_from_slice(&0x7FFF_0000i32.to_le_bytes());
        e8_translate(&mut frame, 0, 0x10000);
        assert_eq!(&frame[1..5], &0x7FFF_0000i32.to_le_bytes());
    }

    #[test]
    fn test_truncated_input() {
        let mut dec = LzxDecoder::new(16).expect("Test operation should succeed");
        let mut out = [0u8; 100];
        assert!(dec.decompress(&[0x00, 0x30], &mut out).is_err());
    }
}
