//! LZX bit streams
//!
//! LZX packs bits MSB-first into 16-bit little-endian words.

use super::error::{LzxError, LzxResult};

/// Zero words that may be read past the end of the input
const MAX_OVERRUN_WORDS: u32 = 4;

/// Reads bits from an LZX stream
pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    buf: u64,
    bits: u32,
    overrun: u32,
}

impl<'a> BitReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            buf: 0,
            bits: 0,
            overrun: 0,
        }
    }

    fn refill(&mut self) -> LzxResult<()> {
        let word = match self.data.get(self.pos..self.pos + 2) {
            Some(w) => u16::from_le_bytes([w[0], w[1]]),
            None => match self.data.get(self.pos) {
                Some(&b) => u16::from(b),
                None => {
                    self.overrun += 1;
                    if self.overrun > MAX_OVERRUN_WORDS {
                        return Err(LzxError::InputOverrun);
                    }
                    0
                }
            },
        };
        self.pos += 2;
        self.buf |= u64::from(word) << (48 - self.bits);
        self.bits += 16;
        Ok(())
    }

    /// Read `n` bits (`n <= 32`)
    pub(crate) fn read_bits(&mut self, n: u32) -> LzxResult<u32> {
        if n == 0 {
            return Ok(0);
        }
        while self.bits < n {
            self.refill()?;
        }
        let value = (self.buf >> (64 - n)) as u32;
        self.buf <<= n;
        self.bits -= n;
        Ok(value)
    }

    pub(crate) fn read_bit(&mut self) -> LzxResult<u32> {
        self.read_bits(1)
    }

    /// Drop the unread bits of the current word
    pub(crate) fn align_word(&mut self) {
        let partial = self.bits % 16;
        self.buf <<= partial;
        self.bits -= partial;
    }

    /// Switch to byte-level reads for an uncompressed block
    ///
    /// Skips 1 to 16 bits so the next read starts on a word boundary.
    pub(crate) fn begin_raw(&mut self) -> LzxResult<()> {
        let partial = self.bits % 16;
        let whole = (self.bits / 16) as usize;
        self.pos = self.pos.saturating_sub(whole * 2);
        if partial == 0 {
            self.pos += 2;
        }
        self.buf = 0;
        self.bits = 0;
        if self.pos > self.data.len() {
            return Err(LzxError::InputOverrun);
        }
        Ok(())
    }

    pub(crate) fn read_raw(&mut self, out: &mut [u8]) -> LzxResult<()> {
        let src = self
            .data
            .get(self.pos..self.pos + out.len())
            .ok_or(LzxError::InputOverrun)?;
        out.copy_from_slice(src);
        self.pos += out.len();
        Ok(())
    }

    pub(crate) fn skip_raw(&mut self, n: usize) -> LzxResult<()> {
        if self.pos + n > self.data.len() {
            return Err(LzxError::InputOverrun);
        }
        self.pos += n;
        Ok(())
    }
}

/// Writes bits in LZX word order
#[derive(Debug, Default)]
pub(crate) struct BitWriter {
    out: Vec<u8>,
    acc: u32,
    bits: u32,
}

impl BitWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Write the low `n` bits of `value` (`n <= 32`)
    pub(crate) fn write_bits(&mut self, value: u32, n: u32) {
        let mut n = n;
        while n > 0 {
            let take = n.min(16 - self.bits);
            let chunk = (value >> (n - take)) & ((1u32 << take) - 1);
            self.acc = (self.acc << take) | chunk;
            self.bits += take;
            n -= take;
            if self.bits == 16 {
                self.out.extend_from_slice(&(self.acc as u16).to_le_bytes());
                self.acc = 0;
                self.bits = 0;
            }
        }
    }

    /// Pad the current word with zero bits
    pub(crate) fn align_word(&mut self) {
        if self.bits > 0 {
            self.write_bits(0, 16 - self.bits);
        }
    }

    /// Counterpart of [`BitReader::begin_raw`]
    pub(crate) fn begin_raw(&mut self) {
        if self.bits == 0 {
            self.write_bits(0, 16);
        } else {
            self.align_word();
        }
    }

    pub(crate) fn write_raw(&mut self, data: &[u8]) {
        debug_assert_eq!(self.bits, 0);
        self.out.extend_from_slice(data);
    }

    pub(crate) fn finish(mut self) -> Vec<u8> {
        self.align_word();
        self.out
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_word_order() {
        let mut w = BitWriter::new();
        w.write_bits(0b101, 3);
        w.write_bits(0x1FFF, 13);
        w.write_bits(0xABCD, 16);
        let data = w.finish();
        // First word is 0b1011_1111_1111_1111 stored little-endian
        assert_eq!(data, vec![0xFF, 0xBF, 0xCD, 0xAB]);

        let mut r = BitReader::new(&data);
        assert_eq!(r.read_bits(3).expect("bits"), 0b101);
        assert_eq!(r.read_bits(13).expect("bits"), 0x1FFF);
        assert_eq!(r.read_bits(16).expect("bits"), 0xABCD);
    }

    #[test]
    fn test_raw_alignment_matches() {
        for lead in [0u32, 5, 16] {
            let mut w = BitWriter::new();
            w.write_bits(0x3FFF_FFFF >> (30 - lead.min(30)), lead);
            w.begin_raw();
            w.write_raw(b"RAW!");
            w.write_bits(0x55, 8);
            let data = w.finish();

            let mut r = BitReader::new(&data);
            r.read_bits(lead).expect("lead bits");
            r.begin_raw().expect("align");
            let mut raw = [0u8; 4];
            r.read_raw(&mut raw).expect("raw");
            assert_eq!(&raw, b"RAW!");
            assert_eq!(r.read_bits(8).expect("tail"), 0x55);
        }
    }

    #[test]
    fn test_overrun_is_bounded() {
        let mut r = BitReader::new(&[]);
        for _ in 0..MAX_OVERRUN_WORDS {
            assert_eq!(r.read_bits(16).expect("zero padding"), 0);
        }
        assert!(matches!(r.read_bits(16), Err(LzxError::InputOverrun)));
    }
}
