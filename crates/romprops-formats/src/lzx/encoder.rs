//! LZX compressor
//!
//! Produces streams the decoder in this module (and the Xbox 360 loader)
//! accepts: one block per 32 KiB frame, verbatim with greedy hash-chain
//! matching, or stored uncompressed when that is smaller. No E8
//! translation is applied.

use super::bitstream::BitWriter;
use super::error::{LzxError, LzxResult};
use super::huffman::{Encoder, MAX_CODE_LEN};
use super::tables::{
    BLOCK_UNCOMPRESSED, BLOCK_VERBATIM, EXTRA_BITS, FRAME_SIZE, MAX_MATCH, MAX_WINDOW_BITS,
    MIN_MATCH, MIN_WINDOW_BITS, NUM_CHARS, NUM_PRIMARY_LENGTHS, NUM_SECONDARY_LENGTHS,
    POSITION_BASE, PRETREE_SYMBOLS, main_tree_size, position_slots,
};

const HASH_BITS: u32 = 15;
const MAX_CHAIN: usize = 48;
const NIL: u32 = u32::MAX;
/// Matches shorter than this are emitted as literals
const MIN_SEARCH_MATCH: usize = 3;

#[derive(Debug, Clone, Copy)]
enum Token {
    Literal(u8),
    Match { len: usize, offset: u32 },
}

#[derive(Debug, Clone, Copy)]
struct Symbol {
    main: u16,
    length: Option<u16>,
    extra_bits: u32,
    extra: u32,
}

/// Pretree-coded code length table
struct LengthPlan {
    pretree: Encoder,
    items: Vec<(u16, u32, u32)>,
}

impl LengthPlan {
    fn new(prev: &[u8], new: &[u8]) -> Self {
        let mut items = Vec::new();
        let mut x = 0;
        while x < new.len() {
            let zeros = new[x..].iter().take_while(|&&l| l == 0).count();
            if zeros >= 20 {
                let run = zeros.min(51);
                items.push((18, 5, (run - 20) as u32));
                x += run;
            } else if zeros >= 4 {
                items.push((17, 4, (zeros - 4) as u32));
                x += zeros;
            } else {
                let z = (u16::from(prev[x]) + 17 - u16::from(new[x])) % 17;
                items.push((z, 0, 0));
                x += 1;
            }
        }
        let mut freqs = [0u32; PRETREE_SYMBOLS];
        for &(sym, _, _) in &items {
            freqs[usize::from(sym)] += 1;
        }
        Self {
            pretree: Encoder::from_frequencies(&freqs, 15),
            items,
        }
    }

    fn cost(&self) -> u64 {
        let body: u64 = self
            .items
            .iter()
            .map(|&(sym, n, _)| u64::from(self.pretree.len_of(usize::from(sym)) + n))
            .sum();
        (PRETREE_SYMBOLS as u64) * 4 + body
    }

    fn write(&self, w: &mut BitWriter) {
        for &l in self.pretree.lengths() {
            w.write_bits(u32::from(l), 4);
        }
        for &(sym, n, value) in &self.items {
            self.pretree.write(w, usize::from(sym));
            w.write_bits(value, n);
        }
    }
}

/// Greedy LZ77 match finder over `seed ++ input`
struct MatchFinder<'a> {
    data: &'a [u8],
    head: Vec<u32>,
    prev: Vec<u32>,
    max_offset: usize,
}

impl<'a> MatchFinder<'a> {
    fn new(data: &'a [u8], max_offset: usize) -> Self {
        Self {
            data,
            head: vec![NIL; 1 << HASH_BITS],
            prev: vec![NIL; data.len()],
            max_offset,
        }
    }

    fn hash(&self, pos: usize) -> Option<usize> {
        let b = self.data.get(pos..pos + 3)?;
        let v = (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]);
        Some((v.wrapping_mul(0x9E37_79B1) >> (32 - HASH_BITS)) as usize)
    }

    fn insert(&mut self, pos: usize) {
        if let Some(h) = self.hash(pos) {
            self.prev[pos] = self.head[h];
            self.head[h] = pos as u32;
        }
    }

    /// Longest match at `pos` no longer than `limit`
    fn find(&self, pos: usize, limit: usize) -> Option<(usize, usize)> {
        let h = self.hash(pos)?;
        let mut cand = self.head[h];
        let mut best: Option<(usize, usize)> = None;
        for _ in 0..MAX_CHAIN {
            if cand == NIL {
                break;
            }
            let c = cand as usize;
            let offset = pos - c;
            if offset > self.max_offset {
                break;
            }
            let len = self.data[c..]
                .iter()
                .zip(&self.data[pos..pos + limit])
                .take_while(|(a, b)| a == b)
                .count();
            if len >= MIN_SEARCH_MATCH && best.is_none_or(|(l, _)| len > l) {
                best = Some((len, offset));
                if len == limit {
                    break;
                }
            }
            cand = self.prev[c];
        }
        best
    }
}

/// LZX compressor for one stream
#[derive(Debug, Clone)]
pub struct LzxEncoder {
    window_bits: u32,
}

impl LzxEncoder {
    /// Create a compressor for a window of `1 << window_bits` bytes
    pub fn new(window_bits: u32) -> LzxResult<Self> {
        if !(MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(&window_bits) {
            return Err(LzxError::InvalidWindowSize(1u32 << window_bits.min(31)));
        }
        Ok(Self { window_bits })
    }

    fn max_offset(&self) -> usize {
        let slots = position_slots(self.window_bits);
        let last = POSITION_BASE[slots - 1] + (1u32 << EXTRA_BITS[slots - 1]) - 1;
        ((last - 2) as usize).min((1usize << self.window_bits) - 3)
    }

    /// Compress `input`, allowing matches into the `seed` history
    ///
    /// The seed must be passed to the decoder as reference data.
    pub fn compress(&self, input: &[u8], seed: &[u8]) -> LzxResult<Vec<u8>> {
        let window = 1usize << self.window_bits;
        if seed.len() > window {
            return Err(LzxError::SeedTooLarge {
                seed: seed.len(),
                window,
            });
        }

        let mut history = Vec::with_capacity(seed.len() + input.len());
        history.extend_from_slice(seed);
        history.extend_from_slice(input);
        let mut finder = MatchFinder::new(&history, self.max_offset());
        for pos in 0..seed.len() {
            finder.insert(pos);
        }

        let main_size = main_tree_size(self.window_bits);
        let mut prev_main = vec![0u8; main_size];
        let mut prev_length = vec![0u8; NUM_SECONDARY_LENGTHS];
        let mut r = [1u32; 3];

        let mut w = BitWriter::new();
        // no E8 translation
        w.write_bits(0, 1);

        let mut pos = seed.len();
        while pos < history.len() {
            let frame_end = (pos + FRAME_SIZE).min(history.len());
            let tokens = tokenize(&mut finder, pos, frame_end);
            let mut block_r = r;
            let symbols: Vec<Symbol> = tokens
                .iter()
                .map(|t| to_symbol(*t, &mut block_r))
                .collect();

            let mut main_freq = vec![0u32; main_size];
            let mut length_freq = vec![0u32; NUM_SECONDARY_LENGTHS];
            for s in &symbols {
                main_freq[usize::from(s.main)] += 1;
                if let Some(l) = s.length {
                    length_freq[usize::from(l)] += 1;
                }
            }
            let main = Encoder::from_frequencies(&main_freq, MAX_CODE_LEN as u8);
            let length = Encoder::from_frequencies(&length_freq, MAX_CODE_LEN as u8);
            let plans = [
                LengthPlan::new(&prev_main[..NUM_CHARS], &main.lengths()[..NUM_CHARS]),
                LengthPlan::new(&prev_main[NUM_CHARS..], &main.lengths()[NUM_CHARS..]),
                LengthPlan::new(&prev_length, length.lengths()),
            ];

            let symbol_bits: u64 = symbols
                .iter()
                .map(|s| {
                    let len_bits = s.length.map_or(0, |l| length.len_of(usize::from(l)));
                    u64::from(main.len_of(usize::from(s.main)) + len_bits + s.extra_bits)
                })
                .sum();
            let verbatim_bits = symbol_bits + plans.iter().map(LengthPlan::cost).sum::<u64>();
            let frame = &history[pos..frame_end];
            let raw_bits = (frame.len() as u64 + 12 + 2) * 8;

            let block_type = if verbatim_bits < raw_bits {
                BLOCK_VERBATIM
            } else {
                BLOCK_UNCOMPRESSED
            };
            w.write_bits(block_type, 3);
            w.write_bits((frame.len() >> 8) as u32, 16);
            w.write_bits((frame.len() & 0xFF) as u32, 8);

            if verbatim_bits < raw_bits {
                for plan in &plans {
                    plan.write(&mut w);
                }
                for s in &symbols {
                    main.write(&mut w, usize::from(s.main));
                    if let Some(l) = s.length {
                        length.write(&mut w, usize::from(l));
                    }
                    w.write_bits(s.extra, s.extra_bits);
                }
                prev_main = main.lengths().to_vec();
                prev_length = length.lengths().to_vec();
                r = block_r;
            } else {
                w.begin_raw();
                for reg in r {
                    w.write_raw(&reg.to_le_bytes());
                }
                w.write_raw(frame);
                if frame.len() % 2 == 1 {
                    w.write_raw(&[0]);
                }
            }

            w.align_word();
            pos = frame_end;
        }
        Ok(w.finish())
    }
}

fn tokenize(finder: &mut MatchFinder<'_>, start: usize, end: usize) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut pos = start;
    while pos < end {
        let limit = (end - pos).min(MAX_MATCH);
        match finder.find(pos, limit) {
            Some((len, offset)) => {
                tokens.push(Token::Match {
                    len,
                    offset: offset as u32,
                });
                for p in pos..pos + len {
                    finder.insert(p);
                }
                pos += len;
            }
            None => {
                tokens.push(Token::Literal(finder.data[pos]));
                finder.insert(pos);
                pos += 1;
            }
        }
    }
    tokens
}

fn to_symbol(token: Token, r: &mut [u32; 3]) -> Symbol {
    let (len, offset) = match token {
        Token::Literal(b) => {
            return Symbol {
                main: u16::from(b),
                length: None,
                extra_bits: 0,
                extra: 0,
            };
        }
        Token::Match { len, offset } => (len, offset),
    };

    let (slot, extra_bits, extra) = if offset == r[0] {
        (0, 0, 0)
    } else if offset == r[1] {
        r.swap(0, 1);
        (1, 0, 0)
    } else if offset == r[2] {
        r.swap(0, 2);
        (2, 0, 0)
    } else {
        let formatted = offset + 2;
        let slot = POSITION_BASE
            .iter()
            .rposition(|&base| base <= formatted)
            .unwrap_or(3)
            .max(3);
        r[2] = r[1];
        r[1] = r[0];
        r[0] = offset;
        (slot, u32::from(EXTRA_BITS[slot]), formatted - POSITION_BASE[slot])
    };

    let len_header = (len - MIN_MATCH).min(NUM_PRIMARY_LENGTHS);
    let length = (len_header == NUM_PRIMARY_LENGTHS)
        .then(|| (len - MIN_MATCH - NUM_PRIMARY_LENGTHS) as u16);
    Symbol {
        main: (NUM_CHARS + ((slot << 3) | len_header)) as u16,
        length,
        extra_bits,
        extra,
    }
}
