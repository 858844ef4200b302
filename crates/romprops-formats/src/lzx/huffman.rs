//! Canonical Huffman codes
//!
//! Codes are assigned in order of (length, symbol), so a tree is fully
//! described by its code lengths. Decoding walks the code one bit at a
//! time using per-length counts.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::bitstream::{BitReader, BitWriter};
use super::error::{LzxError, LzxResult};

/// Longest code LZX allows
pub(crate) const MAX_CODE_LEN: usize = 16;

/// Decoding table for one tree
#[derive(Debug, Clone)]
pub(crate) struct Decoder {
    counts: [u16; MAX_CODE_LEN + 1],
    symbols: Vec<u16>,
}

impl Decoder {
    /// Build a decoder; `Ok(None)` means every length is zero
    pub(crate) fn new(lengths: &[u8], tree: &'static str) -> LzxResult<Option<Self>> {
        let mut counts = [0u16; MAX_CODE_LEN + 1];
        for &len in lengths {
            let len = usize::from(len);
            if len > MAX_CODE_LEN {
                return Err(LzxError::InvalidTable {
                    tree,
                    reason: "code length above 16",
                });
            }
            counts[len] += 1;
        }
        counts[0] = 0;
        if counts.iter().all(|&c| c == 0) {
            return Ok(None);
        }

        let mut left: i32 = 1;
        for &count in &counts[1..] {
            left <<= 1;
            left -= i32::from(count);
            if left < 0 {
                return Err(LzxError::InvalidTable {
                    tree,
                    reason: "over-subscribed",
                });
            }
        }
        if left > 0 {
            return Err(LzxError::InvalidTable {
                tree,
                reason: "incomplete",
            });
        }

        let mut offsets = [0usize; MAX_CODE_LEN + 2];
        for len in 1..=MAX_CODE_LEN {
            offsets[len + 1] = offsets[len] + usize::from(counts[len]);
        }
        let mut symbols = vec![0u16; offsets[MAX_CODE_LEN + 1]];
        for (sym, &len) in lengths.iter().enumerate() {
            if len != 0 {
                let slot = &mut offsets[usize::from(len)];
                symbols[*slot] = sym as u16;
                *slot += 1;
            }
        }
        Ok(Some(Self { counts, symbols }))
    }

    /// Decode one symbol
    pub(crate) fn decode(&self, reader: &mut BitReader<'_>) -> LzxResult<u16> {
        let mut code: i32 = 0;
        let mut first: i32 = 0;
        let mut index: i32 = 0;
        for &count in &self.counts[1..] {
            code |= reader.read_bit()? as i32;
            let count = i32::from(count);
            if code - first < count {
                return Ok(self.symbols[(index + code - first) as usize]);
            }
            index += count;
            first = (first + count) << 1;
            code <<= 1;
        }
        Err(LzxError::InvalidSymbol)
    }
}

/// Encoding table for one tree
#[derive(Debug, Clone)]
pub(crate) struct Encoder {
    lengths: Vec<u8>,
    codes: Vec<u32>,
}

impl Encoder {
    /// Build an optimal code limited to `max_len` bits
    pub(crate) fn from_frequencies(freqs: &[u32], max_len: u8) -> Self {
        let lengths = limited_lengths(freqs, max_len);
        Self::from_lengths(lengths)
    }

    pub(crate) fn from_lengths(lengths: Vec<u8>) -> Self {
        let mut bl_count = [0u32; MAX_CODE_LEN + 1];
        for &l in &lengths {
            bl_count[usize::from(l)] += 1;
        }
        bl_count[0] = 0;
        let mut next = [0u32; MAX_CODE_LEN + 1];
        let mut code = 0u32;
        for len in 1..=MAX_CODE_LEN {
            code = (code + bl_count[len - 1]) << 1;
            next[len] = code;
        }
        let codes = lengths
            .iter()
            .map(|&l| {
                if l == 0 {
                    return 0;
                }
                let c = next[usize::from(l)];
                next[usize::from(l)] += 1;
                c
            })
            .collect();
        Self { lengths, codes }
    }

    pub(crate) fn lengths(&self) -> &[u8] {
        &self.lengths
    }

    pub(crate) fn len_of(&self, sym: usize) -> u32 {
        u32::from(self.lengths[sym])
    }

    pub(crate) fn write(&self, writer: &mut BitWriter, sym: usize) {
        writer.write_bits(self.codes[sym], u32::from(self.lengths[sym]));
    }
}

/// Huffman code lengths, flattening frequencies until they fit `max_len`
fn limited_lengths(freqs: &[u32], max_len: u8) -> Vec<u8> {
    let mut freqs = freqs.to_vec();
    loop {
        let lengths = huffman_lengths(&freqs);
        if lengths.iter().all(|&l| l <= max_len) {
            return lengths;
        }
        for f in freqs.iter_mut().filter(|f| **f > 0) {
            *f = (*f >> 1) | 1;
        }
    }
}

fn huffman_lengths(freqs: &[u32]) -> Vec<u8> {
    let mut lengths = vec![0u8; freqs.len()];
    let used: Vec<usize> = (0..freqs.len()).filter(|&i| freqs[i] > 0).collect();
    match used.as_slice() {
        [] => return lengths,
        [only] => {
            // A one-symbol code is incomplete; pair it with a dummy
            lengths[*only] = 1;
            lengths[usize::from(*only == 0)] = 1;
            return lengths;
        }
        _ => {}
    }

    // parent links for leaves (0..n) and internal nodes (n..)
    let n = used.len();
    let mut parent = vec![usize::MAX; 2 * n - 1];
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = used
        .iter()
        .enumerate()
        .map(|(node, &sym)| Reverse((u64::from(freqs[sym]), node)))
        .collect();
    let mut next = n;
    while let (Some(Reverse((wa, a))), Some(Reverse((wb, b)))) = (heap.pop(), heap.pop()) {
        parent[a] = next;
        parent[b] = next;
        heap.push(Reverse((wa + wb, next)));
        next += 1;
    }

    for (node, &sym) in used.iter().enumerate() {
        let mut depth = 0u8;
        let mut p = node;
        while parent[p] != usize::MAX {
            p = parent[p];
            depth = depth.saturating_add(1);
        }
        lengths[sym] = depth;
    }
    lengths
}
