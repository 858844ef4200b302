//! Fixed LZX tables

/// Output frame size
pub(crate) const FRAME_SIZE: usize = 32768;
/// Shortest match
pub(crate) const MIN_MATCH: usize = 2;
/// Longest match
pub(crate) const MAX_MATCH: usize = 257;
/// Literal symbols in the main tree
pub(crate) const NUM_CHARS: usize = 256;
/// Length tree symbols
pub(crate) const NUM_SECONDARY_LENGTHS: usize = 249;
/// Length header value that continues in the length tree
pub(crate) const NUM_PRIMARY_LENGTHS: usize = 7;
/// Pretree symbols
pub(crate) const PRETREE_SYMBOLS: usize = 20;
/// Aligned offset tree symbols
pub(crate) const ALIGNED_SYMBOLS: usize = 8;
/// Most position slots of any window size
pub(crate) const MAX_POSITION_SLOTS: usize = 50;

/// Block type values
pub(crate) const BLOCK_VERBATIM: u32 = 1;
pub(crate) const BLOCK_ALIGNED: u32 = 2;
pub(crate) const BLOCK_UNCOMPRESSED: u32 = 3;

const fn make_extra_bits() -> [u8; MAX_POSITION_SLOTS + 2] {
    let mut t = [0u8; MAX_POSITION_SLOTS + 2];
    let mut i = 0;
    let mut j = 0;
    while i < t.len() {
        t[i] = j;
        t[i + 1] = j;
        if i != 0 && j < 17 {
            j += 1;
        }
        i += 2;
    }
    t
}

const fn make_position_base() -> [u32; MAX_POSITION_SLOTS + 2] {
    let mut t = [0u32; MAX_POSITION_SLOTS + 2];
    let mut i = 0;
    while i + 1 < t.len() {
        t[i + 1] = t[i] + (1 << EXTRA_BITS[i]);
        i += 1;
    }
    t
}

/// Extra offset bits per position slot
pub(crate) const EXTRA_BITS: [u8; MAX_POSITION_SLOTS + 2] = make_extra_bits();
/// Smallest formatted offset per position slot
pub(crate) const POSITION_BASE: [u32; MAX_POSITION_SLOTS + 2] = make_position_base();

/// Window size exponents LZX supports
pub(crate) const MIN_WINDOW_BITS: u32 = 15;
pub(crate) const MAX_WINDOW_BITS: u32 = 21;

/// Position slots for a window of `1 << window_bits` bytes
pub(crate) const fn position_slots(window_bits: u32) -> usize {
    match window_bits {
        21 => 50,
        20 => 42,
        bits => (bits as usize) << 1,
    }
}

/// Main tree size for a window
pub(crate) const fn main_tree_size(window_bits: u32) -> usize {
    NUM_CHARS + position_slots(window_bits) * 8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_tables() {
        assert_eq!(&EXTRA_BITS[..10], &[0, 0, 0, 0, 1, 1, 2, 2, 3, 3]);
        assert_eq!(&POSITION_BASE[..10], &[0, 1, 2, 3, 4, 6, 8, 12, 16, 24]);
        assert_eq!(EXTRA_BITS[MAX_POSITION_SLOTS - 1], 17);
        assert_eq!(position_slots(15), 30);
        assert_eq!(position_slots(21), 50);
        assert_eq!(main_tree_size(16), 256 + 32 * 8);
    }
}
