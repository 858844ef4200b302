//! LZX compression
//!
//! Xbox 360 executables with "normal" compression store their image as one
//! LZX stream. [`lzx_decompress`] decodes such a stream into a caller-sized
//! buffer, optionally priming the window with history bytes (used by delta
//! patches, which reference the previous image). [`lzx_compress`] is the
//! inverse and is used to author test images.
//!
//! # Examples
//!
//! ```
//! use romprops_formats::lzx::{lzx_compress, lzx_decompress};
//!
//! let data = b"abcabcabcabcabcabc".repeat(100);
//! let packed = lzx_compress(&data, 0x8000, None).unwrap();
//! let mut out = vec![0u8; data.len()];
//! lzx_decompress(&packed, &mut out, 0x8000, None).unwrap();
//! assert_eq!(out, data);
//! ```

mod bitstream;
mod decoder;
mod encoder;
mod error;
mod huffman;
mod tables;

pub use decoder::LzxDecoder;
pub use encoder::LzxEncoder;
pub use error::{LzxError, LzxResult};

use tracing::debug;

/// Window size exponent for a power-of-two window size
pub fn window_bits(window_size: u32) -> LzxResult<u32> {
    if !window_size.is_power_of_two() {
        return Err(LzxError::InvalidWindowSize(window_size));
    }
    Ok(window_size.trailing_zeros())
}

/// Decompress `src` into `dest`, filling it completely
///
/// `window_size` must be a power of two between 32 KiB and 2 MiB. When a
/// `seed` is given it is copied to the end of the otherwise zeroed window
/// so matches can reach back into it.
pub fn lzx_decompress(
    src: &[u8],
    dest: &mut [u8],
    window_size: u32,
    seed: Option<&[u8]>,
) -> LzxResult<()> {
    let bits = window_bits(window_size)?;
    if i32::try_from(dest.len()).is_err() {
        return Err(LzxError::DestinationTooLarge(dest.len()));
    }
    let mut decoder = LzxDecoder::new(bits)?;
    if let Some(seed) = seed {
        decoder.set_reference_data(seed)?;
    }
    debug!(
        "LZX: {} -> {} bytes, window {:#x}, seed {} bytes",
        src.len(),
        dest.len(),
        window_size,
        seed.map_or(0, <[u8]>::len)
    );
    decoder.decompress(src, dest)
}

/// Compress `src` for a window of `window_size` bytes
pub fn lzx_compress(src: &[u8], window_size: u32, seed: Option<&[u8]>) -> LzxResult<Vec<u8>> {
    let bits = window_bits(window_size)?;
    LzxEncoder::new(bits)?.compress(src, seed.unwrap_or_default())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_window_size_must_be_power_of_two() {
        let mut out = [0u8; 4];
        assert!(matches!(
            lzx_decompress(&[0, 0], &mut out, 0x9000, None),
            Err(LzxError::InvalidWindowSize(0x9000))
        ));
        assert!(matches!(
            lzx_decompress(&[0, 0], &mut out, 0x4000, None),
            Err(LzxError::InvalidWindowSize(_))
        ));
    }

    #[test]
    fn test_seed_references_resolve() {
        let seed: Vec<u8> = (0..4096u32).map(|i| (i * 31 % 256) as u8).collect();
        // starts with the last 1000 seed bytes, then new data
        let mut data = seed[seed.len() - 1000..].to_vec();
        data.extend_from_slice(b"fresh bytes after the seeded prefix");

        let packed =
            lzx_compress(&data, 0x8000, Some(&seed)).expect("Test operation should succeed");
        assert!(packed.len() < 200, "seeded prefix should be a match, got {}", packed.len());

        let mut out = vec![0u8; data.len()];
        lzx_decompress(&packed, &mut out, 0x8000, Some(&seed))
            .expect("Test operation should succeed");
        assert_eq!(out, data);

        // Without the seed the same stream references data before the window
        let mut out = vec![0u8; data.len()];
        assert!(lzx_decompress(&packed, &mut out, 0x8000, None).is_err());
    }

    #[test]
    fn test_seed_larger_than_window() {
        let seed = vec![0u8; 0x8001];
        let mut out = [0u8; 1];
        assert!(matches!(
            lzx_decompress(&[0, 0], &mut out, 0x8000, Some(&seed)),
            Err(LzxError::SeedTooLarge { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            chunks in prop::collection::vec((any::<u8>(), 1usize..300), 0..400),
            window_exp in 15u32..=17,
        ) {
            // runs of repeated bytes mixed with counters give both literals and matches
            let mut data = Vec::new();
            for (byte, len) in chunks {
                if byte % 3 == 0 {
                    data.extend((0..len).map(|i| (i as u8).wrapping_add(byte)));
                } else {
                    data.extend(std::iter::repeat_n(byte, len));
                }
            }
            let window = 1u32 << window_exp;
            let packed = lzx_compress(&data, window, None).expect("compress");
            let mut out = vec![0u8; data.len()];
            lzx_decompress(&packed, &mut out, window, None).expect("decompress");
            prop_assert_eq!(out, data);
        }
    }
}
