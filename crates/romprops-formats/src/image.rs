//! Decoded image buffers and raw embedded images
//!
//! Only the simple palette formats are decoded here. PNG and XPR0 payloads
//! are handed back as bytes for the caller's image codec.

use serde::ser::{Serialize, SerializeStruct, Serializer};

/// An image extracted from a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Image {
    /// Decoded 32-bit ARGB pixels, row-major
    Argb32 {
        /// Width in pixels
        width: u32,
        /// Height in pixels
        height: u32,
        /// `0xAARRGGBB` pixels
        pixels: Vec<u32>,
    },
    /// Raw PNG file
    Png(Vec<u8>),
    /// Raw XPR0 texture container
    Xpr0(Vec<u8>),
}

// Pixel data is not serialized, only a description of the image.
impl Serialize for Image {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let kind = match self {
            Self::Argb32 { .. } => "argb32",
            Self::Png(_) => "png",
            Self::Xpr0(_) => "xpr0",
        };
        let (width, height) = self.dimensions().unzip();
        let mut st = serializer.serialize_struct("Image", 3)?;
        st.serialize_field("kind", kind)?;
        st.serialize_field("width", &width)?;
        st.serialize_field("height", &height)?;
        st.end()
    }
}

/// PNG file signature
pub const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

impl Image {
    /// Image dimensions, if they can be read without a codec
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            Self::Argb32 { width, height, .. } => Some((*width, *height)),
            Self::Png(data) => {
                // IHDR is always the first chunk: width/height at 16..24
                if data.len() < 24 || data[..8] != PNG_MAGIC || &data[12..16] != b"IHDR" {
                    return None;
                }
                let w = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
                let h = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
                Some((w, h))
            }
            Self::Xpr0(_) => None,
        }
    }

    /// Raw bytes of an undecoded image
    pub fn raw_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Png(d) | Self::Xpr0(d) => Some(d),
            Self::Argb32 { .. } => None,
        }
    }
}

/// Frame delay of an animated icon
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct AnimationDelay {
    /// Numerator (frames of the source clock)
    pub numer: u16,
    /// Denominator (source clock rate in Hz)
    pub denom: u16,
    /// Delay in milliseconds
    pub ms: u32,
}

impl AnimationDelay {
    /// Delay of `frames` ticks at `rate_hz`
    pub fn from_frames(frames: u16, rate_hz: u16) -> Self {
        let ms = if rate_hz == 0 {
            0
        } else {
            u32::from(frames) * 1000 / u32::from(rate_hz)
        };
        Self {
            numer: frames,
            denom: rate_hz,
            ms,
        }
    }
}

/// Animated icon: frames plus playback sequence
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct IconAnimation {
    /// Distinct frames
    pub frames: Vec<Image>,
    /// Frame index for each sequence step
    pub seq_index: Vec<usize>,
    /// Delay for each sequence step
    pub delays: Vec<AnimationDelay>,
}

impl IconAnimation {
    /// Number of frames
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Whether this is a real animation (more than one frame)
    pub fn is_animated(&self) -> bool {
        self.frames.len() > 1
    }
}

/// Decode a linear 4-bit colour-indexed image
///
/// Pixels are packed two per byte, low nibble first. `palette` holds
/// already converted ARGB32 colours.
pub fn decode_linear_ci4(
    width: u32,
    height: u32,
    data: &[u8],
    palette: &[u32; 16],
) -> Option<Image> {
    let count = (width as usize) * (height as usize);
    if data.len() < count.div_ceil(2) {
        return None;
    }
    let pixels = data
        .iter()
        .flat_map(|b| [b & 0x0F, b >> 4])
        .take(count)
        .map(|idx| palette[idx as usize])
        .collect();
    Some(Image::Argb32 {
        width,
        height,
        pixels,
    })
}

/// Convert a PlayStation BGR555 colour to ARGB32
///
/// Colour `0x0000` is fully transparent; every other value is opaque and
/// the STP bit is ignored.
pub fn bgr555_ps1_to_argb32(px: u16) -> u32 {
    if px == 0 {
        return 0;
    }
    let expand = |c: u16| -> u32 {
        let c = u32::from(c & 0x1F);
        (c << 3) | (c >> 2)
    };
    let r = expand(px);
    let g = expand(px >> 5);
    let b = expand(px >> 10);
    0xFF00_0000 | (r << 16) | (g << 8) | b
}
