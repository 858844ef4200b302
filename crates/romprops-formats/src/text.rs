//! Text decoding helpers
//!
//! Console formats store text as fixed-size, NUL-padded fields in UTF-16
//! (big-endian on Xbox 360, little-endian on Xbox), UTF-8, Shift-JIS or
//! Windows-1252.

use encoding_rs::{SHIFT_JIS, WINDOWS_1252};

/// Slice up to (not including) the first NUL byte
pub fn trim_nul(data: &[u8]) -> &[u8] {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    &data[..end]
}

fn utf16_units(data: &[u8], from: fn([u8; 2]) -> u16) -> Vec<u16> {
    data.chunks_exact(2)
        .map(|c| from([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect()
}

/// Decode NUL-terminated UTF-16BE
pub fn utf16be_to_string(data: &[u8]) -> String {
    String::from_utf16_lossy(&utf16_units(data, u16::from_be_bytes))
}

/// Decode NUL-terminated UTF-16LE
pub fn utf16le_to_string(data: &[u8]) -> String {
    String::from_utf16_lossy(&utf16_units(data, u16::from_le_bytes))
}

/// Decode NUL-terminated UTF-8, replacing invalid sequences
pub fn utf8_to_string(data: &[u8]) -> String {
    String::from_utf8_lossy(trim_nul(data)).into_owned()
}

/// Decode NUL-terminated Windows-1252
pub fn cp1252_to_string(data: &[u8]) -> String {
    let (text, _) = WINDOWS_1252.decode_without_bom_handling(trim_nul(data));
    text.into_owned()
}

/// Decode NUL-terminated text that is either Shift-JIS or Windows-1252
///
/// Shift-JIS is tried first; if the bytes are not valid Shift-JIS they are
/// decoded as Windows-1252, which accepts any input.
pub fn cp1252_sjis_to_string(data: &[u8]) -> String {
    let data = trim_nul(data);
    if let Some(text) = SHIFT_JIS.decode_without_bom_handling_and_without_replacement(data) {
        return text.into_owned();
    }
    let (text, _) = WINDOWS_1252.decode_without_bom_handling(data);
    text.into_owned()
}

/// Convert DOS line endings to Unix ones
pub fn dos2unix(text: &str) -> String {
    text.replace("\r\n", "\n")
}

/// Encode a string as UTF-16BE without terminator
pub fn string_to_utf16be(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_be_bytes).collect()
}

/// Encode a string as UTF-16LE without terminator
pub fn string_to_utf16le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_le_bytes).collect()
}
