//! Bit and byte helpers.
//!
//! DEFLATE reads every byte least-significant bit first, so a bit sequence
//! here is always in that order: bit 0 of byte 0 comes first.

pub type Bit = u8;

/// Chars JavaScript treats as line terminators.
pub const LINE_TERMINATORS: [char; 4] = ['\r', '\n', '\u{2028}', '\u{2029}'];

/// Splits bytes into bits, least significant first.
pub fn bits_from_bytes(bytes: &[u8]) -> Vec<Bit> {
    let mut bits = Vec::with_capacity(bytes.len() * 8);
    for &byte in bytes {
        for bit_pos in 0..8 {
            bits.push((byte >> bit_pos) & 1);
        }
    }
    bits
}

/// Packs bits back into bytes. An incomplete trailing byte is padded with zeroes.
pub fn bytes_from_bits(bits: &[Bit]) -> Vec<u8> {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (offset, bit) in bits.iter().enumerate() {
        bytes[offset >> 3] |= (bit & 1) << (offset & 7);
    }
    bytes
}

/// Lossy UTF-8 view of arbitrary bytes, the way a text decoder in the browser sees them.
pub fn string_from_bytes(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Encodes text one byte per char. Fails when a char is above U+00FF.
pub fn latin1_from_str(text: &str) -> Option<Vec<u8>> {
    text.chars().map(|ch| u8::try_from(u32::from(ch)).ok()).collect()
}

/// True when the text decoded from `bytes` contains any line terminator.
pub fn has_line_terminator(bytes: &[u8]) -> bool {
    string_from_bytes(bytes).contains(LINE_TERMINATORS)
}
