//! Raw DEFLATE framing helpers and the codec capabilities the engine is built on.

use std::future::Future;

use crate::error::CodecError;

/// Largest payload a single stored block can carry.
pub const MAX_STORED_LEN: usize = u16::MAX as usize;

/// A final fixed-Huffman block holding nothing but the end-of-block code.
pub const EMPTY_FINAL_BLOCK: [u8; 2] = [0x03, 0x00];

/// LEN and NLEN of a stored block, little endian.
///
/// Returns `None` when `len` does not fit in a stored block.
pub fn stored_block_header(len: usize) -> Option<[u8; 4]> {
    let len = u16::try_from(len).ok()?;
    let [lo, hi] = len.to_le_bytes();
    let [nlo, nhi] = (!len).to_le_bytes();
    Some([lo, hi, nlo, nhi])
}

/// Validates and test-decodes raw DEFLATE streams. Called many times inside search loops.
pub trait Decompressor {
    /// Inflates a complete raw DEFLATE stream, failing on malformed input.
    fn inflate_raw(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
}

impl<D: Decompressor + ?Sized> Decompressor for &D {
    fn inflate_raw(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        (**self).inflate_raw(data)
    }
}

/// Produces the compressed tail of a document.
pub trait Compressor {
    /// Compresses `input` into raw DEFLATE that may back-reference `dictionary`
    /// without re-emitting it. The output must end with a final block, and an
    /// empty `input` must produce [`EMPTY_FINAL_BLOCK`].
    fn deflate_raw(
        &self,
        input: &[u8],
        dictionary: &[u8],
        iterations: u32,
    ) -> impl Future<Output = Result<Vec<u8>, CodecError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_header_is_len_and_complement() {
        assert_eq!(stored_block_header(0), Some([0x00, 0x00, 0xff, 0xff]));
        assert_eq!(stored_block_header(2), Some([0x02, 0x00, 0xfd, 0xff]));
        assert_eq!(stored_block_header(0x3e), Some([0x3e, 0x00, 0xc1, 0xff]));
        assert_eq!(stored_block_header(MAX_STORED_LEN), Some([0xff, 0xff, 0x00, 0x00]));
    }

    #[test]
    fn test_oversized_stored_block_is_rejected() {
        assert_eq!(stored_block_header(MAX_STORED_LEN + 1), None);
    }
}
