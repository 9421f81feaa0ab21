use std::sync::{Arc, Mutex, OnceLock};

use fetchcrunch_core::{CodecError, Compressor, Decompressor, EMPTY_FINAL_BLOCK};
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

/// Raw DEFLATE on top of zlib via `flate2`.
///
/// One compression handle is created on first use and shared by clones of
/// the codec; calls into it are serialised. zlib has no notion of iterations,
/// so that hint is ignored and every call uses the best compression level.
#[derive(Debug, Clone, Default)]
pub struct FlateCodec {
    deflater: Arc<OnceLock<Arc<Mutex<Compress>>>>,
}

impl FlateCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn deflater(&self) -> Arc<Mutex<Compress>> {
        Arc::clone(
            self.deflater
                .get_or_init(|| Arc::new(Mutex::new(Compress::new(Compression::best(), false)))),
        )
    }
}

fn codec_error(err: impl std::fmt::Display) -> CodecError {
    CodecError::new(err.to_string())
}

/// Inflates a complete raw stream. Truncated input and trailing bytes are errors.
pub fn inflate_raw(data: &[u8], dictionary: Option<&[u8]>) -> Result<Vec<u8>, CodecError> {
    let mut inflater = Decompress::new(false);
    if let Some(dictionary) = dictionary {
        inflater.set_dictionary(dictionary).map_err(codec_error)?;
    }

    let mut out = Vec::with_capacity(data.len().saturating_mul(4).max(64));
    loop {
        let (before_in, before_out) = (inflater.total_in(), inflater.total_out());
        let status = inflater
            .decompress_vec(&data[before_in as usize..], &mut out, FlushDecompress::Finish)
            .map_err(codec_error)?;
        match status {
            Status::StreamEnd => break,
            _ if out.len() == out.capacity() => out.reserve(out.capacity()),
            _ if inflater.total_in() == before_in && inflater.total_out() == before_out => {
                return Err(CodecError::new("unexpected end of deflate stream"));
            }
            _ => {}
        }
    }

    if inflater.total_in() as usize != data.len() {
        return Err(CodecError::new("trailing bytes after deflate stream"));
    }
    Ok(out)
}

fn deflate_raw(deflater: &mut Compress, input: &[u8], dictionary: &[u8]) -> Result<Vec<u8>, CodecError> {
    deflater.reset();
    if !dictionary.is_empty() {
        deflater.set_dictionary(dictionary).map_err(codec_error)?;
    }

    let mut out = Vec::with_capacity(input.len() / 2 + 64);
    loop {
        let consumed = deflater.total_in() as usize;
        let status = deflater
            .compress_vec(&input[consumed..], &mut out, FlushCompress::Finish)
            .map_err(codec_error)?;
        if status == Status::StreamEnd {
            return Ok(out);
        }
        out.reserve(out.capacity().max(64));
    }
}

/// The last byte usually carries padding bits the decoder never reads. Making
/// it `>` gives a tag left open by the stored block a chance to close.
fn patch_closing_waka(compressed: &mut [u8], input: &[u8], dictionary: &[u8]) {
    let Some(last) = compressed.last().copied() else {
        return;
    };
    if last == b'>' {
        return;
    }
    if let Some(byte) = compressed.last_mut() {
        *byte = b'>';
    }
    let decodes_the_same =
        inflate_raw(compressed, Some(dictionary)).is_ok_and(|inflated| inflated == input);
    if !decodes_the_same {
        if let Some(byte) = compressed.last_mut() {
            *byte = last;
        }
    }
}

impl Decompressor for FlateCodec {
    fn inflate_raw(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        inflate_raw(data, None)
    }
}

impl Compressor for FlateCodec {
    async fn deflate_raw(
        &self,
        input: &[u8],
        dictionary: &[u8],
        _iterations: u32,
    ) -> Result<Vec<u8>, CodecError> {
        if input.is_empty() {
            return Ok(EMPTY_FINAL_BLOCK.to_vec());
        }

        let deflater = self.deflater();
        let input = input.to_vec();
        let dictionary = dictionary.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut deflater = match deflater.lock() {
                Ok(guard) => guard,
                Err(_) => return Err(CodecError::new("deflate handle is poisoned")),
            };
            let mut compressed = deflate_raw(&mut deflater, &input, &dictionary)?;
            drop(deflater);
            patch_closing_waka(&mut compressed, &input, &dictionary);
            Ok(compressed)
        })
        .await
        .map_err(codec_error)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_input_is_the_empty_final_block() {
        let codec = FlateCodec::new();
        let compressed = codec.deflate_raw(b"", b"dictionary", 50).await.expect("compresses");
        assert_eq!(compressed, EMPTY_FINAL_BLOCK);
        assert_eq!(codec.inflate_raw(&compressed).expect("inflates"), b"");
    }

    #[tokio::test]
    async fn test_dictionary_back_references() {
        let codec = FlateCodec::new();
        let dictionary = b"(async s=>{for(r=(await fetch`#`).body".repeat(4);
        let input = b"(async s=>{for(r=(await fetch`#`).body;;)}".to_vec();

        let with = codec.deflate_raw(&input, &dictionary, 1).await.expect("compresses");
        let without = codec.deflate_raw(&input, b"", 1).await.expect("compresses");
        assert!(with.len() < without.len());
        assert_eq!(inflate_raw(&with, Some(dictionary.as_slice())).expect("inflates"), input);
        assert_eq!(codec.inflate_raw(&without).expect("inflates"), input);
    }

    #[tokio::test]
    async fn test_handle_is_reused_between_calls() {
        let codec = FlateCodec::new();
        let first = codec.deflate_raw(b"alert(1)", b"", 1).await.expect("compresses");
        let second = codec.clone().deflate_raw(b"alert(1)", b"", 1).await.expect("compresses");
        assert_eq!(first, second);
    }

    #[test]
    fn test_malformed_streams_are_rejected() {
        let codec = FlateCodec::new();
        // Reserved block type 3.
        assert!(codec.inflate_raw(&[0x07]).is_err());
        // Stored block length and complement disagree.
        assert!(codec.inflate_raw(&[0x01, 0x02, 0x00, 0x00, 0x00, b'o', b'k']).is_err());
        // Non-final empty block, then nothing.
        assert!(codec.inflate_raw(&[0x02, 0x00]).is_err());
        // Valid stream followed by junk.
        assert!(codec.inflate_raw(&[0x03, 0x00, 0x00]).is_err());
    }
}
