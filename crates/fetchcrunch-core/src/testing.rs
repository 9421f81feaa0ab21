//! flate2-backed codecs for unit tests.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::deflate::{Compressor, Decompressor, EMPTY_FINAL_BLOCK};
use crate::error::CodecError;

pub(crate) struct FlateInflater;

impl Decompressor for FlateInflater {
    fn inflate_raw(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut inflater = Decompress::new(false);
        let mut out = Vec::with_capacity(data.len() * 4 + 64);
        loop {
            let (before_in, before_out) = (inflater.total_in(), inflater.total_out());
            let status = inflater
                .decompress_vec(&data[before_in as usize..], &mut out, FlushDecompress::Finish)
                .map_err(|err| CodecError::new(err.to_string()))?;
            match status {
                Status::StreamEnd => break,
                _ if out.len() == out.capacity() => out.reserve(out.capacity()),
                _ if inflater.total_in() == before_in && inflater.total_out() == before_out => {
                    return Err(CodecError::new("truncated stream"));
                }
                _ => {}
            }
        }
        if inflater.total_in() as usize != data.len() {
            return Err(CodecError::new("trailing bytes"));
        }
        Ok(out)
    }
}

pub(crate) struct FlateDeflater;

impl Compressor for FlateDeflater {
    async fn deflate_raw(
        &self,
        input: &[u8],
        dictionary: &[u8],
        _iterations: u32,
    ) -> Result<Vec<u8>, CodecError> {
        if input.is_empty() {
            return Ok(EMPTY_FINAL_BLOCK.to_vec());
        }
        let mut deflater = Compress::new(Compression::best(), false);
        if !dictionary.is_empty() {
            deflater
                .set_dictionary(dictionary)
                .map_err(|err| CodecError::new(err.to_string()))?;
        }
        let mut out = Vec::with_capacity(input.len() + 64);
        loop {
            let consumed = deflater.total_in() as usize;
            let status = deflater
                .compress_vec(&input[consumed..], &mut out, FlushCompress::Finish)
                .map_err(|err| CodecError::new(err.to_string()))?;
            match status {
                Status::StreamEnd => return Ok(out),
                _ => out.reserve(out.capacity().max(64)),
            }
        }
    }
}
