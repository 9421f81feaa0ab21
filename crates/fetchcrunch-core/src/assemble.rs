//! Final document assembly.
//!
//! A document is the lead-in, one stored block carrying the bootstrap (and
//! possibly the tag tail and the newline that ends the junk line), and the
//! compressed payload. The few ways of splitting bytes between the stored
//! block and the compressor are all tried and the smallest document that
//! survives every check is kept.

use crate::bits::string_from_bytes;
use crate::deflate::{Compressor, Decompressor, stored_block_header};
use crate::error::AssemblyError;
use crate::lead_in::LeadIn;

/// Bytes that may end the stored block when the tag tail is left to the
/// compressed stream.
const LITERAL_END_BYTES: &[u8] = b"\"' \t\n\r/";
/// Bytes the compressed stream may not start with in that case: they would
/// glue onto the attribute before it. Its low three bits are the first block
/// header, so this is a denylist rather than a list of allowed bytes.
const COMPRESSED_START_DENYLIST: &[u8] = b"\"'<=`\0";

/// How the bootstrap turns inflated bytes back into script text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decoding {
    /// `String.fromCharCode` over every chunk. One byte per char, and the whole
    /// inflated stream goes through a single spread call.
    CharCode,
    /// A `TextDecoderStream`, UTF-8.
    Text,
}

impl Decoding {
    /// In the order they are attempted.
    pub const ALL: [Decoding; 2] = [Decoding::CharCode, Decoding::Text];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyVariant {
    /// The newline that ends the junk line goes into the stored block instead
    /// of the compressed stream.
    pub literal_newline: bool,
    /// The markup after the bootstrap goes into the stored block instead of
    /// being found by chance in the compressed stream.
    pub literal_includes_tail: bool,
}

impl AssemblyVariant {
    pub fn all() -> impl Iterator<Item = AssemblyVariant> {
        [true, false].into_iter().flat_map(|literal_newline| {
            [true, false]
                .into_iter()
                .map(move |literal_includes_tail| AssemblyVariant {
                    literal_newline,
                    literal_includes_tail,
                })
        })
    }
}

/// Resolved pieces of one document.
#[derive(Debug, Clone, Copy)]
pub struct AssemblyParts<'a> {
    pub lead_in: &'a LeadIn,
    pub bootstrap: &'a [u8],
    pub tail: &'a [u8],
    /// The payload exactly as the bootstrap decodes it.
    pub payload: &'a [u8],
}

pub struct Assembler<'a, C, D: ?Sized> {
    compressor: &'a C,
    decompressor: &'a D,
    iterations: u32,
    max_decompressed_len: Option<usize>,
}

impl<'a, C: Compressor, D: Decompressor + ?Sized> Assembler<'a, C, D> {
    pub fn new(compressor: &'a C, decompressor: &'a D, iterations: u32) -> Self {
        Self {
            compressor,
            decompressor,
            iterations,
            max_decompressed_len: None,
        }
    }

    /// Skips variants whose whole inflated stream would exceed `limit` bytes.
    pub fn with_max_decompressed_len(mut self, limit: Option<usize>) -> Self {
        self.max_decompressed_len = limit;
        self
    }

    pub async fn assemble(&self, parts: AssemblyParts<'_>) -> Result<Vec<u8>, AssemblyError> {
        let lead_in = parts.lead_in;
        let mut best: Option<Vec<u8>> = None;

        for variant in AssemblyVariant::all() {
            if !variant.literal_includes_tail && parts.tail.len() != 1 {
                continue;
            }

            let mut content = parts.bootstrap.to_vec();
            if variant.literal_includes_tail {
                content.extend_from_slice(parts.tail);
            }
            if variant.literal_newline {
                content.push(b'\n');
            }

            let Some(header) = stored_block_header(content.len()) else {
                tracing::trace!(?variant, len = content.len(), "stored block too long");
                continue;
            };
            if header.contains(&b'>') {
                tracing::trace!(?variant, len = content.len(), "stored block header closes the tag");
                continue;
            }

            let mut to_compress = Vec::with_capacity(parts.payload.len() + 1);
            if !variant.literal_newline {
                to_compress.push(b'\n');
            }
            to_compress.extend_from_slice(parts.payload);

            if let Some(limit) = self.max_decompressed_len {
                let total = lead_in.decompressed_len() + content.len() + to_compress.len();
                if total > limit {
                    tracing::trace!(?variant, total, limit, "inflated stream over budget");
                    continue;
                }
            }

            // Everything inflated so far, so back-references skip the header.
            let mut dictionary = lead_in.junk().to_vec();
            dictionary.extend_from_slice(&content);
            let compressed = self
                .compressor
                .deflate_raw(&to_compress, &dictionary, self.iterations)
                .await?;

            let size = lead_in.bytes().len() + header.len() + content.len() + compressed.len();
            if best.as_ref().is_some_and(|doc| size >= doc.len()) {
                tracing::trace!(?variant, size, "not smaller than the best document");
                continue;
            }

            if !variant.literal_includes_tail
                && !tail_can_be_inferred(&content, &compressed, parts.tail)
            {
                tracing::trace!(?variant, "tail not found in the compressed stream");
                continue;
            }

            let mut document = Vec::with_capacity(size);
            document.extend_from_slice(lead_in.bytes());
            document.extend_from_slice(&header);
            document.extend_from_slice(&content);
            document.extend_from_slice(&compressed);

            if !self.round_trips(&document, parts.payload) {
                tracing::trace!(?variant, "document does not inflate to the payload");
                continue;
            }

            tracing::debug!(?variant, size, "assembly candidate accepted");
            best = Some(document);
        }

        best.ok_or(AssemblyError::Exhausted)
    }

    /// Whatever precedes the first line break is junk; the rest must be the payload.
    fn round_trips(&self, document: &[u8], payload: &[u8]) -> bool {
        let Ok(inflated) = self.decompressor.inflate_raw(document) else {
            return false;
        };
        inflated
            .iter()
            .position(|&b| b == b'\n' || b == b'\r')
            .is_some_and(|line_end| &inflated[line_end + 1..] == payload)
    }
}

fn tail_can_be_inferred(content: &[u8], compressed: &[u8], tail: &[u8]) -> bool {
    if !content.last().is_some_and(|b| LITERAL_END_BYTES.contains(b)) {
        return false;
    }
    if compressed
        .first()
        .is_none_or(|b| COMPRESSED_START_DENYLIST.contains(b))
    {
        return false;
    }
    let text = string_from_bytes(compressed);
    let tail = string_from_bytes(tail);
    find_tag_end(&text).is_some_and(|end| text[end..].starts_with(&tail))
}

fn is_tag_space(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\n' | '\r' | '>')
}

fn is_line_terminator(ch: char) -> bool {
    matches!(ch, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

/// End of an `name="value"` lookalike starting at `start`, if there is one.
///
/// The name is the longest run of non-space chars ending in `=` that is
/// followed by a quote; the value runs to the matching quote, or to the end
/// of the text, and never crosses a line break.
fn attribute_span(chars: &[(usize, char)], start: usize) -> Option<usize> {
    let run_end = chars[start..]
        .iter()
        .position(|&(_, ch)| is_tag_space(ch))
        .map_or(chars.len(), |len| start + len);

    for equals in (start + 1..run_end).rev() {
        if chars[equals].1 != '=' {
            continue;
        }
        let Some(&(_, quote)) = chars.get(equals + 1) else {
            continue;
        };
        if quote != '"' && quote != '\'' {
            continue;
        }
        let mut at = equals + 2;
        loop {
            match chars.get(at) {
                None => return Some(at),
                Some(&(_, ch)) if ch == quote => return Some(at + 1),
                Some(&(_, ch)) if is_line_terminator(ch) => break,
                Some(_) => at += 1,
            }
        }
    }
    None
}

/// Byte offset of the first `>` that closes a tag when `html` is read from
/// inside a start tag, skipping quoted attribute values.
pub fn find_tag_end(html: &str) -> Option<usize> {
    let chars: Vec<(usize, char)> = html.char_indices().collect();
    let mut at = 0;
    while at < chars.len() {
        if let Some(end) = attribute_span(&chars, at) {
            at = end;
            continue;
        }
        let (offset, ch) = chars[at];
        if ch == '>' {
            return Some(offset);
        }
        at += 1;
    }
    None
}
