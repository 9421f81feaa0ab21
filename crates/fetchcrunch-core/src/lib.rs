//! fetchcrunch core crate.
//!
//! Builds byte streams that are valid raw DEFLATE and valid HTML at the same
//! time. The crate is split by stage:
//!
//! - `bits`: LSB-first bit sequences and text/byte helpers.
//! - `template` + `byte_template`: literal text interleaved with variant slots
//!   kept in an index arena, with mutual exclusion between slots.
//! - `resolve`: payload-aware slot resolution that makes the bootstrap overlap
//!   the payload so the compressor can back-reference it.
//! - `lead_in`: the fixed-Huffman block whose bits double as opening markup.
//! - `assemble`: stored block, compressed payload and validation.
//!
//! Compression itself is not implemented here. Callers inject it through the
//! `Compressor` and `Decompressor` capabilities in `deflate`.

pub mod assemble;
pub mod bits;
pub mod byte_template;
pub mod deflate;
pub mod error;
pub mod lead_in;
pub mod resolve;
pub mod template;

#[cfg(test)]
mod testing;

pub use assemble::{Assembler, AssemblyParts, AssemblyVariant, Decoding, find_tag_end};
pub use byte_template::{ByteItem, ByteSet, ByteTemplate};
pub use deflate::{Compressor, Decompressor, EMPTY_FINAL_BLOCK, MAX_STORED_LEN, stored_block_header};
pub use error::{AssemblyError, CodecError, CrunchError, LeadInError, TemplateError};
pub use lead_in::{LeadIn, LeadInPreference, generate_lead_in};
pub use resolve::{MAX_DISTANCE, MIN_MATCH, resolve, resolve_with};
pub use template::{SlotId, StringTemplate, TemplateItem, VariantSet};
