//! Lead-in search.
//!
//! The document starts with a non-final fixed-Huffman block whose bits are the
//! opening markup itself. Its first byte is `\n`, which is also the block
//! header (`BFINAL=0`, `BTYPE=01`) followed by five bits of the first symbol.
//! Everything the block inflates to is junk the bootstrap has to skip, so it
//! must not contain a line terminator.
//!
//! The end-of-block code lands somewhere after the markup. Rather than decode
//! the Huffman stream ourselves, every variant is tried with 0 to 16 bits of
//! zero padding followed by a final stored block holding a short sentinel,
//! and the decompressor tells us which paddings form a valid stream.

use serde::{Deserialize, Serialize};

use crate::bits::{Bit, bits_from_bytes, bytes_from_bits, has_line_terminator};
use crate::deflate::{Decompressor, stored_block_header};
use crate::error::LeadInError;
use crate::template::StringTemplate;

/// `BFINAL=0 BTYPE=01`, then the low bits of `\n`.
const BLOCK_INTRO: [Bit; 8] = [0, 1, 0, 1, 0, 0, 0, 0];
const MAX_PADDING: usize = 16;
const FINAL_STORED_INTRO: [Bit; 3] = [1, 0, 0];
const STORED_INTRO: [Bit; 3] = [0, 0, 0];
const SENTINEL: &[u8; 2] = b"ok";
/// A fixed-Huffman block header plus end-of-block code.
const FRAMING_BITS: usize = 3 + 7;

/// Which lead-in wins when several variants decode cleanly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LeadInPreference {
    /// Least junk for the bootstrap to skip, then fewest bytes.
    #[default]
    SmallestDecompressed,
    /// Fewest bytes on the wire.
    SmallestCompressed,
}

/// A finished lead-in block, not final, ending on a stored block header that
/// is padded to the byte boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadIn {
    bytes: Vec<u8>,
    junk: Vec<u8>,
}

impl LeadIn {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// What the block inflates to.
    pub fn junk(&self) -> &[u8] {
        &self.junk
    }

    pub fn decompressed_len(&self) -> usize {
        self.junk.len()
    }
}

struct Candidate {
    bits: Vec<Bit>,
    trial_len: usize,
    junk: Vec<u8>,
}

impl Candidate {
    fn beats(&self, other: &Candidate, preference: LeadInPreference) -> bool {
        match preference {
            LeadInPreference::SmallestDecompressed => {
                (self.junk.len(), self.trial_len) < (other.junk.len(), other.trial_len)
            }
            LeadInPreference::SmallestCompressed => self.trial_len < other.trial_len,
        }
    }
}

/// Every fixed-Huffman symbol spends at most 31 bits on at least 3 output bytes
/// or at most 9 bits on one, so `bits` of symbols inflate to at least this much.
fn min_inflated_len(symbol_bits: usize) -> usize {
    symbol_bits * 3 / 31
}

fn trial_bytes(bits: &[Bit]) -> Vec<u8> {
    let mut trial_bits = bits.to_vec();
    trial_bits.extend_from_slice(&FINAL_STORED_INTRO);
    let mut trial = bytes_from_bits(&trial_bits);
    trial.extend(stored_block_header(SENTINEL.len()).into_iter().flatten());
    trial.extend_from_slice(SENTINEL);
    trial
}

/// Searches every casing and separator variant of `head` for the best lead-in.
pub fn generate_lead_in<D: Decompressor + ?Sized>(
    head: &StringTemplate,
    decompressor: &D,
    preference: LeadInPreference,
) -> Result<LeadIn, LeadInError> {
    let mut best: Option<Candidate> = None;
    let mut trials = 0usize;

    for variant in head.variants() {
        let mut bits = BLOCK_INTRO.to_vec();
        bits.extend(bits_from_bytes(variant.as_bytes()));

        for padding in 0..=MAX_PADDING {
            if padding > 0 {
                bits.push(0);
            }
            let trial = trial_bytes(&bits);

            if let Some(current) = &best {
                let hopeless = match preference {
                    LeadInPreference::SmallestCompressed => trial.len() >= current.trial_len,
                    LeadInPreference::SmallestDecompressed => {
                        min_inflated_len(bits.len().saturating_sub(FRAMING_BITS))
                            > current.junk.len()
                    }
                };
                if hopeless {
                    continue;
                }
            }

            trials += 1;
            let inflated = match decompressor.inflate_raw(&trial) {
                Ok(inflated) => inflated,
                Err(err) => {
                    tracing::trace!(%variant, padding, error = %err, "lead-in trial rejected");
                    continue;
                }
            };
            let Some(junk) = inflated.strip_suffix(SENTINEL.as_slice()) else {
                continue;
            };
            if has_line_terminator(junk) {
                tracing::trace!(%variant, padding, "lead-in junk breaks the line");
                continue;
            }

            let candidate = Candidate {
                bits: bits.clone(),
                trial_len: trial.len(),
                junk: junk.to_vec(),
            };
            if best
                .as_ref()
                .is_none_or(|current| candidate.beats(current, preference))
            {
                best = Some(candidate);
            }
        }
    }

    let Some(best) = best else {
        return Err(LeadInError);
    };

    let mut bits = best.bits;
    bits.extend_from_slice(&STORED_INTRO);
    let lead_in = LeadIn {
        bytes: bytes_from_bits(&bits),
        junk: best.junk,
    };
    tracing::debug!(
        trials,
        bytes = lead_in.bytes.len(),
        junk = lead_in.junk.len(),
        "lead-in generated"
    );
    Ok(lead_in)
}
