//! Payload-aware slot resolution.
//!
//! Free choices in the bootstrap (variable names, quotes, tag casing) are
//! picked so that the bootstrap text repeats substrings of the payload. The
//! compressor then gets to emit long back-references instead of literals.
//!
//! The search is greedy and deterministic: every round commits the slot with
//! the longest run of agreeing bytes, scanning template positions from the end
//! (closest to the payload in the final stream) and payload offsets from the
//! start. A longer run always wins; among equal runs the first one found stays.

use crate::byte_template::{ByteItem, ByteTemplate};
use crate::template::SlotId;

/// Shortest DEFLATE back-reference.
pub const MIN_MATCH: usize = 3;
/// DEFLATE window size.
pub const MAX_DISTANCE: usize = 32768;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Match {
    slot: SlotId,
    value: u8,
    size: usize,
}

/// Resolves every slot with DEFLATE's own limits.
pub fn resolve(template: ByteTemplate, payload: &[u8]) -> Vec<u8> {
    resolve_with(template, payload, MIN_MATCH, MAX_DISTANCE)
}

pub fn resolve_with(
    mut template: ByteTemplate,
    payload: &[u8],
    min_size: usize,
    max_distance: usize,
) -> Vec<u8> {
    loop {
        let mut best: Option<Match> = None;

        for offset in (0..template.items.len()).rev() {
            let ByteItem::Slot(id) = template.items[offset] else {
                continue;
            };
            let Some(first) = template.slots[id].first() else {
                panic!("variant slot {id} ran out of candidates");
            };
            let current = best.get_or_insert(Match {
                slot: id,
                value: first,
                size: 0,
            });

            // Bytes further from the template end are further from the payload.
            let Some(window) = max_distance.checked_sub(template.items.len() - offset) else {
                continue;
            };
            if let Some(found) = longest_match(&template, payload, offset, min_size, window) {
                if found.size > current.size {
                    *current = found;
                }
            }
        }

        let Some(winner) = best else {
            break;
        };
        tracing::trace!(
            slot = winner.slot,
            value = %char::from(winner.value),
            run = winner.size,
            "resolved variant slot"
        );
        template.collapse(winner.slot, winner.value);
    }

    template
        .items
        .into_iter()
        .map(|item| match item {
            ByteItem::Literal(byte) => byte,
            ByteItem::Slot(id) => unreachable!("slot {id} left unresolved"),
        })
        .collect()
}

/// The longest run through `offset` that agrees with some payload window.
fn longest_match(
    template: &ByteTemplate,
    payload: &[u8],
    offset: usize,
    min_size: usize,
    window: usize,
) -> Option<Match> {
    let ByteItem::Slot(id) = template.items[offset] else {
        return None;
    };
    let anchor = template.slot(id);
    let last = payload.len().checked_sub(1)?.min(window);

    let mut best: Option<Match> = None;
    for reference in 0..=last {
        let value = payload[reference];
        if !anchor.contains(value) {
            continue;
        }
        let delta = offset as isize - reference as isize;
        let mut size = 1;

        for back in (0..reference).rev() {
            if !template.accepts(delta + back as isize, payload[back]) {
                break;
            }
            size += 1;
        }
        for forward in reference + 1..=last {
            if !template.accepts(delta + forward as isize, payload[forward]) {
                break;
            }
            size += 1;
        }

        if size >= min_size && best.is_none_or(|b| size > b.size) {
            best = Some(Match {
                slot: id,
                value,
                size,
            });
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{StringTemplate, VariantSet};

    fn identifiers(preferred: char) -> VariantSet {
        VariantSet::new(std::iter::once(preferred).chain('a'..='z'))
    }

    fn reader_template() -> (StringTemplate, SlotId, SlotId) {
        let mut template = StringTemplate::new();
        let s = template.add_slot(identifiers('s'));
        let r = template.add_slot(identifiers('r'));
        template.make_exclusive(&[s, r]);
        template.push_literal("async ");
        template.push_slot(s);
        template.push_literal("=>{");
        template.push_slot(r);
        template.push_literal("=0;(await ");
        template.push_slot(r);
        template.push_literal(".read()).value;");
        template.push_slot(s);
        template.push_literal("+=1}");
        (template, s, r)
    }

    fn lower(template: &StringTemplate) -> ByteTemplate {
        ByteTemplate::try_from(template).expect("ascii template")
    }

    #[test]
    fn test_picks_names_from_payload() {
        let (template, _, _) = reader_template();
        let out = resolve(lower(&template), b"x=>a.read().then(q)");
        let text = String::from_utf8(out).expect("ascii output");
        assert!(text.contains("(await a.read())"), "{text}");
    }

    #[test]
    fn test_falls_back_to_preferred_names() {
        let (template, _, _) = reader_template();
        let out = resolve(lower(&template), b"");
        assert_eq!(
            String::from_utf8(out).expect("ascii output"),
            "async s=>{r=0;(await r.read()).value;s+=1}"
        );
    }

    #[test]
    fn test_exclusive_slots_never_share_a_value() {
        let (template, _, _) = reader_template();
        // Both roles would like `a`.
        let out = resolve(lower(&template), b"async a=>{ a.read()).value;");
        let text = String::from_utf8(out).expect("ascii output");
        let decoded = text.as_bytes()[6];
        let reader = text.as_bytes()[10];
        assert_ne!(decoded, reader, "{text}");
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let (template, _, _) = reader_template();
        let payload = b"for(;;)z.read().value;async q=>{}";
        let first = resolve(lower(&template), payload);
        let second = resolve(lower(&template), payload);
        assert_eq!(first, second);
    }

    #[test]
    fn test_short_runs_do_not_count() {
        let mut template = StringTemplate::new();
        template.push_variants(VariantSet::new(['"', '\'']));
        template.push_literal("zz");
        // `'z` is only two bytes long.
        let out = resolve(lower(&template), b"'z");
        assert_eq!(out, b"\"zz");
    }

    #[test]
    fn test_distant_payload_is_ignored() {
        let mut template = StringTemplate::new();
        template.push_variants(VariantSet::new(['"', '\'']));
        template.push_literal("abc");
        let mut payload = vec![b'.'; 64];
        payload.extend_from_slice(b"'abc");
        let near = resolve_with(lower(&template), &payload, MIN_MATCH, MAX_DISTANCE);
        let far = resolve_with(lower(&template), &payload, MIN_MATCH, 32);
        assert_eq!(near, b"'abc");
        assert_eq!(far, b"\"abc");
    }

    #[test]
    #[should_panic(expected = "ran out of candidates")]
    fn test_emptied_slot_aborts() {
        let mut template = StringTemplate::new();
        let a = template.add_slot(VariantSet::new(['a']));
        let b = template.add_slot(VariantSet::new(['a']));
        template.make_exclusive(&[a, b]);
        template.push_slot(a);
        template.push_slot(b);
        resolve(lower(&template), b"");
    }
}
