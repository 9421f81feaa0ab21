//! Bootstrap script generator.
//!
//! The bootstrap is an async arrow function invoked as a tagged template with
//! `` `//` ``. Its first argument is therefore the template strings array,
//! which stringifies to `//`, so prepending it to the inflated text turns the
//! whole first line (lead-in junk, markup, the bootstrap itself) into a
//! comment and leaves the payload after the first line break.

use std::collections::BTreeSet;

use fetchcrunch_core::{Decoding, SlotId, StringTemplate, TemplateError, VariantSet};

const IDENTIFIER_CHARS: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ$_";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BootstrapOptions {
    /// `eval(s)` instead of `(0,eval)(s)`. Shorter, but runs the payload in
    /// the bootstrap's scope, which is slower and can shadow globals.
    pub direct_eval: bool,
    /// Fetch the empty URL instead of `#`. Breaks documents opened from
    /// `data:` and `blob:` URLs.
    pub empty_url: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Decoded,
    Reader,
    Chunk,
}

impl Role {
    const ALL: [Role; 3] = [Role::Decoded, Role::Reader, Role::Chunk];

    fn preferred(self) -> char {
        match self {
            Role::Decoded => 's',
            Role::Reader => 'r',
            Role::Chunk => 'c',
        }
    }
}

fn identifier_slot(role: Role, reserved: &BTreeSet<String>) -> VariantSet {
    VariantSet::new(
        std::iter::once(role.preferred())
            .chain(IDENTIFIER_CHARS.chars())
            .filter(|ch| !reserved.contains(ch.to_string().as_str())),
    )
}

/// The bootstrap script for one decoding strategy, with a variant slot per
/// variable. No two variables can resolve to the same name, and none to a
/// name in `reserved`.
pub fn bootstrap_template(
    decoding: Decoding,
    reserved: &BTreeSet<String>,
    options: BootstrapOptions,
) -> Result<StringTemplate, TemplateError> {
    let mut template = StringTemplate::new();

    let mut ids: Vec<SlotId> = Vec::with_capacity(Role::ALL.len());
    for role in Role::ALL {
        let slot = identifier_slot(role, reserved);
        if slot.len() < Role::ALL.len() {
            return Err(TemplateError::IdentifiersExhausted {
                available: slot.len(),
                needed: Role::ALL.len(),
            });
        }
        ids.push(template.add_slot(slot));
    }
    template.make_exclusive(&ids);
    let [decoded, reader, chunk] = [ids[0], ids[1], ids[2]];

    let url = if options.empty_url { "" } else { "#" };
    let eval = if options.direct_eval { "eval(" } else { "(0,eval)(" };

    template.push_literal("(async ");
    template.push_slot(decoded);
    template.push_literal("=>{for(");
    template.push_slot(reader);
    template.push_literal(&format!(
        "=(await fetch`{url}`).body.pipeThrough(new DecompressionStream(`deflate-raw`))"
    ));
    if decoding == Decoding::Text {
        template.push_literal(".pipeThrough(new TextDecoderStream)");
    }
    template.push_literal(".getReader();");
    template.push_slot(chunk);
    template.push_literal("=(await ");
    template.push_slot(reader);
    template.push_literal(".read()).value;");
    template.push_slot(decoded);
    template.push_literal("+=");
    match decoding {
        Decoding::Text => template.push_slot(chunk),
        Decoding::CharCode => {
            template.push_literal("String.fromCharCode(...");
            template.push_slot(chunk);
            template.push_literal(")");
        }
    }
    template.push_literal(");");
    template.push_literal(eval);
    template.push_slot(decoded);
    template.push_literal(")})`//`");

    Ok(template)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_variant(template: &StringTemplate) -> String {
        template.variants().next().expect("every slot has a candidate")
    }

    #[test]
    fn test_text_bootstrap() {
        let template =
            bootstrap_template(Decoding::Text, &BTreeSet::new(), BootstrapOptions::default())
                .expect("identifiers available");
        assert_eq!(
            first_variant(&template),
            "(async s=>{for(r=(await fetch`#`).body.pipeThrough(new DecompressionStream(`deflate-raw`))\
             .pipeThrough(new TextDecoderStream).getReader();c=(await r.read()).value;s+=c);\
             (0,eval)(s)})`//`"
        );
    }

    #[test]
    fn test_char_code_bootstrap_with_options() {
        let options = BootstrapOptions {
            direct_eval: true,
            empty_url: true,
        };
        let template = bootstrap_template(Decoding::CharCode, &BTreeSet::new(), options)
            .expect("identifiers available");
        assert_eq!(
            first_variant(&template),
            "(async s=>{for(r=(await fetch``).body.pipeThrough(new DecompressionStream(`deflate-raw`))\
             .getReader();c=(await r.read()).value;s+=String.fromCharCode(...c));eval(s)})`//`"
        );
    }

    #[test]
    fn test_roles_are_mutually_exclusive() {
        let template =
            bootstrap_template(Decoding::Text, &BTreeSet::new(), BootstrapOptions::default())
                .expect("identifiers available");
        assert_eq!(template.slot(0).exclusive_with(), &[1, 2]);
        assert_eq!(template.slot(1).exclusive_with(), &[0, 2]);
        assert_eq!(template.slot(2).exclusive_with(), &[0, 1]);
    }

    #[test]
    fn test_reserved_names_are_skipped() {
        let reserved: BTreeSet<String> = ["s", "x", "wide"].iter().map(|s| s.to_string()).collect();
        let template = bootstrap_template(Decoding::Text, &reserved, BootstrapOptions::default())
            .expect("identifiers available");
        assert_eq!(template.slot(0).chars()[0], 'a');
        assert!(!template.slot(1).chars().contains(&'s'));
        assert!(!template.slot(2).chars().contains(&'x'));
        assert_eq!(template.slot(2).len(), IDENTIFIER_CHARS.len() - 2);
    }

    #[test]
    fn test_too_many_reserved_names() {
        let reserved: BTreeSet<String> = IDENTIFIER_CHARS
            .chars()
            .skip(2)
            .map(|ch| ch.to_string())
            .collect();
        assert_eq!(
            bootstrap_template(Decoding::Text, &reserved, BootstrapOptions::default()),
            Err(TemplateError::IdentifiersExhausted {
                available: 2,
                needed: 3
            })
        );
    }
}
