//! Wrapper HTML compiler.
//!
//! The wrapper markup is split into three character templates:
//!
//! - head: everything before the first attribute separator or tag close. It
//!   becomes the lead-in, so only its casing and one separator may vary.
//! - mid: from there up to the tag close that ends the bootstrap tag. It goes
//!   into the stored block together with the bootstrap script.
//! - tail: the rest, starting with that tag close.
//!
//! Tag and attribute names may take any ASCII case, separators any of a small
//! set, and attribute values any quoting that an HTML tokenizer reads back as
//! the same value. `html5ever` is the reference tokenizer for those checks.

use std::collections::BTreeSet;

use fetchcrunch_core::bits::LINE_TERMINATORS;
use fetchcrunch_core::{StringTemplate, TemplateError, VariantSet};
use html5ever::tendril::StrTendril;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
    TokenizerResult,
};

/// Attribute value marking where the bootstrap goes.
pub const BOOTSTRAP_PLACEHOLDER: &str = "__bootstrap__";

/// In order of preference. The head is Huffman-coded junk, so line breaks are fine there.
const HEAD_SEPARATORS: [char; 5] = [' ', '\t', '\n', '/', '\r'];
const INLINE_SEPARATORS: [char; 3] = [' ', '\t', '/'];
const QUOTES: [char; 2] = ['"', '\''];

/// One piece of tokenized wrapper markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrItem {
    /// Anything outside tags, copied as is.
    Text(String),
    /// `<tag`, `</tag`, `name=` or a bare attribute name.
    Name(String),
    AttrValue(String),
    /// The placeholder attribute value.
    Bootstrap,
    Separator,
    Close,
}

#[derive(Default)]
struct TagCollector {
    tags: Vec<Tag>,
}

impl TokenSink for TagCollector {
    type Handle = ();

    fn process_token(&mut self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        if let Token::TagToken(tag) = token {
            self.tags.push(tag);
        }
        TokenSinkResult::Continue
    }
}

fn tokenize_tags(html: &str) -> Vec<Tag> {
    let mut tokenizer = Tokenizer::new(TagCollector::default(), TokenizerOpts::default());
    let mut input = BufferQueue::default();
    input.push_back(StrTendril::from_slice(html));
    // A script pause hands control back with input left; keep feeding.
    while let TokenizerResult::Script(()) = tokenizer.feed(&mut input) {}
    tokenizer.end();
    tokenizer.sink.tags
}

/// Does `chunk`, written right after `=` in a start tag, read back as `expected`?
fn attr_round_trips(chunk: &str, expected: &str) -> bool {
    let tags = tokenize_tags(&format!("<i data-test={chunk}>"));
    match tags.as_slice() {
        [tag] => {
            tag.kind == TagKind::StartTag
                && tag.attrs.len() == 1
                && &*tag.attrs[0].value == expected
        }
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum QuotedValue {
    /// Unquoted; the next attribute needs a separator.
    Raw(String),
    /// Either quote works.
    QuoteSlot(String),
    /// Quotes included.
    Quoted(String),
}

fn relaxed_escapes(code: u8) -> Vec<String> {
    let mut escapes = vec![char::from(code).to_string()];
    if code == b'&' {
        escapes.push("&amp".to_string());
        escapes.push("&AMP".to_string());
    }
    escapes.push(format!("&#{code}"));
    escapes
}

/// `value` wrapped in `quote`, escaping as little as the tokenizer allows.
fn quote_with(value: &str, quote: char) -> String {
    let mut strict: Vec<String> = Vec::new();
    let mut escapes: Vec<(usize, u8)> = Vec::new();
    let mut text = String::new();
    for ch in value.chars() {
        if matches!(ch, '"' | '\'' | '&') {
            if !text.is_empty() {
                strict.push(std::mem::take(&mut text));
            }
            let code = ch as u8;
            escapes.push((strict.len(), code));
            strict.push(format!("&#{code};"));
        } else {
            text.push(ch);
        }
    }
    if !text.is_empty() {
        strict.push(text);
    }

    let wrap = |pieces: &[String]| format!("{quote}{}{quote}", pieces.concat());

    // Each escape is relaxed on its own against the strict form.
    let mut sloppy = strict.clone();
    for &(index, code) in &escapes {
        for relaxed in relaxed_escapes(code) {
            let mut trial = strict.clone();
            trial[index] = relaxed.clone();
            if attr_round_trips(&wrap(&trial), value) {
                sloppy[index] = relaxed;
                break;
            }
        }
    }

    let sloppy = wrap(&sloppy);
    if attr_round_trips(&sloppy, value) {
        sloppy
    } else {
        wrap(&strict)
    }
}

fn quote_attr_value(value: &str) -> QuotedValue {
    if attr_round_trips(value, value) {
        return QuotedValue::Raw(value.to_string());
    }
    if !value.contains(['\'', '"', '&']) {
        return QuotedValue::QuoteSlot(value.to_string());
    }

    let single = quote_with(value, '\'');
    let double = quote_with(value, '"');
    let single_inner = &single[1..single.len() - 1];
    let double_inner = &double[1..double.len() - 1];
    if single_inner == double_inner {
        return QuotedValue::QuoteSlot(single_inner.to_string());
    }
    if single.len() < double.len() {
        QuotedValue::Quoted(single)
    } else {
        QuotedValue::Quoted(double)
    }
}

/// Where a start tag that begins at `html[0]` ends, skipping quoted values.
fn start_tag_end(html: &str) -> Option<usize> {
    enum State {
        Outside,
        AfterEquals,
        Quoted(u8),
    }

    let mut state = State::Outside;
    for (offset, &byte) in html.as_bytes().iter().enumerate().skip(1) {
        state = match state {
            State::Outside => match byte {
                b'>' => return Some(offset + 1),
                b'=' => State::AfterEquals,
                _ => State::Outside,
            },
            State::AfterEquals => match byte {
                b'>' => return Some(offset + 1),
                b'"' | b'\'' => State::Quoted(byte),
                b' ' | b'\t' | b'\n' | b'\r' | b'\x0c' => State::AfterEquals,
                _ => State::Outside,
            },
            State::Quoted(quote) if byte == quote => State::Outside,
            quoted @ State::Quoted(_) => quoted,
        };
    }
    None
}

enum Span<'a> {
    Text(&'a str),
    Tag(&'a str),
}

/// Splits markup into tags and everything else. Comments, doctypes and
/// processing instructions count as text.
fn scan(html: &str) -> Vec<Span<'_>> {
    let bytes = html.as_bytes();
    let mut spans = Vec::new();
    let mut text_start = 0;
    let mut pos = 0;

    while pos < bytes.len() {
        if bytes[pos] != b'<' {
            pos += 1;
            continue;
        }
        let rest = &html[pos..];
        let next = bytes.get(pos + 1).copied().unwrap_or(0);

        if let Some(body) = rest.strip_prefix("<!--") {
            pos += body.find("-->").map_or(rest.len(), |end| 4 + end + 3);
            continue;
        }
        if next == b'!' || next == b'?' {
            pos += rest.find('>').map_or(rest.len(), |end| end + 1);
            continue;
        }

        let tag_len = if next == b'/' && bytes.get(pos + 2).is_some_and(u8::is_ascii_alphabetic) {
            rest.find('>').map(|end| end + 1)
        } else if next.is_ascii_alphabetic() {
            start_tag_end(rest)
        } else {
            None
        };
        let Some(tag_len) = tag_len else {
            pos += 1;
            continue;
        };

        if text_start < pos {
            spans.push(Span::Text(&html[text_start..pos]));
        }
        spans.push(Span::Tag(&html[pos..pos + tag_len]));
        pos += tag_len;
        text_start = pos;
    }

    if text_start < bytes.len() {
        spans.push(Span::Text(&html[text_start..]));
    }
    spans
}

/// Tokenizes wrapper markup, collecting the names the bootstrap may not use.
pub fn ir_from_html(html: &str) -> (Vec<IrItem>, BTreeSet<String>) {
    let mut ir = Vec::new();
    let mut reserved = BTreeSet::new();

    for span in scan(html) {
        let (source, tags) = match span {
            Span::Text(text) => (text, Vec::new()),
            Span::Tag(source) => (source, tokenize_tags(source)),
        };
        let [tag] = tags.as_slice() else {
            if let Some(IrItem::Text(last)) = ir.last_mut() {
                last.push_str(source);
            } else {
                ir.push(IrItem::Text(source.to_string()));
            }
            continue;
        };

        match tag.kind {
            TagKind::StartTag => {
                ir.push(IrItem::Name(format!("<{}", &*tag.name)));
                for attr in &tag.attrs {
                    let name = &*attr.name.local;
                    let value = &*attr.value;
                    if name == "id" && !value.is_empty() {
                        // Ids are implicit globals.
                        reserved.insert(value.to_string());
                    }
                    if &*tag.name == "svg" && value == BOOTSTRAP_PLACEHOLDER {
                        // Resolve to the element inside its event handlers.
                        reserved.insert("x".to_string());
                        reserved.insert("y".to_string());
                    }

                    ir.push(IrItem::Separator);
                    if value == BOOTSTRAP_PLACEHOLDER {
                        ir.push(IrItem::Name(format!("{name}=")));
                        ir.push(IrItem::Bootstrap);
                    } else if !value.is_empty() {
                        ir.push(IrItem::Name(format!("{name}=")));
                        ir.push(IrItem::AttrValue(value.to_string()));
                    } else {
                        ir.push(IrItem::Name(name.to_string()));
                    }
                }
                ir.push(IrItem::Close);
            }
            TagKind::EndTag => {
                ir.push(IrItem::Name(format!("</{}", &*tag.name)));
                ir.push(IrItem::Close);
            }
        }
    }

    (ir, reserved)
}

fn lower(items: &[IrItem], separators: &[char], mut bootstrap: Option<StringTemplate>) -> StringTemplate {
    let mut template = StringTemplate::new();
    let mut skip_separator = false;

    for item in items {
        let skip_this_separator = std::mem::take(&mut skip_separator);
        match item {
            IrItem::Text(text) => template.push_literal(text),
            IrItem::Close => template.push_literal(">"),
            IrItem::Name(name) => {
                for ch in name.chars() {
                    template.push_variants(VariantSet::ascii_case(ch));
                }
            }
            IrItem::AttrValue(value) => match quote_attr_value(value) {
                QuotedValue::Raw(raw) => template.push_literal(&raw),
                QuotedValue::QuoteSlot(inner) => {
                    let quote = template.add_slot(VariantSet::new(QUOTES));
                    template.push_slot(quote);
                    template.push_literal(&inner);
                    template.push_slot(quote);
                    skip_separator = true;
                }
                QuotedValue::Quoted(quoted) => {
                    template.push_literal(&quoted);
                    skip_separator = true;
                }
            },
            IrItem::Bootstrap => {
                let quote = template.add_slot(VariantSet::new(QUOTES));
                template.push_slot(quote);
                if let Some(bootstrap) = bootstrap.take() {
                    template.append(bootstrap);
                }
                template.push_slot(quote);
                skip_separator = true;
            }
            IrItem::Separator => {
                if !skip_this_separator {
                    template.push_variants(VariantSet::new(separators.iter().copied()));
                }
            }
        }
    }
    template
}

fn ensure_single_line(template: &StringTemplate) -> Result<(), TemplateError> {
    match template
        .literal_text()
        .find(|text| text.contains(LINE_TERMINATORS))
    {
        Some(text) => Err(TemplateError::LineTerminator(text.to_string())),
        None => Ok(()),
    }
}

/// Templates for one bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperTemplates {
    pub mid: StringTemplate,
    pub tail: StringTemplate,
}

/// Tokenized wrapper markup with its cut points. Independent of the payload,
/// so it is compiled once per template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledWrapper {
    ir: Vec<IrItem>,
    reserved: BTreeSet<String>,
    head_end: usize,
    mid_end: usize,
}

impl CompiledWrapper {
    pub fn compile(html: &str) -> Result<Self, TemplateError> {
        let (ir, reserved) = ir_from_html(html);

        let head_end = ir
            .iter()
            .position(|item| matches!(item, IrItem::Close | IrItem::Separator))
            .ok_or(TemplateError::NoClosedTag)?;

        let found = ir
            .iter()
            .filter(|item| matches!(item, IrItem::Bootstrap))
            .count();
        let bootstrap_at = match ir.iter().position(|item| matches!(item, IrItem::Bootstrap)) {
            Some(at) if found == 1 => at,
            _ => {
                return Err(TemplateError::PlaceholderCount {
                    placeholder: BOOTSTRAP_PLACEHOLDER,
                    found,
                });
            }
        };
        let mid_end = ir[bootstrap_at..]
            .iter()
            .position(|item| matches!(item, IrItem::Close))
            .map(|offset| bootstrap_at + offset)
            .ok_or(TemplateError::NoClosedTag)?;

        Ok(Self {
            ir,
            reserved,
            head_end,
            mid_end,
        })
    }

    /// Names already bound in the page's global scope or the handler's scope.
    pub fn reserved_identifiers(&self) -> &BTreeSet<String> {
        &self.reserved
    }

    /// The opening markup, with a trailing separator slot.
    pub fn head(&self) -> StringTemplate {
        let mut items = self.ir[..self.head_end].to_vec();
        items.push(IrItem::Separator);
        lower(&items, &HEAD_SEPARATORS, None)
    }

    /// Mid and tail around `bootstrap`. Both end up inside the junk line, so
    /// neither may break it.
    pub fn templates(&self, bootstrap: StringTemplate) -> Result<WrapperTemplates, TemplateError> {
        let mid = lower(
            &self.ir[self.head_end..self.mid_end],
            &INLINE_SEPARATORS,
            Some(bootstrap),
        );
        let tail = lower(&self.ir[self.mid_end..], &INLINE_SEPARATORS, None);
        ensure_single_line(&mid)?;
        ensure_single_line(&tail)?;
        Ok(WrapperTemplates { mid, tail })
    }
}
