//! Character templates: literal text interleaved with variant slots.
//!
//! Slots live in an arena owned by the template and items refer to them by
//! index, so every occurrence of a slot resolves to the same character.

pub type SlotId = usize;

/// A set of acceptable characters for one template position, in order of preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSet {
    chars: Vec<char>,
    exclusive_with: Vec<SlotId>,
}

impl VariantSet {
    pub fn new(chars: impl IntoIterator<Item = char>) -> Self {
        let mut unique = Vec::new();
        for ch in chars {
            if !unique.contains(&ch) {
                unique.push(ch);
            }
        }
        Self {
            chars: unique,
            exclusive_with: Vec::new(),
        }
    }

    /// `{original, UPPER, lower}` for ASCII letters, a single char otherwise.
    pub fn ascii_case(ch: char) -> Self {
        Self::new([ch, ch.to_ascii_uppercase(), ch.to_ascii_lowercase()])
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    pub fn exclusive_with(&self) -> &[SlotId] {
        &self.exclusive_with
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn remove(&mut self, ch: char) {
        self.chars.retain(|&c| c != ch);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateItem {
    Literal(String),
    Slot(SlotId),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringTemplate {
    items: Vec<TemplateItem>,
    slots: Vec<VariantSet>,
}

impl StringTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[TemplateItem] {
        &self.items
    }

    pub fn slots(&self) -> &[VariantSet] {
        &self.slots
    }

    pub fn slot(&self, id: SlotId) -> &VariantSet {
        &self.slots[id]
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Appends literal text, merging it into a preceding literal.
    pub fn push_literal(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(TemplateItem::Literal(last)) = self.items.last_mut() {
            last.push_str(text);
        } else {
            self.items.push(TemplateItem::Literal(text.to_string()));
        }
    }

    /// Registers a slot without placing it.
    pub fn add_slot(&mut self, set: VariantSet) -> SlotId {
        self.slots.push(set);
        self.slots.len() - 1
    }

    /// Places another occurrence of an existing slot.
    pub fn push_slot(&mut self, id: SlotId) {
        self.items.push(TemplateItem::Slot(id));
    }

    /// Registers a slot and places it once. A single-char set becomes a literal.
    pub fn push_variants(&mut self, set: VariantSet) -> Option<SlotId> {
        if let [only] = set.chars() {
            self.push_literal(&only.to_string());
            return None;
        }
        let id = self.add_slot(set);
        self.push_slot(id);
        Some(id)
    }

    /// Makes every pair of the given slots mutually exclusive.
    pub fn make_exclusive(&mut self, ids: &[SlotId]) {
        for &id in ids {
            for &other in ids {
                if id != other && !self.slots[id].exclusive_with.contains(&other) {
                    self.slots[id].exclusive_with.push(other);
                }
            }
        }
    }

    /// Appends `other`, remapping its slots into this arena.
    pub fn append(&mut self, other: StringTemplate) {
        let base = self.slots.len();
        for mut set in other.slots {
            for id in &mut set.exclusive_with {
                *id += base;
            }
            self.slots.push(set);
        }
        for item in other.items {
            match item {
                TemplateItem::Literal(text) => self.push_literal(&text),
                TemplateItem::Slot(id) => self.push_slot(id + base),
            }
        }
    }

    /// Every concrete string the template can produce.
    pub fn variants(&self) -> Variants<'_> {
        Variants::new(self)
    }

    /// All literal text, ignoring slots.
    pub fn literal_text(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(|item| match item {
            TemplateItem::Literal(text) => Some(text.as_str()),
            TemplateItem::Slot(_) => None,
        })
    }
}

/// Cartesian product over the referenced slots, last slot varying fastest.
pub struct Variants<'a> {
    template: &'a StringTemplate,
    order: Vec<SlotId>,
    choice: Vec<usize>,
    done: bool,
}

impl<'a> Variants<'a> {
    fn new(template: &'a StringTemplate) -> Self {
        let mut order = Vec::new();
        for item in &template.items {
            if let TemplateItem::Slot(id) = item {
                if !order.contains(id) {
                    order.push(*id);
                }
            }
        }
        let done = order.iter().any(|&id| template.slots[id].is_empty());
        Self {
            template,
            order,
            choice: vec![0; template.slots.len()],
            done,
        }
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for item in &self.template.items {
            match item {
                TemplateItem::Literal(text) => out.push_str(text),
                TemplateItem::Slot(id) => out.push(self.template.slots[*id].chars[self.choice[*id]]),
            }
        }
        out
    }

    fn advance(&mut self) {
        for &id in self.order.iter().rev() {
            self.choice[id] += 1;
            if self.choice[id] < self.template.slots[id].len() {
                return;
            }
            self.choice[id] = 0;
        }
        self.done = true;
    }
}

impl Iterator for Variants<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.done {
            return None;
        }
        let current = self.render();
        self.advance();
        Some(current)
    }
}
