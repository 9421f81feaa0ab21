use crate::error::TemplateError;
use crate::template::{SlotId, StringTemplate, TemplateItem};

/// Candidate bytes of one slot: preference order plus a 256-bit membership mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteSet {
    values: Vec<u8>,
    mask: [u64; 4],
    pub(crate) exclusive_with: Vec<SlotId>,
}

impl ByteSet {
    pub fn new(values: impl IntoIterator<Item = u8>) -> Self {
        let mut set = Self {
            values: Vec::new(),
            mask: [0; 4],
            exclusive_with: Vec::new(),
        };
        for value in values {
            if !set.contains(value) {
                set.mask[usize::from(value >> 6)] |= 1 << (value & 63);
                set.values.push(value);
            }
        }
        set
    }

    pub fn contains(&self, value: u8) -> bool {
        self.mask[usize::from(value >> 6)] & (1 << (value & 63)) != 0
    }

    pub fn values(&self) -> &[u8] {
        &self.values
    }

    pub fn first(&self) -> Option<u8> {
        self.values.first().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn remove(&mut self, value: u8) {
        if self.contains(value) {
            self.mask[usize::from(value >> 6)] &= !(1 << (value & 63));
            self.values.retain(|&v| v != value);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteItem {
    Literal(u8),
    Slot(SlotId),
}

/// A template lowered to bytes. Slot ids match the source `StringTemplate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteTemplate {
    pub(crate) items: Vec<ByteItem>,
    pub(crate) slots: Vec<ByteSet>,
}

impl ByteTemplate {
    pub fn items(&self) -> &[ByteItem] {
        &self.items
    }

    pub fn slot(&self, id: SlotId) -> &ByteSet {
        &self.slots[id]
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Does the template position accept `value`? Out-of-range positions never match.
    pub(crate) fn accepts(&self, position: isize, value: u8) -> bool {
        if position < 0 {
            return false;
        }
        match self.items.get(position as usize) {
            Some(ByteItem::Literal(byte)) => *byte == value,
            Some(ByteItem::Slot(id)) => self.slots[*id].contains(value),
            None => false,
        }
    }

    /// Replaces every occurrence of `id` with `value` and takes `value` away from
    /// the slots that are mutually exclusive with it.
    pub(crate) fn collapse(&mut self, id: SlotId, value: u8) {
        for item in &mut self.items {
            if *item == ByteItem::Slot(id) {
                *item = ByteItem::Literal(value);
            }
        }
        let exclusive = self.slots[id].exclusive_with.clone();
        for other in exclusive {
            self.slots[other].remove(value);
        }
    }
}

impl TryFrom<&StringTemplate> for ByteTemplate {
    type Error = TemplateError;

    fn try_from(template: &StringTemplate) -> Result<Self, TemplateError> {
        let mut slots = Vec::with_capacity(template.slots().len());
        for set in template.slots() {
            let mut bytes = Vec::with_capacity(set.len());
            for &ch in set.chars() {
                if !ch.is_ascii() {
                    return Err(TemplateError::NonAsciiVariant(ch));
                }
                bytes.push(ch as u8);
            }
            let mut byte_set = ByteSet::new(bytes);
            byte_set.exclusive_with = set.exclusive_with().to_vec();
            slots.push(byte_set);
        }

        let mut items = Vec::new();
        for item in template.items() {
            match item {
                TemplateItem::Literal(text) => {
                    items.extend(text.bytes().map(ByteItem::Literal));
                }
                TemplateItem::Slot(id) => items.push(ByteItem::Slot(*id)),
            }
        }

        Ok(Self { items, slots })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::VariantSet;

    #[test]
    fn test_byte_set_keeps_preference_order() {
        let mut set = ByteSet::new(*b"sab");
        assert_eq!(set.first(), Some(b's'));
        set.remove(b's');
        assert_eq!(set.values(), b"ab");
        assert!(!set.contains(b's'));
        assert!(set.contains(b'b'));
    }

    #[test]
    fn test_lowering_keeps_slot_identity() {
        let mut template = StringTemplate::new();
        let quote = template.add_slot(VariantSet::new(['"', '\'']));
        template.push_slot(quote);
        template.push_literal("é");
        template.push_slot(quote);

        let bytes = ByteTemplate::try_from(&template).expect("ascii variants");
        assert_eq!(bytes.len(), 4);
        assert_eq!(bytes.items()[0], ByteItem::Slot(quote));
        assert_eq!(bytes.items()[3], ByteItem::Slot(quote));
    }

    #[test]
    fn test_non_ascii_variant_is_rejected() {
        let mut template = StringTemplate::new();
        template.push_variants(VariantSet::new(['a', 'ä']));
        assert_eq!(
            ByteTemplate::try_from(&template),
            Err(TemplateError::NonAsciiVariant('ä'))
        );
    }
}
