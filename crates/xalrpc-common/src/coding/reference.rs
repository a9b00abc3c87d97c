//! Bookkeeping for the reference envelopes that preserve sharing and cycles.
//!
//! On the way out, [`EncodeReferenceTable`] is filled during the recording
//! walk: every container, extension and long string gets a slot, and a second
//! sighting flips the slot to `has_multiple`. The emit walk then writes the
//! first occurrence of a multiply-referenced value as a definition and every
//! later one as a back-reference.
//!
//! On the way in, [`DecodeReferenceTable`] maps wire ids to the values they
//! define.

use std::collections::HashMap;
use std::sync::Arc;

use super::value::Value;

/// Strings longer than this many characters are eligible for references.
pub const REFERENCE_STRING_THRESHOLD: usize = 20;

/// Identity of a referenceable value within one encoding pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ReferenceKey {
    Container(usize),
    Extension(usize),
    Text(Arc<str>),
}

#[derive(Debug)]
struct ReferenceSlot {
    id: i64,
    has_multiple: bool,
    is_encoded: bool,
    // Keeps the allocation alive so its address cannot be reused by another
    // value while the pass is running.
    _retained: Value,
}

/// Outcome of recording a value in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sighting {
    /// First time the value was seen; it owns this slot.
    First(usize),
    /// The value was seen before under this slot.
    Repeat(usize),
}

#[derive(Debug, Default)]
pub struct EncodeReferenceTable {
    slots: Vec<ReferenceSlot>,
    index: HashMap<ReferenceKey, usize>,
}

impl EncodeReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` and reports whether it was seen already.
    ///
    /// Returns `None` for values that never take part in references:
    /// null, booleans, numbers and strings at or under the length threshold.
    pub fn record(&mut self, value: &Value) -> Option<Sighting> {
        let key = Self::key_of(value)?;
        if let Some(&slot) = self.index.get(&key) {
            self.slots[slot].has_multiple = true;
            return Some(Sighting::Repeat(slot));
        }

        let slot = self.slots.len();
        self.slots.push(ReferenceSlot {
            id: slot as i64 + 1,
            has_multiple: false,
            is_encoded: false,
            _retained: value.clone(),
        });
        self.index.insert(key, slot);
        Some(Sighting::First(slot))
    }

    pub fn id(&self, slot: usize) -> i64 {
        self.slots[slot].id
    }

    pub fn has_multiple(&self, slot: usize) -> bool {
        self.slots[slot].has_multiple
    }

    pub fn is_encoded(&self, slot: usize) -> bool {
        self.slots[slot].is_encoded
    }

    pub fn mark_encoded(&mut self, slot: usize) {
        self.slots[slot].is_encoded = true;
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn key_of(value: &Value) -> Option<ReferenceKey> {
        match value {
            Value::Array(a) => Some(ReferenceKey::Container(a.identity())),
            Value::Object(o) => Some(ReferenceKey::Container(o.identity())),
            Value::TypedArray(t) => Some(ReferenceKey::Container(t.identity())),
            Value::Extension(e) => Some(ReferenceKey::Extension(e.identity())),
            Value::String(s) if s.chars().count() > REFERENCE_STRING_THRESHOLD => {
                Some(ReferenceKey::Text(s.clone()))
            }
            _ => None,
        }
    }
}

/// Wire id to value mapping built while decoding.
#[derive(Debug, Default)]
pub struct DecodeReferenceTable {
    values: HashMap<i64, Value>,
}

impl DecodeReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates `id` with `value`, replacing any earlier placeholder.
    pub fn define(&mut self, id: i64, value: Value) {
        self.values.insert(id, value);
    }

    pub fn resolve(&self, id: i64) -> Option<Value> {
        self.values.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_strings_are_not_recorded() {
        let mut table = EncodeReferenceTable::new();
        assert_eq!(table.record(&Value::from("exactly twenty chars")), None);
        assert_eq!(table.record(&Value::from(42)), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_long_strings_keyed_by_content() {
        let mut table = EncodeReferenceTable::new();
        let text = "twenty one characters";
        assert_eq!(table.record(&Value::from(text)), Some(Sighting::First(0)));
        assert_eq!(table.record(&Value::from(text.to_string())), Some(Sighting::Repeat(0)));
        assert!(table.has_multiple(0));
        assert_eq!(table.id(0), 1);
    }

    #[test]
    fn test_containers_keyed_by_identity() {
        let mut table = EncodeReferenceTable::new();
        let a = Value::array(vec![Value::from(1)]);
        let b = Value::array(vec![Value::from(1)]);

        assert_eq!(table.record(&a), Some(Sighting::First(0)));
        assert_eq!(table.record(&b), Some(Sighting::First(1)));
        assert_eq!(table.record(&a.clone()), Some(Sighting::Repeat(0)));
        assert!(table.has_multiple(0));
        assert!(!table.has_multiple(1));
    }

    #[test]
    fn test_decode_table_overwrites_placeholder() {
        let mut table = DecodeReferenceTable::new();
        table.define(3, Value::Null);
        table.define(3, Value::from("real"));
        assert_eq!(table.resolve(3), Some(Value::from("real")));
        assert_eq!(table.resolve(4), None);
    }
}
