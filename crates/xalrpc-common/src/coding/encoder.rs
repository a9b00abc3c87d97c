use std::fmt::Write;
use std::sync::Arc;

use super::adaptor::{AdaptorRegistry, PRIMITIVE_ITEM_TYPES};
use super::error::CodingError;
use super::number::Number;
use super::reference::{EncodeReferenceTable, Sighting};
use super::value::Value;
use super::{is_marker_key, ARRAY_KEY, ID_KEY, ITEM_TYPE_KEY, MAX_NESTING_DEPTH, REF_KEY, TYPE_KEY, VALUE_KEY};

/// Recorded form of a value, produced by the first pass and written out by
/// the second. `slot` is the reference table entry of referenceable nodes.
enum Node {
    Literal(String),
    Text {
        slot: Option<usize>,
        text: Arc<str>,
    },
    Array {
        slot: Option<usize>,
        items: Vec<Node>,
    },
    Object {
        slot: Option<usize>,
        entries: Vec<(String, Node)>,
    },
    Extension {
        slot: Option<usize>,
        type_name: String,
        representation: Box<Node>,
        bare: bool,
    },
    TypedArray {
        slot: Option<usize>,
        item_type: String,
        items: Vec<Node>,
    },
    Reference(usize),
}

/// Two-pass graph encoder: record every value into the reference table, then
/// emit text with definitions and back-references where values repeat.
pub(crate) struct Encoder<'a> {
    adaptors: &'a AdaptorRegistry,
    table: EncodeReferenceTable,
}

impl<'a> Encoder<'a> {
    pub(crate) fn new(adaptors: &'a AdaptorRegistry) -> Self {
        Encoder {
            adaptors,
            table: EncodeReferenceTable::new(),
        }
    }

    pub(crate) fn encode(mut self, value: &Value) -> Result<String, CodingError> {
        let root = self.record(value, None, 0)?;
        let mut out = String::new();
        self.emit(&root, &mut out);
        Ok(out)
    }

    /// `bare_type` is set for items of a typed array whose declared item
    /// type is an extension; such items drop their type envelope.
    ///
    /// `depth` is the JSON nesting of the enclosing container. Each value is
    /// charged for the deepest form it may be written in, envelopes included,
    /// since sharing is only known once the whole graph is recorded.
    fn record(&mut self, value: &Value, bare_type: Option<&str>, depth: usize) -> Result<Node, CodingError> {
        let slot = match self.table.record(value) {
            Some(Sighting::Repeat(slot)) => {
                nest(depth, 1)?;
                return Ok(Node::Reference(slot));
            }
            Some(Sighting::First(slot)) => Some(slot),
            None => None,
        };
        let envelope = usize::from(slot.is_some());

        match value {
            Value::Null => Ok(Node::Literal("null".to_string())),
            Value::Bool(b) => Ok(Node::Literal(b.to_string())),
            Value::Number(n) => Ok(Node::Literal(format_number(*n)?)),
            Value::String(s) => {
                nest(depth, envelope)?;
                Ok(Node::Text {
                    slot,
                    text: s.clone(),
                })
            }
            Value::Array(array) => {
                let depth = nest(depth, 1 + envelope)?;
                let mut items = Vec::with_capacity(array.len());
                for item in array.to_vec() {
                    items.push(self.record(&item, None, depth)?);
                }
                Ok(Node::Array { slot, items })
            }
            Value::Object(object) => {
                let depth = nest(depth, 1 + envelope)?;
                let fields: Vec<(String, Value)> = object
                    .read()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                check_reserved_keys(&fields)?;
                let mut entries = Vec::with_capacity(fields.len());
                for (key, item) in fields {
                    let node = self.record(&item, None, depth)?;
                    entries.push((key, node));
                }
                Ok(Node::Object { slot, entries })
            }
            Value::Extension(extension) => {
                let depth = nest(depth, 1 + envelope)?;
                let adaptor = self.adaptors.lookup(extension.type_name())?;
                let representation = adaptor.to_representation(&**extension.native())?;
                let representation = self.record(&representation, None, depth)?;
                Ok(Node::Extension {
                    slot,
                    type_name: extension.type_name().to_string(),
                    representation: Box::new(representation),
                    bare: bare_type == Some(extension.type_name()),
                })
            }
            Value::TypedArray(typed) => {
                let depth = nest(depth, 2 + envelope)?;
                let item_type = typed.item_type();
                let extended = self.adaptors.is_extended(item_type);
                if !extended && !PRIMITIVE_ITEM_TYPES.contains(&item_type) {
                    return Err(CodingError::UnsupportedType(item_type.to_string()));
                }
                let mut items = Vec::with_capacity(typed.items().len());
                for item in typed.items().to_vec() {
                    if extended {
                        check_extension_item(item_type, &item)?;
                    }
                    let bare = if extended { Some(item_type) } else { None };
                    items.push(self.record(&item, bare, depth)?);
                }
                Ok(Node::TypedArray {
                    slot,
                    item_type: item_type.to_string(),
                    items,
                })
            }
        }
    }

    fn emit(&mut self, node: &Node, out: &mut String) {
        match node {
            Node::Literal(text) => out.push_str(text),
            Node::Reference(slot) => self.emit_reference(*slot, out),
            Node::Text { slot, text } => {
                self.emit_definition(*slot, out, |_, out| write_string(out, text));
            }
            Node::Array { slot, items } => {
                self.emit_definition(*slot, out, |encoder, out| encoder.emit_items(items, out));
            }
            Node::Object { slot, entries } => {
                self.emit_definition(*slot, out, |encoder, out| {
                    out.push('{');
                    for (i, (key, item)) in entries.iter().enumerate() {
                        if i > 0 {
                            out.push(',');
                        }
                        write_string(out, key);
                        out.push(':');
                        encoder.emit(item, out);
                    }
                    out.push('}');
                });
            }
            Node::Extension {
                slot,
                type_name,
                representation,
                bare,
            } => {
                let shared = slot.map_or(false, |slot| self.table.has_multiple(slot));
                if *bare && !shared {
                    self.emit(representation, out);
                    return;
                }
                self.emit_definition(*slot, out, |encoder, out| {
                    out.push('{');
                    write_string(out, TYPE_KEY);
                    out.push(':');
                    write_string(out, type_name);
                    out.push(',');
                    write_string(out, VALUE_KEY);
                    out.push(':');
                    encoder.emit(representation, out);
                    out.push('}');
                });
            }
            Node::TypedArray {
                slot,
                item_type,
                items,
            } => {
                self.emit_definition(*slot, out, |encoder, out| {
                    out.push('{');
                    write_string(out, ITEM_TYPE_KEY);
                    out.push(':');
                    write_string(out, item_type);
                    out.push(',');
                    write_string(out, ARRAY_KEY);
                    out.push(':');
                    encoder.emit_items(items, out);
                    out.push('}');
                });
            }
        }
    }

    fn emit_items(&mut self, items: &[Node], out: &mut String) {
        out.push('[');
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            self.emit(item, out);
        }
        out.push(']');
    }

    /// Writes `body` directly, or wrapped in a definition envelope when the
    /// value is referenced more than once.
    fn emit_definition<F>(&mut self, slot: Option<usize>, out: &mut String, body: F)
    where
        F: FnOnce(&mut Self, &mut String),
    {
        let slot = match slot {
            Some(slot) if self.table.has_multiple(slot) => slot,
            _ => return body(self, out),
        };
        if self.table.is_encoded(slot) {
            self.emit_reference(slot, out);
            return;
        }
        self.table.mark_encoded(slot);

        out.push('{');
        write_string(out, ID_KEY);
        let _ = write!(out, ":{},", self.table.id(slot));
        write_string(out, VALUE_KEY);
        out.push(':');
        body(self, out);
        out.push('}');
    }

    fn emit_reference(&self, slot: usize, out: &mut String) {
        out.push('{');
        write_string(out, REF_KEY);
        let _ = write!(out, ":{}}}", self.table.id(slot));
    }
}

/// Adds `levels` of nesting to `depth`, refusing to pass the limit the
/// decoder enforces.
fn nest(depth: usize, levels: usize) -> Result<usize, CodingError> {
    let depth = depth + levels;
    if depth > MAX_NESTING_DEPTH {
        return Err(CodingError::NestingTooDeep(MAX_NESTING_DEPTH));
    }
    Ok(depth)
}

fn format_number(n: Number) -> Result<String, CodingError> {
    match n {
        Number::Integer(i) => Ok(i.to_string()),
        Number::Float(f) if f.is_finite() => Ok(format!("{:?}", f)),
        Number::Float(f) => Err(CodingError::NonFiniteNumber(f)),
    }
}

/// Plain objects may not carry an envelope marker key: the decoder would
/// either read them as the envelope or reject them.
fn check_reserved_keys(entries: &[(String, Value)]) -> Result<(), CodingError> {
    if entries.iter().any(|(key, _)| is_marker_key(key)) {
        let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        return Err(CodingError::ReservedKeys(keys.join(",")));
    }
    Ok(())
}

fn check_extension_item(item_type: &str, item: &Value) -> Result<(), CodingError> {
    match item {
        Value::Null => Ok(()),
        Value::Extension(e) if e.type_name() == item_type => Ok(()),
        other => Err(CodingError::conversion(
            item_type,
            format!("typed array item is {}", other.type_label()),
        )),
    }
}

pub(crate) fn write_string(out: &mut String, text: &str) {
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
