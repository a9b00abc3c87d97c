use super::adaptor::{AdaptorRegistry, PRIMITIVE_ITEM_TYPES};
use super::error::CodingError;
use super::number::Number;
use super::reference::DecodeReferenceTable;
use super::value::{Array, Extension, Object, TypedArray, Value};
use super::{is_marker_key, ARRAY_KEY, ID_KEY, ITEM_TYPE_KEY, MAX_NESTING_DEPTH, REF_KEY, TYPE_KEY, VALUE_KEY};

/// Recursive descent decoder over message text.
///
/// A reference definition (`{"__XALID": n, "value": ...}`) hands its id to
/// the value that follows through `pending_definition`. Arrays and objects
/// claim it and register themselves before their contents are read, which
/// is what lets a container refer to itself.
pub(crate) struct Decoder<'a> {
    adaptors: &'a AdaptorRegistry,
    text: &'a str,
    pos: usize,
    depth: usize,
    references: DecodeReferenceTable,
    pending_definition: Option<i64>,
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(adaptors: &'a AdaptorRegistry, text: &'a str) -> Self {
        Decoder {
            adaptors,
            text,
            pos: 0,
            depth: 0,
            references: DecodeReferenceTable::new(),
            pending_definition: None,
        }
    }

    pub(crate) fn decode(mut self) -> Result<Value, CodingError> {
        self.skip_whitespace();
        if self.peek().is_none() {
            return Err(self.error("empty input"));
        }
        let value = self.parse_value()?;
        self.skip_whitespace();
        if self.pos < self.text.len() {
            return Err(self.error("trailing characters after value"));
        }
        Ok(value)
    }

    fn parse_value(&mut self) -> Result<Value, CodingError> {
        self.skip_whitespace();
        let claim = self.pending_definition.take();
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some(b'{') => self.parse_object(claim),
            Some(b'[') => self.parse_array(claim),
            Some(b'"') => Ok(Value::from(self.parse_string()?)),
            Some(b't') => self.parse_literal("true", Value::Bool(true)),
            Some(b'f') => self.parse_literal("false", Value::Bool(false)),
            Some(b'n') => self.parse_literal("null", Value::Null),
            Some(b'-' | b'0'..=b'9') => self.parse_number(),
            Some(c) => Err(self.error(format!("unexpected character '{}'", c as char))),
        }
    }

    fn parse_array(&mut self, claim: Option<i64>) -> Result<Value, CodingError> {
        self.enter()?;
        self.pos += 1;
        let array = Array::new();
        if let Some(id) = claim {
            self.references.define(id, Value::Array(array.clone()));
        }

        self.skip_whitespace();
        if self.peek() == Some(b']') {
            self.pos += 1;
            self.depth -= 1;
            return Ok(Value::Array(array));
        }

        loop {
            let item = self.parse_value()?;
            array.push(item);
            self.skip_whitespace();
            match self.next_byte() {
                Some(b',') => continue,
                Some(b']') => break,
                None => return Err(self.error("unterminated array")),
                Some(c) => {
                    return Err(self.error_at(self.pos - 1, format!("expected ',' or ']' but found '{}'", c as char)))
                }
            }
        }

        self.depth -= 1;
        Ok(Value::Array(array))
    }

    fn parse_object(&mut self, claim: Option<i64>) -> Result<Value, CodingError> {
        self.enter()?;
        let start = self.pos;
        self.pos += 1;
        let object = Object::new();
        if let Some(id) = claim {
            self.references.define(id, Value::Object(object.clone()));
        }

        self.skip_whitespace();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            self.depth -= 1;
            return Ok(Value::Object(object));
        }

        let mut definition_id = None;
        loop {
            self.skip_whitespace();
            if self.peek() != Some(b'"') {
                return Err(self.error("expected a string key"));
            }
            let key = self.parse_string()?;
            self.skip_whitespace();
            if self.next_byte() != Some(b':') {
                return Err(self.error_at(self.pos.saturating_sub(1), "expected ':' after key"));
            }

            if key == VALUE_KEY {
                self.pending_definition = definition_id;
            }
            let value = self.parse_value()?;
            self.pending_definition = None;

            if key == ID_KEY && object.is_empty() {
                definition_id = value.as_number().and_then(|n| n.to_exact_i64());
            }
            object.insert(key, value);

            self.skip_whitespace();
            match self.next_byte() {
                Some(b',') => continue,
                Some(b'}') => break,
                None => return Err(self.error("unterminated object")),
                Some(c) => {
                    return Err(self.error_at(self.pos - 1, format!("expected ',' or '}}' but found '{}'", c as char)))
                }
            }
        }

        self.depth -= 1;
        self.finish_object(object, start, claim)
    }

    /// Interprets the envelope shapes; anything else stays a plain object.
    fn finish_object(&mut self, object: Object, start: usize, claim: Option<i64>) -> Result<Value, CodingError> {
        let keys = object.keys();
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();

        let value = match keys.as_slice() {
            [REF_KEY] => {
                let id = self.envelope_id(&object, REF_KEY, start)?;
                return self
                    .references
                    .resolve(id)
                    .ok_or(CodingError::UnresolvedReference { id, offset: start });
            }
            [ID_KEY, VALUE_KEY] => {
                let id = self.envelope_id(&object, ID_KEY, start)?;
                let value = object.get(VALUE_KEY).unwrap_or_default();
                self.references.define(id, value.clone());
                return Ok(value);
            }
            [TYPE_KEY, VALUE_KEY] => {
                let type_name = self.envelope_name(&object, TYPE_KEY, start)?;
                let representation = object.get(VALUE_KEY).unwrap_or_default();
                let native = self.adaptors.lookup(&type_name)?.to_native(&representation)?;
                Value::Extension(Extension::from_shared(type_name, native))
            }
            [ITEM_TYPE_KEY, ARRAY_KEY] => {
                let item_type = self.envelope_name(&object, ITEM_TYPE_KEY, start)?;
                let items = match object.get(ARRAY_KEY) {
                    Some(Value::Array(items)) => items.to_vec(),
                    _ => return Err(CodingError::parse(start, "typed array without an item list")),
                };
                self.typed_array(item_type, items)?
            }
            // A definition with extra keys may already have claimed its id,
            // so no half-envelope is taken as a plain object
            _ if keys.iter().any(|key| is_marker_key(key)) => {
                return Err(CodingError::parse(start, "malformed envelope"));
            }
            _ => return Ok(Value::Object(object)),
        };

        if let Some(id) = claim {
            self.references.define(id, value.clone());
        }
        Ok(value)
    }

    fn typed_array(&self, item_type: String, items: Vec<Value>) -> Result<Value, CodingError> {
        if let Some(adaptor) = self.adaptors.get(&item_type) {
            let items = items
                .into_iter()
                .map(|item| {
                    let converted = match &item {
                        Value::Null => true,
                        Value::Extension(e) => e.type_name() == item_type,
                        _ => false,
                    };
                    if converted {
                        return Ok(item);
                    }
                    let native = adaptor.to_native(&item)?;
                    Ok(Value::Extension(Extension::from_shared(item_type.as_str(), native)))
                })
                .collect::<Result<Vec<_>, CodingError>>()?;
            return Ok(Value::TypedArray(TypedArray::new(item_type, items)));
        }
        if PRIMITIVE_ITEM_TYPES.contains(&item_type.as_str()) {
            return Ok(Value::TypedArray(TypedArray::new(item_type, items)));
        }
        Err(CodingError::UnsupportedType(item_type))
    }

    fn envelope_id(&self, object: &Object, key: &str, start: usize) -> Result<i64, CodingError> {
        object
            .get(key)
            .and_then(|v| v.as_number())
            .and_then(|n| n.to_exact_i64())
            .ok_or_else(|| CodingError::parse(start, format!("{} must be an integer", key)))
    }

    fn envelope_name(&self, object: &Object, key: &str, start: usize) -> Result<String, CodingError> {
        match object.get(key) {
            Some(Value::String(s)) => Ok(s.to_string()),
            _ => Err(CodingError::parse(start, format!("{} must be a string", key))),
        }
    }

    fn parse_string(&mut self) -> Result<String, CodingError> {
        let start = self.pos;
        self.pos += 1;
        let bytes = self.text.as_bytes();
        let mut out = String::new();
        let mut run_start = self.pos;

        loop {
            match bytes.get(self.pos) {
                None => return Err(self.error_at(start, "unterminated string")),
                Some(b'"') => {
                    out.push_str(&self.text[run_start..self.pos]);
                    self.pos += 1;
                    return Ok(out);
                }
                Some(b'\\') => {
                    out.push_str(&self.text[run_start..self.pos]);
                    self.pos += 1;
                    self.parse_escape(&mut out)?;
                    run_start = self.pos;
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn parse_escape(&mut self, out: &mut String) -> Result<(), CodingError> {
        let escape_at = self.pos - 1;
        match self.next_byte() {
            Some(b'"') => out.push('"'),
            Some(b'\\') => out.push('\\'),
            Some(b'/') => out.push('/'),
            Some(b'b') => out.push('\u{08}'),
            Some(b'f') => out.push('\u{0c}'),
            Some(b'n') => out.push('\n'),
            Some(b'r') => out.push('\r'),
            Some(b't') => out.push('\t'),
            Some(b'u') => {
                let high = self.parse_hex4()?;
                let code = if (0xD800..0xDC00).contains(&high) {
                    if self.text.as_bytes().get(self.pos..self.pos + 2) != Some(b"\\u".as_slice()) {
                        return Err(self.error_at(escape_at, "unpaired surrogate"));
                    }
                    self.pos += 2;
                    let low = self.parse_hex4()?;
                    if !(0xDC00..0xE000).contains(&low) {
                        return Err(self.error_at(escape_at, "invalid low surrogate"));
                    }
                    0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)
                } else {
                    high
                };
                let c = char::from_u32(code).ok_or_else(|| self.error_at(escape_at, "invalid unicode escape"))?;
                out.push(c);
            }
            None => return Err(self.error_at(escape_at, "unterminated escape")),
            // Unknown escapes stand for the escaped character itself.
            Some(_) => {
                self.pos -= 1;
                let c = self.text[self.pos..]
                    .chars()
                    .next()
                    .ok_or_else(|| self.error_at(escape_at, "unterminated escape"))?;
                self.pos += c.len_utf8();
                out.push(c);
            }
        }
        Ok(())
    }

    fn parse_hex4(&mut self) -> Result<u32, CodingError> {
        let digits = self
            .text
            .get(self.pos..self.pos + 4)
            .ok_or_else(|| self.error("truncated unicode escape"))?;
        let code = u32::from_str_radix(digits, 16).map_err(|_| self.error("invalid unicode escape"))?;
        self.pos += 4;
        Ok(code)
    }

    fn parse_number(&mut self) -> Result<Value, CodingError> {
        let start = self.pos;
        let bytes = self.text.as_bytes();
        let mut integral = true;

        if bytes.get(self.pos) == Some(&b'-') {
            self.pos += 1;
        }
        let digits = self.skip_digits();
        if digits == 0 {
            return Err(self.error_at(start, "invalid number"));
        }
        if bytes.get(self.pos) == Some(&b'.') {
            integral = false;
            self.pos += 1;
            if self.skip_digits() == 0 {
                return Err(self.error_at(start, "invalid number"));
            }
        }
        if matches!(bytes.get(self.pos), Some(b'e' | b'E')) {
            integral = false;
            self.pos += 1;
            if matches!(bytes.get(self.pos), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if self.skip_digits() == 0 {
                return Err(self.error_at(start, "invalid number"));
            }
        }

        let literal = &self.text[start..self.pos];
        if integral {
            if let Ok(i) = literal.parse::<i64>() {
                return Ok(Value::Number(Number::Integer(i)));
            }
        }
        literal
            .parse::<f64>()
            .map(|f| Value::Number(Number::Float(f)))
            .map_err(|_| self.error_at(start, "invalid number"))
    }

    fn parse_literal(&mut self, literal: &str, value: Value) -> Result<Value, CodingError> {
        if self.text[self.pos..].starts_with(literal) {
            self.pos += literal.len();
            Ok(value)
        } else {
            Err(self.error("invalid literal"))
        }
    }

    fn skip_digits(&mut self) -> usize {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        self.pos - start
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn next_byte(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn enter(&mut self) -> Result<(), CodingError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        Ok(())
    }

    fn error(&self, message: impl Into<String>) -> CodingError {
        CodingError::parse(self.pos, message)
    }

    fn error_at(&self, offset: usize, message: impl Into<String>) -> CodingError {
        CodingError::parse(offset, message)
    }
}
