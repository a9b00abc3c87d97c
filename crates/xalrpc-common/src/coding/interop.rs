//! Conversions between [`Value`] and `serde_json::Value`.
//!
//! `serde_json` trees cannot express sharing, so shared containers are
//! duplicated and cycles are refused.

use serde_json::{Map, Value as JsonValue};

use super::adaptor::AdaptorRegistry;
use super::error::CodingError;
use super::number::Number;
use super::value::{Array, Value};
use super::{TYPE_KEY, VALUE_KEY};

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Number(Number::Integer(i)),
                None => Value::Number(Number::Float(n.as_f64().unwrap_or(f64::NAN))),
            },
            JsonValue::String(s) => Value::from(s),
            JsonValue::Array(items) => Value::array(items.into_iter().map(Value::from).collect()),
            JsonValue::Object(map) => Value::object(map.into_iter().map(|(k, v)| (k, Value::from(v)))),
        }
    }
}

/// Renders a value as a plain JSON tree.
///
/// Extensions become `{"__XALTYPE": ..., "value": ...}` objects so the type
/// stays visible; typed arrays become their item list.
pub fn to_json(value: &Value, adaptors: &AdaptorRegistry) -> Result<JsonValue, CodingError> {
    let mut path = Vec::new();
    convert(value, adaptors, &mut path)
}

fn convert(value: &Value, adaptors: &AdaptorRegistry, path: &mut Vec<usize>) -> Result<JsonValue, CodingError> {
    Ok(match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Number(Number::Integer(i)) => JsonValue::from(*i),
        Value::Number(Number::Float(f)) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .ok_or(CodingError::NonFiniteNumber(*f))?,
        Value::String(s) => JsonValue::String(s.to_string()),
        Value::Array(array) => convert_items(array, adaptors, path)?,
        Value::TypedArray(typed) => convert_items(typed.items(), adaptors, path)?,
        Value::Object(object) => {
            enter(path, object.identity())?;
            let mut map = Map::new();
            for (key, item) in object.read().iter() {
                map.insert(key.clone(), convert(item, adaptors, path)?);
            }
            path.pop();
            JsonValue::Object(map)
        }
        Value::Extension(extension) => {
            let adaptor = adaptors.lookup(extension.type_name())?;
            let representation = adaptor.to_representation(&**extension.native())?;
            let mut map = Map::new();
            map.insert(TYPE_KEY.to_string(), JsonValue::String(extension.type_name().to_string()));
            map.insert(VALUE_KEY.to_string(), convert(&representation, adaptors, path)?);
            JsonValue::Object(map)
        }
    })
}

fn convert_items(array: &Array, adaptors: &AdaptorRegistry, path: &mut Vec<usize>) -> Result<JsonValue, CodingError> {
    enter(path, array.identity())?;
    let items = array
        .read()
        .iter()
        .map(|item| convert(item, adaptors, path))
        .collect::<Result<Vec<_>, _>>()?;
    path.pop();
    Ok(JsonValue::Array(items))
}

fn enter(path: &mut Vec<usize>, identity: usize) -> Result<(), CodingError> {
    if path.contains(&identity) {
        return Err(CodingError::conversion("json", "cyclic graph has no tree form"));
    }
    path.push(identity);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_serde_json() {
        let value = Value::from(json!({"a": [1, 2.5, "x"], "b": null}));
        let object = value.as_object().unwrap();
        assert_eq!(object.get("b"), Some(Value::Null));
        assert_eq!(
            object.get("a"),
            Some(Value::array(vec![Value::from(1), Value::from(2.5), Value::from("x")]))
        );
    }

    #[test]
    fn test_to_json_duplicates_shared_values() {
        let shared = Value::array(vec![Value::from(1)]);
        let value = Value::array(vec![shared.clone(), shared]);
        let json = to_json(&value, &AdaptorRegistry::new()).unwrap();
        assert_eq!(json, json!([[1], [1]]));
    }

    #[test]
    fn test_to_json_rejects_cycles() {
        let array = Array::new();
        array.push(Value::Array(array.clone()));
        assert!(to_json(&Value::Array(array), &AdaptorRegistry::new()).is_err());
    }
}
