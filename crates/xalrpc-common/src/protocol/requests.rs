use crate::coding::{Object, Value};
use crate::protocol::error::{Result, RpcError};

pub type RequestId = i64;

/// Separates the service name from the method name in a request message.
pub const SERVICE_METHOD_DELIMITER: char = '#';

const MESSAGE_KEY: &str = "message";
const PARAMS_KEY: &str = "params";
const ID_KEY: &str = "id";

/// A method call: `{"message": "service#method", "params": [...], "id": n}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub message: String,
    pub params: Vec<Value>,
}

impl Request {
    pub fn new(id: RequestId, service: &str, method: &str, params: Vec<Value>) -> Self {
        Request {
            id,
            message: format!("{}{}{}", service, SERVICE_METHOD_DELIMITER, method),
            params,
        }
    }

    /// Splits the message at the first delimiter.
    pub fn service_and_method(&self) -> Result<(&str, &str)> {
        self.message
            .split_once(SERVICE_METHOD_DELIMITER)
            .ok_or_else(|| RpcError::InvalidRequest(format!("malformed message '{}'", self.message)))
    }

    pub fn to_value(&self) -> Value {
        Value::object([
            (MESSAGE_KEY, Value::from(self.message.as_str())),
            (PARAMS_KEY, Value::array(self.params.clone())),
            (ID_KEY, Value::from(self.id)),
        ])
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| RpcError::InvalidRequest(format!("expected an object, got {}", value.type_label())))?;

        let message = match object.get(MESSAGE_KEY) {
            Some(Value::String(s)) => s.to_string(),
            _ => return Err(RpcError::InvalidRequest("missing message".to_string())),
        };
        let params = match object.get(PARAMS_KEY) {
            Some(Value::Array(items)) => items.to_vec(),
            Some(Value::TypedArray(typed)) => typed.items().to_vec(),
            None | Some(Value::Null) => Vec::new(),
            Some(other) => {
                return Err(RpcError::InvalidRequest(format!(
                    "params must be an array, got {}",
                    other.type_label()
                )))
            }
        };
        let id = read_id(object)
            .ok_or_else(|| RpcError::InvalidRequest("missing or non-integer id".to_string()))?;

        Ok(Request { id, message, params })
    }
}

pub(crate) fn read_id(object: &Object) -> Option<RequestId> {
    object
        .get(ID_KEY)
        .and_then(|v| v.as_number())
        .and_then(|n| n.to_exact_i64())
}
