use crate::coding::Value;
use crate::protocol::error::{Result, RpcError};
use crate::protocol::exception::{RemoteException, ServiceDropped};
use crate::protocol::requests::{read_id, RequestId};

const RESULT_KEY: &str = "result";
const ERROR_KEY: &str = "error";
const ID_KEY: &str = "id";

/// Answer to a two-way call: `{"result": ..., "id": n, "error": ...}`.
///
/// `error` is null on success and otherwise holds a `RemoteException` or a
/// `RemoteServiceDropped` extension.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: RequestId,
    pub result: Value,
    pub error: Value,
}

impl Response {
    pub fn success(id: RequestId, result: Value) -> Self {
        Response {
            id,
            result,
            error: Value::Null,
        }
    }

    pub fn exception(id: RequestId, exception: RemoteException) -> Self {
        Response {
            id,
            result: Value::Null,
            error: exception.to_value(),
        }
    }

    pub fn service_dropped(id: RequestId, message: impl Into<String>) -> Self {
        Response {
            id,
            result: Value::Null,
            error: ServiceDropped::new(message).to_value(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_null()
    }

    pub fn to_value(&self) -> Value {
        Value::object([
            (RESULT_KEY, self.result.clone()),
            (ID_KEY, Value::from(self.id)),
            (ERROR_KEY, self.error.clone()),
        ])
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| RpcError::InvalidResponse(format!("expected an object, got {}", value.type_label())))?;
        let id = read_id(object)
            .ok_or_else(|| RpcError::InvalidResponse("missing or non-integer id".to_string()))?;

        Ok(Response {
            id,
            result: object.get(RESULT_KEY).unwrap_or_default(),
            error: object.get(ERROR_KEY).unwrap_or_default(),
        })
    }

    /// The result on success, or the remote failure as an error.
    ///
    /// A dropped-connection signal becomes [`RpcError::ServiceDropped`], a
    /// remote exception becomes [`RpcError::RemoteInvocation`]; any other
    /// error payload is wrapped as a remote exception describing it.
    pub fn into_result(self) -> Result<Value> {
        if self.error.is_null() {
            return Ok(self.result);
        }
        if let Some(dropped) = self.error.downcast_extension::<ServiceDropped>() {
            return Err(RpcError::ServiceDropped(dropped.message.clone()));
        }
        if let Some(exception) = self.error.downcast_extension::<RemoteException>() {
            return Err(RpcError::RemoteInvocation(exception.clone()));
        }
        let message = match self.error.as_str() {
            Some(text) => text.to_string(),
            None => format!("{:?}", self.error),
        };
        Err(RpcError::RemoteInvocation(RemoteException::new(message)))
    }
}
