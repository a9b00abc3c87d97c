//! Remote failures carried inside responses.
//!
//! A service that fails is answered with a `RemoteException` extension in the
//! response's `error` field; a service that lost its own downstream
//! connection answers with `RemoteServiceDropped` so the caller can tell the
//! two apart.

use std::fmt;

use crate::coding::{AdaptorRegistry, CodingError, Value};

pub const REMOTE_EXCEPTION_TYPE: &str = "RemoteException";
pub const SERVICE_DROPPED_TYPE: &str = "RemoteServiceDropped";

/// A failure raised by a remote service method.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteException {
    pub message: String,
    /// Messages of the underlying causes, outermost first.
    pub causes: Vec<String>,
}

impl RemoteException {
    pub fn new(message: impl Into<String>) -> Self {
        RemoteException {
            message: message.into(),
            causes: Vec::new(),
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    /// Captures an error and its `source()` chain.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut exception = RemoteException::new(err.to_string());
        let mut source = err.source();
        while let Some(cause) = source {
            exception.causes.push(cause.to_string());
            source = cause.source();
        }
        exception
    }

    pub fn to_value(&self) -> Value {
        Value::extension(REMOTE_EXCEPTION_TYPE, self.clone())
    }
}

impl fmt::Display for RemoteException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for cause in &self.causes {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for RemoteException {}

/// Signal that the answering service lost a connection it depended on.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDropped {
    pub message: String,
}

impl ServiceDropped {
    pub fn new(message: impl Into<String>) -> Self {
        ServiceDropped {
            message: message.into(),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::extension(SERVICE_DROPPED_TYPE, self.clone())
    }
}

/// Adds the remote error types to `registry` as standard types.
pub fn register_standard_types(registry: &mut AdaptorRegistry) {
    registry.register_standard(
        REMOTE_EXCEPTION_TYPE,
        |e: &RemoteException| {
            Value::object([
                ("message", Value::from(e.message.as_str())),
                (
                    "causes",
                    Value::array(e.causes.iter().map(|c| Value::from(c.as_str())).collect()),
                ),
            ])
        },
        |value| {
            let object = value
                .as_object()
                .ok_or_else(|| CodingError::conversion(REMOTE_EXCEPTION_TYPE, "expected an object"))?;
            let message = object
                .get("message")
                .and_then(|m| m.as_str().map(str::to_string))
                .unwrap_or_default();
            let causes = match object.get("causes") {
                Some(Value::Array(items)) => items
                    .read()
                    .iter()
                    .filter_map(|c| c.as_str().map(str::to_string))
                    .collect(),
                _ => Vec::new(),
            };
            Ok(RemoteException { message, causes })
        },
    );
    registry.register_standard(
        SERVICE_DROPPED_TYPE,
        |e: &ServiceDropped| Value::object([("message", Value::from(e.message.as_str()))]),
        |value| {
            let message = value
                .as_object()
                .and_then(|o| o.get("message"))
                .and_then(|m| m.as_str().map(str::to_string))
                .unwrap_or_default();
            Ok(ServiceDropped { message })
        },
    );
}
