use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use xalrpc_common::coding::Value;
use xalrpc_common::protocol::error::{Result, RpcError};
use xalrpc_common::protocol::{signature_key, Interface, MethodSpec, RemoteException, RequestId, Response};

/// Implementation behind a registered service.
///
/// `method` is the declaration the dispatcher resolved for the call, so
/// overloads sharing a name can be told apart by comparing against the
/// interface's `MethodSpec` constants.
#[async_trait]
pub trait ServiceProvider: Send + Sync + 'static {
    async fn invoke(&self, method: &MethodSpec, params: Vec<Value>) -> anyhow::Result<Value>;
}

/// A registered service: its interface, provider and resolved-method cache.
pub struct ServiceHandler {
    name: String,
    interface: Interface,
    provider: Arc<dyn ServiceProvider>,
    /// Call shape (see [`signature_key`]) to resolved method. Only hits are
    /// kept, since the shapes of failed calls are chosen by the client.
    resolved: DashMap<String, &'static MethodSpec>,
}

impl ServiceHandler {
    pub fn new(name: impl Into<String>, interface: Interface, provider: Arc<dyn ServiceProvider>) -> Self {
        Self {
            name: name.into(),
            interface,
            provider,
            resolved: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interface(&self) -> &Interface {
        &self.interface
    }

    /// Best matching method for a call, cached per call shape.
    pub fn resolve(&self, method: &str, params: &[Value]) -> Option<&'static MethodSpec> {
        let key = signature_key(method, params);
        if let Some(hit) = self.resolved.get(&key) {
            return Some(*hit);
        }
        let spec = self.interface.resolve(method, params)?;
        self.resolved.insert(key, spec);
        Some(spec)
    }

    pub fn cached_signatures(&self) -> usize {
        self.resolved.len()
    }

    /// Resolves and runs one call.
    ///
    /// Returns the response to send, or `None` for a one-way method. One-way
    /// invocations are detached so the connection can move on to its next
    /// request straight away.
    ///
    /// # Errors
    ///
    /// `RpcError::Dispatch` when no declared method accepts the arguments.
    /// Failures of the provider itself are reported inside the response.
    pub async fn dispatch(&self, id: RequestId, method: &str, params: Vec<Value>) -> Result<Option<Response>> {
        let spec = self.resolve(method, &params).ok_or_else(|| {
            RpcError::Dispatch(format!(
                "no method of {} accepts {}",
                self.name,
                signature_key(method, &params)
            ))
        })?;

        let provider = self.provider.clone();
        let task = tokio::spawn(async move { provider.invoke(spec, params).await });

        if spec.one_way {
            let service = self.name.clone();
            tokio::spawn(async move {
                if let Some(failure) = failure_of(task.await) {
                    tracing::warn!(service = %service, method = spec.name, error = %failure, "One-way call failed");
                }
            });
            return Ok(None);
        }

        let response = match task.await {
            Ok(Ok(value)) => Response::success(id, value),
            Ok(Err(err)) => failure_response(id, &err),
            Err(join_err) => Response::exception(id, panic_exception(join_err)),
        };
        Ok(Some(response))
    }
}

/// The dropped-connection signal when the provider's failure is a dropped
/// downstream service, a remote exception describing it otherwise.
fn failure_response(id: RequestId, err: &anyhow::Error) -> Response {
    let dropped = err.chain().find_map(|cause| match cause.downcast_ref::<RpcError>() {
        Some(RpcError::ServiceDropped(message)) => Some(message.clone()),
        _ => None,
    });
    match dropped {
        Some(message) => Response::service_dropped(id, message),
        None => {
            let root: &(dyn std::error::Error + 'static) = err.as_ref();
            Response::exception(id, RemoteException::from_error(root))
        }
    }
}

fn failure_of(outcome: std::result::Result<anyhow::Result<Value>, tokio::task::JoinError>) -> Option<String> {
    match outcome {
        Ok(Ok(_)) => None,
        Ok(Err(err)) => Some(format!("{:#}", err)),
        Err(join_err) => Some(panic_exception(join_err).to_string()),
    }
}

fn panic_exception(err: tokio::task::JoinError) -> RemoteException {
    if !err.is_panic() {
        return RemoteException::new("service invocation was cancelled");
    }
    let payload: Box<dyn Any + Send> = err.into_panic();
    let detail = if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    };
    RemoteException::new("service panicked").with_cause(detail)
}
