use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use xalrpc_common::coding::{CodingError, JsonCoder, Value};
use xalrpc_common::protocol::error::{Result, RpcError};
use xalrpc_common::protocol::{Interface, Request, RequestId, Response};

use crate::pool::{ConnectionPool, PoolConfig, PooledConnection};
use crate::state::{ServiceState, SERVICE_STATE};

/// Configuration for a remote proxy
#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    pub pool: PoolConfig,
    /// Deadline for a response once the request is sent (in milliseconds).
    /// `None` waits until the server answers or the connection drops.
    pub read_timeout_ms: Option<u64>,
}

/// Client-side stand-in for a remote service.
///
/// Every call is encoded as a request, sent over a pooled connection that
/// the call owns until its response arrives, and the response is decoded
/// back into a value or an error. Calls may run concurrently from any
/// number of tasks; each uses its own connection.
///
/// Cloning is cheap and clones share the pool and request counter.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use xalrpc_client::RemoteProxy;
/// use xalrpc_common::{Interface, JsonCoder, Value};
///
/// # #[tokio::main]
/// # async fn main() -> xalrpc_common::Result<()> {
/// let calc = RemoteProxy::new("127.0.0.1", 9001, "calc", Interface::open("calc"), Arc::new(JsonCoder::standard()));
/// let sum: i64 = calc.call("add", vec![Value::from(3), Value::from(4)]).await?;
/// assert_eq!(sum, 7);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RemoteProxy {
    inner: Arc<ProxyInner>,
}

struct ProxyInner {
    host: String,
    port: u16,
    service_name: String,
    interface: Interface,
    coder: Arc<JsonCoder>,
    pool: ConnectionPool,
    read_timeout_ms: Option<u64>,
    next_id: AtomicI64,
}

impl RemoteProxy {
    /// Creates a proxy with the default configuration.
    ///
    /// No connection is opened until the first call.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        service_name: impl Into<String>,
        interface: Interface,
        coder: Arc<JsonCoder>,
    ) -> Self {
        Self::with_config(host, port, service_name, interface, coder, ProxyConfig::default())
    }

    pub fn with_config(
        host: impl Into<String>,
        port: u16,
        service_name: impl Into<String>,
        interface: Interface,
        coder: Arc<JsonCoder>,
        config: ProxyConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ProxyInner {
                host: host.into(),
                port,
                service_name: service_name.into(),
                interface,
                coder,
                pool: ConnectionPool::new(config.pool),
                read_timeout_ms: config.read_timeout_ms,
                next_id: AtomicI64::new(1),
            }),
        }
    }

    pub fn interface(&self) -> &Interface {
        &self.inner.interface
    }

    pub fn coder(&self) -> &Arc<JsonCoder> {
        &self.inner.coder
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.inner.pool
    }

    /// Closes idle connections; connections in use are closed when their
    /// call finishes.
    pub fn dispose(&self) {
        self.dispose_service_resources();
    }

    /// Invokes a method of the remote service.
    ///
    /// Methods the interface declares one-way return `Value::Null` as soon
    /// as the request is written; no response is read. The connection goes
    /// back to the pool. If the server then rejects the request it closes
    /// that connection, which the pool notices before reusing it; a call
    /// racing the close still fails with `ServiceDropped` and may be retried.
    ///
    /// # Arguments
    ///
    /// * `method` - Method name, without the service prefix
    /// * `params` - Positional arguments
    ///
    /// # Errors
    ///
    /// - [`RpcError::ServiceDropped`] when the connection could not be opened
    ///   or broke during the call, or the server reported a dropped downstream
    /// - [`RpcError::RemoteInvocation`] when the method itself failed
    /// - [`RpcError::Timeout`] when a read deadline is configured and passed
    /// - [`RpcError::Coding`] when the arguments cannot be encoded
    pub async fn invoke(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let inner = &self.inner;
        if !inner.interface.declares(method) && SERVICE_STATE.declares(method) {
            return Ok(self.answer_locally(method));
        }

        let one_way = inner
            .interface
            .resolve(method, &params)
            .map_or(false, |spec| spec.one_way);
        self.send(method, params, one_way).await
    }

    /// Sends a call as one-way whatever the interface declares, for methods
    /// of an open interface that the server treats as one-way.
    ///
    /// Pooling follows [`invoke`](Self::invoke) for one-way methods.
    pub async fn notify(&self, method: &str, params: Vec<Value>) -> Result<()> {
        self.send(method, params, true).await.map(|_| ())
    }

    async fn send(&self, method: &str, params: Vec<Value>, one_way: bool) -> Result<Value> {
        let inner = &self.inner;
        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Request::new(id, &inner.service_name, method, params);
        let text = inner.coder.encode(&request.to_value())?;

        let mut conn = inner
            .pool
            .acquire(&inner.host, inner.port)
            .await
            .map_err(RpcError::dropped)?;

        tracing::debug!(
            service = %inner.service_name,
            method = %method,
            id,
            one_way,
            "Sending request"
        );

        let outcome = self.exchange(&mut conn, &text, id, one_way).await;
        inner.pool.release(conn);
        outcome?.into_result()
    }

    /// Invokes a method and converts its result.
    pub async fn call<T>(&self, method: &str, params: Vec<Value>) -> Result<T>
    where
        T: TryFrom<Value, Error = CodingError>,
    {
        let value = self.invoke(method, params).await?;
        Ok(T::try_from(value)?)
    }

    async fn exchange(
        &self,
        conn: &mut PooledConnection,
        text: &str,
        id: RequestId,
        one_way: bool,
    ) -> Result<Response> {
        conn.transport_mut()
            .send_text(text)
            .await
            .map_err(RpcError::dropped)?;
        if one_way {
            return Ok(Response::success(id, Value::Null));
        }

        let received = match self.inner.read_timeout_ms {
            Some(ms) => {
                match tokio::time::timeout(Duration::from_millis(ms), conn.transport_mut().receive_text()).await {
                    Ok(received) => received,
                    Err(_) => {
                        // The abandoned read may have consumed part of a frame
                        conn.mark_broken();
                        return Err(RpcError::Timeout(ms));
                    }
                }
            }
            None => conn.transport_mut().receive_text().await,
        };
        let reply = received.map_err(RpcError::dropped)?;

        let response = self
            .inner
            .coder
            .decode(&reply)
            .map_err(RpcError::from)
            .and_then(|value| Response::from_value(&value));
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                conn.mark_broken();
                return Err(e);
            }
        };
        if response.id != id {
            conn.mark_broken();
            return Err(RpcError::InvalidResponse(format!(
                "expected response {} but received {}",
                id, response.id
            )));
        }
        Ok(response)
    }

    fn answer_locally(&self, method: &str) -> Value {
        match method {
            "service_name" => Value::from(self.service_name()),
            "service_host" => Value::from(self.service_host()),
            "service_port" => Value::from(self.service_port()),
            _ => {
                self.dispose_service_resources();
                Value::Null
            }
        }
    }
}

impl ServiceState for RemoteProxy {
    fn service_name(&self) -> &str {
        &self.inner.service_name
    }

    fn service_host(&self) -> &str {
        &self.inner.host
    }

    fn service_port(&self) -> u16 {
        self.inner.port
    }

    fn dispose_service_resources(&self) {
        tracing::debug!(service = %self.inner.service_name, "Disposing service resources");
        self.inner.pool.close_all();
    }
}

impl std::fmt::Debug for RemoteProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteProxy")
            .field("service", &self.inner.service_name)
            .field("host", &self.inner.host)
            .field("port", &self.inner.port)
            .finish()
    }
}
