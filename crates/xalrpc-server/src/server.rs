use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use xalrpc_common::coding::JsonCoder;
use xalrpc_common::protocol::error::{Result, RpcError};
use xalrpc_common::protocol::{Interface, RemoteException, Request, Response};
use xalrpc_common::transport::FrameTransport;

use crate::handler::{ServiceHandler, ServiceProvider};

/// Time allowed for a new connection to complete its upgrade handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Hosts services on one listening socket.
///
/// Each accepted connection gets its own task that reads requests one at a
/// time, dispatches them to the registered handler and writes the response
/// back before reading the next. Connections are served concurrently.
///
/// Handlers may be added and removed while the server runs. Cloning is cheap
/// and clones control the same server.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use xalrpc_common::JsonCoder;
/// use xalrpc_server::RpcServer;
///
/// # #[tokio::main]
/// # async fn main() -> xalrpc_common::Result<()> {
/// let server = RpcServer::bind("127.0.0.1:0", Arc::new(JsonCoder::standard())).await?;
/// println!("listening on {}", server.local_addr());
/// server.run().await
/// # }
/// ```
#[derive(Clone)]
pub struct RpcServer {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    coder: Arc<JsonCoder>,
    handlers: DashMap<String, Arc<ServiceHandler>>,
    listener: Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    connections: AtomicUsize,
}

impl RpcServer {
    /// Binds the listening socket. Connections are accepted once
    /// [`run`](Self::run) or [`start`](Self::start) is called.
    pub async fn bind(addr: &str, coder: Arc<JsonCoder>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RpcError::Io(std::io::Error::new(e.kind(), format!("failed to bind to {}: {}", addr, e))))?;
        let local_addr = listener.local_addr()?;
        let (shutdown, _) = watch::channel(false);

        tracing::info!(addr = %local_addr, "Listening");

        Ok(Self {
            inner: Arc::new(ServerInner {
                coder,
                handlers: DashMap::new(),
                listener: Mutex::new(Some(listener)),
                local_addr,
                shutdown,
                connections: AtomicUsize::new(0),
            }),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    pub fn coder(&self) -> &Arc<JsonCoder> {
        &self.inner.coder
    }

    /// Registers a service under `name`, replacing any previous one.
    pub fn add_handler<P>(&self, name: &str, interface: Interface, provider: P)
    where
        P: ServiceProvider,
    {
        self.add_shared_handler(name, interface, Arc::new(provider));
    }

    pub fn add_shared_handler(&self, name: &str, interface: Interface, provider: Arc<dyn ServiceProvider>) {
        let handler = Arc::new(ServiceHandler::new(name, interface, provider));
        if self.inner.handlers.insert(name.to_string(), handler).is_some() {
            tracing::info!(service = %name, "Replaced service handler");
        } else {
            tracing::info!(service = %name, "Registered service handler");
        }
    }

    /// Unregisters a service. Calls already dispatched to it complete.
    pub fn remove_handler(&self, name: &str) -> bool {
        self.inner.handlers.remove(name).is_some()
    }

    /// Names of the registered services, sorted.
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.handlers.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of connections currently being served.
    pub fn connection_count(&self) -> usize {
        self.inner.connections.load(Ordering::SeqCst)
    }

    /// Runs the accept loop in a background task.
    pub fn start(&self) -> JoinHandle<Result<()>> {
        let server = self.clone();
        tokio::spawn(async move { server.run().await })
    }

    /// Accepts connections until [`shutdown`](Self::shutdown) is called.
    ///
    /// On shutdown the listener is closed and every connection task is
    /// aborted, which drops its socket.
    ///
    /// # Errors
    ///
    /// Fails if the server is already running or was shut down.
    pub async fn run(&self) -> Result<()> {
        let listener = self
            .inner
            .listener
            .lock()
            .await
            .take()
            .ok_or_else(|| RpcError::InvalidRequest("server is already running or shut down".to_string()))?;
        let mut shutdown = self.inner.shutdown.subscribe();
        let mut connections = JoinSet::new();

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        tracing::debug!(peer = %peer_addr, "Connection accepted");
                        let inner = self.inner.clone();
                        connections.spawn(async move {
                            let _guard = ConnectionGuard::new(&inner.connections);
                            serve_connection(&inner, stream, peer_addr).await;
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                    }
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = shutdown.changed() => {}
            }
        }

        drop(listener);
        connections.shutdown().await;
        tracing::info!(addr = %self.inner.local_addr, "Server stopped");
        Ok(())
    }

    /// Stops the accept loop and drops every open connection.
    pub fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
    }
}

/// Keeps the open connection count while a connection task is alive,
/// including when it is aborted.
struct ConnectionGuard<'a> {
    count: &'a AtomicUsize,
}

impl<'a> ConnectionGuard<'a> {
    fn new(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self { count }
    }
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn serve_connection(inner: &ServerInner, stream: TcpStream, peer_addr: SocketAddr) {
    let mut transport = match tokio::time::timeout(HANDSHAKE_TIMEOUT, FrameTransport::accept(stream)).await {
        Ok(Ok(transport)) => transport,
        Ok(Err(e)) => {
            tracing::warn!(peer = %peer_addr, error = %e, "Handshake failed");
            return;
        }
        Err(_) => {
            tracing::warn!(peer = %peer_addr, "Handshake timed out");
            return;
        }
    };

    loop {
        let text = match transport.receive_text().await {
            Ok(text) => text,
            Err(e) if e.is_connection_dropped() => {
                tracing::debug!(peer = %peer_addr, "Connection closed by peer");
                return;
            }
            Err(e) => {
                tracing::warn!(peer = %peer_addr, error = %e, "Dropping connection");
                return;
            }
        };

        match process(inner, &text).await {
            Ok(Some(reply)) => {
                if let Err(e) = transport.send_text(&reply).await {
                    tracing::warn!(peer = %peer_addr, error = %e, "Failed to send response");
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => {
                // Undecodable or undispatchable requests end the connection
                tracing::warn!(peer = %peer_addr, error = %e, "Closing connection");
                transport.close().await;
                return;
            }
        }
    }
}

/// Decodes, dispatches and encodes one request; `None` for one-way calls.
async fn process(inner: &ServerInner, text: &str) -> Result<Option<String>> {
    let request = Request::from_value(&inner.coder.decode(text)?)?;
    let (service, method) = request.service_and_method()?;
    tracing::debug!(id = request.id, service = %service, method = %method, "Dispatching request");

    // Clone out of the map so no registry lock is held across the call
    let handler = inner
        .handlers
        .get(service)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| RpcError::Dispatch(format!("no service named {}", service)))?;

    let method = method.to_string();
    let response = match handler.dispatch(request.id, &method, request.params).await? {
        Some(response) => response,
        None => return Ok(None),
    };
    Ok(Some(encode_response(&inner.coder, response)?))
}

/// Encodes a response; a result that cannot be encoded is answered with a
/// remote exception instead.
fn encode_response(coder: &JsonCoder, response: Response) -> Result<String> {
    match coder.encode(&response.to_value()) {
        Ok(text) => Ok(text),
        Err(e) => {
            let exception = RemoteException::new("failed to encode response").with_cause(e.to_string());
            let fallback = Response::exception(response.id, exception);
            Ok(coder.encode(&fallback.to_value())?)
        }
    }
}
