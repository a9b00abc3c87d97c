use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use xalrpc_common::transport::{FrameTransport, TransportError};

/// Configuration for the connection pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Idle connections kept per endpoint; extra released connections are closed
    pub max_idle_per_endpoint: usize,
    /// Timeout for establishing a connection, handshake included (in milliseconds)
    pub connect_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_endpoint: 8,
            connect_timeout_ms: 5000,
        }
    }
}

/// A connection checked out of the pool.
///
/// Owned exclusively by one call at a time, so a request and its response are
/// never interleaved with another call's traffic. Dropping it without
/// [`ConnectionPool::release`] closes the socket.
pub struct PooledConnection {
    transport: FrameTransport,
    endpoint: String,
    generation: u64,
    broken: bool,
}

impl PooledConnection {
    pub fn transport_mut(&mut self) -> &mut FrameTransport {
        &mut self.transport
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Marks the connection unusable, e.g. after a read was abandoned midway.
    /// Broken connections are closed on release instead of being reused.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn is_reusable(&self) -> bool {
        !self.broken && !self.transport.is_closed()
    }
}

struct PoolInner {
    idle: HashMap<String, Vec<FrameTransport>>,
    generation: u64,
}

/// Idle connections per `host:port` endpoint.
///
/// Connections are reused LIFO. [`close_all`](Self::close_all) drops every
/// idle connection and retires those currently checked out, so they are
/// closed when released; later acquisitions open fresh connections.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<Mutex<PoolInner>>,
    config: PoolConfig,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PoolInner {
                idle: HashMap::new(),
                generation: 0,
            })),
            config,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Takes an idle connection to the endpoint or opens a new one.
    ///
    /// Idle connections the server has closed in the meantime are detected
    /// without waiting and discarded.
    ///
    /// # Errors
    ///
    /// Returns the transport error of a failed connect or handshake.
    pub async fn acquire(&self, host: &str, port: u16) -> Result<PooledConnection, TransportError> {
        let endpoint = format!("{}:{}", host, port);

        // The lock is never held across the idle check or a connect
        let mut reused = None;
        let mut generation;
        loop {
            let candidate = {
                let mut inner = self.inner.lock();
                generation = inner.generation;
                inner.idle.get_mut(&endpoint).and_then(Vec::pop)
            };
            let Some(mut transport) = candidate else {
                break;
            };
            if transport.check_idle().await {
                reused = Some(transport);
                break;
            }
            tracing::debug!(endpoint = %endpoint, "Discarding closed connection from pool");
        }

        let transport = match reused {
            Some(transport) => transport,
            None => {
                let timeout = Duration::from_millis(self.config.connect_timeout_ms);
                FrameTransport::connect(host, port, timeout).await?
            }
        };

        Ok(PooledConnection {
            transport,
            endpoint,
            generation,
            broken: false,
        })
    }

    /// Returns a connection to the pool.
    ///
    /// Broken or closed connections, connections retired by
    /// [`close_all`](Self::close_all) and connections beyond the idle limit
    /// are dropped, which closes their socket.
    pub fn release(&self, conn: PooledConnection) {
        if !conn.is_reusable() {
            tracing::debug!(endpoint = %conn.endpoint, "Dropping unusable connection");
            return;
        }

        let mut inner = self.inner.lock();
        if conn.generation != inner.generation {
            return;
        }
        let idle = inner.idle.entry(conn.endpoint).or_default();
        if idle.len() < self.config.max_idle_per_endpoint {
            idle.push(conn.transport);
        }
    }

    /// Number of idle connections held for an endpoint.
    pub fn idle_count(&self, host: &str, port: u16) -> usize {
        let endpoint = format!("{}:{}", host, port);
        self.inner.lock().idle.get(&endpoint).map_or(0, Vec::len)
    }

    /// Closes every idle connection and retires checked-out ones.
    pub fn close_all(&self) {
        let drained: Vec<FrameTransport> = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            inner.idle.drain().flat_map(|(_, conns)| conns).collect()
        };
        tracing::debug!(count = drained.len(), "Closing pooled connections");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Accepts connections forever, completing the handshake and then
    /// holding each one open until the peer goes away.
    async fn spawn_endpoint() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => return,
                };
                tokio::spawn(async move {
                    if let Ok(mut transport) = FrameTransport::accept(stream).await {
                        while transport.receive_text().await.is_ok() {}
                    }
                });
            }
        });
        port
    }

    #[test]
    fn test_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.max_idle_per_endpoint, 8);
        assert_eq!(config.connect_timeout_ms, 5000);
    }

    #[tokio::test]
    async fn test_acquire_unreachable_endpoint_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let pool = ConnectionPool::new(PoolConfig::default());
        let err = pool.acquire("127.0.0.1", port).await.err().unwrap();
        assert!(err.is_connection_dropped());
    }

    #[tokio::test]
    async fn test_released_connection_is_reused() {
        let port = spawn_endpoint().await;
        let pool = ConnectionPool::new(PoolConfig::default());

        let conn = pool.acquire("127.0.0.1", port).await.unwrap();
        assert_eq!(conn.endpoint(), format!("127.0.0.1:{}", port));
        pool.release(conn);
        assert_eq!(pool.idle_count("127.0.0.1", port), 1);

        let again = pool.acquire("127.0.0.1", port).await.unwrap();
        assert!(again.is_reusable());
        assert_eq!(pool.idle_count("127.0.0.1", port), 0);
    }

    #[tokio::test]
    async fn test_broken_connection_not_pooled() {
        let port = spawn_endpoint().await;
        let pool = ConnectionPool::new(PoolConfig::default());

        let mut conn = pool.acquire("127.0.0.1", port).await.unwrap();
        conn.mark_broken();
        pool.release(conn);
        assert_eq!(pool.idle_count("127.0.0.1", port), 0);
    }

    #[tokio::test]
    async fn test_idle_connection_closed_by_server_is_replaced() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            // First connection is closed straight after the handshake
            let (stream, _) = listener.accept().await.unwrap();
            let mut first = FrameTransport::accept(stream).await.unwrap();
            first.close().await;
            let (stream, _) = listener.accept().await.unwrap();
            let mut second = FrameTransport::accept(stream).await.unwrap();
            while second.receive_text().await.is_ok() {}
        });
        let pool = ConnectionPool::new(PoolConfig::default());

        let conn = pool.acquire("127.0.0.1", port).await.unwrap();
        pool.release(conn);
        assert_eq!(pool.idle_count("127.0.0.1", port), 1);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut fresh = pool.acquire("127.0.0.1", port).await.unwrap();
        assert_eq!(pool.idle_count("127.0.0.1", port), 0);
        assert!(fresh.transport_mut().check_idle().await);
        assert!(fresh.is_reusable());
    }

    #[tokio::test]
    async fn test_idle_limit() {
        let port = spawn_endpoint().await;
        let pool = ConnectionPool::new(PoolConfig {
            max_idle_per_endpoint: 1,
            connect_timeout_ms: 1000,
        });

        let a = pool.acquire("127.0.0.1", port).await.unwrap();
        let b = pool.acquire("127.0.0.1", port).await.unwrap();
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.idle_count("127.0.0.1", port), 1);
    }

    #[tokio::test]
    async fn test_close_all_retires_checked_out_connections() {
        let port = spawn_endpoint().await;
        let pool = ConnectionPool::new(PoolConfig::default());

        let idle = pool.acquire("127.0.0.1", port).await.unwrap();
        let busy = pool.acquire("127.0.0.1", port).await.unwrap();
        pool.release(idle);

        pool.close_all();
        assert_eq!(pool.idle_count("127.0.0.1", port), 0);

        pool.release(busy);
        assert_eq!(pool.idle_count("127.0.0.1", port), 0);

        // Still usable afterwards
        let fresh = pool.acquire("127.0.0.1", port).await.unwrap();
        pool.release(fresh);
        assert_eq!(pool.idle_count("127.0.0.1", port), 1);
    }
}
