//! Client side of xalrpc: remote proxies over pooled connections.

pub mod pool;
pub mod proxy;
pub mod state;

pub use pool::{ConnectionPool, PoolConfig, PooledConnection};
pub use proxy::{ProxyConfig, RemoteProxy};
pub use state::{ServiceState, SERVICE_STATE};
