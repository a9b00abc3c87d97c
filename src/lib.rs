//! # xalrpc
//!
//! Remote procedure calls carried as JSON text over WebSocket-style frames.
//!
//! Arguments and results are arbitrary object graphs: values reachable
//! through several paths, or through themselves, arrive with the same shape
//! they were sent with. Types the JSON model cannot express are carried as
//! registered extension types.
//!
//! ## Crates
//!
//! - [`common`]: the message codec, request and response model, and frame
//!   transport
//! - [`client`]: [`RemoteProxy`] and its connection pool
//! - [`server`]: [`RpcServer`] and the service provider trait
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use xalrpc::{Interface, JsonCoder, RemoteProxy, Value};
//!
//! # #[tokio::main]
//! # async fn main() -> xalrpc::Result<()> {
//! let coder = Arc::new(JsonCoder::standard());
//! let calc = RemoteProxy::new("127.0.0.1", 9001, "calc", Interface::open("calc"), coder);
//! let sum: i64 = calc.call("add", vec![Value::from(3), Value::from(4)]).await?;
//! # Ok(())
//! # }
//! ```

pub use xalrpc_client as client;
pub use xalrpc_common as common;
pub use xalrpc_server as server;

pub use xalrpc_client::{ProxyConfig, RemoteProxy, ServiceState};
pub use xalrpc_common::protocol::{Interface, MethodSpec, ParamKind, RemoteException};
pub use xalrpc_common::{JsonCoder, Result, RpcError, Value};
pub use xalrpc_server::{RpcServer, ServiceProvider};
