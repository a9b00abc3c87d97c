//! Server side of xalrpc.
//!
//! An [`RpcServer`] owns a listening socket and a registry of named
//! services. Each service is an [`Interface`](xalrpc_common::Interface)
//! describing its methods plus a [`ServiceProvider`] that implements them:
//!
//! ```no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use xalrpc_common::protocol::{param, Interface, MethodSpec, ParamKind};
//! use xalrpc_common::{JsonCoder, Value};
//! use xalrpc_server::{RpcServer, ServiceProvider};
//!
//! const ADD: MethodSpec = MethodSpec::new("add", &[ParamKind::Int, ParamKind::Int]);
//! const CALC: Interface = Interface::new("calc", &[ADD]);
//!
//! struct Calc;
//!
//! #[async_trait]
//! impl ServiceProvider for Calc {
//!     async fn invoke(&self, _method: &MethodSpec, params: Vec<Value>) -> anyhow::Result<Value> {
//!         let a: i64 = param(&params, 0)?;
//!         let b: i64 = param(&params, 1)?;
//!         Ok(Value::from(a + b))
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> xalrpc_common::Result<()> {
//! let server = RpcServer::bind("127.0.0.1:9001", Arc::new(JsonCoder::standard())).await?;
//! server.add_handler("calc", CALC, Calc);
//! server.run().await
//! # }
//! ```

pub mod handler;
pub mod server;

pub use handler::{ServiceHandler, ServiceProvider};
pub use server::RpcServer;
