pub mod error;
pub mod exception;
pub mod method;
pub mod requests;
pub mod responses;

#[cfg(test)]
mod tests;

pub use error::{Result, RpcError};
pub use exception::{RemoteException, ServiceDropped, REMOTE_EXCEPTION_TYPE, SERVICE_DROPPED_TYPE};
pub use method::{param, resolve, signature_key, Interface, MethodSpec, ParamKind};
pub use requests::{Request, RequestId, SERVICE_METHOD_DELIMITER};
pub use responses::Response;
