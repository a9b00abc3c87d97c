use std::convert::Infallible;

use thiserror::Error;

use crate::coding::CodingError;
use crate::protocol::exception::RemoteException;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Coding error: {0}")]
    Coding(#[from] CodingError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Remote invocation failed: {0}")]
    RemoteInvocation(RemoteException),

    #[error("Remote service dropped: {0}")]
    ServiceDropped(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RpcError {
    /// Only a dropped connection is worth retrying; every other failure
    /// would repeat identically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RpcError::ServiceDropped(_))
    }

    pub fn is_service_dropped(&self) -> bool {
        matches!(self, RpcError::ServiceDropped(_))
    }

    /// Folds every transport-level failure into `ServiceDropped`, the way a
    /// caller of a remote service sees them.
    pub fn dropped(err: TransportError) -> Self {
        RpcError::ServiceDropped(err.to_string())
    }
}

impl From<Infallible> for RpcError {
    fn from(err: Infallible) -> Self {
        match err {}
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
