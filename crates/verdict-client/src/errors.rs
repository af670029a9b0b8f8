//! Client error kinds.
//!
//! Connection-class errors ([`ClientError::is_retriable`]) make the
//! client re-pick a balancer target; everything else surfaces to the
//! caller immediately.

use thiserror::Error;
use verdict_core::wire::WireError;

/// Error returned by client operations.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Connect was called while a connection is already established.
    #[error("connection has been already established")]
    AlreadyConnected,

    /// No connection is established or the client has been closed.
    #[error("no connection")]
    NotConnected,

    /// The underlying TCP connection failed.
    #[error("connection failure")]
    ConnFailure,

    /// The stream dropped an in-flight request.
    #[error("stream failure")]
    StreamFailure,

    /// The connection was not in a usable state for the call.
    #[error("connection is in the wrong state")]
    WrongConnState,

    /// The stream state changed while waiting for a request slot.
    #[error("stream is in the wrong state")]
    WrongStreamState,

    /// The server reply could not be decoded.
    #[error("server error: {status}")]
    ResponseServerError {
        /// Rendered server-side status or decode failure.
        status: String,
    },

    /// The request could not be marshaled.
    #[error("request marshaling failed: {0}")]
    Request(#[from] WireError),
}

impl ClientError {
    /// Whether the error warrants re-picking a balancer target.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::ConnFailure | Self::StreamFailure | Self::WrongConnState | Self::WrongStreamState
        )
    }
}
