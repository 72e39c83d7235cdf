//! Error types for the plugin RPC services.
//!
//! This module defines the central `Error` enum for every failure that is
//! local to a single call. It implements `From<Error>` for `tonic::Status` so
//! handlers can propagate with `?` and the host receives a structured gRPC
//! error with an appropriate code.
//!
//! ## Error Cases
//! - `ChannelError`: An internal communication failure between the handler
//!   and the worker pool.
//! - `Internal`: The injected work service failed or panicked.
//! - `AlreadyStreaming`: A second reader tried to attach to the stdio stream.
//! - `ServiceShutdown`: A request arrived while the server was stopping.
//!
//! Startup failures (bind, handshake, configuration) are process fatal and are
//! reported through `anyhow` by the binary instead.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified per-call error type for the plugin services.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// Internal channel send/receive failure (e.g., a worker went away).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The work service returned an error or panicked.
    #[error("Internal error: {cause}")]
    Internal { cause: String },

    /// The stdio stream already has an attached reader.
    #[error("Stdio stream already has an active reader")]
    AlreadyStreaming,

    /// The server is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    /// Wraps any displayable failure as [`Error::Internal`].
    pub fn internal(cause: impl core::fmt::Display) -> Self {
        Self::Internal {
            cause: cause.to_string(),
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::ChannelError { context } => {
                Status::internal(format!("Channel error: {}", context))
            }
            Error::Internal { cause } => Status::internal(cause),
            Error::AlreadyStreaming => {
                Status::failed_precondition("StreamStdio may only be consumed by one reader")
            }
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn maps_each_variant_to_a_grpc_code() {
        let cases = [
            (
                Error::ChannelError {
                    context: "worker gone".into(),
                },
                Code::Internal,
            ),
            (Error::internal("disk full"), Code::Internal),
            (Error::AlreadyStreaming, Code::FailedPrecondition),
            (Error::ServiceShutdown, Code::Unavailable),
        ];

        for (err, code) in cases {
            assert_eq!(Status::from(err).code(), code);
        }
    }

    #[test]
    fn internal_status_carries_the_cause() {
        let status = Status::from(Error::internal("disk full"));
        assert_eq!(status.message(), "disk full");
    }
}
