//! `plugin.GRPCController` implementation.
//!
//! `Shutdown` records the host's intent to stop the plugin. By default it does
//! nothing else: the process keeps serving until the host closes the
//! transport or sends a signal. With `--honor-shutdown-rpc` the call also
//! cancels the server's shutdown token.

use jrplugin_core::proto::plugin::{Empty, grpc_controller_server::GrpcController};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

#[derive(Clone, Default)]
pub struct ControllerService {
    stop: Option<CancellationToken>,
}

impl ControllerService {
    /// `stop` is cancelled on every `Shutdown` call when present.
    pub const fn new(stop: Option<CancellationToken>) -> Self {
        Self { stop }
    }
}

#[tonic::async_trait]
impl GrpcController for ControllerService {
    async fn shutdown(&self, _req: Request<Empty>) -> Result<Response<Empty>, Status> {
        tracing::info!("Shutting down");

        if let Some(stop) = &self.stop {
            stop.cancel();
        }

        Ok(Response::new(Empty {}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_is_idempotent_and_inert_by_default() {
        let controller = ControllerService::default();
        for _ in 0..2 {
            controller.shutdown(Request::new(Empty {})).await.unwrap();
        }
    }

    #[tokio::test]
    async fn shutdown_cancels_the_token_when_honored() {
        let token = CancellationToken::new();
        let controller = ControllerService::new(Some(token.clone()));

        controller.shutdown(Request::new(Empty {})).await.unwrap();
        assert!(token.is_cancelled());

        controller.shutdown(Request::new(Empty {})).await.unwrap();
        assert!(token.is_cancelled());
    }
}
