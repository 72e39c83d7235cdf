//! `plugin.GRPCStdio` implementation.
//!
//! `StreamStdio` attaches to the [`LogBridge`] and spawns a dedicated
//! [`pump_frames`] task for the lifetime of the call. Only one call may be
//! attached at a time; a concurrent second call is rejected with
//! `FAILED_PRECONDITION` instead of splitting records between readers.

use crate::server::{
    bridge::LogBridge,
    streaming::pump::{PumpExit, pump_frames},
};
use core::pin::Pin;
use jrplugin_core::proto::plugin::{Empty, StdioData, grpc_stdio_server::GrpcStdio};
use tokio::sync::mpsc;
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

#[derive(Clone)]
pub struct StdioService {
    bridge: LogBridge,
    shutdown: CancellationToken,
    stream_buffer_size: usize,
}

impl StdioService {
    pub fn new(bridge: LogBridge, shutdown: CancellationToken, stream_buffer_size: usize) -> Self {
        Self {
            bridge,
            shutdown,
            stream_buffer_size: stream_buffer_size.max(1),
        }
    }
}

#[tonic::async_trait]
impl GrpcStdio for StdioService {
    type StreamStdioStream = Pin<Box<dyn Stream<Item = Result<StdioData, Status>> + Send>>;

    async fn stream_stdio(
        &self,
        _req: Request<Empty>,
    ) -> Result<Response<Self::StreamStdioStream>, Status> {
        if self.shutdown.is_cancelled() {
            return Err(jrplugin_core::Error::ServiceShutdown.into());
        }

        let reader = self.bridge.attach()?;
        let (resp_tx, resp_rx) = mpsc::channel(self.stream_buffer_size);
        let token = self.shutdown.child_token();

        tokio::spawn(async move {
            match pump_frames(reader, resp_tx, token).await {
                PumpExit::Cancelled => tracing::debug!("Stdio stream cancelled"),
                PumpExit::ReaderDisconnected => tracing::debug!("Stdio reader disconnected"),
                PumpExit::BridgeClosed => tracing::debug!("Log bridge closed"),
            }
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(resp_rx))))
    }
}
