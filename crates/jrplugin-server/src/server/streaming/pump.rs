use crate::server::{bridge::BridgeReader, telemetry::increment_frames_streamed};
use jrplugin_core::proto::plugin::StdioData;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// Why [`pump_frames`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PumpExit {
    /// The server is stopping.
    Cancelled,
    /// The RPC caller went away.
    ReaderDisconnected,
    /// Every bridge sender was dropped.
    BridgeClosed,
}

/// Drains the log bridge into the response channel of one `StreamStdio` call.
///
/// The loop runs until the caller disconnects or `token` is cancelled. Each
/// iteration first reserves room in `resp_tx`, then pulls exactly one record,
/// so a record is only taken off the bridge once it has a slot to go to.
/// Records still queued when the loop exits stay in the bridge for the next
/// reader.
///
/// # Arguments
///
/// - `reader`: Exclusive bridge reader; dropped on return, which detaches it.
/// - `resp_tx`: Channel feeding the gRPC response stream.
/// - `token`: Cancelled when the server stops.
pub async fn pump_frames(
    mut reader: BridgeReader,
    resp_tx: mpsc::Sender<Result<StdioData, Status>>,
    token: CancellationToken,
) -> PumpExit {
    loop {
        let permit = tokio::select! {
            biased;
            () = token.cancelled() => return PumpExit::Cancelled,
            permit = resp_tx.reserve() => match permit {
                Ok(permit) => permit,
                Err(_) => return PumpExit::ReaderDisconnected,
            },
        };

        let frame = tokio::select! {
            biased;
            () = token.cancelled() => return PumpExit::Cancelled,
            () = resp_tx.closed() => return PumpExit::ReaderDisconnected,
            frame = reader.next() => match frame {
                Some(frame) => frame,
                None => return PumpExit::BridgeClosed,
            },
        };

        permit.send(Ok(frame.into()));
        increment_frames_streamed();
    }
}
