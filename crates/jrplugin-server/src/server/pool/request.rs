use jrplugin_core::{
    Error,
    types::{WorkAck, WorkUnit},
};
use tokio::sync::oneshot;

/// A message sent from the worker pool to its worker tasks.
///
/// [`WorkRequest`]s travel over one bounded queue shared by every worker; the
/// first idle worker takes the next request.
#[derive(Debug)]
pub enum WorkRequest {
    /// Run the work service on `unit` and send the outcome to `response`.
    Handle {
        unit: WorkUnit,
        response: oneshot::Sender<Result<WorkAck, Error>>,
    },

    /// Stop the receiving worker.
    ///
    /// - `response`: One-shot channel acknowledging that the worker exited its
    ///   loop.
    Shutdown { response: oneshot::Sender<()> },
}
