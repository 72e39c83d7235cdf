use crate::server::{pool::request::WorkRequest, work::WorkService};
use core::any::Any;
use jrplugin_core::{
    Error,
    types::{WorkAck, WorkUnit},
};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

/// Worker task processing [`WorkRequest`] messages.
///
/// All workers pull from the same queue, so at most `num_workers` units are
/// in flight at any time. Each unit runs on Tokio's blocking pool because the
/// injected [`WorkService`] is synchronous and may block.
///
/// # Request Types
///
/// - [`WorkRequest::Handle`] - Runs the service and replies with the ack or an
///   [`Error::Internal`].
/// - [`WorkRequest::Shutdown`] - Acknowledges and exits the loop.
pub async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<WorkRequest>>>,
    service: Arc<dyn WorkService>,
) {
    tracing::trace!("Worker {worker_id} started");

    loop {
        // Hold the lock only while waiting for the next request.
        let Some(work) = rx.lock().await.recv().await else {
            break;
        };

        match work {
            WorkRequest::Handle { unit, response } => {
                let result = run_unit(&service, unit).await;
                if response.send(result).is_err() {
                    tracing::debug!("Worker {worker_id} finished a unit nobody waits for");
                }
            }
            WorkRequest::Shutdown { response } => {
                tracing::debug!("Worker {worker_id} received shutdown signal");

                if response.send(()).is_err() {
                    tracing::error!("Worker {worker_id} failed to acknowledge shutdown");
                }
                break;
            }
        }
    }

    tracing::trace!("Worker {worker_id} stopped");
}

/// Runs `service` on `unit`, turning errors and panics into
/// [`Error::Internal`].
pub async fn run_unit(service: &Arc<dyn WorkService>, unit: WorkUnit) -> Result<WorkAck, Error> {
    let service = Arc::clone(service);
    match tokio::task::spawn_blocking(move || service.handle(unit)).await {
        Ok(Ok(ack)) => Ok(ack),
        Ok(Err(e)) => Err(Error::internal(e)),
        Err(e) if e.is_panic() => Err(Error::internal(format!(
            "work service panicked: {}",
            panic_message(e.into_panic().as_ref())
        ))),
        Err(e) => Err(Error::internal(e)),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}
