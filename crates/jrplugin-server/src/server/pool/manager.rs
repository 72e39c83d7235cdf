//! Bounded worker pool for unary work calls.
//!
//! This module defines the [`WorkerPool`] struct, which owns a fixed number of
//! worker tasks fed by one bounded queue. Handlers call
//! [`WorkerPool::dispatch`] and await the reply; the pool caps how many units
//! run at once and supports graceful, time-bounded shutdown via a shared
//! [`CancellationToken`].

use crate::server::{
    pool::{request::WorkRequest, worker::worker_loop},
    telemetry::{decrement_unary_inflight, increment_unary_inflight},
    work::WorkService,
};
use core::time::Duration;
use jrplugin_core::{
    Error,
    types::{WorkAck, WorkUnit},
};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tokio::{
    sync::{Mutex, mpsc, oneshot},
    time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;

/// A cooperative pool of asynchronous workers that process [`WorkRequest`]s.
pub struct WorkerPool {
    tx: mpsc::Sender<WorkRequest>,
    num_workers: usize,
    inflight: Arc<AtomicUsize>,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

/// Keeps the in-flight counter honest even when the caller is dropped
/// mid-call.
struct InflightGuard(Arc<AtomicUsize>);

impl InflightGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        increment_unary_inflight();
        Self(Arc::clone(counter))
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
        decrement_unary_inflight();
    }
}

impl WorkerPool {
    /// Spawns `num_workers` worker tasks sharing `service`.
    ///
    /// The queue holds at most `num_workers` pending requests; further callers
    /// wait in [`dispatch`](Self::dispatch) until a slot frees up.
    pub fn spawn(
        num_workers: usize,
        service: Arc<dyn WorkService>,
        shutdown_timeout: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel(num_workers.max(1));
        let rx = Arc::new(Mutex::new(rx));

        for worker_id in 0..num_workers {
            tokio::spawn(worker_loop(
                worker_id,
                Arc::clone(&rx),
                Arc::clone(&service),
            ));
        }

        Self {
            tx,
            num_workers,
            inflight: Arc::new(AtomicUsize::new(0)),
            shutdown_token: CancellationToken::new(),
            shutdown_timeout,
        }
    }

    /// Number of units currently dispatched and not yet answered.
    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    /// Runs `unit` on the next free worker and waits for its reply.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The pool is shutting down (`shutdown_token` was cancelled).
    /// - The worker queue or reply channel closed unexpectedly.
    /// - The work service failed ([`Error::Internal`]).
    pub async fn dispatch(&self, unit: WorkUnit) -> Result<WorkAck, Error> {
        if self.shutdown_token.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }

        let _inflight = InflightGuard::new(&self.inflight);
        let (response, reply) = oneshot::channel();

        self.tx
            .send(WorkRequest::Handle { unit, response })
            .await
            .map_err(|_| Error::ChannelError {
                context: "work queue closed".to_string(),
            })?;

        reply.await.map_err(|_| Error::ChannelError {
            context: "worker dropped the reply".to_string(),
        })?
    }

    /// Gracefully shuts down all workers in the pool.
    ///
    /// - Refuses new units.
    /// - Waits up to `shutdown_timeout` for in-flight units to finish.
    /// - Sends a [`WorkRequest::Shutdown`] per worker and waits (up to 3
    ///   seconds each) for the acknowledgements.
    pub async fn shutdown(&self) -> Result<(), Error> {
        // === Phase 0: Stop accepting new requests ===
        tracing::info!("Refusing new work");
        self.shutdown_token.cancel();

        // === Phase 1: Wait for in-flight units to drain ===
        tracing::info!("Draining in-flight work ({} active)", self.inflight());
        let drain_result = timeout(self.shutdown_timeout, async {
            while self.inflight() > 0 {
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await;

        match drain_result {
            Ok(()) => {
                tracing::debug!("All in-flight work drained successfully");
            }
            Err(_) => {
                tracing::warn!(
                    "Graceful drain timed out ({} units still active)",
                    self.inflight()
                );
            }
        }

        // === Phase 2: Notify workers to shut down ===
        tracing::debug!("Notifying all workers to shut down");
        let mut shutdown_handles = Vec::with_capacity(self.num_workers);

        for i in 0..self.num_workers {
            let (tx, rx) = oneshot::channel();
            match timeout(
                self.shutdown_timeout,
                self.tx.send(WorkRequest::Shutdown { response: tx }),
            )
            .await
            {
                Ok(Ok(())) => shutdown_handles.push((i, rx)),
                Ok(Err(e)) => {
                    tracing::error!("Failed to send shutdown to worker {i}: {e}");
                }
                Err(_) => {
                    tracing::warn!("Timed out queueing shutdown for worker {i}");
                }
            }
        }

        let timeout_futures = shutdown_handles.into_iter().map(|(i, rx)| async move {
            match timeout(Duration::from_secs(3), rx).await {
                Ok(Ok(())) => {
                    tracing::trace!("Worker shutdown {i} acknowledged");
                }
                Ok(Err(e)) => {
                    tracing::error!("Worker shutdown {i} returned error: {e}");
                }
                Err(_) => {
                    tracing::warn!("Worker shutdown {i} timed out");
                }
            }
        });

        futures::future::join_all(timeout_futures).await;

        tracing::info!("Worker pool shutdown complete");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tower::BoxError;

    fn unit(value: &'static [u8]) -> WorkUnit {
        WorkUnit {
            key: Bytes::from_static(b"k1"),
            value: Bytes::from_static(value),
            ..Default::default()
        }
    }

    fn counting() -> Arc<dyn WorkService> {
        Arc::new(|unit: WorkUnit| -> Result<WorkAck, BoxError> {
            Ok(WorkAck::new(unit.value.len() as u64, "ok"))
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn dispatch_returns_the_service_ack() {
        let pool = WorkerPool::spawn(2, counting(), Duration::from_secs(1));
        let ack = pool.dispatch(unit(b"hello")).await.unwrap();
        assert_eq!(ack.bytes_processed, 5);
        assert_eq!(pool.inflight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn service_errors_become_internal_errors() {
        let failing: Arc<dyn WorkService> =
            Arc::new(|_: WorkUnit| -> Result<WorkAck, BoxError> { Err("disk full".into()) });
        let pool = WorkerPool::spawn(1, failing, Duration::from_secs(1));

        let err = pool.dispatch(unit(b"x")).await.unwrap_err();
        assert_eq!(err, Error::internal("disk full"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn panics_are_contained_and_the_pool_keeps_serving() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let flaky: Arc<dyn WorkService> =
            Arc::new(move |unit: WorkUnit| -> Result<WorkAck, BoxError> {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first call explodes");
                }
                Ok(WorkAck::new(unit.value.len() as u64, "ok"))
            });
        let pool = WorkerPool::spawn(1, flaky, Duration::from_secs(1));

        let err = pool.dispatch(unit(b"x")).await.unwrap_err();
        assert!(matches!(err, Error::Internal { ref cause } if cause.contains("first call explodes")));

        let ack = pool.dispatch(unit(b"abc")).await.unwrap();
        assert_eq!(ack.bytes_processed, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_is_bounded_by_worker_count() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (Arc::clone(&running), Arc::clone(&peak));
        let slow: Arc<dyn WorkService> =
            Arc::new(move |_: WorkUnit| -> Result<WorkAck, BoxError> {
                let now = r.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(20));
                r.fetch_sub(1, Ordering::SeqCst);
                Ok(WorkAck::default())
            });
        let pool = Arc::new(WorkerPool::spawn(3, slow, Duration::from_secs(1)));

        let calls = (0..12).map(|_| {
            let pool = Arc::clone(&pool);
            async move { pool.dispatch(unit(b"")).await }
        });
        for result in futures::future::join_all(calls).await {
            result.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn shutdown_refuses_new_work() {
        let pool = WorkerPool::spawn(2, counting(), Duration::from_millis(200));
        pool.shutdown().await.unwrap();

        let err = pool.dispatch(unit(b"late")).await.unwrap_err();
        assert_eq!(err, Error::ServiceShutdown);
    }
}
