//! Process runtime with a bounded teardown.
//!
//! Dropping a Tokio runtime waits for every blocking task it spawned. A
//! [`WorkService`](crate::WorkService) that never returns would keep the
//! process alive after the server reached `Stopped`, so the binary builds
//! its runtime here and shuts it down with a timeout instead.

use core::{future::Future, time::Duration};
use std::io;
use tokio::runtime::{Builder, Runtime};

/// Multi-threaded runtime with I/O and timers enabled.
///
/// # Errors
///
/// Fails if the runtime's threads or I/O driver cannot be created.
pub fn build_runtime() -> io::Result<Runtime> {
    Builder::new_multi_thread().enable_all().build()
}

/// Drives `fut` to completion on `runtime`, then tears the runtime down,
/// abandoning blocking tasks still running after `grace`.
pub fn run_bounded<F: Future>(runtime: Runtime, grace: Duration, fut: F) -> F::Output {
    let output = runtime.block_on(fut);
    runtime.shutdown_timeout(grace);
    output
}
