//! Worker pool running the injected work service for unary calls.
//!
//! - [`manager`] - [`WorkerPool`](manager::WorkerPool): dispatch and graceful
//!   shutdown.
//! - [`worker`] - the per-worker loop and panic containment.
//! - [`request`] - messages passed from the pool to its workers.

pub mod manager;
pub mod request;
pub mod worker;
