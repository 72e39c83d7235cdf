//! The pluggable business logic behind `producer.Producer/Produce`.
//!
//! Plugin authors implement [`WorkService`] and hand it to
//! [`PluginServer::new`](crate::server::multiplexer::PluginServer::new). The
//! server runs `handle` on a blocking thread owned by the worker pool, so
//! implementations may do synchronous I/O. Errors and panics are reported to
//! the host as `INTERNAL` and never take the process down.

use jrplugin_core::types::{WorkAck, WorkUnit};
use tower::BoxError;

/// Capability injected into the server to process each [`WorkUnit`].
pub trait WorkService: Send + Sync + 'static {
    /// Processes one unit of work.
    ///
    /// # Errors
    ///
    /// Any error is surfaced to the caller of that single RPC.
    fn handle(&self, unit: WorkUnit) -> Result<WorkAck, BoxError>;
}

impl<F> WorkService for F
where
    F: Fn(WorkUnit) -> Result<WorkAck, BoxError> + Send + Sync + 'static,
{
    fn handle(&self, unit: WorkUnit) -> Result<WorkAck, BoxError> {
        self(unit)
    }
}

/// Default producer of the binary: logs each unit and acknowledges the value
/// length.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleProducer;

impl WorkService for ConsoleProducer {
    fn handle(&self, unit: WorkUnit) -> Result<WorkAck, BoxError> {
        tracing::info!(
            key = %String::from_utf8_lossy(&unit.key),
            headers = ?unit.headers,
            "{}",
            String::from_utf8_lossy(&unit.value)
        );
        Ok(WorkAck::new(unit.value.len() as u64, ""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn console_producer_counts_value_bytes() {
        let unit = WorkUnit {
            key: Bytes::from_static(b"k1"),
            value: Bytes::from_static(b"hello"),
            ..Default::default()
        };
        let ack = ConsoleProducer.handle(unit).unwrap();
        assert_eq!(ack.bytes_processed, 5);
    }

    #[test]
    fn closures_are_work_services() {
        let service = |unit: WorkUnit| -> Result<WorkAck, BoxError> {
            Ok(WorkAck::new(unit.key.len() as u64, "key only"))
        };
        let ack = service
            .handle(WorkUnit {
                key: Bytes::from_static(b"abc"),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(ack, WorkAck::new(3, "key only"));
    }
}
