//! Log bridge: in-process log events to a pull-based frame stream.
//!
//! Every `tracing` event that passes the [`BridgeLayer`] filter becomes a
//! [`LogRecord`] in an unbounded FIFO queue. The queue has many writers and
//! at most one reader at a time:
//!
//! ```text
//! tracing::info!(..) ──► BridgeLayer ─┐
//! LogBridge::emit(..) ────────────────┼──► [unbounded FIFO] ──► BridgeReader::next() ──► LogFrame
//! tracing::warn!(..) ──► BridgeLayer ─┘        (one reader, guarded)
//! ```
//!
//! ## Guarantees
//!
//! - `emit` never blocks and never drops a record while the bridge is alive.
//! - Records reach the reader in emission order, exactly once.
//! - A second [`LogBridge::attach`] while a reader is alive fails with
//!   [`Error::AlreadyStreaming`]. Dropping the reader releases the queue and
//!   everything still in it to the next reader; nothing is replayed.
//! - [`BridgeReader::next`] is cancel-safe: dropping the future before it
//!   resolves leaves the queue untouched.

pub mod format;
pub mod layer;
pub mod record;

pub use format::LogFormat;
pub use layer::{BridgeLayer, bridge_targets};
pub use record::{LogFrame, LogRecord};

use jrplugin_core::Error;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};

/// Handle to the log queue. Cheap to clone; all clones share one queue.
#[derive(Clone)]
pub struct LogBridge {
    tx: mpsc::UnboundedSender<LogRecord>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<LogRecord>>>,
    format: Arc<LogFormat>,
}

impl LogBridge {
    pub fn new(format: LogFormat) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            format: Arc::new(format),
        }
    }

    /// Appends a record to the queue.
    pub fn emit(&self, record: LogRecord) {
        // The receiver lives as long as `self`, so this cannot fail here.
        let _ = self.tx.send(record);
    }

    /// Returns a `tracing` layer feeding this bridge.
    pub fn layer(&self) -> BridgeLayer {
        BridgeLayer::new(self.tx.clone())
    }

    /// Claims the single reader slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStreaming`] while another [`BridgeReader`] is
    /// alive.
    pub fn attach(&self) -> Result<BridgeReader, Error> {
        let rx = Arc::clone(&self.rx)
            .try_lock_owned()
            .map_err(|_| Error::AlreadyStreaming)?;

        Ok(BridgeReader {
            rx,
            format: Arc::clone(&self.format),
        })
    }

    /// Whether a reader currently holds the queue.
    pub fn is_attached(&self) -> bool {
        self.rx.try_lock().is_err()
    }
}

impl Default for LogBridge {
    fn default() -> Self {
        Self::new(LogFormat::default())
    }
}

/// Exclusive consumer of the bridge queue. Dropping it detaches.
pub struct BridgeReader {
    rx: OwnedMutexGuard<mpsc::UnboundedReceiver<LogRecord>>,
    format: Arc<LogFormat>,
}

impl BridgeReader {
    /// Waits for the oldest record, removes it and returns it formatted.
    ///
    /// Returns `None` only once every sender (the bridge and all layers) has
    /// been dropped and the queue is empty.
    pub async fn next(&mut self) -> Option<LogFrame> {
        let record = self.rx.recv().await?;
        Some(LogFrame {
            channel: record.channel,
            data: self.format.format(&record),
        })
    }

    /// Like [`next`](Self::next) but never waits.
    pub fn try_next(&mut self) -> Option<LogFrame> {
        let record = self.rx.try_recv().ok()?;
        Some(LogFrame {
            channel: record.channel,
            data: self.format.format(&record),
        })
    }
}
