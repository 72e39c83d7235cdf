use super::record::LogRecord;
use chrono::Utc;
use core::fmt;
use jrplugin_core::types::StdioChannel;
use std::borrow::Cow;
use tokio::sync::mpsc;
use tracing::{
    Event, Subscriber,
    field::{Field, Visit},
};
use tracing_log::NormalizeEvent;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    layer::{Context, Layer},
};

/// Targets that are never forwarded to the host.
///
/// The transport logs each frame it writes, including the frames carrying
/// bridge records, so letting these through feeds the stream its own traffic.
const SILENCED_TARGETS: &[&str] = &[
    "h2",
    "hyper",
    "tonic",
    "tower",
    concat!(env!("CARGO_CRATE_NAME"), "::server::streaming"),
];

/// Per-layer filter for the bridge: `level` for everything except the
/// transport stack and the stdio pump.
pub fn bridge_targets(level: LevelFilter) -> Targets {
    Targets::new()
        .with_default(level)
        .with_targets(SILENCED_TARGETS.iter().map(|t| (*t, LevelFilter::OFF)))
}

/// `tracing` layer that turns every event it sees into a [`LogRecord`] and
/// appends it to the bridge queue.
///
/// The layer only holds a sender; installing it does not make the bridge
/// global. Pair it with [`bridge_targets`] through `Layer::with_filter`.
#[derive(Clone)]
pub struct BridgeLayer {
    tx: mpsc::UnboundedSender<LogRecord>,
}

impl BridgeLayer {
    pub(super) const fn new(tx: mpsc::UnboundedSender<LogRecord>) -> Self {
        Self { tx }
    }
}

impl<S> Layer<S> for BridgeLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        // Events forwarded from the `log` crate carry their real origin in
        // `log.*` fields.
        let (level, target, file, line) = match event.normalized_metadata() {
            Some(meta) => (
                *meta.level(),
                Cow::Owned(meta.target().to_string()),
                meta.file().map(|f| Cow::Owned(f.to_string())),
                meta.line(),
            ),
            None => {
                let meta = event.metadata();
                (
                    *meta.level(),
                    Cow::Borrowed(meta.target()),
                    meta.file().map(Cow::Borrowed),
                    meta.line(),
                )
            }
        };

        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        let record = LogRecord {
            timestamp: Utc::now(),
            level,
            target,
            file,
            line,
            message: visitor.message,
            fields: visitor.fields,
            channel: StdioChannel::Stdout,
        };

        // Only fails once the bridge and every reader are gone.
        let _ = self.tx.send(record);
    }
}

#[derive(Default)]
struct RecordVisitor {
    message: String,
    fields: Vec<(&'static str, String)>,
}

impl RecordVisitor {
    fn push(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = value,
            name if name.starts_with("log.") => {}
            name => self.fields.push((name, value)),
        }
    }
}

impl Visit for RecordVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, format!("{value:?}"));
    }
}
