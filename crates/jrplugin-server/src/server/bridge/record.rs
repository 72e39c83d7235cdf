use bytes::Bytes;
use chrono::{DateTime, Utc};
use jrplugin_core::{proto::plugin::StdioData, types::StdioChannel};
use std::borrow::Cow;
use tracing::Level;

/// One structured log event waiting in the bridge queue.
///
/// Records are created for every event that passes the bridge's filter and
/// are consumed exactly once by the attached reader.
#[derive(Clone, Debug)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub target: Cow<'static, str>,
    pub file: Option<Cow<'static, str>>,
    pub line: Option<u32>,
    pub message: String,
    pub fields: Vec<(&'static str, String)>,
    pub channel: StdioChannel,
}

impl LogRecord {
    /// Creates a record stamped with the current time and routed to stdout.
    pub fn new(
        level: Level,
        target: impl Into<Cow<'static, str>>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            target: target.into(),
            file: None,
            line: None,
            message: message.into(),
            fields: Vec::new(),
            channel: StdioChannel::Stdout,
        }
    }

    #[must_use]
    pub fn with_location(mut self, file: impl Into<Cow<'static, str>>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    #[must_use]
    pub fn with_field(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.fields.push((name, value.into()));
        self
    }
}

/// A formatted record, ready to go on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogFrame {
    pub channel: StdioChannel,
    pub data: Bytes,
}

impl From<LogFrame> for StdioData {
    fn from(frame: LogFrame) -> Self {
        let mut data = StdioData {
            data: frame.data,
            ..Default::default()
        };
        data.set_channel(frame.channel.into());
        data
    }
}
