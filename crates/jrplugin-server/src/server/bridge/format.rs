use super::record::LogRecord;
use bytes::Bytes;
use chrono::SecondsFormat;
use core::fmt::Write;

/// Canonical text layout for records leaving the bridge.
///
/// ```text
/// 2024-05-01T10:00:00.000Z INFO  jrplugin src/main.rs:42 - Received request key="k1"
/// ```
///
/// The value is immutable once built, so it is shared between readers without
/// synchronization.
#[derive(Clone, Debug)]
pub struct LogFormat {
    /// Append `file:line` after the target when the record has one.
    pub with_location: bool,
    /// Append structured fields as `name=value` after the message.
    pub with_fields: bool,
}

impl Default for LogFormat {
    fn default() -> Self {
        Self {
            with_location: true,
            with_fields: true,
        }
    }
}

impl LogFormat {
    /// Renders `record` as a single newline terminated line.
    pub fn format(&self, record: &LogRecord) -> Bytes {
        let mut out = String::with_capacity(64 + record.message.len());

        // Writing into a `String` cannot fail.
        let _ = write!(
            out,
            "{} {}  {}",
            record
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            record.level,
            record.target
        );

        if self.with_location {
            if let (Some(file), Some(line)) = (record.file.as_deref(), record.line) {
                let _ = write!(out, " {file}:{line}");
            }
        }

        let _ = write!(out, " - {}", record.message);

        if self.with_fields {
            for (name, value) in &record.fields {
                let _ = write!(out, " {name}={value}");
            }
        }

        out.push('\n');
        Bytes::from(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tracing::Level;

    fn record() -> LogRecord {
        let mut record = LogRecord::new(Level::INFO, "jrplugin", "Received request")
            .with_location("src/main.rs", 42)
            .with_field("key", "\"k1\"");
        record.timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        record
    }

    #[test]
    fn renders_the_full_layout() {
        let line = LogFormat::default().format(&record());
        assert_eq!(
            line,
            "2024-05-01T10:00:00.000Z INFO  jrplugin src/main.rs:42 - Received request key=\"k1\"\n"
        );
    }

    #[test]
    fn location_and_fields_are_optional() {
        let format = LogFormat {
            with_location: false,
            with_fields: false,
        };
        let line = format.format(&record());
        assert_eq!(line, "2024-05-01T10:00:00.000Z INFO  jrplugin - Received request\n");
    }

    #[test]
    fn records_without_location_skip_it() {
        let mut record = LogRecord::new(Level::WARN, "jrplugin", "no location");
        record.timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let line = LogFormat::default().format(&record);
        assert_eq!(line, "2024-05-01T10:00:00.000Z WARN  jrplugin - no location\n");
    }
}
