//! # Plugin Protocol Types and Constants
//!
//! Domain types exchanged between the RPC layer and the injected business
//! logic, plus the constants that make up the handshake contract with the
//! host.
//!
//! The generated protobuf messages stay at the transport boundary; handlers
//! convert them into [`WorkUnit`] / [`WorkAck`] so plugin authors never touch
//! prost types.

use crate::proto::{
    plugin::stdio_data,
    producer::{ProduceRequest, ProduceResponse},
};
use bytes::Bytes;
use std::collections::HashMap;

/// Version of the host/plugin core protocol (first handshake field).
pub const CORE_PROTOCOL_VERSION: u32 = 1;

/// Default application protocol version (second handshake field).
pub const DEFAULT_APP_PROTOCOL_VERSION: u32 = 1;

/// Server type announced in the handshake (fifth field).
pub const SERVER_TYPE: &str = "grpc";

/// Health service name go-plugin hosts query before dispensing a plugin.
pub const PLUGIN_HEALTH_SERVICE: &str = "plugin";

/// One unit of work submitted by the host.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkUnit {
    pub key: Bytes,
    pub value: Bytes,
    pub headers: HashMap<String, String>,
    pub config_params: HashMap<String, String>,
}

impl From<ProduceRequest> for WorkUnit {
    fn from(req: ProduceRequest) -> Self {
        Self {
            key: req.key,
            value: req.value,
            headers: req.headers,
            config_params: req.config_params,
        }
    }
}

/// Acknowledgment returned by the work service for a [`WorkUnit`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkAck {
    pub bytes_processed: u64,
    pub message: String,
}

impl WorkAck {
    pub fn new(bytes_processed: u64, message: impl Into<String>) -> Self {
        Self {
            bytes_processed,
            message: message.into(),
        }
    }
}

impl From<WorkAck> for ProduceResponse {
    fn from(ack: WorkAck) -> Self {
        Self {
            bytes: ack.bytes_processed,
            message: ack.message,
        }
    }
}

/// Serving status of a named service as reported by the health service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ServingStatus {
    #[default]
    Unknown,
    Serving,
    NotServing,
}

/// Output channel a log frame is mirrored to on the host side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StdioChannel {
    #[default]
    Stdout,
    Stderr,
}

impl From<StdioChannel> for stdio_data::Channel {
    fn from(channel: StdioChannel) -> Self {
        match channel {
            StdioChannel::Stdout => stdio_data::Channel::Stdout,
            StdioChannel::Stderr => stdio_data::Channel::Stderr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_unit_takes_ownership_of_request_payload() {
        let req = ProduceRequest {
            key: Bytes::from_static(b"k1"),
            value: Bytes::from_static(b"hello"),
            headers: HashMap::from([("h".to_string(), "v".to_string())]),
            config_params: HashMap::new(),
        };

        let unit = WorkUnit::from(req);
        assert_eq!(unit.key, Bytes::from_static(b"k1"));
        assert_eq!(unit.value.len(), 5);
        assert_eq!(unit.headers.get("h").map(String::as_str), Some("v"));
        assert!(unit.config_params.is_empty());
    }

    #[test]
    fn ack_maps_onto_produce_response() {
        let resp = ProduceResponse::from(WorkAck::new(5, "Written to file"));
        assert_eq!(resp.bytes, 5);
        assert_eq!(resp.message, "Written to file");
    }

    #[test]
    fn channels_map_onto_wire_enum() {
        assert_eq!(stdio_data::Channel::from(StdioChannel::Stdout) as i32, 1);
        assert_eq!(stdio_data::Channel::from(StdioChannel::Stderr) as i32, 2);
    }
}
