//! The handshake line a plugin prints on standard output.
//!
//! The host launches the plugin process and polls its stdout for exactly one
//! line of the form
//!
//! ```text
//! <core-protocol-version>|<app-protocol-version>|<network>|<address>|<server-type>
//! ```
//!
//! e.g. `1|1|tcp|127.0.0.1:1234|grpc`. Everything the host knows about the
//! plugin's transport comes from this line, so it is written once, flushed
//! immediately, and only after the listener is accepting connections.

use crate::types::{CORE_PROTOCOL_VERSION, SERVER_TYPE};
use core::{fmt, str::FromStr};
use std::io::{self, Write};

/// Transport family announced in the handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Network {
    Tcp,
    Unix,
}

impl Network {
    pub const fn as_str(self) -> &'static str {
        match self {
            Network::Tcp => "tcp",
            Network::Unix => "unix",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = ParseHandshakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Network::Tcp),
            "unix" => Ok(Network::Unix),
            other => Err(ParseHandshakeError::UnknownNetwork(other.to_string())),
        }
    }
}

/// Failure to parse a handshake line.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum ParseHandshakeError {
    #[error("expected 5 '|' separated fields, found {0}")]
    FieldCount(usize),

    #[error("invalid protocol version {0:?}")]
    Version(String),

    #[error("unknown network {0:?}")]
    UnknownNetwork(String),

    #[error("empty address")]
    EmptyAddress,
}

/// A parsed or to-be-emitted handshake line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Handshake {
    pub core_version: u32,
    pub app_version: u32,
    pub network: Network,
    pub address: String,
    pub server_type: String,
}

impl Handshake {
    /// Builds the handshake for a gRPC server listening on `address`.
    pub fn grpc(app_version: u32, network: Network, address: impl Into<String>) -> Self {
        Self {
            core_version: CORE_PROTOCOL_VERSION,
            app_version,
            network,
            address: address.into(),
            server_type: SERVER_TYPE.to_string(),
        }
    }

    /// Writes the line followed by a newline and flushes `out`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when `out` is not writable. Callers
    /// treat this as fatal: a host that never sees the line gives up on the
    /// plugin.
    pub fn emit<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{self}")?;
        out.flush()
    }
}

impl fmt::Display for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}",
            self.core_version, self.app_version, self.network, self.address, self.server_type
        )
    }
}

impl FromStr for Handshake {
    type Err = ParseHandshakeError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('|').collect();
        let [core_version, app_version, network, address, server_type] = fields.as_slice() else {
            return Err(ParseHandshakeError::FieldCount(fields.len()));
        };

        let version = |raw: &&str| {
            raw.parse::<u32>()
                .map_err(|_| ParseHandshakeError::Version((*raw).to_string()))
        };

        if address.is_empty() {
            return Err(ParseHandshakeError::EmptyAddress);
        }

        Ok(Self {
            core_version: version(core_version)?,
            app_version: version(app_version)?,
            network: network.parse()?,
            address: (*address).to_string(),
            server_type: (*server_type).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_the_five_field_line() {
        let handshake = Handshake::grpc(1, Network::Tcp, "127.0.0.1:1234");
        assert_eq!(handshake.to_string(), "1|1|tcp|127.0.0.1:1234|grpc");
    }

    #[test]
    fn emit_writes_a_single_terminated_line() {
        let mut out = Vec::new();
        Handshake::grpc(3, Network::Unix, "/tmp/plugin.sock")
            .emit(&mut out)
            .unwrap();
        assert_eq!(out, b"1|3|unix|/tmp/plugin.sock|grpc\n");
    }

    #[test]
    fn parses_an_emitted_line() {
        let parsed: Handshake = "1|2|tcp|127.0.0.1:50051|grpc\n".parse().unwrap();
        assert_eq!(parsed.core_version, 1);
        assert_eq!(parsed.app_version, 2);
        assert_eq!(parsed.network, Network::Tcp);
        assert_eq!(parsed.address, "127.0.0.1:50051");
        assert_eq!(parsed.server_type, "grpc");
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(
            "1|1|tcp|127.0.0.1:1".parse::<Handshake>(),
            Err(ParseHandshakeError::FieldCount(4))
        );
        assert_eq!(
            "x|1|tcp|127.0.0.1:1|grpc".parse::<Handshake>(),
            Err(ParseHandshakeError::Version("x".into()))
        );
        assert_eq!(
            "1|1|udp|127.0.0.1:1|grpc".parse::<Handshake>(),
            Err(ParseHandshakeError::UnknownNetwork("udp".into()))
        );
        assert_eq!(
            "1|1|tcp||grpc".parse::<Handshake>(),
            Err(ParseHandshakeError::EmptyAddress)
        );
    }

    struct Closed;

    impl Write for Closed {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn emit_surfaces_unwritable_output() {
        let err = Handshake::grpc(1, Network::Tcp, "127.0.0.1:1")
            .emit(&mut Closed)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
