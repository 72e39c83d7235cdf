//! Plugin-side server.
//!
//! ## Structure
//!
//! - [`multiplexer`] - listener, handshake and lifecycle ([`PluginServer`]).
//! - [`service`] - the `Producer`, `GRPCController` and `GRPCStdio` services.
//! - [`health`] - `grpc.health.v1.Health`.
//! - [`bridge`] - the in-process log queue drained by `StreamStdio`.
//! - [`streaming`] - the frame pump behind each stdio stream.
//! - [`pool`] - bounded workers for unary `Produce` calls.
//! - [`work`] - the pluggable [`WorkService`].
//! - [`config`] - CLI and environment configuration.
//! - [`runtime`] - the process runtime and its bounded teardown.
//! - [`telemetry`] - `tracing` setup and optional OpenTelemetry export.
//!
//! [`PluginServer`]: multiplexer::PluginServer
//! [`WorkService`]: work::WorkService

pub mod bridge;
pub mod config;
pub mod health;
pub mod multiplexer;
pub mod pool;
pub mod runtime;
pub mod service;
pub mod streaming;
pub mod telemetry;
pub mod work;
