//! gRPC service implementations registered by the multiplexer.
//!
//! ## Structure
//!
//! - [`producer`] - `producer.Producer`, backed by the worker pool.
//! - [`controller`] - `plugin.GRPCController`, the host's shutdown channel.
//! - [`stdio`] - `plugin.GRPCStdio`, the single log stream.
//!
//! Health checking lives in [`crate::server::health`].

pub mod controller;
pub mod producer;
pub mod stdio;
