#![doc = include_str!("../README.md")]

pub mod server;

pub use server::{
    bridge::{LogBridge, LogFormat, LogRecord},
    config::{CliArgs, ServerConfig},
    multiplexer::{BoundServer, PluginServer, ServerHandle, ServerState},
    work::{ConsoleProducer, WorkService},
};
