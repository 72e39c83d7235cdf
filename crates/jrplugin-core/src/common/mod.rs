pub mod error;
pub mod handshake;
pub mod types;

pub use error::{Error, Result};
pub use handshake::{Handshake, Network, ParseHandshakeError};
