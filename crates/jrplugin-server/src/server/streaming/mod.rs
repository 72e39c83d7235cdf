//! The long-lived stdio stream.
//!
//! - [`pump`] - the cancellable loop that moves frames from the log bridge to
//!   the attached `StreamStdio` caller.

pub mod pump;
