//! rxhub-baseband: the DSP-core side of the cross-core link.
//!
//! Demodulation is out of scope; this crate starts from already-decoded
//! [`Message`](rxhub_core::Message)s. A [`BasebandLink`] pushes them into the
//! cross-core queue and raises the application core's interrupt, and a
//! [`Replayer`] feeds a recorded [`PacketScript`] through a link on its own
//! thread, standing in for live radio input.

use thiserror::Error;

pub mod link;
pub mod replay;
pub mod script;

pub use link::BasebandLink;
pub use replay::{ReplayStats, Replayer};
pub use script::{PacketScript, ScriptRecord};

#[derive(Debug, Error)]
pub enum BasebandError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("script line {line}: {message}")]
    Script { line: usize, message: String },
}

pub type Result<T> = std::result::Result<T, BasebandError>;
