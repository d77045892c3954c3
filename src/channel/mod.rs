//! Message channel between a binding session and the remote session.
//!
//! # Module Structure
//!
//! - `message` - Wire shapes and inbound parsing
//! - `recording` - In-memory channel for tests and `replay`
//! - `ws` - WebSocket transport for `serve`
//!
//! The session only needs [`Channel::send`]. Inbound frames reach it from
//! whatever drives the session (the `serve` actor, a replay script).

mod message;
mod recording;
pub mod ws;

use thiserror::Error;

pub use message::{InboundMessage, OutboundMessage, parse_batch};
pub use recording::{RecordingChannel, Sent};
pub use ws::WsTransport;

/// Errors raised while sending upstream
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel is closed")]
    Closed,

    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outbound half of the duplex channel.
///
/// Fire-and-forget: a successful `send` promises no more than the
/// underlying transport does.
pub trait Channel {
    fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError>;
}

impl<C: Channel + ?Sized> Channel for &C {
    fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        (**self).send(message)
    }
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        (**self).send(message)
    }
}
