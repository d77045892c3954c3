//! In-memory channel that records every message sent.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::{Channel, ChannelError, OutboundMessage};
use crate::core::{InputId, Value};
use crate::limiter::Clock;

/// One recorded send.
#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    /// Clock time of the send (0 without a clock)
    pub at_ms: u64,
    pub message: OutboundMessage,
}

/// Records outbound messages. Clones share the same log.
#[derive(Clone, Default)]
pub struct RecordingChannel {
    log: Arc<Mutex<Vec<Sent>>>,
    closed: Arc<AtomicBool>,
    clock: Option<Arc<dyn Clock>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timestamp sends with `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock: Some(clock),
            ..Self::default()
        }
    }

    /// While closed, every send fails with [`ChannelError::Closed`].
    pub fn set_closed(&self, closed: bool) {
        self.closed.store(closed, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.log.lock().clone()
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.log.lock().iter().map(|s| s.message.clone()).collect()
    }

    /// Values sent for `id`, in order.
    pub fn values_for(&self, id: &str) -> Vec<Value> {
        self.log
            .lock()
            .iter()
            .filter(|s| s.message.id == id)
            .map(|s| s.message.value.clone())
            .collect()
    }

    /// Ids in send order.
    pub fn ids(&self) -> Vec<InputId> {
        self.log.lock().iter().map(|s| s.message.id.clone()).collect()
    }

    /// Drain the log.
    pub fn take(&self) -> Vec<Sent> {
        std::mem::take(&mut *self.log.lock())
    }

    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }
}

impl Channel for RecordingChannel {
    fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        let at_ms = self.clock.as_ref().map_or(0, |c| c.now_ms());
        self.log.lock().push(Sent {
            at_ms,
            message: message.clone(),
        });
        Ok(())
    }
}
