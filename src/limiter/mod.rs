//! Rate Limiter
//!
//! Gates outbound value changes per control id according to its
//! [`RatePolicy`]:
//!
//! ```text
//! change ──> Immediate ───────────────────────────────> Dispatch
//!        ──> Debounce  ── (re)start timer ── quiet ──> Dispatch (last value)
//!        ──> Throttle  ── window closed? ────────────> Dispatch + open window
//!                      └─ window open ── stage ── boundary ──> Dispatch + reopen
//! ```
//!
//! A bypassed change (`rate_limited == false`) cancels whatever is staged
//! for its id and dispatches at once, so a stale batched value can never
//! arrive after a newer bypassed one.
//!
//! The limiter never reads a clock itself: callers pass `now_ms`, and
//! collect timer dispatches with [`RateLimiter::fire_due`].

mod clock;
mod timer;

use rustc_hash::FxHashMap;

use crate::core::{InputId, RatePolicy, Value};

pub use clock::{Clock, ManualClock, SystemClock};
pub use timer::{Expired, TimerQueue, TimerToken};

/// A value leaving the limiter, ready for the outbound channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub id: InputId,
    pub value: Value,
    /// Flag of the change event this value came from
    pub rate_limited: bool,
    /// Logical dispatch time (timer deadline for batched values)
    pub at_ms: u64,
}

#[derive(Debug, Clone)]
struct Staged {
    value: Value,
    rate_limited: bool,
}

/// Pending change record for one id.
///
/// For debounce it exists while a value waits for quiet; for throttle it
/// exists while a window is open, with `staged` holding the value coalesced
/// for the window boundary.
#[derive(Debug)]
struct PendingChange {
    policy: RatePolicy,
    staged: Option<Staged>,
    timer: TimerToken,
}

/// Per-id debounce/throttle state machine.
#[derive(Debug, Default)]
pub struct RateLimiter {
    pending: FxHashMap<InputId, PendingChange>,
    timers: TimerQueue<InputId>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one change. Returns the dispatch if it leaves immediately.
    pub fn submit(
        &mut self,
        id: &InputId,
        policy: RatePolicy,
        value: Value,
        rate_limited: bool,
        now_ms: u64,
    ) -> Option<Dispatch> {
        let dispatch_now = |value| Dispatch {
            id: id.clone(),
            value,
            rate_limited,
            at_ms: now_ms,
        };

        if !rate_limited {
            // Bypass: drop anything staged, then send
            if self.pending.remove(id).is_some() {
                crate::debug!("limiter"; "bypass for `{}` cancelled staged value", id);
            }
            if let RatePolicy::Throttle { delay_ms } = policy {
                self.open_window(id, policy, now_ms.saturating_add(delay_ms));
            }
            return Some(dispatch_now(value));
        }

        match policy {
            RatePolicy::Immediate => Some(dispatch_now(value)),

            RatePolicy::Debounce { delay_ms } => {
                let timer = self.timers.schedule(id.clone(), now_ms.saturating_add(delay_ms));
                self.pending.insert(
                    id.clone(),
                    PendingChange {
                        policy,
                        staged: Some(Staged {
                            value,
                            rate_limited,
                        }),
                        timer,
                    },
                );
                None
            }

            RatePolicy::Throttle { delay_ms } => {
                if let Some(record) = self.pending.get_mut(id) {
                    record.staged = Some(Staged {
                        value,
                        rate_limited,
                    });
                    return None;
                }
                self.open_window(id, policy, now_ms.saturating_add(delay_ms));
                Some(dispatch_now(value))
            }
        }
    }

    fn open_window(&mut self, id: &InputId, policy: RatePolicy, deadline_ms: u64) {
        let timer = self.timers.schedule(id.clone(), deadline_ms);
        self.pending.insert(
            id.clone(),
            PendingChange {
                policy,
                staged: None,
                timer,
            },
        );
    }

    /// Fire every timer due at `now_ms`, in deadline order.
    ///
    /// A throttle boundary that dispatches reopens its window from the
    /// boundary itself, so a window opened in the past can expire within
    /// the same call.
    pub fn fire_due(&mut self, now_ms: u64) -> Vec<Dispatch> {
        let mut out = Vec::new();

        while let Some(expired) = self.timers.pop_due(now_ms) {
            let Some(record) = self.pending.get(&expired.key) else {
                continue;
            };
            if record.timer != expired.token {
                continue; // superseded or cancelled
            }

            let Some(record) = self.pending.remove(&expired.key) else {
                continue;
            };
            let Some(staged) = record.staged else {
                // Throttle window closed with nothing coalesced
                continue;
            };

            if let RatePolicy::Throttle { delay_ms } = record.policy {
                let reopen_at = expired.deadline_ms.saturating_add(delay_ms);
                self.open_window(&expired.key, record.policy, reopen_at);
            }

            out.push(Dispatch {
                id: expired.key,
                value: staged.value,
                rate_limited: staged.rate_limited,
                at_ms: expired.deadline_ms,
            });
        }

        out
    }

    /// Drop the pending record for `id`; its timer will never dispatch.
    pub fn cancel(&mut self, id: &InputId) -> bool {
        self.pending.remove(id).is_some()
    }

    /// Drop every pending record and timer.
    pub fn cancel_all(&mut self) {
        self.pending.clear();
        self.timers.clear();
    }

    /// Whether a value is staged for `id`.
    pub fn has_staged(&self, id: &InputId) -> bool {
        self.pending.get(id).is_some_and(|r| r.staged.is_some())
    }

    /// Deadline of the next live timer.
    ///
    /// Cancelled timers still sit in the queue; they are discarded here so
    /// a caller sleeping until the deadline does not wake up for nothing.
    pub fn next_deadline(&mut self) -> Option<u64> {
        loop {
            let (key, token, deadline) = self.timers.peek()?;
            if self.pending.get(key).is_some_and(|r| r.timer == token) {
                return Some(deadline);
            }
            // Earliest timer is stale: drop it and look again
            self.timers.pop_due(deadline);
        }
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }
}
