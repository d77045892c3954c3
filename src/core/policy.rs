//! Rate policies: when a changed value is sent upstream.

use std::fmt;
use std::time::Duration;

/// How often a bound control's changes are dispatched.
///
/// Delays are unsigned, so `delay_ms >= 0` holds by construction. Its
/// serialized form is `config::RateEntry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RatePolicy {
    /// Every change is dispatched synchronously.
    #[default]
    Immediate,
    /// Dispatch only after `delay_ms` without further changes.
    Debounce { delay_ms: u64 },
    /// Dispatch at most once per `delay_ms`, always including the latest value.
    Throttle { delay_ms: u64 },
}

impl RatePolicy {
    pub const fn debounce(delay_ms: u64) -> Self {
        Self::Debounce { delay_ms }
    }

    pub const fn throttle(delay_ms: u64) -> Self {
        Self::Throttle { delay_ms }
    }

    /// Delay carried by the policy (`None` for `Immediate`).
    pub const fn delay_ms(&self) -> Option<u64> {
        match self {
            Self::Immediate => None,
            Self::Debounce { delay_ms } | Self::Throttle { delay_ms } => Some(*delay_ms),
        }
    }

    pub fn delay(&self) -> Option<Duration> {
        self.delay_ms().map(Duration::from_millis)
    }

    pub const fn is_immediate(&self) -> bool {
        matches!(self, Self::Immediate)
    }
}

impl fmt::Display for RatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => write!(f, "immediate"),
            Self::Debounce { delay_ms } => write!(f, "debounce({delay_ms}ms)"),
            Self::Throttle { delay_ms } => write!(f, "throttle({delay_ms}ms)"),
        }
    }
}
