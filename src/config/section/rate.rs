//! `[rate.<driver>]` section configuration.
//!
//! Overrides the rate policy a driver reports for its controls.
//!
//! # Example
//!
//! ```toml
//! [rate.text]
//! policy = "throttle"     # immediate | debounce | throttle
//! delay = 500             # milliseconds, required unless immediate
//!
//! [rate.checkbox]
//! policy = "immediate"
//! ```

use serde::{Deserialize, Serialize};

use crate::core::RatePolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Immediate,
    Debounce,
    Throttle,
}

impl PolicyKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Debounce => "debounce",
            Self::Throttle => "throttle",
        }
    }
}

/// Raw override entry, checked by [`RateEntry::to_policy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateEntry {
    pub policy: PolicyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
}

impl RateEntry {
    pub fn to_policy(&self) -> Result<RatePolicy, String> {
        match (self.policy, self.delay) {
            (PolicyKind::Immediate, None) => Ok(RatePolicy::Immediate),
            (PolicyKind::Immediate, Some(_)) => Err("`immediate` takes no delay".to_string()),
            (PolicyKind::Debounce, Some(ms)) => Ok(RatePolicy::debounce(ms)),
            (PolicyKind::Throttle, Some(ms)) => Ok(RatePolicy::throttle(ms)),
            (kind, None) => Err(format!("`{}` needs a delay in milliseconds", kind.name())),
        }
    }
}

impl From<RatePolicy> for RateEntry {
    fn from(policy: RatePolicy) -> Self {
        let kind = match policy {
            RatePolicy::Immediate => PolicyKind::Immediate,
            RatePolicy::Debounce { .. } => PolicyKind::Debounce,
            RatePolicy::Throttle { .. } => PolicyKind::Throttle,
        };
        Self {
            policy: kind,
            delay: policy.delay_ms(),
        }
    }
}
