//! Session behavior knobs, normally built from `[session]` and `[rate.*]`.

use std::fmt;
use std::str::FromStr;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::core::RatePolicy;

/// Attribute marking controls that are expected to bind.
pub const DEFAULT_MARKER: &str = "data-bind";

/// What happens to the change event a server-pushed write produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EchoPolicy {
    /// The echo goes back upstream, confirming the value the control holds.
    #[default]
    Mirror,
    /// Drop any dispatch whose value equals the last one sent or received
    /// for that id.
    SkipUnchanged,
    /// Discard change events raised by the inbound write itself.
    Suppress,
}

impl fmt::Display for EchoPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mirror => "mirror",
            Self::SkipUnchanged => "skip-unchanged",
            Self::Suppress => "suppress",
        })
    }
}

impl FromStr for EchoPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mirror" => Ok(Self::Mirror),
            "skip-unchanged" => Ok(Self::SkipUnchanged),
            "suppress" => Ok(Self::Suppress),
            other => Err(format!(
                "unknown echo policy `{other}` (expected mirror, skip-unchanged or suppress)"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub echo: EchoPolicy,
    /// Hold dispatches until `flush_deferred` (submit-button mode)
    pub defer: bool,
    /// Elements carrying this attribute must be claimed by some driver
    pub marker: String,
    /// Per-driver policy overrides, keyed by registry name
    pub overrides: FxHashMap<String, RatePolicy>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            echo: EchoPolicy::default(),
            defer: false,
            marker: DEFAULT_MARKER.to_string(),
            overrides: FxHashMap::default(),
        }
    }
}

impl SessionOptions {
    pub fn with_echo(mut self, echo: EchoPolicy) -> Self {
        self.echo = echo;
        self
    }

    pub fn with_defer(mut self, defer: bool) -> Self {
        self.defer = defer;
        self
    }

    pub fn with_override(mut self, driver: &str, policy: RatePolicy) -> Self {
        self.overrides.insert(driver.to_string(), policy);
        self
    }
}
