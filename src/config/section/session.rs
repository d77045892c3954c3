//! `[session]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [session]
//! echo = "mirror"         # mirror | skip-unchanged | suppress
//! defer = false           # hold values until submit
//! marker = "data-bind"    # attribute marking controls that must bind
//! ```

use serde::{Deserialize, Serialize};

use crate::session::{DEFAULT_MARKER, EchoPolicy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// What happens to the change a server-pushed value produces.
    pub echo: EchoPolicy,

    /// Hold every dispatch until an explicit submit.
    pub defer: bool,

    /// Elements with this attribute are reported when no driver claims them.
    pub marker: String,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            echo: EchoPolicy::default(),
            defer: false,
            marker: DEFAULT_MARKER.to_string(),
        }
    }
}

impl SessionSection {
    /// An attribute name: non-empty, no whitespace, quotes, `=`, `<`, `>` or `/`.
    pub fn marker_is_valid(&self) -> bool {
        !self.marker.is_empty()
            && !self
                .marker
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '=' | '<' | '>' | '/'))
    }
}
