//! Configuration section definitions.
//!
//! Each module corresponds to a section in `bindwire.toml`:
//!
//! | Module    | TOML Section     | Purpose                              |
//! |-----------|------------------|--------------------------------------|
//! | `session` | `[session]`      | Echo policy, deferred mode, marker   |
//! | `rate`    | `[rate.<name>]`  | Per-driver rate policy overrides     |
//! | `serve`   | `[serve]`        | WebSocket endpoint                   |

mod rate;
mod serve;
mod session;

pub use rate::{PolicyKind, RateEntry};
pub use serve::{DEFAULT_PORT, ServeConfig};
pub use session::SessionSection;
