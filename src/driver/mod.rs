//! Control drivers.
//!
//! A driver knows how to locate, identify, read and write one kind of
//! control, how to listen for its changes, and how often those changes
//! should be sent upstream.
//!
//! # Module Structure
//!
//! - `registry` - Ordered name -> driver table, first match wins
//! - `builtin` - Reference drivers (checkbox, text, number, slider)
//!
//! Drivers hold no per-control state. Everything lives on the element they
//! are handed, so one instance serves every control it matches.

pub mod builtin;
mod registry;

use std::sync::Arc;

use thiserror::Error;

use crate::core::{RatePolicy, Value};
use crate::dom::{Element, Handler};

pub use registry::Registry;

/// Attribute that overrides a control's identifier.
pub const ID_ATTR: &str = "data-input-id";

/// Errors returned by driver calls
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("`{op}` is not supported by this driver")]
    Unsupported { op: &'static str },

    #[error("invalid value {value}: expected {expected}")]
    InvalidValue {
        expected: &'static str,
        value: Value,
    },

    #[error("driver panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Other(String),
}

impl DriverError {
    pub fn invalid(expected: &'static str, value: &Value) -> Self {
        Self::InvalidValue {
            expected,
            value: value.clone(),
        }
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Change notification handed to [`Driver::subscribe`].
///
/// The flag is `true` when the change may be batched by the rate limiter
/// and `false` when it must be sent at once.
pub type ChangeCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Capability set every control driver implements.
///
/// Only `name`, `find` and `get_value` are required. Missing write or
/// subscription support surfaces as [`DriverError::Unsupported`] when the
/// session first needs it, never at registration.
pub trait Driver: Send + Sync {
    /// Name used as the listener namespace and in diagnostics.
    fn name(&self) -> &str;

    /// Controls of this kind in `scope`'s subtree, `scope` included.
    ///
    /// Must be a pure query: calling it again returns the same elements.
    fn find(&self, scope: &Element) -> Vec<Element>;

    /// Whether this driver handles `el`.
    fn matches(&self, el: &Element) -> bool {
        self.find(el).iter().any(|found| found.ptr_eq(el))
    }

    /// The explicit `data-input-id` override, else the element id.
    fn get_id(&self, el: &Element) -> Option<String> {
        default_id(el)
    }

    fn get_value(&self, el: &Element) -> DriverResult<Value>;

    /// Write `value` and fire the event `subscribe` listens for.
    fn set_value(&self, _el: &Element, _value: &Value) -> DriverResult<()> {
        Err(DriverError::Unsupported { op: "set_value" })
    }

    /// Apply a server-pushed update. Defaults to [`Driver::set_value`].
    fn receive_update(&self, el: &Element, value: &Value) -> DriverResult<()> {
        self.set_value(el, value)
    }

    fn subscribe(&self, _el: &Element, _callback: ChangeCallback) -> DriverResult<()> {
        Err(DriverError::Unsupported { op: "subscribe" })
    }

    /// Remove exactly what `subscribe` installed. A no-op when already
    /// unsubscribed.
    fn unsubscribe(&self, _el: &Element) -> DriverResult<()> {
        Err(DriverError::Unsupported { op: "unsubscribe" })
    }

    /// Default policy for this driver's controls. `None` means immediate.
    fn rate_policy(&self) -> Option<RatePolicy> {
        None
    }

    fn initialize(&self, _el: &Element) -> DriverResult<()> {
        Ok(())
    }

    fn dispose(&self, _el: &Element) -> DriverResult<()> {
        Ok(())
    }
}

// ============================================================================
// Helpers shared by drivers
// ============================================================================

/// `data-input-id`, else the element's `id`.
pub fn default_id(el: &Element) -> Option<String> {
    el.attr(ID_ATTR).filter(|id| !id.is_empty()).or_else(|| el.id())
}

/// Install a listener under `namespace` that reports `rate_limited`.
pub fn on_change(
    el: &Element,
    events: &str,
    namespace: &str,
    callback: &ChangeCallback,
    rate_limited: bool,
) {
    let callback = Arc::clone(callback);
    let handler: Handler = Arc::new(move |_| callback(rate_limited));
    el.on(events, namespace, handler);
}

/// Numeric JSON value. Integral values become integers so `5` read back
/// from a control compares equal to the `5` that was written.
#[allow(clippy::cast_possible_truncation)]
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

/// Text form of a number as a control would show it.
pub fn format_number(n: f64) -> String {
    match number_value(n) {
        Value::Number(num) => num.to_string(),
        _ => String::new(),
    }
}

/// A JSON number, or a string holding one.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
