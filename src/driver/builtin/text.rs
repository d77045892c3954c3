use crate::core::{RatePolicy, Value};
use crate::dom::{Element, Selector};
use crate::driver::{ChangeCallback, Driver, DriverError, DriverResult, on_change};

use super::TYPING_DEBOUNCE_MS;

/// Single-line text inputs and textareas.
///
/// Keystrokes are batched; `change` (the user leaving the field) bypasses
/// the limiter so the final text goes out at once.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDriver;

impl TextDriver {
    pub const NAME: &'static str = "text";

    fn write(el: &Element, value: &Value) -> DriverResult<()> {
        match value {
            Value::String(s) => el.set_value(s),
            Value::Null => el.set_value(""),
            other => return Err(DriverError::invalid("a string", other)),
        }
        Ok(())
    }
}

impl Driver for TextDriver {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn find(&self, scope: &Element) -> Vec<Element> {
        scope.select(&Selector::tag("input").attr_eq("type", "text").or(Selector::tag("textarea")))
    }

    fn get_value(&self, el: &Element) -> DriverResult<Value> {
        Ok(Value::String(el.value()))
    }

    fn set_value(&self, el: &Element, value: &Value) -> DriverResult<()> {
        Self::write(el, value)?;
        el.trigger("change");
        Ok(())
    }

    /// Accepts a string, or `{ "value"?, "placeholder"? }`.
    fn receive_update(&self, el: &Element, value: &Value) -> DriverResult<()> {
        let Value::Object(patch) = value else {
            return self.set_value(el, value);
        };

        if let Some(placeholder) = patch.get("placeholder") {
            let text = placeholder
                .as_str()
                .ok_or_else(|| DriverError::invalid("a string placeholder", placeholder))?;
            el.set_attr("placeholder", text);
        }
        if let Some(value) = patch.get("value") {
            self.set_value(el, value)?;
        }
        Ok(())
    }

    fn subscribe(&self, el: &Element, callback: ChangeCallback) -> DriverResult<()> {
        on_change(el, "keyup input", Self::NAME, &callback, true);
        on_change(el, "change", Self::NAME, &callback, false);
        Ok(())
    }

    fn unsubscribe(&self, el: &Element) -> DriverResult<()> {
        super::unsubscribe_namespace(el, Self::NAME);
        Ok(())
    }

    fn rate_policy(&self) -> Option<RatePolicy> {
        Some(RatePolicy::debounce(TYPING_DEBOUNCE_MS))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_round_trip() {
        let input = Element::new("input").with_attr("type", "text");
        let area = Element::new("textarea");
        for el in [&input, &area] {
            for v in ["", "hello", "multi\nline"] {
                TextDriver.set_value(el, &json!(v)).unwrap();
                assert_eq!(TextDriver.get_value(el).unwrap(), json!(v));
            }
        }
    }

    #[test]
    fn test_null_clears() {
        let el = Element::new("textarea").with_value("draft");
        TextDriver.set_value(&el, &Value::Null).unwrap();
        assert_eq!(el.value(), "");
        assert!(TextDriver.set_value(&el, &json!(42)).is_err());
    }

    #[test]
    fn test_keystrokes_batched_blur_bypasses() {
        let el = Element::new("input").with_attr("type", "text");
        let flags = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&flags);
        TextDriver
            .subscribe(&el, Arc::new(move |rate_limited| seen.lock().push(rate_limited)))
            .unwrap();

        el.simulate_edit(&json!("a"), false);
        el.trigger("keyup");
        el.simulate_edit(&json!("ab"), true);
        assert_eq!(*flags.lock(), vec![true, true, true, false]);
    }

    #[test]
    fn test_receive_patch() {
        let el = Element::new("input").with_attr("type", "text").with_value("old");
        TextDriver
            .receive_update(&el, &json!({ "placeholder": "Your name" }))
            .unwrap();
        assert_eq!(el.attr("placeholder").as_deref(), Some("Your name"));
        assert_eq!(el.value(), "old");

        TextDriver.receive_update(&el, &json!({ "value": "new" })).unwrap();
        assert_eq!(TextDriver.get_value(&el).unwrap(), json!("new"));
    }

    #[test]
    fn test_policy() {
        assert_eq!(TextDriver.rate_policy(), Some(RatePolicy::debounce(250)));
    }
}
