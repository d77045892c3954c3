use crate::core::{RatePolicy, Value};
use crate::dom::{Element, Selector};
use crate::driver::{
    ChangeCallback, Driver, DriverError, DriverResult, format_number, number_value, on_change,
    value_as_f64,
};

use super::TYPING_DEBOUNCE_MS;

/// `input[type=number]`. An empty or unparseable field reads as `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberDriver;

impl NumberDriver {
    pub const NAME: &'static str = "number";

    fn write(el: &Element, value: &Value) -> DriverResult<()> {
        if value.is_null() {
            el.set_value("");
            return Ok(());
        }
        let n = value_as_f64(value).ok_or_else(|| DriverError::invalid("a number", value))?;
        el.set_value(&format_number(n));
        Ok(())
    }

    fn write_bound(el: &Element, name: &str, value: &Value) -> DriverResult<()> {
        match value {
            Value::Null => {
                el.remove_attr(name);
            }
            other => {
                let n = value_as_f64(other)
                    .ok_or_else(|| DriverError::invalid("a number bound", other))?;
                el.set_attr(name, &format_number(n));
            }
        }
        Ok(())
    }
}

impl Driver for NumberDriver {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn find(&self, scope: &Element) -> Vec<Element> {
        scope.select(&Selector::tag("input").attr_eq("type", "number"))
    }

    fn get_value(&self, el: &Element) -> DriverResult<Value> {
        Ok(el
            .value()
            .trim()
            .parse::<f64>()
            .map_or(Value::Null, number_value))
    }

    fn set_value(&self, el: &Element, value: &Value) -> DriverResult<()> {
        Self::write(el, value)?;
        el.trigger("change");
        Ok(())
    }

    /// Accepts a number, `null`, or `{ "value"?, "min"?, "max"?, "step"? }`.
    /// A patch fires a single `change` after every field is applied.
    fn receive_update(&self, el: &Element, value: &Value) -> DriverResult<()> {
        let Value::Object(patch) = value else {
            return self.set_value(el, value);
        };

        for bound in ["min", "max", "step"] {
            if let Some(v) = patch.get(bound) {
                Self::write_bound(el, bound, v)?;
            }
        }
        if let Some(v) = patch.get("value") {
            Self::write(el, v)?;
        }
        el.trigger("change");
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
