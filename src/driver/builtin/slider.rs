use crate::core::{RatePolicy, Value};
use crate::dom::{Element, Selector};
use crate::driver::{
    ChangeCallback, Driver, DriverError, DriverResult, format_number, number_value, value_as_f64,
};

use super::TYPING_DEBOUNCE_MS;

const DEFAULT_MIN: f64 = 0.0;
const DEFAULT_MAX: f64 = 100.0;

/// Set on a slider to send every change immediately.
const IMMEDIATE_ATTR: &str = "data-immediate";

/// Range inputs and `.js-range-slider` widgets.
///
/// Writes outside `[min, max]` are rejected, so a value that was accepted
/// reads back unchanged. Moving the bounds reclamps the current value. A
/// widget without a parseable value reports `data-from`, then the middle of
/// its range.
#[derive(Debug, Clone, Copy, Default)]
pub struct SliderDriver;

impl SliderDriver {
    pub const NAME: &'static str = "slider";

    fn bounds(el: &Element) -> (f64, f64) {
        let min = el.attr_f64("min").unwrap_or(DEFAULT_MIN);
        let max = el.attr_f64("max").unwrap_or(DEFAULT_MAX);
        if max < min { (min, min) } else { (min, max) }
    }

    fn current(el: &Element) -> f64 {
        el.value()
            .trim()
            .parse()
            .ok()
            .or_else(|| el.attr_f64("data-from"))
            .unwrap_or_else(|| {
                let (min, max) = Self::bounds(el);
                min + (max - min) / 2.0
            })
    }

    fn write(el: &Element, n: f64, value: &Value) -> DriverResult<()> {
        let (min, max) = Self::bounds(el);
        if !(min..=max).contains(&n) {
            return Err(DriverError::invalid("a number within [min, max]", value));
        }
        el.set_value(&format_number(n));
        Ok(())
    }
}

impl Driver for SliderDriver {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn find(&self, scope: &Element) -> Vec<Element> {
        scope.select(
            &Selector::tag("input")
                .attr_eq("type", "range")
                .or(Selector::any().class("js-range-slider")),
        )
    }

    fn get_value(&self, el: &Element) -> DriverResult<Value> {
        Ok(number_value(Self::current(el)))
    }

    fn set_value(&self, el: &Element, value: &Value) -> DriverResult<()> {
        let n = value_as_f64(value).ok_or_else(|| DriverError::invalid("a number", value))?;
        Self::write(el, n, value)?;
        el.trigger("change");
        Ok(())
    }

    /// Accepts a number or `{ "value"?, "min"?, "max"?, "step"? }`.
    ///
    /// Bounds are applied first. An explicit value must lie in the new
    /// range; without one the current value is clamped into it.
    fn receive_update(&self, el: &Element, value: &Value) -> DriverResult<()> {
        let Value::Object(patch) = value else {
            return self.set_value(el, value);
        };

        let current = Self::current(el);
        for bound in ["min", "max", "step"] {
            if let Some(v) = patch.get(bound) {
                let n = value_as_f64(v).ok_or_else(|| DriverError::invalid("a number bound", v))?;
                el.set_attr(bound, &format_number(n));
            }
        }
        match patch.get("value") {
            Some(v) => {
                let n = value_as_f64(v).ok_or_else(|| DriverError::invalid("a number", v))?;
                Self::write(el, n, v)?;
            }
            None => {
                let (min, max) = Self::bounds(el);
                el.set_value(&format_number(current.clamp(min, max)));
            }
        }
        el.trigger("change");
        Ok(())
    }

    fn subscribe(&self, el: &Element, callback: ChangeCallback) -> DriverResult<()> {
        let handler: crate::dom::Handler = std::sync::Arc::new(move |event| {
            callback(!event.target.has_attr(IMMEDIATE_ATTR));
        });
        el.on("change", Self::NAME, handler);
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
