use crate::core::Value;
use crate::dom::{Element, Selector};
use crate::driver::{ChangeCallback, Driver, DriverError, DriverResult, on_change};

/// `input[type=checkbox]`, valued by its `checked` property.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckboxDriver;

impl CheckboxDriver {
    pub const NAME: &'static str = "checkbox";
}

impl Driver for CheckboxDriver {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn find(&self, scope: &Element) -> Vec<Element> {
        scope.select(&Selector::tag("input").attr_eq("type", "checkbox"))
    }

    fn get_value(&self, el: &Element) -> DriverResult<Value> {
        Ok(Value::Bool(el.checked()))
    }

    fn set_value(&self, el: &Element, value: &Value) -> DriverResult<()> {
        let checked = value
            .as_bool()
            .ok_or_else(|| DriverError::invalid("a boolean", value))?;
        el.set_checked(checked);
        el.trigger("change");
        Ok(())
    }

    fn subscribe(&self, el: &Element, callback: ChangeCallback) -> DriverResult<()> {
        on_change(el, "change", Self::NAME, &callback, true);
        Ok(())
    }

    fn unsubscribe(&self, el: &Element) -> DriverResult<()> {
        super::unsubscribe_namespace(el, Self::NAME);
        Ok(())
    }
}
