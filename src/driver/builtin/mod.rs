//! Reference drivers.
//!
//! | Driver     | Controls                                 | Policy       |
//! |------------|------------------------------------------|--------------|
//! | `checkbox` | `input[type=checkbox]`                   | immediate    |
//! | `number`   | `input[type=number]`                     | debounce 250 |
//! | `slider`   | `input[type=range]`, `.js-range-slider`  | debounce 250 |
//! | `text`     | `input[type=text]`, `textarea`           | debounce 250 |

mod checkbox;
mod number;
mod slider;
mod text;

pub use checkbox::CheckboxDriver;
pub use number::NumberDriver;
pub use slider::SliderDriver;
pub use text::TextDriver;

use super::Registry;

/// Delay shared by the typing-style drivers.
pub const TYPING_DEBOUNCE_MS: u64 = 250;

/// Register every reference driver.
pub fn register_all(registry: &mut Registry) {
    registry.register(CheckboxDriver::NAME, CheckboxDriver);
    registry.register(NumberDriver::NAME, NumberDriver);
    registry.register(SliderDriver::NAME, SliderDriver);
    registry.register(TextDriver::NAME, TextDriver);
}

/// Drivers use their own name as the listener namespace.
fn unsubscribe_namespace(el: &crate::dom::Element, namespace: &str) {
    let removed = el.off(namespace);
    if removed > 0 {
        crate::debug!("driver"; "{}: removed {} listener(s) from {:?}", namespace, removed, el);
    }
}
