//! In-process document model.
//!
//! Plays the role of the DOM provider for drivers: a tree of elements with
//! attributes, the `value`/`checked` properties form controls carry, and
//! namespaced event listeners.
//!
//! # Module Structure
//!
//! - `selector` - Compound selectors (`input[type=checkbox]`, `.slider`)
//! - `html` - Build a document from HTML markup (via `tl`)
//!
//! Listeners are keyed by a namespace so a driver can remove exactly the
//! handlers it installed (`el.off("checkbox")`), leaving other consumers of
//! the same event untouched.

mod html;
mod selector;

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use thiserror::Error;

pub use selector::Selector;

/// Document model errors
#[derive(Debug, Error)]
pub enum DomError {
    #[error("invalid selector `{selector}`: {reason}")]
    Selector { selector: String, reason: String },

    #[error("HTML parse error: {0}")]
    Html(String),
}

/// Event listener callback
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// An event dispatched on an element.
#[derive(Clone)]
pub struct Event {
    /// Event type (`change`, `input`, `keyup`, ...)
    pub kind: String,
    /// Element the event was dispatched on
    pub target: Element,
}

struct Listener {
    events: Vec<String>,
    namespace: String,
    handler: Handler,
}

#[derive(Default)]
struct NodeState {
    attrs: FxHashMap<String, String>,
    value: String,
    checked: bool,
    text: String,
    children: Vec<Element>,
    parent: Weak<Node>,
    listeners: Vec<Listener>,
}

struct Node {
    tag: String,
    state: Mutex<NodeState>,
}

/// Handle to one element. Clones share the same node; equality is identity.
#[derive(Clone)]
pub struct Element(Arc<Node>);

/// Stable identity of an element, usable as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementKey(usize);

impl Element {
    /// Create a detached element.
    pub fn new(tag: &str) -> Self {
        Self(Arc::new(Node {
            tag: tag.to_ascii_lowercase(),
            state: Mutex::new(NodeState::default()),
        }))
    }

    // ------------------------------------------------------------------------
    // builder helpers
    // ------------------------------------------------------------------------

    /// Set an attribute, builder style.
    pub fn with_attr(self, name: &str, value: &str) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_id(self, id: &str) -> Self {
        self.with_attr("id", id)
    }

    pub fn with_class(self, class: &str) -> Self {
        self.add_class(class);
        self
    }

    pub fn with_value(self, value: &str) -> Self {
        self.set_value(value);
        self
    }

    pub fn with_checked(self, checked: bool) -> Self {
        self.set_checked(checked);
        self
    }

    pub fn with_child(self, child: Element) -> Self {
        self.append_child(&child);
        self
    }

    // ------------------------------------------------------------------------
    // identity & attributes
    // ------------------------------------------------------------------------

    pub fn key(&self) -> ElementKey {
        ElementKey(Arc::as_ptr(&self.0) as usize)
    }

    pub fn ptr_eq(&self, other: &Element) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn tag(&self) -> &str {
        &self.0.tag
    }

    pub fn id(&self) -> Option<String> {
        self.attr("id").filter(|id| !id.is_empty())
    }

    /// Attribute names are ASCII case-insensitive, as in HTML.
    pub fn attr(&self, name: &str) -> Option<String> {
        self.0
            .state
            .lock()
            .attrs
            .get(&name.to_ascii_lowercase())
            .cloned()
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.0
            .state
            .lock()
            .attrs
            .contains_key(&name.to_ascii_lowercase())
    }

    pub fn set_attr(&self, name: &str, value: &str) {
        self.0
            .state
            .lock()
            .attrs
            .insert(name.to_ascii_lowercase(), value.to_string());
    }

    pub fn remove_attr(&self, name: &str) -> Option<String> {
        self.0
            .state
            .lock()
            .attrs
            .remove(&name.to_ascii_lowercase())
    }

    pub fn classes(&self) -> Vec<String> {
        self.attr("class")
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|c| c.split_whitespace().any(|name| name == class))
    }

    pub fn add_class(&self, class: &str) {
        if self.has_class(class) {
            return;
        }
        let mut state = self.0.state.lock();
        let updated = match state.attrs.get("class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {class}", existing.trim()),
            _ => class.to_string(),
        };
        state.attrs.insert("class".to_string(), updated);
    }

    /// Numeric attribute, if present and parseable.
    pub fn attr_f64(&self, name: &str) -> Option<f64> {
        self.attr(name).and_then(|v| v.trim().parse().ok())
    }

    // ------------------------------------------------------------------------
    // form properties
    // ------------------------------------------------------------------------

    /// The `value` property. Writing it does not dispatch any event.
    pub fn value(&self) -> String {
        self.0.state.lock().value.clone()
    }

    pub fn set_value(&self, value: &str) {
        self.0.state.lock().value = value.to_string();
    }

    /// The `checked` property. Writing it does not dispatch any event.
    pub fn checked(&self) -> bool {
        self.0.state.lock().checked
    }

    pub fn set_checked(&self, checked: bool) {
        self.0.state.lock().checked = checked;
    }

    /// Text content of the element itself (not its descendants).
    pub fn text(&self) -> String {
        self.0.state.lock().text.clone()
    }

    pub fn set_text(&self, text: &str) {
        self.0.state.lock().text = text.to_string();
    }

    // ------------------------------------------------------------------------
    // tree
    // ------------------------------------------------------------------------

    /// Append `child`, detaching it from any previous parent first.
    pub fn append_child(&self, child: &Element) {
        child.detach();
        child.0.state.lock().parent = Arc::downgrade(&self.0);
        self.0.state.lock().children.push(child.clone());
    }

    /// Remove `child` if it is a direct child. Returns whether it was found.
    pub fn remove_child(&self, child: &Element) -> bool {
        let removed = {
            let mut state = self.0.state.lock();
            let before = state.children.len();
            state.children.retain(|c| !c.ptr_eq(child));
            before != state.children.len()
        };
        if removed {
            child.0.state.lock().parent = Weak::new();
        }
        removed
    }

    /// Detach from the parent, if any.
    pub fn detach(&self) {
        if let Some(parent) = self.parent() {
            parent.remove_child(self);
        }
    }

    pub fn parent(&self) -> Option<Element> {
        self.0.state.lock().parent.upgrade().map(Element)
    }

    pub fn children(&self) -> Vec<Element> {
        self.0.state.lock().children.clone()
    }

    /// Whether `other` is this element or one of its descendants.
    pub fn contains(&self, other: &Element) -> bool {
        let mut current = Some(other.clone());
        while let Some(el) = current {
            if el.ptr_eq(self) {
                return true;
            }
            current = el.parent();
        }
        false
    }

    /// This element followed by all descendants, in document order.
    pub fn subtree(&self) -> Vec<Element> {
        let mut out = Vec::new();
        let mut stack = vec![self.clone()];
        while let Some(el) = stack.pop() {
            let children = el.children();
            out.push(el);
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Elements in this subtree (including `self`) matching `selector`.
    pub fn select(&self, selector: &Selector) -> Vec<Element> {
        self.subtree()
            .into_iter()
            .filter(|el| selector.matches(el))
            .collect()
    }

    /// Parse `css` and select with it.
    pub fn query(&self, css: &str) -> Result<Vec<Element>, DomError> {
        Ok(self.select(&Selector::parse(css)?))
    }

    // ------------------------------------------------------------------------
    // events
    // ------------------------------------------------------------------------

    /// Install `handler` for the space-separated `events` under `namespace`.
    pub fn on(&self, events: &str, namespace: &str, handler: Handler) {
        let events = events.split_whitespace().map(str::to_string).collect();
        self.0.state.lock().listeners.push(Listener {
            events,
            namespace: namespace.to_string(),
            handler,
        });
    }

    /// Remove every listener installed under `namespace`. Returns the count.
    pub fn off(&self, namespace: &str) -> usize {
        let mut state = self.0.state.lock();
        let before = state.listeners.len();
        state.listeners.retain(|l| l.namespace != namespace);
        before - state.listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.0.state.lock().listeners.len()
    }

    /// Dispatch `kind` to matching listeners.
    ///
    /// Handlers run after the element lock is released, so a handler may
    /// freely read or write the element.
    pub fn trigger(&self, kind: &str) {
        let handlers: Vec<Handler> = self
            .0
            .state
            .lock()
            .listeners
            .iter()
            .filter(|l| l.events.iter().any(|e| e == kind))
            .map(|l| Arc::clone(&l.handler))
            .collect();

        let event = Event {
            kind: kind.to_string(),
            target: self.clone(),
        };
        for handler in handlers {
            handler(&event);
        }
    }

    /// Act like a user editing this control.
    ///
    /// Checkboxes take a boolean and fire `change`. Other controls take the
    /// value's text, fire `input`, and additionally `change` when `commit`
    /// is set (the user left the field) or the control is a range.
    pub fn simulate_edit(&self, value: &serde_json::Value, commit: bool) {
        let kind = self.attr("type").unwrap_or_default();
        if kind == "checkbox" {
            self.set_checked(value.as_bool().unwrap_or(false));
            self.trigger("change");
            return;
        }

        let text = match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        self.set_value(&text);
        self.trigger("input");
        if commit || kind == "range" {
            self.trigger("change");
        }
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Element {}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.tag())?;
        if let Some(id) = self.id() {
            write!(f, " id=\"{id}\"")?;
        }
        write!(f, ">")
    }
}

/// A document: a root element plus lookups.
#[derive(Debug, Clone)]
pub struct Document {
    root: Element,
}

impl Document {
    pub fn new() -> Self {
        Self {
            root: Element::new("body"),
        }
    }

    /// Parse HTML markup into a document.
    pub fn from_html(markup: &str) -> Result<Self, DomError> {
        let doc = Self::new();
        html::load_into(&doc.root, markup)?;
        Ok(doc)
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<Element> {
        self.root
            .subtree()
            .into_iter()
            .find(|el| el.id().as_deref() == Some(id))
    }

    pub fn query(&self, css: &str) -> Result<Vec<Element>, DomError> {
        self.root.query(css)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counter_handler(count: &Arc<AtomicUsize>) -> Handler {
        let count = Arc::clone(count);
        Arc::new(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_tree_contains_and_detach() {
        let child = Element::new("input").with_id("a");
        let form = Element::new("form").with_child(child.clone());
        let root = Element::new("body").with_child(form.clone());

        assert!(root.contains(&child));
        assert_eq!(root.subtree().len(), 3);

        form.remove_child(&child);
        assert!(!root.contains(&child));
        assert!(child.parent().is_none());
    }

    #[test]
    fn test_append_moves_between_parents() {
        let child = Element::new("span");
        let a = Element::new("div").with_child(child.clone());
        let b = Element::new("div");
        b.append_child(&child);

        assert!(a.children().is_empty());
        assert_eq!(b.children().len(), 1);
    }

    #[test]
    fn test_namespaced_listeners() {
        let el = Element::new("input");
        let driver_hits = Arc::new(AtomicUsize::new(0));
        let other_hits = Arc::new(AtomicUsize::new(0));

        el.on("change input", "checkbox", counter_handler(&driver_hits));
        el.on("change", "analytics", counter_handler(&other_hits));

        el.trigger("change");
        el.trigger("input");
        el.trigger("keyup");
        assert_eq!(driver_hits.load(Ordering::SeqCst), 2);
        assert_eq!(other_hits.load(Ordering::SeqCst), 1);

        assert_eq!(el.off("checkbox"), 1);
        assert_eq!(el.off("checkbox"), 0);
        el.trigger("change");
        assert_eq!(driver_hits.load(Ordering::SeqCst), 2);
        assert_eq!(other_hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_handler_may_touch_element() {
        let el = Element::new("input");
        el.on(
            "change",
            "self",
            Arc::new(|event: &Event| {
                event.target.set_attr("data-seen", "yes");
            }),
        );
        el.trigger("change");
        assert_eq!(el.attr("data-seen").as_deref(), Some("yes"));
    }

    #[test]
    fn test_attr_names_ignore_case() {
        let el = Element::new("input").with_attr("data-Bind", "").with_attr("MAX", "10");

        assert!(el.has_attr("data-bind"));
        assert!(el.has_attr("DATA-BIND"));
        assert_eq!(el.attr("Max").as_deref(), Some("10"));
        assert_eq!(el.remove_attr("MAX").as_deref(), Some("10"));
        assert!(!el.has_attr("max"));
    }

    #[test]
    fn test_classes() {
        let el = Element::new("div").with_class("a").with_class("b").with_class("a");
        assert_eq!(el.classes(), vec!["a", "b"]);
        assert!(el.has_class("b"));
        assert!(!el.has_class("c"));
    }

    #[test]
    fn test_simulate_edit_checkbox_fires_change() {
        let el = Element::new("input").with_attr("type", "checkbox");
        let hits = Arc::new(AtomicUsize::new(0));
        el.on("change", "test", counter_handler(&hits));

        el.simulate_edit(&serde_json::json!(true), false);
        assert!(el.checked());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_get_element_by_id() {
        let doc = Document::new();
        doc.root()
            .append_child(&Element::new("div").with_child(Element::new("input").with_id("x")));
        assert!(doc.get_element_by_id("x").is_some());
        assert!(doc.get_element_by_id("y").is_none());
    }
}
