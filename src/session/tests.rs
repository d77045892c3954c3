use std::sync::Arc;

use serde_json::json;

use super::*;
use crate::channel::RecordingChannel;
use crate::dom::{Document, Selector};
use crate::driver::on_change;

/// Boolean control: `.toggle` elements valued by `checked`.
struct ToggleDriver;

impl Driver for ToggleDriver {
    fn name(&self) -> &str {
        "toggle"
    }

    fn find(&self, scope: &Element) -> Vec<Element> {
        scope.select(&Selector::any().class("toggle"))
    }

    fn get_value(&self, el: &Element) -> DriverResult<Value> {
        Ok(Value::Bool(el.checked()))
    }

    fn set_value(&self, el: &Element, value: &Value) -> DriverResult<()> {
        let on = value
            .as_bool()
            .ok_or_else(|| DriverError::invalid("a boolean", value))?;
        el.set_checked(on);
        el.trigger("change");
        Ok(())
    }

    fn subscribe(&self, el: &Element, callback: ChangeCallback) -> DriverResult<()> {
        on_change(el, "change", "toggle", &callback, true);
        Ok(())
    }

    fn unsubscribe(&self, el: &Element) -> DriverResult<()> {
        el.off("toggle");
        Ok(())
    }

    fn rate_policy(&self) -> Option<RatePolicy> {
        Some(RatePolicy::throttle(1000))
    }
}

/// Panics on every read.
struct Exploding;

impl Driver for Exploding {
    fn name(&self) -> &str {
        "exploding"
    }

    fn find(&self, scope: &Element) -> Vec<Element> {
        scope.select(&Selector::any().class("exploding"))
    }

    fn get_value(&self, _el: &Element) -> DriverResult<Value> {
        panic!("sensor offline")
    }

    fn subscribe(&self, el: &Element, callback: ChangeCallback) -> DriverResult<()> {
        on_change(el, "change", "exploding", &callback, true);
        Ok(())
    }

    fn unsubscribe(&self, el: &Element) -> DriverResult<()> {
        el.off("exploding");
        Ok(())
    }
}

struct Harness {
    clock: ManualClock,
    channel: RecordingChannel,
    session: BindingSession<RecordingChannel>,
}

fn harness(registry: Registry, options: SessionOptions) -> Harness {
    let clock = ManualClock::new();
    let channel = RecordingChannel::with_clock(Arc::new(clock.clone()));
    let session = BindingSession::new(Arc::new(registry), channel.clone())
        .with_clock(Arc::new(clock.clone()))
        .with_options(options);
    Harness {
        clock,
        channel,
        session,
    }
}

fn builtin() -> Harness {
    harness(Registry::with_builtin(), SessionOptions::default())
}

fn with_toggle() -> Harness {
    let mut registry = Registry::with_builtin();
    registry.register("toggle", ToggleDriver);
    harness(registry, SessionOptions::default())
}

fn page(markup: &str) -> Document {
    Document::from_html(markup).unwrap()
}

// ============================================================================
// binding
// ============================================================================

#[test]
fn test_bind_all_uses_first_matching_driver() {
    let mut h = builtin();
    let doc = page(
        r#"<form>
             <input type="checkbox" id="agree">
             <input type="text" id="name" value="Ada">
             <input type="range" id="volume" min="0" max="10" value="4">
             <input type="number" id="count" value="3">
           </form>"#,
    );

    let report = h.session.bind_all(doc.root());
    assert!(report.skipped.is_empty(), "{:?}", report.skipped);
    assert_eq!(report.bound.len(), 4);

    let drivers: Vec<(String, String)> = h
        .session
        .bindings()
        .into_iter()
        .map(|b| (b.id.to_string(), b.driver))
        .collect();
    assert!(drivers.contains(&("agree".into(), "checkbox".into())));
    assert!(drivers.contains(&("volume".into(), "slider".into())));
    assert_eq!(h.session.policy_of("name"), Some(RatePolicy::debounce(250)));
    assert_eq!(h.session.policy_of("agree"), Some(RatePolicy::Immediate));
}

#[test]
fn test_initial_values_are_not_dispatched() {
    let mut h = builtin();
    let doc = page(r#"<input type="text" id="name" value="Ada">"#);
    h.session.bind_all(doc.root());

    assert_eq!(
        h.session.initial_values(),
        vec![(InputId::new("name"), json!("Ada"))]
    );
    h.session.run_until(&h.clock, 10_000);
    assert!(h.channel.is_empty());
}

#[test]
fn test_rebinding_is_idempotent() {
    let mut h = builtin();
    let doc = page(r#"<input type="checkbox" id="agree">"#);

    assert_eq!(h.session.bind_all(doc.root()).bound.len(), 1);
    assert!(h.session.bind_all(doc.root()).bound.is_empty());

    let el = doc.get_element_by_id("agree").unwrap();
    assert_eq!(h.session.bind(&el).unwrap(), InputId::new("agree"));
    assert_eq!(el.listener_count(), 1);
}

#[test]
fn test_unmatched_marker_is_reported_not_raised() {
    let mut h = builtin();
    let doc = page(
        r#"<div>
             <div class="color-wheel" id="hue" data-bind></div>
             <input type="checkbox" id="agree">
           </div>"#,
    );

    let report = h.session.bind_all(doc.root());
    assert_eq!(report.bound, vec![InputId::new("agree")]);
    assert!(matches!(
        report.skipped.as_slice(),
        [BindError::DriverNotFound { .. }]
    ));

    let hue = doc.get_element_by_id("hue").unwrap();
    assert!(matches!(
        h.session.bind(&hue),
        Err(BindError::DriverNotFound { .. })
    ));
}

#[test]
fn test_mixed_case_marker_matches() {
    let mut options = SessionOptions::default();
    options.marker = "data-Live".to_string();
    let mut h = harness(Registry::with_builtin(), options);
    let doc = page(r#"<div class="gauge" id="rpm" data-live></div>"#);

    let report = h.session.bind_all(doc.root());
    assert!(matches!(
        report.skipped.as_slice(),
        [BindError::DriverNotFound { .. }]
    ));
}

#[test]
fn test_duplicate_and_missing_ids() {
    let mut h = builtin();
    let doc = page(
        r#"<div>
             <input type="checkbox" id="agree">
             <input type="checkbox" data-input-id="agree">
             <input type="checkbox">
           </div>"#,
    );

    let report = h.session.bind_all(doc.root());
    assert_eq!(report.bound, vec![InputId::new("agree")]);
    let kinds: Vec<&str> = report.skipped.iter().map(BindError::kind).collect();
    assert_eq!(kinds, vec!["duplicate-id", "missing-id"]);
    assert_eq!(h.session.diagnostics().len(), 2);
}

#[test]
fn test_override_replaces_driver_policy() {
    let options = SessionOptions::default().with_override("text", RatePolicy::throttle(500));
    let mut h = harness(Registry::with_builtin(), options);
    let doc = page(r#"<input type="text" id="name">"#);
    h.session.bind_all(doc.root());

    assert_eq!(h.session.policy_of("name"), Some(RatePolicy::throttle(500)));
}

// ============================================================================
// rate limiting through the session
// ============================================================================

#[test]
fn test_huge_delay_does_not_overflow() {
    let options = SessionOptions::default().with_override("text", RatePolicy::debounce(u64::MAX));
    let mut h = harness(Registry::with_builtin(), options);
    let doc = page(r#"<input type="text" id="name">"#);
    h.session.bind_all(doc.root());

    doc.get_element_by_id("name")
        .unwrap()
        .simulate_edit(&json!("a"), false);
    assert_eq!(h.session.pump(), 1);
    h.session.run_until(&h.clock, 5000);
    assert!(h.channel.is_empty());
    assert_eq!(h.session.next_deadline(), Some(u64::MAX));
}

#[test]
fn test_toggle_throttle_burst() {
    let mut h = with_toggle();
    let doc = page(r#"<div class="toggle" id="switch"></div>"#);
    h.session.bind_all(doc.root());
    assert_eq!(
        h.session.initial_values(),
        vec![(InputId::new("switch"), json!(false))]
    );

    let switch = h.session.element("switch").unwrap();
    for (t, on) in [(0, true), (50, false), (100, true), (150, false), (200, true)] {
        h.clock.set(t);
        switch.set_checked(on);
        switch.trigger("change");
        h.session.pump();
    }
    h.session.run_until(&h.clock, 5000);

    let sent = h.channel.sent();
    assert_eq!(sent.len(), 2, "{sent:?}");
    assert_eq!((sent[0].at_ms, &sent[0].message.value), (0, &json!(true)));
    assert_eq!((sent[1].at_ms, &sent[1].message.value), (1000, &json!(true)));
    assert!(sent.iter().all(|s| s.message.rate_limited));
}

#[test]
fn test_typing_is_debounced() {
    let mut h = builtin();
    let doc = page(r#"<input type="text" id="name">"#);
    h.session.bind_all(doc.root());
    let name = doc.get_element_by_id("name").unwrap();

    for (t, text) in [(0, "a"), (100, "ab"), (200, "abc")] {
        h.clock.set(t);
        name.simulate_edit(&json!(text), false);
        h.session.pump();
    }
    assert_eq!(h.session.sleep_duration(), Duration::from_millis(250));

    h.session.run_until(&h.clock, 449);
    assert!(h.channel.is_empty());
    h.session.run_until(&h.clock, 1000);

    let sent = h.channel.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].at_ms, 450);
    assert_eq!(sent[0].message.value, json!("abc"));
}

#[test]
fn test_commit_bypasses_pending_debounce() {
    let mut h = builtin();
    let doc = page(r#"<input type="text" id="name">"#);
    h.session.bind_all(doc.root());
    let name = doc.get_element_by_id("name").unwrap();

    h.clock.set(0);
    name.simulate_edit(&json!("dra"), false);
    h.clock.set(100);
    // Typing fires `input`, leaving the field fires `change`
    name.simulate_edit(&json!("draft"), true);
    h.session.run_until(&h.clock, 5000);

    let messages = h.channel.messages();
    assert_eq!(messages.len(), 1, "{messages:?}");
    assert_eq!(messages[0].value, json!("draft"));
    assert!(!messages[0].rate_limited);
}

#[test]
fn test_bypass_is_never_overtaken_by_batched_value() {
    let mut h = builtin();
    let doc = page(r#"<input type="text" id="name">"#);
    h.session.bind_all(doc.root());
    let name = doc.get_element_by_id("name").unwrap();

    h.clock.set(0);
    name.simulate_edit(&json!("one"), false);
    h.session.pump();
    h.clock.set(100);
    name.set_value("two");
    name.trigger("change");
    h.session.pump();
    h.session.run_until(&h.clock, 5000);

    assert_eq!(h.channel.values_for("name"), vec![json!("two")]);
}

// ============================================================================
// unbinding and teardown
// ============================================================================

#[test]
fn test_unbind_stops_dispatch() {
    let mut h = builtin();
    let doc = page(r#"<input type="checkbox" id="agree">"#);
    h.session.bind_all(doc.root());
    let agree = doc.get_element_by_id("agree").unwrap();

    assert!(h.session.unbind(&agree));
    assert!(!h.session.unbind(&agree));
    assert_eq!(agree.listener_count(), 0);

    agree.simulate_edit(&json!(true), true);
    h.session.run_until(&h.clock, 1000);
    assert!(h.channel.is_empty());
}

#[test]
fn test_unbind_cancels_pending_value() {
    let mut h = builtin();
    let doc = page(r#"<input type="text" id="name">"#);
    h.session.bind_all(doc.root());
    let name = doc.get_element_by_id("name").unwrap();

    name.simulate_edit(&json!("half"), false);
    h.session.pump();
    assert!(h.session.unbind_id("name"));
    h.session.run_until(&h.clock, 5000);

    assert!(h.channel.is_empty());
    assert_eq!(h.session.next_deadline(), None);
}

#[test]
fn test_prune_detached() {
    let mut h = builtin();
    let doc = page(
        r#"<form>
             <input type="checkbox" id="keep">
             <div id="panel"><input type="checkbox" id="gone"></div>
           </form>"#,
    );
    h.session.bind_all(doc.root());

    doc.get_element_by_id("panel").unwrap().detach();
    assert_eq!(h.session.prune_detached(doc.root()), 1);
    assert_eq!(h.session.bound_ids(), vec![InputId::new("keep")]);
}

#[test]
fn test_unbind_all_scope() {
    let mut h = builtin();
    let doc = page(
        r#"<form>
             <input type="checkbox" id="outside">
             <div id="panel">
               <input type="checkbox" id="a">
               <input type="text" id="b">
             </div>
           </form>"#,
    );
    h.session.bind_all(doc.root());

    let panel = doc.get_element_by_id("panel").unwrap();
    assert_eq!(h.session.unbind_all(&panel), 2);
    assert!(h.session.is_bound("outside"));
    assert!(!h.session.is_bound("a"));
}

#[test]
fn test_teardown_cancels_timers() {
    let mut h = with_toggle();
    let doc = page(
        r#"<div>
             <div class="toggle" id="switch"></div>
             <input type="text" id="name">
           </div>"#,
    );
    h.session.bind_all(doc.root());
    let switch = doc.get_element_by_id("switch").unwrap();
    let name = doc.get_element_by_id("name").unwrap();

    switch.set_checked(true);
    switch.trigger("change");
    switch.set_checked(false);
    switch.trigger("change");
    name.simulate_edit(&json!("pending"), false);
    h.session.pump();
    assert_eq!(h.channel.len(), 1);

    h.session.teardown();
    h.session.teardown();
    assert!(h.session.is_torn_down());
    assert_eq!(switch.listener_count(), 0);
    assert_eq!(h.session.next_deadline(), None);

    h.clock.set(10_000);
    assert_eq!(h.session.tick(), 0);
    assert_eq!(h.channel.len(), 1);
    assert_eq!(
        h.session.handle_inbound(&InboundMessage::new("switch", json!(true))),
        Err(BindError::SessionClosed)
    );
}

// ============================================================================
// inbound updates and echo
// ============================================================================

#[test]
fn test_inbound_update_sets_state_and_fires_once() {
    let mut h = builtin();
    let doc = page(r#"<input type="range" id="volume" min="0" max="10" value="4">"#);
    h.session.bind_all(doc.root());
    let volume = doc.get_element_by_id("volume").unwrap();

    h.session
        .handle_inbound(&InboundMessage::new("volume", json!({"value": 7, "max": 20})))
        .unwrap();
    assert_eq!(volume.value(), "7");
    assert_eq!(volume.attr("max").as_deref(), Some("20"));

    h.session.run_until(&h.clock, 5000);
    // Mirror: the one change event is echoed once
    assert_eq!(h.channel.values_for("volume"), vec![json!(7)]);
}

#[test]
fn test_unknown_target_and_malformed_json() {
    let mut h = builtin();
    let doc = page(r#"<input type="checkbox" id="agree">"#);
    h.session.bind_all(doc.root());

    assert_eq!(
        h.session.handle_inbound(&InboundMessage::new("ghost", json!(1))),
        Err(BindError::UnknownTargetId { id: "ghost".into() })
    );
    assert_eq!(h.session.handle_inbound_json("{not json"), 0);
    assert_eq!(
        h.session
            .handle_inbound_json(r#"[{"id": "agree", "value": true}, {"value": 1}]"#),
        1
    );

    let kinds: Vec<&str> = h.session.diagnostics().iter().map(BindError::kind).collect();
    assert_eq!(kinds, vec!["unknown-target", "malformed", "malformed"]);
    assert!(doc.get_element_by_id("agree").unwrap().checked());
}

#[test]
fn test_echo_suppress() {
    let options = SessionOptions::default().with_echo(EchoPolicy::Suppress);
    let mut h = harness(Registry::with_builtin(), options);
    let doc = page(r#"<input type="checkbox" id="agree">"#);
    h.session.bind_all(doc.root());

    h.session
        .handle_inbound(&InboundMessage::new("agree", json!(true)))
        .unwrap();
    h.session.run_until(&h.clock, 1000);
    assert!(h.channel.is_empty());

    // Local edits still go out
    doc.get_element_by_id("agree")
        .unwrap()
        .simulate_edit(&json!(false), true);
    h.session.tick();
    assert_eq!(h.channel.values_for("agree"), vec![json!(false)]);
}

#[test]
fn test_echo_suppress_drops_staged_local_value() {
    let options = SessionOptions::default().with_echo(EchoPolicy::Suppress);
    let mut h = harness(Registry::with_builtin(), options);
    let doc = page(r#"<input type="text" id="name">"#);
    h.session.bind_all(doc.root());
    let name = doc.get_element_by_id("name").unwrap();

    name.simulate_edit(&json!("abc"), false);
    h.session.pump();
    h.clock.set(100);
    h.session
        .handle_inbound(&InboundMessage::new("name", json!("xyz")))
        .unwrap();
    h.session.run_until(&h.clock, 5000);

    assert_eq!(name.value(), "xyz");
    assert!(h.channel.is_empty());
}

#[test]
fn test_echo_skip_unchanged() {
    let options = SessionOptions::default().with_echo(EchoPolicy::SkipUnchanged);
    let mut h = harness(Registry::with_builtin(), options);
    let doc = page(r#"<input type="checkbox" id="agree">"#);
    h.session.bind_all(doc.root());
    let agree = doc.get_element_by_id("agree").unwrap();

    h.session
        .handle_inbound(&InboundMessage::new("agree", json!(true)))
        .unwrap();
    // Same value the server just pushed
    agree.simulate_edit(&json!(true), true);
    h.session.tick();
    assert!(h.channel.is_empty());

    agree.simulate_edit(&json!(false), true);
    agree.simulate_edit(&json!(false), true);
    h.session.tick();
    assert_eq!(h.channel.values_for("agree"), vec![json!(false)]);
}

#[test]
fn test_echo_mirror_default() {
    let mut h = builtin();
    assert_eq!(h.session.options().echo, EchoPolicy::Mirror);
    let doc = page(r#"<input type="checkbox" id="agree">"#);
    h.session.bind_all(doc.root());

    h.session
        .handle_inbound(&InboundMessage::new("agree", json!(true)))
        .unwrap();
    assert_eq!(h.channel.values_for("agree"), vec![json!(true)]);
}

// ============================================================================
// deferred mode
// ============================================================================

#[test]
fn test_deferred_holds_until_flush() {
    let options = SessionOptions::default().with_defer(true);
    let mut h = harness(Registry::with_builtin(), options);
    let doc = page(
        r#"<form>
             <input type="text" id="name">
             <input type="checkbox" id="agree">
           </form>"#,
    );
    h.session.bind_all(doc.root());
    let name = doc.get_element_by_id("name").unwrap();
    let agree = doc.get_element_by_id("agree").unwrap();

    name.simulate_edit(&json!("A"), false);
    agree.simulate_edit(&json!(true), true);
    name.simulate_edit(&json!("Ada"), false);
    h.session.run_until(&h.clock, 5000);
    assert!(h.channel.is_empty());
    assert_eq!(h.session.pending_deferred(), 2);

    assert_eq!(h.session.flush_deferred(), 2);
    let messages = h.channel.messages();
    let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["name", "agree"]);
    assert_eq!(messages[0].value, json!("Ada"));
    assert_eq!(h.session.flush_deferred(), 0);
}

// ============================================================================
// fault isolation
// ============================================================================

#[test]
fn test_panicking_driver_is_isolated() {
    let mut registry = Registry::with_builtin();
    registry.register("exploding", Exploding);
    let mut h = harness(registry, SessionOptions::default());
    let doc = page(
        r#"<div>
             <div class="exploding" id="gauge"></div>
             <input type="checkbox" id="agree">
           </div>"#,
    );

    let report = h.session.bind_all(doc.root());
    assert_eq!(report.bound.len(), 2);
    assert!(h.session.bindings().iter().any(|b| b.id == "gauge" && b.initial.is_none()));

    doc.get_element_by_id("gauge").unwrap().trigger("change");
    doc.get_element_by_id("agree")
        .unwrap()
        .simulate_edit(&json!(true), true);
    h.session.tick();

    assert_eq!(h.channel.values_for("agree"), vec![json!(true)]);
    let faults = h
        .session
        .diagnostics()
        .iter()
        .filter(|e| matches!(e, BindError::DriverFault { op: "get_value", .. }))
        .count();
    assert_eq!(faults, 2);
}

#[test]
fn test_send_failure_is_recorded() {
    let mut h = builtin();
    let doc = page(r#"<input type="checkbox" id="agree">"#);
    h.session.bind_all(doc.root());

    h.channel.set_closed(true);
    doc.get_element_by_id("agree")
        .unwrap()
        .simulate_edit(&json!(true), true);
    h.session.tick();

    assert!(h.channel.is_empty());
    assert!(matches!(
        h.session.take_diagnostics().as_slice(),
        [BindError::SendFailed { .. }]
    ));
}

#[test]
fn test_resubscribe_keeps_queued_edits() {
    let mut h = builtin();
    let doc = page(r#"<input type="checkbox" id="agree">"#);
    h.session.bind_all(doc.root());
    let agree = doc.get_element_by_id("agree").unwrap();

    agree.simulate_edit(&json!(true), true);
    h.session.resubscribe("agree").unwrap();
    h.session.run_until(&h.clock, 5000);
    assert_eq!(h.channel.values_for("agree"), vec![json!(true)]);
    assert_eq!(agree.listener_count(), 1);

    agree.simulate_edit(&json!(false), true);
    h.session.tick();
    assert_eq!(h.channel.values_for("agree"), vec![json!(true), json!(false)]);
}
