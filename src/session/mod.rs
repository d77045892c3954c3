//! Binding Session
//!
//! Per-document runtime that binds controls to drivers and moves values
//! between them and the outbound channel.
//!
//! ```text
//! element event ──> driver listener ──> ChangeEvent queue
//!                                            │ pump()
//!                                            v
//!                                 get_value ──> RateLimiter ──> Channel::send
//!                                                    ^ tick()
//! inbound {id, value} ──> index lookup ──> receive_update ──> (echo policy)
//! ```
//!
//! Listeners never run driver logic: they only enqueue a [`ChangeEvent`].
//! Everything else happens on the thread that calls `pump`, `tick` or
//! `handle_inbound`, so the session needs no locking of its own.
//!
//! # Module Structure
//!
//! - `options` - Echo policy, deferred mode, rate overrides
//! - `actor` - Async loop driving a session for `serve`

pub mod actor;
mod options;
#[cfg(test)]
mod tests;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender, unbounded};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::channel::{Channel, InboundMessage, OutboundMessage, parse_batch};
use crate::core::{BindError, InputId, RatePolicy, Value};
use crate::dom::{Element, ElementKey};
use crate::driver::{ChangeCallback, Driver, DriverError, DriverResult, Registry};
use crate::limiter::{Clock, Dispatch, ManualClock, RateLimiter, SystemClock};

pub use options::{DEFAULT_MARKER, EchoPolicy, SessionOptions};

/// Sleep used by the actor when no timer is pending
const IDLE_SLEEP: Duration = Duration::from_secs(86400);

/// A change observed by a driver listener, waiting for `pump`.
#[derive(Debug, Clone)]
struct ChangeEvent {
    id: InputId,
    /// Binding generation the listener was installed for
    generation: u64,
    rate_limited: bool,
    at_ms: u64,
}

struct Binding {
    element: Element,
    driver_name: Arc<str>,
    driver: Arc<dyn Driver>,
    policy: RatePolicy,
    generation: u64,
    seq: u64,
    initial: Option<Value>,
    subscribed: bool,
}

/// Snapshot of one bound control.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingInfo {
    pub id: InputId,
    pub driver: String,
    pub policy: RatePolicy,
    /// Value read at bind time. Never dispatched.
    pub initial: Option<Value>,
    /// Whether the driver's listeners are installed
    pub subscribed: bool,
}

/// Outcome of [`BindingSession::bind_all`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindReport {
    pub bound: Vec<InputId>,
    pub skipped: Vec<BindError>,
}

/// Runtime binding one document's controls to a channel.
pub struct BindingSession<C: Channel> {
    registry: Arc<Registry>,
    channel: C,
    clock: Arc<dyn Clock>,
    options: SessionOptions,

    bindings: FxHashMap<InputId, Binding>,
    by_element: FxHashMap<ElementKey, InputId>,

    events_tx: Sender<ChangeEvent>,
    events_rx: Receiver<ChangeEvent>,
    limiter: RateLimiter,

    /// Last value sent or received per id
    last_values: FxHashMap<InputId, Value>,
    /// Held dispatches in first-seen order, latest value per id
    deferred: Vec<Dispatch>,

    diagnostics: Vec<BindError>,
    counter: u64,
    torn_down: bool,
}

impl<C: Channel> BindingSession<C> {
    pub fn new(registry: Arc<Registry>, channel: C) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            registry,
            channel,
            clock: Arc::new(SystemClock::new()),
            options: SessionOptions::default(),
            bindings: FxHashMap::default(),
            by_element: FxHashMap::default(),
            events_tx,
            events_rx,
            limiter: RateLimiter::new(),
            last_values: FxHashMap::default(),
            deferred: Vec::new(),
            diagnostics: Vec::new(),
            counter: 0,
            torn_down: false,
        }
    }

    /// Use `clock` for event timestamps and timers. Set before binding.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    // ========================================================================
    // binding
    // ========================================================================

    /// Bind every control under `scope` (inclusive).
    ///
    /// Drivers are asked in registration order and the first to find an
    /// element claims it. Elements carrying the marker attribute that no
    /// driver claimed are reported as [`BindError::DriverNotFound`].
    pub fn bind_all(&mut self, scope: &Element) -> BindReport {
        let mut report = BindReport::default();
        if self.torn_down {
            report.skipped.push(BindError::SessionClosed);
            return report;
        }

        let registry = Arc::clone(&self.registry);
        let scope_name = format!("{scope:?}");
        let mut claimed = FxHashSet::default();

        for (name, driver) in registry.iter() {
            let Ok(found) = self.guard(name, "find", &scope_name, || Ok(driver.find(scope))) else {
                continue;
            };
            for el in found {
                if !claimed.insert(el.key()) || self.by_element.contains_key(&el.key()) {
                    continue;
                }
                match self.bind_with(&el, name, driver) {
                    Ok(id) => report.bound.push(id),
                    Err(e) => report.skipped.push(e),
                }
            }
        }

        for el in scope.subtree() {
            if el.has_attr(&self.options.marker)
                && !claimed.contains(&el.key())
                && !self.by_element.contains_key(&el.key())
            {
                let err = BindError::DriverNotFound {
                    element: format!("{el:?}"),
                };
                self.record(err.clone());
                report.skipped.push(err);
            }
        }

        crate::debug!(
            "session";
            "bound {} control(s), skipped {}",
            report.bound.len(),
            report.skipped.len()
        );
        report
    }

    /// Bind one element, resolving its driver through the registry.
    ///
    /// Binding an element that is already bound returns its id.
    pub fn bind(&mut self, el: &Element) -> Result<InputId, BindError> {
        if self.torn_down {
            return Err(BindError::SessionClosed);
        }
        if let Some(id) = self.by_element.get(&el.key()) {
            return Ok(id.clone());
        }

        let registry = Arc::clone(&self.registry);
        let target = format!("{el:?}");
        for (name, driver) in registry.iter() {
            if let Ok(true) = self.guard(name, "matches", &target, || Ok(driver.matches(el))) {
                return self.bind_with(el, name, driver);
            }
        }

        let err = BindError::DriverNotFound { element: target };
        self.record(err.clone());
        Err(err)
    }

    fn bind_with(
        &mut self,
        el: &Element,
        name: &str,
        driver: &Arc<dyn Driver>,
    ) -> Result<InputId, BindError> {
        let target = format!("{el:?}");

        let id = self.guard(name, "get_id", &target, || Ok(driver.get_id(el)))?;
        let Some(id) = id.filter(|id| !id.is_empty()).map(InputId::from) else {
            let err = BindError::MissingId {
                driver: name.to_string(),
                element: target,
            };
            self.record(err.clone());
            return Err(err);
        };
        if self.bindings.contains_key(&id) {
            let err = BindError::DuplicateId { id: id.to_string() };
            self.record(err.clone());
            return Err(err);
        }

        self.guard(name, "initialize", id.as_str(), || driver.initialize(el))?;

        let policy = match self.options.overrides.get(name) {
            Some(policy) => *policy,
            None => self
                .guard(name, "rate_policy", id.as_str(), || Ok(driver.rate_policy()))
                .ok()
                .flatten()
                .unwrap_or_default(),
        };

        let generation = self.next_counter();
        let callback = self.change_callback(&id, generation);
        // A failed subscribe leaves the control bound; see `resubscribe`
        let subscribed = self
            .guard(name, "subscribe", id.as_str(), || driver.subscribe(el, callback))
            .is_ok();

        let initial = self
            .guard(name, "get_value", id.as_str(), || driver.get_value(el))
            .ok();
        if self.options.echo == EchoPolicy::SkipUnchanged
            && let Some(value) = &initial
        {
            self.last_values.insert(id.clone(), value.clone());
        }

        crate::debug!("bind"; "`{}` -> {} ({})", id, name, policy);
        self.bindings.insert(
            id.clone(),
            Binding {
                element: el.clone(),
                driver_name: Arc::from(name),
                driver: Arc::clone(driver),
                policy,
                generation,
                seq: generation,
                initial,
                subscribed,
            },
        );
        self.by_element.insert(el.key(), id.clone());
        Ok(id)
    }

    fn change_callback(&self, id: &InputId, generation: u64) -> ChangeCallback {
        let tx = self.events_tx.clone();
        let clock = Arc::clone(&self.clock);
        let id = id.clone();
        Arc::new(move |rate_limited: bool| {
            let _ = tx.send(ChangeEvent {
                id: id.clone(),
                generation,
                rate_limited,
                at_ms: clock.now_ms(),
            });
        })
    }

    /// Unbind `el`. Returns whether it was bound.
    pub fn unbind(&mut self, el: &Element) -> bool {
        match self.by_element.get(&el.key()).cloned() {
            Some(id) => self.unbind_id(id.as_str()),
            None => false,
        }
    }

    /// Cancel pending values for `id`, unsubscribe and dispose its control.
    pub fn unbind_id(&mut self, id: &str) -> bool {
        let Some((id, binding)) = self.bindings.remove_entry(id) else {
            return false;
        };
        self.by_element.remove(&binding.element.key());
        self.limiter.cancel(&id);
        self.deferred.retain(|d| d.id != id);
        self.last_values.remove(&id);

        let name = &binding.driver_name;
        if binding.subscribed {
            let _ = self.guard(name, "unsubscribe", id.as_str(), || {
                binding.driver.unsubscribe(&binding.element)
            });
        }
        let _ = self.guard(name, "dispose", id.as_str(), || {
            binding.driver.dispose(&binding.element)
        });

        crate::debug!("bind"; "`{}` unbound", id);
        true
    }

    /// Unbind every control inside `scope` (inclusive).
    pub fn unbind_all(&mut self, scope: &Element) -> usize {
        let ids = self.ids_where(|el| scope.contains(el));
        ids.iter().filter(|id| self.unbind_id(id.as_str())).count()
    }

    /// Unbind controls no longer attached under `root`.
    pub fn prune_detached(&mut self, root: &Element) -> usize {
        let ids = self.ids_where(|el| !root.contains(el));
        ids.iter().filter(|id| self.unbind_id(id.as_str())).count()
    }

    fn ids_where(&self, pred: impl Fn(&Element) -> bool) -> Vec<InputId> {
        self.bindings
            .iter()
            .filter(|(_, b)| pred(&b.element))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Reinstall the listeners of a bound control, for instance after its
    /// driver faulted while subscribing.
    pub fn resubscribe(&mut self, id: &str) -> Result<(), BindError> {
        let Some((id, name, driver, el, subscribed)) = self.bindings.get_key_value(id).map(|(id, b)| {
            (
                id.clone(),
                Arc::clone(&b.driver_name),
                Arc::clone(&b.driver),
                b.element.clone(),
                b.subscribed,
            )
        }) else {
            return Err(BindError::UnknownTargetId { id: id.to_string() });
        };

        // Events queued by the current listeners are still valid
        self.pump();
        if subscribed {
            let _ = self.guard(&name, "unsubscribe", id.as_str(), || driver.unsubscribe(&el));
        }
        let generation = self.next_counter();
        let callback = self.change_callback(&id, generation);
        let result = self.guard(&name, "subscribe", id.as_str(), || driver.subscribe(&el, callback));

        if let Some(binding) = self.bindings.get_mut(&id) {
            binding.generation = generation;
            binding.subscribed = result.is_ok();
        }
        result
    }

    // ========================================================================
    // outbound path
    // ========================================================================

    /// Process queued change events in order. Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        if self.torn_down {
            return 0;
        }
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            if self.process_change(event) {
                handled += 1;
            }
        }
        handled
    }

    fn process_change(&mut self, event: ChangeEvent) -> bool {
        let Some(binding) = self.bindings.get(&event.id) else {
            return false;
        };
        if binding.generation != event.generation {
            return false; // listener from an earlier subscription
        }
        let name = Arc::clone(&binding.driver_name);
        let driver = Arc::clone(&binding.driver);
        let el = binding.element.clone();
        let policy = binding.policy;

        let Ok(value) = self.guard(&name, "get_value", event.id.as_str(), || driver.get_value(&el))
        else {
            return false;
        };

        if self.options.defer {
            self.buffer(Dispatch {
                id: event.id,
                value,
                rate_limited: event.rate_limited,
                at_ms: event.at_ms,
            });
            return true;
        }

        // Timers that expired before this change go first
        self.fire_timers(event.at_ms);
        if let Some(dispatch) =
            self.limiter
                .submit(&event.id, policy, value, event.rate_limited, event.at_ms)
        {
            self.send_now(dispatch);
        }
        true
    }

    /// Pump, then fire every timer due now. Returns timer dispatches.
    pub fn tick(&mut self) -> usize {
        if self.torn_down {
            return 0;
        }
        self.pump();
        let now = self.clock.now_ms();
        self.fire_timers(now)
    }

    fn fire_timers(&mut self, now_ms: u64) -> usize {
        let due = self.limiter.fire_due(now_ms);
        let count = due.len();
        for dispatch in due {
            self.send_now(dispatch);
        }
        count
    }

    /// Deadline of the next pending timer, in clock milliseconds.
    pub fn next_deadline(&mut self) -> Option<u64> {
        if self.torn_down {
            return None;
        }
        self.limiter.next_deadline()
    }

    /// How long a driver loop may sleep before the next `tick`.
    pub fn sleep_duration(&mut self) -> Duration {
        let Some(deadline) = self.next_deadline() else {
            return IDLE_SLEEP;
        };
        let remaining = deadline.saturating_sub(self.clock.now_ms());
        Duration::from_millis(remaining).max(Duration::from_millis(1))
    }

    /// Step `clock` through every deadline up to `until_ms`, ticking at
    /// each. `clock` must be the clock this session was built with.
    pub fn run_until(&mut self, clock: &ManualClock, until_ms: u64) {
        self.pump();
        while let Some(deadline) = self.next_deadline() {
            if deadline > until_ms {
                break;
            }
            clock.set(deadline);
            self.tick();
        }
        clock.set(until_ms);
        self.tick();
    }

    fn buffer(&mut self, dispatch: Dispatch) {
        match self.deferred.iter_mut().find(|d| d.id == dispatch.id) {
            Some(existing) => *existing = dispatch,
            None => self.deferred.push(dispatch),
        }
    }

    /// Send every held dispatch (submit). Returns how many were flushed.
    pub fn flush_deferred(&mut self) -> usize {
        if self.torn_down {
            return 0;
        }
        self.pump();
        let held = std::mem::take(&mut self.deferred);
        let count = held.len();
        for dispatch in held {
            self.send_now(dispatch);
        }
        count
    }

    fn send_now(&mut self, dispatch: Dispatch) {
        if self.options.echo == EchoPolicy::SkipUnchanged
            && self.last_values.get(&dispatch.id) == Some(&dispatch.value)
        {
            crate::debug!("session"; "`{}` unchanged, not sent", dispatch.id);
            return;
        }

        let message = OutboundMessage::from(dispatch);
        match self.channel.send(&message) {
            Ok(()) => {
                crate::debug!("session"; "sent `{}` = {}", message.id, message.value);
                self.last_values.insert(message.id, message.value);
            }
            Err(e) => self.record(BindError::SendFailed {
                id: message.id.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    // ========================================================================
    // inbound path
    // ========================================================================

    /// Apply a server-pushed value to its control.
    ///
    /// Queued local changes are pumped first so they keep their causal
    /// order relative to the update.
    pub fn handle_inbound(&mut self, message: &InboundMessage) -> Result<(), BindError> {
        if self.torn_down {
            return Err(BindError::SessionClosed);
        }
        self.pump();

        let Some(binding) = self.bindings.get(&message.id) else {
            let err = BindError::UnknownTargetId {
                id: message.id.to_string(),
            };
            self.record(err.clone());
            return Err(err);
        };
        let name = Arc::clone(&binding.driver_name);
        let driver = Arc::clone(&binding.driver);
        let el = binding.element.clone();

        self.last_values
            .insert(message.id.clone(), message.value.clone());
        let result = self.guard(&name, "receive_update", message.id.as_str(), || {
            driver.receive_update(&el, &message.value)
        });

        match self.options.echo {
            EchoPolicy::Suppress => self.discard_echo(&message.id),
            EchoPolicy::Mirror | EchoPolicy::SkipUnchanged => {
                self.pump();
            }
        }
        result
    }

    /// Drop the write's own change events and any local value still
    /// waiting for `id`: the control now holds the server's value.
    fn discard_echo(&mut self, id: &InputId) {
        if self.limiter.cancel(id) {
            crate::debug!("session"; "staged value of `{}` superseded by server", id);
        }
        self.deferred.retain(|d| d.id != *id);

        let queued: Vec<ChangeEvent> = self.events_rx.try_iter().collect();
        for event in queued {
            if event.id == *id {
                crate::debug!("session"; "echo of `{}` suppressed", id);
                continue;
            }
            self.process_change(event);
        }
    }

    /// Parse and apply one inbound frame. Returns how many updates applied.
    pub fn handle_inbound_json(&mut self, text: &str) -> usize {
        let mut applied = 0;
        for parsed in parse_batch(text) {
            match parsed {
                Ok(message) => {
                    if self.handle_inbound(&message).is_ok() {
                        applied += 1;
                    }
                }
                Err(err) => self.record(err),
            }
        }
        applied
    }

    // ========================================================================
    // teardown
    // ========================================================================

    /// Cancel all timers and unbind everything. Idempotent.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        while self.events_rx.try_recv().is_ok() {}
        self.limiter.cancel_all();
        self.deferred.clear();

        let ids: Vec<InputId> = self.bindings.keys().cloned().collect();
        for id in &ids {
            self.unbind_id(id.as_str());
        }
        while self.events_rx.try_recv().is_ok() {}

        self.torn_down = true;
        crate::debug!("session"; "torn down ({} binding(s))", ids.len());
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    // ========================================================================
    // fault isolation
    // ========================================================================

    /// Run one driver call, turning an error or a panic into a
    /// [`BindError::DriverFault`] recorded against that control.
    fn guard<T>(
        &mut self,
        driver: &str,
        op: &'static str,
        target: &str,
        call: impl FnOnce() -> DriverResult<T>,
    ) -> Result<T, BindError> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(call))
            .unwrap_or_else(|payload| Err(DriverError::Panicked(panic_message(payload.as_ref()))));

        outcome.map_err(|e| {
            let err = BindError::DriverFault {
                driver: driver.to_string(),
                op,
                id: target.to_string(),
                reason: e.to_string(),
            };
            self.record(err.clone());
            err
        })
    }

    fn record(&mut self, err: BindError) {
        crate::log!("bind"; "{}", err);
        self.diagnostics.push(err);
    }

    fn next_counter(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    // ========================================================================
    // introspection
    // ========================================================================

    pub fn is_bound(&self, id: &str) -> bool {
        self.bindings.contains_key(id)
    }

    /// Bound ids in bind order.
    pub fn bound_ids(&self) -> Vec<InputId> {
        self.ordered().into_iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn policy_of(&self, id: &str) -> Option<RatePolicy> {
        self.bindings.get(id).map(|b| b.policy)
    }

    pub fn element(&self, id: &str) -> Option<Element> {
        self.bindings.get(id).map(|b| b.element.clone())
    }

    /// Every binding in bind order.
    pub fn bindings(&self) -> Vec<BindingInfo> {
        self.ordered()
            .into_iter()
            .map(|(id, b)| BindingInfo {
                id: id.clone(),
                driver: b.driver_name.to_string(),
                policy: b.policy,
                initial: b.initial.clone(),
                subscribed: b.subscribed,
            })
            .collect()
    }

    /// Values captured at bind time, in bind order.
    pub fn initial_values(&self) -> Vec<(InputId, Value)> {
        self.ordered()
            .into_iter()
            .filter_map(|(id, b)| b.initial.clone().map(|v| (id.clone(), v)))
            .collect()
    }

    fn ordered(&self) -> Vec<(&InputId, &Binding)> {
        let mut all: Vec<_> = self.bindings.iter().collect();
        all.sort_by_key(|(_, b)| b.seq);
        all
    }

    /// Dispatches held for the next `flush_deferred`.
    pub fn pending_deferred(&self) -> usize {
        self.deferred.len()
    }

    pub fn diagnostics(&self) -> &[BindError] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<BindError> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }
}

impl<C: Channel> Drop for BindingSession<C> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
