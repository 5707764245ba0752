//! Weighted, ordered event bus.
//!
//! # Design
//! Each event name maps to a list of registrations kept sorted by descending
//! weight; equal weights keep registration order. `emit` snapshots the list
//! and releases the lock before calling anything, so a listener may register,
//! remove or emit from inside its callback without deadlocking.
//!
//! Listeners return a `Result`. A failing listener is logged and skipped;
//! the rest of the chain still runs.
//!
//! Listener identity is the callback `Arc`: registering the same `Arc` twice
//! is allowed (with a warning) and `remove` drops every copy.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

/// Fine-grained request lifecycle events, payload `{"transactionId": id}`.
pub const REQUEST_START: &str = "request:startFetching";
pub const REQUEST_END: &str = "request:endFetching";
/// Fine-grained resource lifecycle events, payload `{"transactionId": id}`.
pub const RESOURCE_START: &str = "resource:startFetching";
pub const RESOURCE_END: &str = "resource:endFetching";
/// Aggregate events: something started fetching / nothing is fetching anymore.
pub const START_FETCHING: &str = "startFetching";
pub const END_FETCHING: &str = "endFetching";
/// Resource registry ready, payload `{"fromCache": bool}`.
pub const RESOURCES_READY: &str = "resourcesReady";
pub const LOGIN: &str = "login";
pub const LOGOUT: &str = "logout";

pub const DEFAULT_WEIGHT: i32 = 1;

pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;
pub type ListenerResult = Result<(), ListenerError>;

/// Opaque value handed back to a listener on every call.
pub type Context = Arc<dyn Any + Send + Sync>;

/// What a listener sees when its event fires.
pub struct Emission<'a> {
    pub event: &'a str,
    pub payload: &'a Value,
    pub context: Option<&'a Context>,
}

pub type Callback = Arc<dyn Fn(&Emission<'_>) -> ListenerResult + Send + Sync>;

/// Wrap a closure as a `Callback`. Keep the returned `Arc` to `remove` it later.
pub fn listener<F>(f: F) -> Callback
where
    F: Fn(&Emission<'_>) -> ListenerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Clone)]
struct Registration {
    id: ListenerId,
    callback: Callback,
    context: Option<Context>,
    weight: i32,
    // Present for `once` registrations; flips to true on the first delivery.
    fired: Option<Arc<AtomicBool>>,
}

pub struct EventBus {
    events: Mutex<HashMap<String, Vec<Registration>>>,
    max_listeners: Option<usize>,
    next_id: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(None)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let events = self.events.lock();
        f.debug_struct("EventBus")
            .field("events", &events.keys().collect::<Vec<_>>())
            .field("max_listeners", &self.max_listeners)
            .finish()
    }
}

impl EventBus {
    pub fn new(max_listeners: Option<usize>) -> Self {
        Self {
            events: Mutex::new(HashMap::new()),
            max_listeners,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn on(&self, event: &str, callback: Callback, context: Option<Context>, weight: i32) -> ListenerId {
        self.register(event, callback, context, weight, None)
    }

    /// Like `on`, but the registration is dropped before its first delivery.
    pub fn once(&self, event: &str, callback: Callback, context: Option<Context>, weight: i32) -> ListenerId {
        self.register(event, callback, context, weight, Some(Arc::new(AtomicBool::new(false))))
    }

    fn register(
        &self,
        event: &str,
        callback: Callback,
        context: Option<Context>,
        weight: i32,
        fired: Option<Arc<AtomicBool>>,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut events = self.events.lock();
        let list = events.entry(event.to_string()).or_default();

        if let Some(max) = self.max_listeners {
            if list.len() >= max {
                tracing::warn!(event, max, "max listeners reached");
            }
        }
        if list
            .iter()
            .any(|r| same_callback(&r.callback, &callback) && same_context(&r.context, &context))
        {
            tracing::warn!(event, "event already has this callback");
        }

        let pos = list
            .iter()
            .position(|r| r.weight < weight)
            .unwrap_or(list.len());
        list.insert(
            pos,
            Registration {
                id,
                callback,
                context,
                weight,
                fired,
            },
        );
        id
    }

    /// Deliver `payload` to every listener of `event`. Returns how many
    /// listeners were invoked.
    pub fn emit(&self, event: &str, payload: &Value) -> usize {
        tracing::debug!(event, %payload, "EventBus:emit");
        let snapshot = match self.events.lock().get(event) {
            Some(list) => list.clone(),
            None => return 0,
        };

        let mut delivered = 0;
        for registration in snapshot {
            if let Some(fired) = &registration.fired {
                if fired.swap(true, Ordering::AcqRel) {
                    continue;
                }
                self.remove_listener(registration.id);
            }
            let emission = Emission {
                event,
                payload,
                context: registration.context.as_ref(),
            };
            delivered += 1;
            if let Err(err) = (registration.callback)(&emission) {
                tracing::warn!(event, error = %err, "listener failed");
            }
        }
        delivered
    }

    /// Without a callback, drop the whole event. With one, drop every
    /// registration of that callback. Returns the number of registrations
    /// removed.
    pub fn remove(&self, event: &str, callback: Option<&Callback>) -> usize {
        let mut events = self.events.lock();
        match callback {
            None => events.remove(event).map_or(0, |list| list.len()),
            Some(callback) => {
                let Some(list) = events.get_mut(event) else {
                    return 0;
                };
                let before = list.len();
                list.retain(|r| !same_callback(&r.callback, callback));
                before - list.len()
            }
        }
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut events = self.events.lock();
        for list in events.values_mut() {
            if let Some(pos) = list.iter().position(|r| r.id == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn listeners_count(&self, event: &str) -> usize {
        self.events.lock().get(event).map_or(0, Vec::len)
    }
}

fn same_callback(a: &Callback, b: &Callback) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn same_context(a: &Option<Context>, b: &Option<Context>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
        _ => false,
    }
}
