//! In-flight transaction accounting.
//!
//! Requests and resource fetches each open a transaction while they run.
//! Consumers that only care whether *anything* is in flight listen to the
//! aggregate `startFetching` / `endFetching` events, which fire on the 0→1 and
//! 1→0 transitions of the open set and nowhere else.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use serde_json::{json, Value};

use crate::events::{self, EventBus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Default)]
struct TrackerState {
    last_id: u64,
    open: HashSet<TransactionId>,
}

pub struct TransactionTracker {
    bus: Arc<EventBus>,
    state: Mutex<TrackerState>,
    // Serializes "mutate then emit" so aggregate events are observed in the
    // same order as the transitions that caused them. Re-entrant because a
    // `startFetching` listener may itself start a request. This is the one
    // lock held while listeners run: an aggregate listener must not block on
    // another thread that needs `begin` or `end`.
    transitions: ReentrantMutex<()>,
}

impl TransactionTracker {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            state: Mutex::new(TrackerState::default()),
            transitions: ReentrantMutex::new(()),
        }
    }

    pub fn begin(&self) -> TransactionId {
        let _order = self.transitions.lock();
        let (id, first) = {
            let mut state = self.state.lock();
            state.last_id += 1;
            let id = TransactionId(state.last_id);
            state.open.insert(id);
            (id, state.open.len() == 1)
        };
        if first {
            self.bus.emit(events::START_FETCHING, &Value::Null);
        }
        id
    }

    /// Close `id`. Closing an id twice, or one never opened, does nothing.
    pub fn end(&self, id: TransactionId) {
        let _order = self.transitions.lock();
        let last = {
            let mut state = self.state.lock();
            state.open.remove(&id) && state.open.is_empty()
        };
        if last {
            self.bus.emit(events::END_FETCHING, &Value::Null);
        }
    }

    pub fn is_active(&self) -> bool {
        !self.state.lock().open.is_empty()
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().open.len()
    }
}

/// An open transaction that announces its own end.
///
/// Creating one opens a transaction and emits `start_event`; dropping it emits
/// `end_event` and closes the transaction. Tying the end to `Drop` means a
/// request that errors, or a task that panics, still closes its transaction.
pub struct TransactionGuard {
    tracker: Arc<TransactionTracker>,
    bus: Arc<EventBus>,
    id: TransactionId,
    end_event: &'static str,
}

impl TransactionGuard {
    pub fn open(
        tracker: &Arc<TransactionTracker>,
        bus: &Arc<EventBus>,
        start_event: &'static str,
        end_event: &'static str,
    ) -> Self {
        let id = tracker.begin();
        bus.emit(start_event, &transaction_payload(id));
        Self {
            tracker: Arc::clone(tracker),
            bus: Arc::clone(bus),
            id,
            end_event,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        self.bus.emit(self.end_event, &transaction_payload(self.id));
        self.tracker.end(self.id);
    }
}

fn transaction_payload(id: TransactionId) -> Value {
    json!({ "transactionId": id.0 })
}
