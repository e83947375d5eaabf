//! Search events and listeners.

use pathwise_choice::ChoiceValue;
use pathwise_state::Fingerprint;
use std::sync::{Arc, Mutex};

/// Something the driver did. Listeners receive every event in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    SearchStarted,
    /// A generator was registered at a decision point.
    ChoiceCreated {
        name: String,
        location: String,
        total: usize,
        cascaded: bool,
    },
    /// A generator moved to its next choice.
    ChoiceAdvanced {
        name: String,
        index: usize,
        value: ChoiceValue,
    },
    /// A transition boundary was reached. `fingerprint` is `None` when
    /// state matching is off.
    TransitionEnded {
        depth: usize,
        fingerprint: Option<Fingerprint>,
        new_state: bool,
    },
    StateMatched {
        depth: usize,
        fingerprint: Fingerprint,
    },
    /// All choices of the deepest generator group were explored and the
    /// group was dropped.
    Backtracked { depth: usize },
    /// The program terminated on this path. The final step is not a
    /// transition boundary: no `TransitionEnded` precedes this event, the
    /// end state is never fingerprinted or matched, and `depth` is that of
    /// the last boundary.
    EndState { depth: usize },
    /// The path was cut off by the depth limit.
    ConstraintHit { depth: usize },
    /// The program asked for the current path to be abandoned.
    PathIgnored { depth: usize },
    PropertyViolated { description: String },
    SearchExhausted,
}

pub trait SearchListener {
    fn on_event(&mut self, event: &SearchEvent);
}

impl<F: FnMut(&SearchEvent)> SearchListener for F {
    fn on_event(&mut self, event: &SearchEvent) {
        self(event)
    }
}

/// A listener that keeps every event. Clones share the same log, so one
/// can be handed to the search and another kept for inspection.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<SearchEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SearchEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Events for which `pred` holds.
    pub fn filtered<P: Fn(&SearchEvent) -> bool>(&self, pred: P) -> Vec<SearchEvent> {
        self.events().into_iter().filter(|e| pred(e)).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl SearchListener for EventLog {
    fn on_event(&mut self, event: &SearchEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
