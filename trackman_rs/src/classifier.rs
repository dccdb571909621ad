use crate::activity::{activity_type_name, TransitionEvent};
use crate::status_store::StatusStore;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Broadcast action the transition registration is bound to
pub const TRANSITIONS_RECEIVER_ACTION: &str = "com.chromian.trackman.TRANSITION_ACTION";

/// Platform broadcast as handed over by the host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionBroadcast {
    pub action: Option<String>,
    /// `None` when the broadcast carries no transition result
    pub events: Option<Vec<TransitionEvent>>,
}

impl TransitionBroadcast {
    pub fn transitions(events: Vec<TransitionEvent>) -> Self {
        Self {
            action: Some(TRANSITIONS_RECEIVER_ACTION.to_string()),
            events: Some(events),
        }
    }
}

/// Decodes transition broadcasts and writes them into the status store
#[derive(Clone)]
pub struct ClassifierAdapter {
    store: Arc<StatusStore>,
}

impl ClassifierAdapter {
    pub fn new(store: Arc<StatusStore>) -> Self {
        Self { store }
    }

    /// Returns the number of events recorded.
    ///
    /// Every event is recorded, enter or exit alike; the transition kind is
    /// only logged.
    pub fn on_receive(&self, broadcast: &TransitionBroadcast) -> usize {
        debug!(target: "classifier", "onReceive triggered for action: {:?}", broadcast.action);

        if broadcast.action.as_deref() != Some(TRANSITIONS_RECEIVER_ACTION) {
            warn!(target: "classifier", "Received unknown intent action: {:?}", broadcast.action);
            return 0;
        }

        let Some(events) = &broadcast.events else {
            warn!(target: "classifier", "Broadcast did not contain a transition result");
            return 0;
        };

        for event in events {
            info!(
                target: "classifier",
                "Transition event: Activity={}, Transition={}",
                activity_type_name(event.activity_type),
                event.kind()
            );
            self.store.record_transition(event.activity_type);
        }
        events.len()
    }
}
