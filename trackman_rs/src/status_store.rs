use crate::activity::{activity_type_name, ActivityCategory};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

/// Placeholder shown while no activity has been decoded yet
pub const PLACEHOLDER_LABEL: &str = "Tracking activity...";

/// Backlog of undelivered activity updates kept per change subscriber
const CHANGE_CAPACITY: usize = 256;

/// Consistent copy of the three store fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub tracking_enabled: bool,
    pub current_activity: Option<ActivityCategory>,
    pub update_count: u64,
}

impl StatusSnapshot {
    pub fn label(&self) -> &'static str {
        self.current_activity
            .map(|a| a.label())
            .unwrap_or(PLACEHOLDER_LABEL)
    }

    pub fn is_in_vehicle(&self) -> bool {
        self.current_activity == Some(ActivityCategory::InVehicle)
    }
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            tracking_enabled: false,
            current_activity: None,
            update_count: 0,
        }
    }
}

/// Observable in-memory tracking status.
///
/// Each field lives in its own watch channel, so a new subscriber sees the
/// current value first and then every later publish. Publishing always
/// notifies, including when the new value equals the old one. Writes are
/// expected from a single owner (the session controller and the transition
/// intake it drives); reads may happen from any thread.
///
/// Watch receivers only keep the latest value. Consumers that must act on
/// every single record, repeats included, use `subscribe_changes` instead.
///
/// Values are retained when tracking is switched off.
pub struct StatusStore {
    tracking: watch::Sender<bool>,
    activity: watch::Sender<Option<ActivityCategory>>,
    update_count: watch::Sender<u64>,
    changes: broadcast::Sender<Option<ActivityCategory>>,
}

impl StatusStore {
    pub fn new() -> Self {
        let (tracking, _) = watch::channel(false);
        let (activity, _) = watch::channel(None);
        let (update_count, _) = watch::channel(0);
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            tracking,
            activity,
            update_count,
            changes,
        }
    }

    pub fn set_tracking(&self, enabled: bool) {
        debug!(target: "status_store", "Updating tracking flag to: {}", enabled);
        self.tracking.send_replace(enabled);
    }

    /// Count the event, then publish its decoded category.
    ///
    /// Unrecognised codes clear the current activity.
    pub fn record_transition(&self, raw_code: i32) -> Option<ActivityCategory> {
        self.update_count.send_modify(|count| *count += 1);

        let decoded = ActivityCategory::decode(raw_code);
        debug!(
            target: "status_store",
            "Updating status to: {:?} (raw {})",
            decoded,
            activity_type_name(raw_code)
        );
        self.activity.send_replace(decoded);
        // No change subscribers is fine, e.g. while tracking is off
        let _ = self.changes.send(decoded);
        decoded
    }

    pub fn tracking_enabled(&self) -> bool {
        *self.tracking.borrow()
    }

    pub fn current_activity(&self) -> Option<ActivityCategory> {
        *self.activity.borrow()
    }

    pub fn update_count(&self) -> u64 {
        *self.update_count.borrow()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            tracking_enabled: self.tracking_enabled(),
            current_activity: self.current_activity(),
            update_count: self.update_count(),
        }
    }

    /// The returned receiver has already seen the current value.
    pub fn subscribe_tracking(&self) -> watch::Receiver<bool> {
        self.tracking.subscribe()
    }

    pub fn subscribe_activity(&self) -> watch::Receiver<Option<ActivityCategory>> {
        self.activity.subscribe()
    }

    pub fn subscribe_update_count(&self) -> watch::Receiver<u64> {
        self.update_count.subscribe()
    }

    /// One message per `record_transition` made after this call, in order.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<Option<ActivityCategory>> {
        self.changes.subscribe()
    }
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new()
    }
}
