use crate::error::DispatchError;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

pub const ACTION_VIEW: &str = "android.intent.action.VIEW";

/// Explicit component target (package + class)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentName {
    pub package: String,
    pub class: String,
}

/// Addressed inter-process request, shaped after an Android intent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub action: Option<String>,
    pub data: Option<String>,
    pub package: Option<String>,
    pub component: Option<ComponentName>,
    pub extras: BTreeMap<String, String>,
    pub new_task: bool,
}

impl Intent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_action(mut self, action: &str) -> Self {
        self.action = Some(action.to_string());
        self
    }

    pub fn with_data(mut self, uri: &str) -> Self {
        self.data = Some(uri.to_string());
        self
    }

    pub fn with_package(mut self, package: &str) -> Self {
        self.package = Some(package.to_string());
        self
    }

    pub fn with_class_name(mut self, package: &str, class: &str) -> Self {
        self.component = Some(ComponentName {
            package: package.to_string(),
            class: class.to_string(),
        });
        self
    }

    pub fn put_extra(mut self, key: &str, value: &str) -> Self {
        self.extras.insert(key.to_string(), value.to_string());
        self
    }

    pub fn new_task(mut self) -> Self {
        self.new_task = true;
        self
    }

    /// Package the request is addressed to, via explicit package or component
    pub fn target_package(&self) -> Option<&str> {
        self.package
            .as_deref()
            .or_else(|| self.component.as_ref().map(|c| c.package.as_str()))
    }
}

/// Platform seam that actually delivers an intent (e.g. `Context.startActivity`).
///
/// Implementations may block; callers run them off the event path.
pub trait IntentDispatcher: Send + Sync {
    fn start_activity(&self, intent: &Intent) -> Result<(), DispatchError>;
}

/// Dispatcher that records every intent instead of delivering it.
///
/// Used by the replay tool and tests. Failures and latency can be primed per
/// target package.
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<Intent>>,
    failures: Mutex<HashMap<String, DispatchError>>,
    delays: Mutex<HashMap<String, Duration>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request to `package` fails with `error` from now on
    pub fn fail_package(&self, package: &str, error: DispatchError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(package.to_string(), error);
        }
    }

    /// Every request to `package` blocks for `delay` before completing
    pub fn delay_package(&self, package: &str, delay: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.insert(package.to_string(), delay);
        }
    }

    pub fn sent(&self) -> Vec<Intent> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, package: &str) -> Vec<Intent> {
        self.sent()
            .into_iter()
            .filter(|i| i.target_package() == Some(package))
            .collect()
    }
}

impl IntentDispatcher for RecordingDispatcher {
    fn start_activity(&self, intent: &Intent) -> Result<(), DispatchError> {
        let package = intent.target_package().unwrap_or_default().to_string();

        let delay = self
            .delays
            .lock()
            .ok()
            .and_then(|d| d.get(&package).copied());
        if let Some(delay) = delay {
            debug!(target: "intent", "Delaying delivery to {} by {:?}", package, delay);
            std::thread::sleep(delay);
        }

        let failure = self
            .failures
            .lock()
            .ok()
            .and_then(|f| f.get(&package).cloned());
        if let Some(err) = failure {
            return Err(err);
        }

        info!(
            target: "intent",
            "Delivered intent action={:?} data={:?} package={}",
            intent.action, intent.data, package
        );
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(intent.clone());
        }
        Ok(())
    }
}
