use crate::intent::Intent;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const ACTION_APPLICATION_DETAILS_SETTINGS: &str = "android.settings.APPLICATION_DETAILS_SETTINGS";

/// API level that introduced the runtime notification permission
pub const SDK_TIRAMISU: i32 = 33;

/// Runtime capability grants the tracking session depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    ActivityRecognition,
    PostNotifications,
}

impl Capability {
    pub fn permission(&self) -> &'static str {
        match self {
            Capability::ActivityRecognition => "android.permission.ACTIVITY_RECOGNITION",
            Capability::PostNotifications => "android.permission.POST_NOTIFICATIONS",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Capability::ActivityRecognition => "Activity Recognition",
            Capability::PostNotifications => "Notifications",
        }
    }

    pub fn from_permission(permission: &str) -> Option<Self> {
        match permission {
            "android.permission.ACTIVITY_RECOGNITION" => Some(Capability::ActivityRecognition),
            "android.permission.POST_NOTIFICATIONS" => Some(Capability::PostNotifications),
            _ => None,
        }
    }
}

/// Capabilities the manual toggle needs on a given platform version
pub fn required_capabilities(sdk_int: i32) -> Vec<Capability> {
    let mut required = Vec::with_capacity(2);
    if sdk_int >= SDK_TIRAMISU {
        required.push(Capability::PostNotifications);
    }
    required.push(Capability::ActivityRecognition);
    required
}

/// Platform seam answering whether a capability is currently granted
pub trait PermissionChecker: Send + Sync {
    fn is_granted(&self, capability: Capability) -> bool;
}

/// Deep link into the system settings page of `package`
pub fn app_settings_intent(package: &str) -> Intent {
    Intent::new()
        .with_action(ACTION_APPLICATION_DETAILS_SETTINGS)
        .with_data(&format!("package:{}", package))
        .new_task()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Ready,
    NeedsGrant {
        missing: Vec<Capability>,
        /// A previous request was denied, so a settings link is offered next to retry
        offer_settings: bool,
    },
}

/// What the manual on/off switch asks the session controller to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleCommand {
    Start,
    Stop,
    RequestPermissions(Vec<Capability>),
}

/// Gate in front of the manual tracking toggle.
///
/// Remembers which capabilities were denied, so the caller can offer the
/// settings deep link along with the retry.
pub struct PermissionGate {
    sdk_int: i32,
    denied: HashSet<Capability>,
}

impl PermissionGate {
    pub fn new(sdk_int: i32) -> Self {
        Self {
            sdk_int,
            denied: HashSet::new(),
        }
    }

    pub fn missing(&self, checker: &dyn PermissionChecker) -> Vec<Capability> {
        required_capabilities(self.sdk_int)
            .into_iter()
            .filter(|c| !checker.is_granted(*c))
            .collect()
    }

    pub fn evaluate(&self, checker: &dyn PermissionChecker) -> GateDecision {
        let missing = self.missing(checker);
        if missing.is_empty() {
            return GateDecision::Ready;
        }
        let offer_settings = missing.iter().any(|c| self.denied.contains(c));
        GateDecision::NeedsGrant {
            missing,
            offer_settings,
        }
    }

    /// Feed back the result of a permission request
    pub fn record_results(&mut self, results: &[(Capability, bool)]) {
        for (capability, granted) in results {
            if *granted {
                self.denied.remove(capability);
            } else {
                warn!(target: "permissions", "Denied: {}", capability.permission());
                self.denied.insert(*capability);
            }
        }
    }

    pub fn toggle(&self, enabled: bool, checker: &dyn PermissionChecker) -> ToggleCommand {
        if !enabled {
            return ToggleCommand::Stop;
        }
        match self.evaluate(checker) {
            GateDecision::Ready => {
                debug!(target: "permissions", "All permissions granted");
                ToggleCommand::Start
            }
            GateDecision::NeedsGrant { missing, .. } => {
                warn!(
                    target: "permissions",
                    "Cannot start tracking, missing permissions: {:?}",
                    missing.iter().map(|c| c.permission()).collect::<Vec<_>>()
                );
                ToggleCommand::RequestPermissions(missing)
            }
        }
    }
}

/// Fixed grant set, handy for tests and the replay tool
#[derive(Debug, Clone, Default)]
pub struct StaticPermissions {
    granted: HashSet<Capability>,
}

impl StaticPermissions {
    pub fn all() -> Self {
        Self {
            granted: [Capability::ActivityRecognition, Capability::PostNotifications]
                .into_iter()
                .collect(),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn without(mut self, capability: Capability) -> Self {
        self.granted.remove(&capability);
        self
    }
}

impl PermissionChecker for StaticPermissions {
    fn is_granted(&self, capability: Capability) -> bool {
        self.granted.contains(&capability)
    }
}
