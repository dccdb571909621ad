use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw activity type codes delivered by the platform classifier
pub mod codes {
    pub const IN_VEHICLE: i32 = 0;
    pub const ON_BICYCLE: i32 = 1;
    pub const ON_FOOT: i32 = 2;
    pub const STILL: i32 = 3;
    pub const UNKNOWN: i32 = 4;
    pub const TILTING: i32 = 5;
    pub const WALKING: i32 = 7;
    pub const RUNNING: i32 = 8;

    pub const TRANSITION_ENTER: i32 = 0;
    pub const TRANSITION_EXIT: i32 = 1;
}

/// Semantic activity category decoded from a raw classifier code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityCategory {
    InVehicle,
    OnBicycle,
    Running,
    Still,
    Walking,
    OnFoot,
    Unknown,
}

impl ActivityCategory {
    /// Total mapping: anything outside the recognised set is `Unknown`.
    pub fn from_code(code: i32) -> Self {
        match code {
            codes::IN_VEHICLE => ActivityCategory::InVehicle,
            codes::ON_BICYCLE => ActivityCategory::OnBicycle,
            codes::RUNNING => ActivityCategory::Running,
            codes::STILL => ActivityCategory::Still,
            codes::WALKING => ActivityCategory::Walking,
            codes::ON_FOOT => ActivityCategory::OnFoot,
            _ => ActivityCategory::Unknown,
        }
    }

    /// Decode a raw code, `None` when the code is not one of the six recognised activities.
    pub fn decode(code: i32) -> Option<Self> {
        match Self::from_code(code) {
            ActivityCategory::Unknown => None,
            category => Some(category),
        }
    }

    /// Human readable label used by the persistent indicator
    pub fn label(&self) -> &'static str {
        match self {
            ActivityCategory::InVehicle => "In Vehicle",
            ActivityCategory::OnBicycle => "On Bicycle",
            ActivityCategory::Running => "Running",
            ActivityCategory::Still => "Still",
            ActivityCategory::Walking => "Walking",
            ActivityCategory::OnFoot => "On Foot",
            ActivityCategory::Unknown => "Unknown",
        }
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ActivityCategory::InVehicle => Some(codes::IN_VEHICLE),
            ActivityCategory::OnBicycle => Some(codes::ON_BICYCLE),
            ActivityCategory::Running => Some(codes::RUNNING),
            ActivityCategory::Still => Some(codes::STILL),
            ActivityCategory::Walking => Some(codes::WALKING),
            ActivityCategory::OnFoot => Some(codes::ON_FOOT),
            ActivityCategory::Unknown => None,
        }
    }
}

impl fmt::Display for ActivityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Name of a raw activity code for logging, e.g. `IN_VEHICLE` or `UNKNOWN (5)`
pub fn activity_type_name(code: i32) -> String {
    match code {
        codes::IN_VEHICLE => "IN_VEHICLE".to_string(),
        codes::ON_BICYCLE => "ON_BICYCLE".to_string(),
        codes::RUNNING => "RUNNING".to_string(),
        codes::STILL => "STILL".to_string(),
        codes::WALKING => "WALKING".to_string(),
        codes::ON_FOOT => "ON_FOOT".to_string(),
        other => format!("UNKNOWN ({})", other),
    }
}

/// Enter/exit direction of a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionKind {
    Enter,
    Exit,
    Other(i32),
}

impl TransitionKind {
    pub fn from_code(code: i32) -> Self {
        match code {
            codes::TRANSITION_ENTER => TransitionKind::Enter,
            codes::TRANSITION_EXIT => TransitionKind::Exit,
            other => TransitionKind::Other(other),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            TransitionKind::Enter => codes::TRANSITION_ENTER,
            TransitionKind::Exit => codes::TRANSITION_EXIT,
            TransitionKind::Other(code) => *code,
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionKind::Enter => f.write_str("ENTER"),
            TransitionKind::Exit => f.write_str("EXIT"),
            TransitionKind::Other(code) => write!(f, "UNKNOWN ({})", code),
        }
    }
}

/// One `(activity, transition)` pair out of a platform transition result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub activity_type: i32,
    pub transition_type: i32,
    #[serde(default)]
    pub elapsed_realtime_nanos: i64,
}

impl TransitionEvent {
    pub fn new(activity_type: i32, transition_type: i32) -> Self {
        Self {
            activity_type,
            transition_type,
            elapsed_realtime_nanos: 0,
        }
    }

    pub fn kind(&self) -> TransitionKind {
        TransitionKind::from_code(self.transition_type)
    }
}

/// A single entry of the transition registration request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredTransition {
    pub activity_type: i32,
    pub transition: TransitionKind,
}

const MONITORED_ACTIVITIES: [i32; 5] = [
    codes::IN_VEHICLE,
    codes::ON_BICYCLE,
    codes::RUNNING,
    codes::WALKING,
    codes::STILL,
];

/// ENTER and EXIT for every monitored activity
pub fn monitored_transitions() -> Vec<MonitoredTransition> {
    MONITORED_ACTIVITIES
        .iter()
        .flat_map(|&activity_type| {
            [TransitionKind::Enter, TransitionKind::Exit]
                .into_iter()
                .map(move |transition| MonitoredTransition {
                    activity_type,
                    transition,
                })
        })
        .collect()
}
