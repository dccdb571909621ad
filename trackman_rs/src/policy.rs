use crate::activity::ActivityCategory;
use serde::{Deserialize, Serialize};
use std::fmt;

/// External recording application addressed by a signaler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackerKind {
    OpenTracks,
    GeoTracker,
}

impl fmt::Display for TrackerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerKind::OpenTracks => f.write_str("OpenTracks"),
            TrackerKind::GeoTracker => f.write_str("Geo Tracker"),
        }
    }
}

/// Recording control verb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verb {
    Start,
    Stop,
    Pause,
    Resume,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Start => "start",
            Verb::Stop => "stop",
            Verb::Pause => "pause",
            Verb::Resume => "resume",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerAction {
    pub target: TrackerKind,
    pub verb: Verb,
}

impl TrackerAction {
    pub fn new(target: TrackerKind, verb: Verb) -> Self {
        Self { target, verb }
    }
}

/// Map the current activity onto tracker actions.
///
/// In a vehicle both trackers are started, anything else (including no
/// activity) stops both. Repeated calls re-issue the same pair; receivers
/// treat start and stop as idempotent requests.
pub fn decide(activity: Option<ActivityCategory>) -> [TrackerAction; 2] {
    let verb = match activity {
        Some(ActivityCategory::InVehicle) => Verb::Start,
        _ => Verb::Stop,
    };
    [
        TrackerAction::new(TrackerKind::OpenTracks, verb),
        TrackerAction::new(TrackerKind::GeoTracker, verb),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_vehicle_starts_both() {
        let actions = decide(Some(ActivityCategory::InVehicle));
        assert_eq!(
            actions,
            [
                TrackerAction::new(TrackerKind::OpenTracks, Verb::Start),
                TrackerAction::new(TrackerKind::GeoTracker, Verb::Start),
            ]
        );
    }

    #[test]
    fn test_everything_else_stops_both() {
        let others = [
            Some(ActivityCategory::Still),
            Some(ActivityCategory::Walking),
            Some(ActivityCategory::Running),
            Some(ActivityCategory::OnBicycle),
            Some(ActivityCategory::OnFoot),
            Some(ActivityCategory::Unknown),
            None,
        ];
        for activity in others {
            let actions = decide(activity);
            assert_eq!(actions.len(), 2);
            assert!(actions.iter().all(|a| a.verb == Verb::Stop), "{:?}", activity);
            assert_eq!(actions[0].target, TrackerKind::OpenTracks);
            assert_eq!(actions[1].target, TrackerKind::GeoTracker);
        }
    }

    #[test]
    fn test_no_hysteresis() {
        let first = decide(Some(ActivityCategory::InVehicle));
        let second = decide(Some(ActivityCategory::InVehicle));
        assert_eq!(first, second);
    }
}
