use crate::config::{GeoTrackerConfig, OpenTracksConfig, TrackMetadata};
use crate::error::{ControllerError, DispatchError, SignalError};
use crate::intent::{Intent, IntentDispatcher, ACTION_VIEW};
use crate::policy::{TrackerAction, TrackerKind, Verb};
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

const OPEN_TRACKS_API_PATH: &str = "de.dennisguse.opentracks.publicapi";
const OPEN_TRACKS_START_CLASS: &str = "de.dennisguse.opentracks.publicapi.StartRecording";
const OPEN_TRACKS_STOP_CLASS: &str = "de.dennisguse.opentracks.publicapi.StopRecording";

pub const EXTRA_TRACK_NAME: &str = "TRACK_NAME";
pub const EXTRA_TRACK_DESCRIPTION: &str = "TRACK_DESCRIPTION";
pub const EXTRA_TRACK_CATEGORY: &str = "TRACK_CATEGORY";
pub const EXTRA_TRACK_ICON: &str = "TRACK_ICON";

const GEO_TRACKER_URI_BASE: &str = "geotracker://recorder";

/// Sends recording control requests to one external tracker app
pub trait TrackerSignaler: Send + Sync {
    fn kind(&self) -> TrackerKind;

    fn supports(&self, verb: Verb) -> bool;

    /// Single attempt, no retry. A failed request is dropped.
    fn signal(&self, verb: Verb) -> Result<(), SignalError>;
}

/// Receives one-shot user-visible notices (toast-style)
pub trait NoticeSink: Send + Sync {
    fn notify(&self, message: &str);
}

/// Notice sink that only logs
pub struct LogNoticeSink;

impl NoticeSink for LogNoticeSink {
    fn notify(&self, message: &str) {
        info!(target: "notice", "{}", message);
    }
}

/// Notice sink that keeps every message, for tests and replay summaries
#[derive(Default)]
pub struct RecordingNoticeSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingNoticeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

impl NoticeSink for RecordingNoticeSink {
    fn notify(&self, message: &str) {
        info!(target: "notice", "{}", message);
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_string());
        }
    }
}

fn map_dispatch_error(target: TrackerKind, detail: String, err: DispatchError) -> SignalError {
    match err {
        DispatchError::ActivityNotFound => SignalError::TargetNotInstalled { target, detail },
        DispatchError::Security(reason) => SignalError::PermissionDenied { target, reason },
        DispatchError::Other(reason) => SignalError::UnknownFailure { target, reason },
    }
}

/// OpenTracks public API: component-addressed StartRecording/StopRecording.
///
/// The Public API has to be enabled in the OpenTracks settings, otherwise the
/// request fails with a permission error.
pub struct OpenTracksSignaler {
    package: String,
    start_metadata: TrackMetadata,
    dispatcher: Arc<dyn IntentDispatcher>,
}

impl OpenTracksSignaler {
    pub fn new(config: &OpenTracksConfig, dispatcher: Arc<dyn IntentDispatcher>) -> Self {
        Self {
            package: config.package.clone(),
            start_metadata: config.start_metadata.clone(),
            dispatcher,
        }
    }

    pub fn build_intent(&self, verb: Verb) -> Option<Intent> {
        let class = match verb {
            Verb::Start => OPEN_TRACKS_START_CLASS,
            Verb::Stop => OPEN_TRACKS_STOP_CLASS,
            Verb::Pause | Verb::Resume => return None,
        };

        // Sent from the service, outside any activity task
        let mut intent = Intent::new().with_class_name(&self.package, class).new_task();
        if verb == Verb::Start {
            let meta = &self.start_metadata;
            let extras = [
                (EXTRA_TRACK_NAME, &meta.name),
                (EXTRA_TRACK_DESCRIPTION, &meta.description),
                (EXTRA_TRACK_CATEGORY, &meta.category),
                (EXTRA_TRACK_ICON, &meta.icon),
            ];
            for (key, value) in extras {
                if let Some(value) = value {
                    intent = intent.put_extra(key, value);
                }
            }
        }
        Some(intent)
    }
}

impl TrackerSignaler for OpenTracksSignaler {
    fn kind(&self) -> TrackerKind {
        TrackerKind::OpenTracks
    }

    fn supports(&self, verb: Verb) -> bool {
        matches!(verb, Verb::Start | Verb::Stop)
    }

    fn signal(&self, verb: Verb) -> Result<(), SignalError> {
        let intent = self.build_intent(verb).ok_or_else(|| SignalError::UnsupportedVerb {
            target: self.kind(),
            verb: verb.as_str().to_string(),
        })?;
        debug!(
            target: "open_tracks",
            "Preparing {} intent for {} with extras {:?}",
            verb, self.package, intent.extras
        );

        self.dispatcher.start_activity(&intent).map_err(|err| {
            let class = intent
                .component
                .as_ref()
                .map(|c| c.class.as_str())
                .unwrap_or(OPEN_TRACKS_API_PATH);
            error!(
                target: "open_tracks",
                "Error sending {} intent to {} ({}): {}",
                verb, self.package, class, err
            );
            map_dispatch_error(self.kind(), format!("{}/{}", self.package, class), err)
        })?;

        info!(target: "open_tracks", "Successfully sent {} intent to {}", verb, self.package);
        Ok(())
    }
}

/// Geo Tracker: `geotracker://recorder/<verb>` viewed inside the app's package
pub struct GeoTrackerSignaler {
    package: String,
    dispatcher: Arc<dyn IntentDispatcher>,
}

impl GeoTrackerSignaler {
    pub fn new(config: &GeoTrackerConfig, dispatcher: Arc<dyn IntentDispatcher>) -> Self {
        Self {
            package: config.package.clone(),
            dispatcher,
        }
    }

    pub fn control_uri(verb: Verb) -> String {
        format!("{}/{}", GEO_TRACKER_URI_BASE, verb.as_str())
    }

    pub fn build_intent(&self, verb: Verb) -> Intent {
        Intent::new()
            .with_action(ACTION_VIEW)
            .with_data(&Self::control_uri(verb))
            .with_package(&self.package)
            .new_task()
    }
}

impl TrackerSignaler for GeoTrackerSignaler {
    fn kind(&self) -> TrackerKind {
        TrackerKind::GeoTracker
    }

    fn supports(&self, _verb: Verb) -> bool {
        true
    }

    fn signal(&self, verb: Verb) -> Result<(), SignalError> {
        let uri = Self::control_uri(verb);
        debug!(
            target: "geo_tracker",
            "Preparing {} intent with URI: {} for package: {}",
            verb, uri, self.package
        );

        self.dispatcher
            .start_activity(&self.build_intent(verb))
            .map_err(|err| {
                error!(
                    target: "geo_tracker",
                    "Error sending intent {} to {}: {}",
                    uri, self.package, err
                );
                map_dispatch_error(self.kind(), uri.clone(), err)
            })?;

        info!(
            target: "geo_tracker",
            "Successfully sent {} intent ({}) to {}",
            verb, uri, self.package
        );
        Ok(())
    }
}

/// The two signalers driven by the trigger policy
#[derive(Clone)]
pub struct Trackers {
    pub open_tracks: Arc<dyn TrackerSignaler>,
    pub geo_tracker: Arc<dyn TrackerSignaler>,
}

impl Trackers {
    pub fn new(open_tracks: Arc<dyn TrackerSignaler>, geo_tracker: Arc<dyn TrackerSignaler>) -> Self {
        Self {
            open_tracks,
            geo_tracker,
        }
    }

    /// Both signalers built from config on top of one dispatcher
    pub fn from_config(
        config: &crate::config::TrackmanConfig,
        dispatcher: Arc<dyn IntentDispatcher>,
    ) -> Self {
        Self::new(
            Arc::new(OpenTracksSignaler::new(&config.open_tracks, Arc::clone(&dispatcher))),
            Arc::new(GeoTrackerSignaler::new(&config.geo_tracker, dispatcher)),
        )
    }

    pub fn get(&self, kind: TrackerKind) -> &Arc<dyn TrackerSignaler> {
        match kind {
            TrackerKind::OpenTracks => &self.open_tracks,
            TrackerKind::GeoTracker => &self.geo_tracker,
        }
    }
}

fn run_action(signaler: &dyn TrackerSignaler, action: TrackerAction) -> Result<(), SignalError> {
    if !signaler.supports(action.verb) {
        warn!(target: "dispatch", "{} has no {} action, skipping", action.target, action.verb);
        return Err(SignalError::UnsupportedVerb {
            target: action.target,
            verb: action.verb.as_str().to_string(),
        });
    }
    signaler.signal(action.verb)
}

/// Fire one independent blocking task per action.
///
/// A failing or slow signaler never affects the others. Failures are logged,
/// shown as a notice and resolved to `TargetUnavailable` or `DispatchFailure`
/// inside the task. The handles are returned for callers that want to observe
/// completion; dropping them does not cancel anything.
pub fn dispatch_actions(
    actions: &[TrackerAction],
    trackers: &Trackers,
    notices: &Arc<dyn NoticeSink>,
) -> Vec<JoinHandle<Result<(), ControllerError>>> {
    actions
        .iter()
        .map(|action| {
            let signaler = Arc::clone(trackers.get(action.target));
            let notices = Arc::clone(notices);
            let action = *action;
            tokio::task::spawn_blocking(move || {
                run_action(signaler.as_ref(), action).map_err(|err| {
                    notices.notify(&err.notice());
                    let err = ControllerError::from(err);
                    error!(
                        target: "dispatch",
                        "{} {} failed: {}",
                        action.target, action.verb, err
                    );
                    err
                })
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{open_tracks_packages, TrackmanConfig, GEO_TRACKER_PACKAGE};
    use crate::intent::RecordingDispatcher;
    use crate::policy::decide;
    use crate::activity::ActivityCategory;

    fn setup() -> (Arc<RecordingDispatcher>, Trackers) {
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let trackers = Trackers::from_config(&TrackmanConfig::default(), dispatcher.clone());
        (dispatcher, trackers)
    }

    #[test]
    fn test_open_tracks_start_carries_only_category() {
        let (dispatcher, trackers) = setup();
        trackers.open_tracks.signal(Verb::Start).unwrap();

        let sent = dispatcher.sent_to(open_tracks_packages::FDROID);
        assert_eq!(sent.len(), 1);
        let intent = &sent[0];
        let component = intent.component.as_ref().unwrap();
        assert_eq!(component.class, OPEN_TRACKS_START_CLASS);
        assert_eq!(intent.extras.len(), 1);
        assert_eq!(
            intent.extras.get(EXTRA_TRACK_CATEGORY).map(String::as_str),
            Some("In Vehicle Detection")
        );
        assert!(intent.new_task);
    }

    #[test]
    fn test_open_tracks_stop_has_no_extras() {
        let (dispatcher, trackers) = setup();
        trackers.open_tracks.signal(Verb::Stop).unwrap();

        let intent = &dispatcher.sent()[0];
        assert_eq!(intent.component.as_ref().unwrap().class, OPEN_TRACKS_STOP_CLASS);
        assert!(intent.extras.is_empty());
    }

    #[test]
    fn test_open_tracks_rejects_pause() {
        let (dispatcher, trackers) = setup();
        assert!(!trackers.open_tracks.supports(Verb::Pause));
        let err = trackers.open_tracks.signal(Verb::Pause).unwrap_err();
        assert!(matches!(err, SignalError::UnsupportedVerb { .. }));
        assert!(dispatcher.sent().is_empty());
    }

    #[test]
    fn test_geo_tracker_uris() {
        let (dispatcher, trackers) = setup();
        for verb in [Verb::Start, Verb::Stop, Verb::Pause, Verb::Resume] {
            trackers.geo_tracker.signal(verb).unwrap();
        }
        let uris: Vec<_> = dispatcher
            .sent_to(GEO_TRACKER_PACKAGE)
            .into_iter()
            .map(|i| {
                assert_eq!(i.action.as_deref(), Some(ACTION_VIEW));
                assert!(i.extras.is_empty());
                i.data.unwrap()
            })
            .collect();
        assert_eq!(
            uris,
            vec![
                "geotracker://recorder/start",
                "geotracker://recorder/stop",
                "geotracker://recorder/pause",
                "geotracker://recorder/resume",
            ]
        );
    }

    #[test]
    fn test_dispatch_errors_map_to_signal_errors() {
        let (dispatcher, trackers) = setup();
        dispatcher.fail_package(GEO_TRACKER_PACKAGE, DispatchError::ActivityNotFound);
        dispatcher.fail_package(
            open_tracks_packages::FDROID,
            DispatchError::Security("public api disabled".into()),
        );

        assert!(matches!(
            trackers.geo_tracker.signal(Verb::Start),
            Err(SignalError::TargetNotInstalled { target: TrackerKind::GeoTracker, .. })
        ));
        assert!(matches!(
            trackers.open_tracks.signal(Verb::Start),
            Err(SignalError::PermissionDenied { target: TrackerKind::OpenTracks, .. })
        ));
    }

    #[tokio::test]
    async fn test_unsupported_verb_is_skipped_and_reported() {
        let (dispatcher, trackers) = setup();
        let sink = Arc::new(RecordingNoticeSink::new());
        let notices: Arc<dyn NoticeSink> = sink.clone();

        let actions = [TrackerAction {
            target: TrackerKind::OpenTracks,
            verb: Verb::Pause,
        }];
        let mut handles = dispatch_actions(&actions, &trackers, &notices);
        let result = handles.remove(0).await.unwrap();

        assert!(matches!(result, Err(ControllerError::DispatchFailure(_))));
        assert!(dispatcher.sent().is_empty());
        assert_eq!(sink.messages(), vec!["OpenTracks cannot pause.".to_string()]);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_the_other() {
        let (dispatcher, trackers) = setup();
        dispatcher.fail_package(GEO_TRACKER_PACKAGE, DispatchError::ActivityNotFound);
        let sink = Arc::new(RecordingNoticeSink::new());
        let notices: Arc<dyn NoticeSink> = sink.clone();

        let actions = decide(Some(ActivityCategory::InVehicle));
        let handles = dispatch_actions(&actions, &trackers, &notices);

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(ControllerError::TargetUnavailable(_))));
        assert_eq!(dispatcher.sent_to(open_tracks_packages::FDROID).len(), 1);
        assert_eq!(
            sink.messages(),
            vec!["Geo Tracker not found or cannot handle action.".to_string()]
        );
    }
}
