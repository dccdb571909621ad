use crate::activity::{monitored_transitions, ActivityCategory, MonitoredTransition};
use crate::config::IndicatorConfig;
use crate::error::{ControllerError, RegistrationError};
use crate::indicator::{IndicatorContent, StatusIndicator};
use crate::permissions::{Capability, PermissionChecker, ToggleCommand};
use crate::policy::decide;
use crate::signaler::{dispatch_actions, NoticeSink, Trackers};
use crate::status_store::StatusStore;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Not subscribed to transitions
    Stopped,
    /// Permission checked, registration in progress
    Starting,
    /// Subscribed, indicator visible, policy active
    Running,
}

/// Platform subscription to activity transition events
pub trait TransitionSource: Send + Sync {
    fn register(&self, transitions: &[MonitoredTransition]) -> Result<(), RegistrationError>;

    /// Best effort; failures are logged by the caller and not propagated.
    fn unregister(&self) -> Result<(), RegistrationError>;
}

/// Collaborators of a session controller
#[derive(Clone)]
pub struct SessionDeps {
    pub store: Arc<StatusStore>,
    pub trackers: Trackers,
    pub indicator: Arc<dyn StatusIndicator>,
    pub notices: Arc<dyn NoticeSink>,
    pub permissions: Arc<dyn PermissionChecker>,
    pub source: Arc<dyn TransitionSource>,
    pub indicator_config: IndicatorConfig,
}

/// Owns the "tracking is active" lifecycle.
///
/// While running, a task follows the store's change stream and for every
/// recorded transition refreshes the indicator, evaluates the trigger policy
/// and fires both tracker signals without waiting for them.
pub struct SessionController {
    deps: SessionDeps,
    runtime: Handle,
    state: watch::Sender<SessionState>,
    observer: Option<JoinHandle<()>>,
}

impl SessionController {
    pub fn new(deps: SessionDeps, runtime: Handle) -> Self {
        let (state, _) = watch::channel(SessionState::Stopped);
        Self {
            deps,
            runtime,
            state,
            observer: None,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn store(&self) -> &Arc<StatusStore> {
        &self.deps.store
    }

    fn set_state(&self, state: SessionState) {
        debug!(target: "controller", "Session state -> {:?}", state);
        self.state.send_replace(state);
    }

    /// Stopped -> Starting -> Running.
    ///
    /// A start while already starting or running is ignored.
    pub fn start(&mut self) -> Result<(), ControllerError> {
        if self.state() != SessionState::Stopped {
            warn!(target: "controller", "Service already running, ignoring start command.");
            return Ok(());
        }

        info!(target: "controller", "Attempting to start tracking service...");
        let capability = Capability::ActivityRecognition;
        if !self.deps.permissions.is_granted(capability) {
            error!(
                target: "controller",
                "{} permission not granted. Staying stopped.",
                capability.permission()
            );
            return Err(ControllerError::PermissionMissing(
                capability.permission().to_string(),
            ));
        }

        self.set_state(SessionState::Starting);

        // Subscribe first so events delivered while registering are not lost
        let changes = self.deps.store.subscribe_changes();
        let transitions = monitored_transitions();
        info!(
            target: "controller",
            "Registering for activity transitions ({} activity types)...",
            transitions.len() / 2
        );
        if let Err(err) = self.deps.source.register(&transitions) {
            error!(target: "controller", "FAILED registration for activity transition updates: {}", err);
            self.set_state(SessionState::Stopped);
            return Err(err.into());
        }

        self.deps.store.set_tracking(true);
        let initial = self.deps.store.current_activity();
        self.deps.indicator.show(&IndicatorContent::for_activity(
            &self.deps.indicator_config,
            initial,
        ));

        self.observer = Some(self.runtime.spawn(observe_activity(changes, self.deps.clone())));

        self.set_state(SessionState::Running);
        info!(target: "controller", "Service started successfully and registered for transitions.");
        Ok(())
    }

    /// Running -> Stopped. Unregistration failures are logged only.
    pub fn stop(&mut self) {
        if self.state() == SessionState::Stopped {
            warn!(target: "controller", "Stop command ignored: Service wasn't running.");
            return;
        }

        info!(target: "controller", "Stopping service internally...");
        if let Some(observer) = self.observer.take() {
            observer.abort();
        }
        self.deps.store.set_tracking(false);

        match self.deps.source.unregister() {
            Ok(()) => info!(target: "controller", "Successfully unregistered from activity updates."),
            Err(err) => warn!(target: "controller", "FAILED to unregister from activity updates: {}", err),
        }

        self.deps.indicator.clear();
        self.set_state(SessionState::Stopped);
    }

    /// Asynchronous rejection of an accepted registration
    pub fn on_registration_failed(&mut self, err: RegistrationError) -> ControllerError {
        error!(target: "controller", "Registration failed after start: {}", err);
        self.stop();
        ControllerError::RegistrationFailure(err)
    }

    /// Apply a command coming from the manual on/off switch
    pub fn apply(&mut self, command: ToggleCommand) -> Result<(), ControllerError> {
        match command {
            ToggleCommand::Start => self.start(),
            ToggleCommand::Stop => {
                self.stop();
                Ok(())
            }
            ToggleCommand::RequestPermissions(missing) => Err(ControllerError::PermissionMissing(
                missing
                    .iter()
                    .map(|c| c.permission())
                    .collect::<Vec<_>>()
                    .join(", "),
            )),
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if self.state() != SessionState::Stopped {
            self.stop();
        }
    }
}

async fn observe_activity(
    mut changes: broadcast::Receiver<Option<ActivityCategory>>,
    deps: SessionDeps,
) {
    loop {
        let activity = match changes.recv().await {
            Ok(activity) => activity,
            Err(RecvError::Lagged(skipped)) => {
                warn!(target: "controller", "Observer lagged, {} transitions skipped", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        debug!(
            target: "controller",
            "Observed activity status change: {}",
            activity.map(|a| a.label()).unwrap_or("Unknown")
        );

        deps.indicator.update(&IndicatorContent::for_activity(
            &deps.indicator_config,
            activity,
        ));

        let actions = decide(activity);
        // Fire-and-forget: handles are dropped, failures surface as notices
        drop(dispatch_actions(&actions, &deps.trackers, &deps.notices));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{codes, TransitionEvent};
    use crate::classifier::{ClassifierAdapter, TransitionBroadcast};
    use crate::config::{open_tracks_packages, TrackmanConfig, GEO_TRACKER_PACKAGE};
    use crate::error::DispatchError;
    use crate::indicator::RecordingIndicator;
    use crate::intent::RecordingDispatcher;
    use crate::permissions::StaticPermissions;
    use crate::signaler::RecordingNoticeSink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeSource {
        registered: AtomicUsize,
        unregistered: AtomicUsize,
        reject: Mutex<Option<RegistrationError>>,
        unregister_error: Mutex<Option<RegistrationError>>,
        /// Transition delivered by the platform before `register` returns
        early_event: Mutex<Option<(Arc<StatusStore>, i32)>>,
    }

    impl TransitionSource for FakeSource {
        fn register(&self, transitions: &[MonitoredTransition]) -> Result<(), RegistrationError> {
            assert_eq!(transitions.len(), 10);
            if let Some(err) = self.reject.lock().unwrap().clone() {
                return Err(err);
            }
            self.registered.fetch_add(1, Ordering::SeqCst);
            if let Some((store, code)) = self.early_event.lock().unwrap().take() {
                store.record_transition(code);
            }
            Ok(())
        }

        fn unregister(&self) -> Result<(), RegistrationError> {
            self.unregistered.fetch_add(1, Ordering::SeqCst);
            match self.unregister_error.lock().unwrap().clone() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    struct Harness {
        controller: SessionController,
        store: Arc<StatusStore>,
        dispatcher: Arc<RecordingDispatcher>,
        indicator: Arc<RecordingIndicator>,
        notices: Arc<RecordingNoticeSink>,
        source: Arc<FakeSource>,
    }

    fn harness(permissions: StaticPermissions) -> Harness {
        let _ = env_logger::builder().is_test(true).try_init();
        let config = TrackmanConfig::default();
        let store = Arc::new(StatusStore::new());
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let indicator = Arc::new(RecordingIndicator::new());
        let notices = Arc::new(RecordingNoticeSink::new());
        let source = Arc::new(FakeSource::default());

        let deps = SessionDeps {
            store: store.clone(),
            trackers: Trackers::from_config(&config, dispatcher.clone()),
            indicator: indicator.clone(),
            notices: notices.clone(),
            permissions: Arc::new(permissions),
            source: source.clone(),
            indicator_config: config.indicator.clone(),
        };
        Harness {
            controller: SessionController::new(deps, Handle::current()),
            store,
            dispatcher,
            indicator,
            notices,
            source,
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(tokio::time::Instant::now() < deadline, "condition not reached");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn data_uris(dispatcher: &RecordingDispatcher) -> Vec<String> {
        dispatcher
            .sent_to(GEO_TRACKER_PACKAGE)
            .into_iter()
            .filter_map(|i| i.data)
            .collect()
    }

    #[tokio::test]
    async fn test_start_reaches_running() {
        let mut h = harness(StaticPermissions::all());
        h.controller.start().unwrap();

        assert_eq!(h.controller.state(), SessionState::Running);
        assert!(h.store.tracking_enabled());
        assert_eq!(h.source.registered.load(Ordering::SeqCst), 1);
        assert_eq!(h.indicator.visible().unwrap().text, "Tracking activity...");
        assert!(h.dispatcher.sent().is_empty());
    }

    #[tokio::test]
    async fn test_permission_denied_stays_stopped() {
        let mut h = harness(StaticPermissions::all().without(Capability::ActivityRecognition));
        let err = h.controller.start().unwrap_err();

        assert!(matches!(err, ControllerError::PermissionMissing(_)));
        assert_eq!(h.controller.state(), SessionState::Stopped);
        assert_eq!(h.source.registered.load(Ordering::SeqCst), 0);
        assert!(!h.store.tracking_enabled());
        assert!(h.indicator.ops().is_empty());
    }

    #[tokio::test]
    async fn test_registration_rejected_returns_to_stopped() {
        let mut h = harness(StaticPermissions::all());
        *h.source.reject.lock().unwrap() = Some(RegistrationError::Rejected("api unavailable".into()));

        let err = h.controller.start().unwrap_err();
        assert!(matches!(err, ControllerError::RegistrationFailure(_)));
        assert_eq!(h.controller.state(), SessionState::Stopped);
        assert!(!h.store.tracking_enabled());
    }

    #[tokio::test]
    async fn test_vehicle_then_still_dispatches_start_then_stop() {
        let mut h = harness(StaticPermissions::all());
        h.controller.start().unwrap();

        h.store.record_transition(codes::IN_VEHICLE);
        wait_until(|| h.dispatcher.sent().len() == 2).await;
        assert_eq!(data_uris(&h.dispatcher), vec!["geotracker://recorder/start"]);
        wait_until(|| h.indicator.visible().map(|c| c.text) == Some("In Vehicle".into())).await;

        h.store.record_transition(codes::STILL);
        wait_until(|| h.dispatcher.sent().len() == 4).await;
        assert_eq!(
            data_uris(&h.dispatcher),
            vec!["geotracker://recorder/start", "geotracker://recorder/stop"]
        );
        wait_until(|| h.indicator.visible().map(|c| c.text) == Some("Still".into())).await;

        let open_tracks = h.dispatcher.sent_to(open_tracks_packages::FDROID);
        assert_eq!(open_tracks.len(), 2);
        assert!(open_tracks[0].component.as_ref().unwrap().class.ends_with("StartRecording"));
        assert!(open_tracks[1].component.as_ref().unwrap().class.ends_with("StopRecording"));
    }

    #[tokio::test]
    async fn test_repeated_vehicle_event_dispatches_twice() {
        let mut h = harness(StaticPermissions::all());
        h.controller.start().unwrap();

        h.store.record_transition(codes::IN_VEHICLE);
        wait_until(|| h.dispatcher.sent().len() == 2).await;
        h.store.record_transition(codes::IN_VEHICLE);
        wait_until(|| h.dispatcher.sent().len() == 4).await;

        assert_eq!(
            data_uris(&h.dispatcher),
            vec!["geotracker://recorder/start", "geotracker://recorder/start"]
        );
    }

    #[tokio::test]
    async fn test_batched_repeats_each_dispatch() {
        let mut h = harness(StaticPermissions::all());
        h.controller.start().unwrap();

        let adapter = ClassifierAdapter::new(h.store.clone());
        let events = vec![
            TransitionEvent::new(codes::IN_VEHICLE, codes::TRANSITION_ENTER),
            TransitionEvent::new(codes::IN_VEHICLE, codes::TRANSITION_ENTER),
        ];
        assert_eq!(adapter.on_receive(&TransitionBroadcast::transitions(events)), 2);

        wait_until(|| h.dispatcher.sent().len() == 4).await;
        assert_eq!(
            data_uris(&h.dispatcher),
            vec!["geotracker://recorder/start", "geotracker://recorder/start"]
        );
        assert_eq!(h.dispatcher.sent_to(open_tracks_packages::FDROID).len(), 2);
        assert_eq!(h.store.update_count(), 2);
    }

    #[tokio::test]
    async fn test_event_during_registration_is_dispatched() {
        let mut h = harness(StaticPermissions::all());
        *h.source.early_event.lock().unwrap() = Some((h.store.clone(), codes::IN_VEHICLE));
        h.controller.start().unwrap();

        wait_until(|| h.dispatcher.sent().len() == 2).await;
        assert_eq!(data_uris(&h.dispatcher), vec!["geotracker://recorder/start"]);
        wait_until(|| h.indicator.visible().map(|c| c.text) == Some("In Vehicle".into())).await;
    }

    #[tokio::test]
    async fn test_missing_target_keeps_session_running() {
        let mut h = harness(StaticPermissions::all());
        h.dispatcher
            .fail_package(GEO_TRACKER_PACKAGE, DispatchError::ActivityNotFound);
        h.controller.start().unwrap();

        h.store.record_transition(codes::IN_VEHICLE);
        wait_until(|| !h.notices.messages().is_empty()).await;
        wait_until(|| h.dispatcher.sent_to(open_tracks_packages::FDROID).len() == 1).await;

        assert_eq!(
            h.notices.messages(),
            vec!["Geo Tracker not found or cannot handle action.".to_string()]
        );
        assert_eq!(h.controller.state(), SessionState::Running);

        // Later events are still processed
        h.store.record_transition(codes::WALKING);
        wait_until(|| h.dispatcher.sent_to(open_tracks_packages::FDROID).len() == 2).await;
    }

    #[tokio::test]
    async fn test_slow_target_does_not_stall_next_event() {
        let mut h = harness(StaticPermissions::all());
        h.dispatcher
            .delay_package(GEO_TRACKER_PACKAGE, Duration::from_millis(1000));
        h.controller.start().unwrap();

        h.store.record_transition(codes::IN_VEHICLE);
        wait_until(|| h.dispatcher.sent_to(open_tracks_packages::FDROID).len() == 1).await;
        h.store.record_transition(codes::STILL);
        wait_until(|| h.dispatcher.sent_to(open_tracks_packages::FDROID).len() == 2).await;

        // Both OpenTracks requests went out while Geo Tracker was still blocked
        assert!(h.dispatcher.sent_to(GEO_TRACKER_PACKAGE).len() < 2);
        wait_until(|| h.dispatcher.sent_to(GEO_TRACKER_PACKAGE).len() == 2).await;
    }

    #[tokio::test]
    async fn test_stop_clears_indicator_and_keeps_last_values() {
        let mut h = harness(StaticPermissions::all());
        *h.source.unregister_error.lock().unwrap() =
            Some(RegistrationError::Security("revoked".into()));
        h.controller.start().unwrap();
        h.store.record_transition(codes::WALKING);
        wait_until(|| h.dispatcher.sent().len() == 2).await;

        h.controller.stop();
        assert_eq!(h.controller.state(), SessionState::Stopped);
        assert_eq!(h.source.unregistered.load(Ordering::SeqCst), 1);
        assert!(h.indicator.visible().is_none());

        let snap = h.store.snapshot();
        assert!(!snap.tracking_enabled);
        assert_eq!(snap.current_activity, Some(ActivityCategory::Walking));

        // Events after stop no longer trigger signals
        h.store.record_transition(codes::IN_VEHICLE);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.dispatcher.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let mut h = harness(StaticPermissions::all());
        h.controller.start().unwrap();
        h.controller.start().unwrap();
        assert_eq!(h.source.registered.load(Ordering::SeqCst), 1);

        h.controller.stop();
        h.controller.stop();
        assert_eq!(h.source.unregistered.load(Ordering::SeqCst), 1);

        h.controller.start().unwrap();
        assert_eq!(h.controller.state(), SessionState::Running);
        assert_eq!(h.source.registered.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_late_registration_failure_stops_session() {
        let mut h = harness(StaticPermissions::all());
        h.controller.start().unwrap();

        let err = h
            .controller
            .on_registration_failed(RegistrationError::Security("permission revoked".into()));
        assert!(matches!(err, ControllerError::RegistrationFailure(_)));
        assert_eq!(h.controller.state(), SessionState::Stopped);
        assert!(!h.store.tracking_enabled());
    }

    #[tokio::test]
    async fn test_toggle_commands() {
        let mut h = harness(StaticPermissions::all());
        h.controller.apply(ToggleCommand::Start).unwrap();
        assert_eq!(h.controller.state(), SessionState::Running);
        h.controller.apply(ToggleCommand::Stop).unwrap();
        assert_eq!(h.controller.state(), SessionState::Stopped);

        let err = h
            .controller
            .apply(ToggleCommand::RequestPermissions(vec![Capability::PostNotifications]))
            .unwrap_err();
        assert_eq!(
            err,
            ControllerError::PermissionMissing("android.permission.POST_NOTIFICATIONS".into())
        );
    }

    #[tokio::test]
    async fn test_drop_while_running_unregisters() {
        let h = harness(StaticPermissions::all());
        let source = h.source.clone();
        let store = h.store.clone();
        let mut controller = h.controller;
        controller.start().unwrap();
        drop(controller);

        assert_eq!(source.unregistered.load(Ordering::SeqCst), 1);
        assert!(!store.tracking_enabled());
    }
}
