use crate::error::{JResult, TrackmanJniError};
use log::{error, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Runtime;
use trackman_rs::classifier::{ClassifierAdapter, TransitionBroadcast};
use trackman_rs::config::TrackmanConfig;
use trackman_rs::controller::{SessionController, SessionDeps, SessionState, TransitionSource};
use trackman_rs::error::RegistrationError;
use trackman_rs::indicator::StatusIndicator;
use trackman_rs::intent::IntentDispatcher;
use trackman_rs::live_status::LiveStatus;
use trackman_rs::permissions::{
    app_settings_intent, Capability, GateDecision, PermissionChecker, PermissionGate,
    ToggleCommand,
};
use trackman_rs::signaler::{NoticeSink, Trackers};
use trackman_rs::status_store::StatusStore;

/// Platform implementations the runtime is wired to
#[derive(Clone)]
pub struct PlatformSeams {
    pub dispatcher: Arc<dyn IntentDispatcher>,
    pub permissions: Arc<dyn PermissionChecker>,
    pub source: Arc<dyn TransitionSource>,
    pub indicator: Arc<dyn StatusIndicator>,
    pub notices: Arc<dyn NoticeSink>,
}

/// Everything that lives for the whole process once `init` ran
pub struct TrackmanRuntime {
    // Dropped before the tokio runtime so the observer is aborted on a live runtime
    controller: Mutex<SessionController>,
    gate: Mutex<PermissionGate>,
    permissions: Arc<dyn PermissionChecker>,
    dispatcher: Arc<dyn IntentDispatcher>,
    app_package: String,
    store: Arc<StatusStore>,
    adapter: ClassifierAdapter,
    runtime: Runtime,
}

impl TrackmanRuntime {
    /// `app_package` is this app's own package, target of the settings deep link
    pub fn new(
        seams: PlatformSeams,
        config: &TrackmanConfig,
        sdk_int: i32,
        app_package: String,
    ) -> JResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("trackman-worker")
            .enable_all()
            .build()
            .map_err(|e| TrackmanJniError::Internal(format!("Failed to build runtime: {}", e)))?;

        let store = Arc::new(StatusStore::new());
        let deps = SessionDeps {
            store: store.clone(),
            trackers: Trackers::from_config(config, seams.dispatcher.clone()),
            indicator: seams.indicator,
            notices: seams.notices,
            permissions: seams.permissions.clone(),
            source: seams.source,
            indicator_config: config.indicator.clone(),
        };
        let controller = SessionController::new(deps, runtime.handle().clone());
        info!(target: "jni", "Trackman runtime ready (sdk {})", sdk_int);

        Ok(Self {
            controller: Mutex::new(controller),
            gate: Mutex::new(PermissionGate::new(sdk_int)),
            permissions: seams.permissions,
            dispatcher: seams.dispatcher,
            app_package,
            adapter: ClassifierAdapter::new(store.clone()),
            store,
            runtime,
        })
    }

    fn controller(&self) -> JResult<MutexGuard<'_, SessionController>> {
        self.controller
            .lock()
            .map_err(|_| TrackmanJniError::Internal("Failed to acquire controller lock".to_string()))
    }

    fn gate(&self) -> JResult<MutexGuard<'_, PermissionGate>> {
        self.gate
            .lock()
            .map_err(|_| TrackmanJniError::Internal("Failed to acquire permission gate lock".to_string()))
    }

    pub fn store(&self) -> &Arc<StatusStore> {
        &self.store
    }

    pub fn handle(&self) -> &tokio::runtime::Handle {
        self.runtime.handle()
    }

    pub fn start(&self) -> JResult<()> {
        self.controller()?.start()?;
        Ok(())
    }

    pub fn stop(&self) -> JResult<()> {
        self.controller()?.stop();
        Ok(())
    }

    /// Manual switch: `true` starts only when every required grant is present
    pub fn set_enabled(&self, enabled: bool) -> JResult<()> {
        let command: ToggleCommand = self.gate()?.toggle(enabled, self.permissions.as_ref());
        self.controller()?.apply(command)?;
        Ok(())
    }

    pub fn missing_permissions(&self) -> JResult<Vec<Capability>> {
        Ok(self.gate()?.missing(self.permissions.as_ref()))
    }

    /// Records a permission dialog result; returns whether the settings
    /// deep link should be offered next
    pub fn on_permission_result(&self, capability: Capability, granted: bool) -> JResult<bool> {
        let mut gate = self.gate()?;
        gate.record_results(&[(capability, granted)]);
        Ok(matches!(
            gate.evaluate(self.permissions.as_ref()),
            GateDecision::NeedsGrant {
                offer_settings: true,
                ..
            }
        ))
    }

    /// Open the system settings page of this app so denied grants can be
    /// given by hand
    pub fn open_app_settings(&self) -> JResult<()> {
        info!(target: "jni", "Opening app settings for {}", self.app_package);
        self.dispatcher
            .start_activity(&app_settings_intent(&self.app_package))
            .map_err(|err| {
                warn!(target: "jni", "Settings page unavailable: {}", err);
                TrackmanJniError::from(err)
            })
    }

    pub fn on_broadcast(&self, broadcast: &TransitionBroadcast) -> usize {
        self.adapter.on_receive(broadcast)
    }

    pub fn on_registration_failed(&self, message: String) -> JResult<()> {
        let err = self
            .controller()?
            .on_registration_failed(RegistrationError::Rejected(message));
        error!(target: "jni", "{}", err);
        Ok(())
    }

    pub fn session_state(&self) -> JResult<SessionState> {
        Ok(self.controller()?.state())
    }

    pub fn is_tracking(&self) -> bool {
        self.store.tracking_enabled()
    }

    pub fn update_count(&self) -> u64 {
        self.store.update_count()
    }

    pub fn status_json(&self) -> JResult<String> {
        let status = LiveStatus::new(&self.store.snapshot(), self.session_state()?);
        status
            .to_json()
            .map_err(|_| TrackmanJniError::Internal("JSON serialization failed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackman_rs::activity::{codes, MonitoredTransition, TransitionEvent};
    use trackman_rs::config::GEO_TRACKER_PACKAGE;
    use trackman_rs::error::{ControllerError, DispatchError};
    use trackman_rs::indicator::RecordingIndicator;
    use trackman_rs::intent::RecordingDispatcher;
    use trackman_rs::permissions::{StaticPermissions, ACTION_APPLICATION_DETAILS_SETTINGS};
    use trackman_rs::signaler::RecordingNoticeSink;

    struct AcceptingSource;

    impl TransitionSource for AcceptingSource {
        fn register(&self, _transitions: &[MonitoredTransition]) -> Result<(), RegistrationError> {
            Ok(())
        }

        fn unregister(&self) -> Result<(), RegistrationError> {
            Ok(())
        }
    }

    fn runtime(permissions: StaticPermissions) -> (TrackmanRuntime, Arc<RecordingDispatcher>) {
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let seams = PlatformSeams {
            dispatcher: dispatcher.clone(),
            permissions: Arc::new(permissions),
            source: Arc::new(AcceptingSource),
            indicator: Arc::new(RecordingIndicator::new()),
            notices: Arc::new(RecordingNoticeSink::new()),
        };
        let rt = TrackmanRuntime::new(
            seams,
            &TrackmanConfig::default(),
            34,
            "com.chromian.trackman".to_string(),
        )
        .unwrap();
        (rt, dispatcher)
    }

    #[test]
    fn test_broadcast_reaches_trackers() {
        let (rt, dispatcher) = runtime(StaticPermissions::all());
        rt.start().unwrap();
        assert!(rt.is_tracking());

        let events = vec![TransitionEvent::new(codes::IN_VEHICLE, codes::TRANSITION_ENTER)];
        assert_eq!(rt.on_broadcast(&TransitionBroadcast::transitions(events)), 1);
        assert_eq!(rt.update_count(), 1);

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while dispatcher.sent_to(GEO_TRACKER_PACKAGE).is_empty() {
            assert!(std::time::Instant::now() < deadline, "no dispatch");
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        rt.stop().unwrap();
        assert!(!rt.is_tracking());
    }

    #[test]
    fn test_start_without_permission_is_illegal_state() {
        let (rt, _) = runtime(StaticPermissions::none());
        let err = rt.start().unwrap_err();
        assert!(matches!(
            err,
            TrackmanJniError::Controller(ControllerError::PermissionMissing(_))
        ));
        assert_eq!(rt.session_state().unwrap(), SessionState::Stopped);
    }

    #[test]
    fn test_toggle_and_permission_feedback() {
        let (rt, _) = runtime(StaticPermissions::all().without(Capability::ActivityRecognition));
        assert_eq!(
            rt.missing_permissions().unwrap(),
            vec![Capability::ActivityRecognition]
        );
        assert!(rt.set_enabled(true).is_err());
        assert!(rt
            .on_permission_result(Capability::ActivityRecognition, false)
            .unwrap());
        rt.set_enabled(false).unwrap();
    }

    #[test]
    fn test_denial_then_open_settings() {
        let (rt, dispatcher) = runtime(StaticPermissions::none());
        let offer = rt
            .on_permission_result(Capability::ActivityRecognition, false)
            .unwrap();
        assert!(offer);

        rt.open_app_settings().unwrap();
        let sent = dispatcher.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].action.as_deref(), Some(ACTION_APPLICATION_DETAILS_SETTINGS));
        assert_eq!(sent[0].data.as_deref(), Some("package:com.chromian.trackman"));
        assert!(sent[0].new_task);
    }

    #[test]
    fn test_open_settings_failure_is_reported() {
        let (rt, dispatcher) = runtime(StaticPermissions::all());
        // The settings intent is addressed by action only, so it carries no package
        dispatcher.fail_package("", DispatchError::ActivityNotFound);

        let err = rt.open_app_settings().unwrap_err();
        assert!(matches!(
            err,
            TrackmanJniError::Settings(DispatchError::ActivityNotFound)
        ));
    }

    #[test]
    fn test_registration_failure_and_status_json() {
        let (rt, _) = runtime(StaticPermissions::all());
        rt.start().unwrap();
        rt.on_registration_failed("api unavailable".to_string()).unwrap();
        assert_eq!(rt.session_state().unwrap(), SessionState::Stopped);

        let json = rt.status_json().unwrap();
        let status: LiveStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(status.session_state, SessionState::Stopped);
        assert!(!status.tracking_enabled);
    }
}
