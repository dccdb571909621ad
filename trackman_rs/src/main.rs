use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use flate2::read::GzDecoder;
use log::{error, info, warn};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::time::{sleep, Duration};

use trackman_rs::activity::{MonitoredTransition, TransitionEvent};
use trackman_rs::classifier::{ClassifierAdapter, TransitionBroadcast};
use trackman_rs::config::TrackmanConfig;
use trackman_rs::controller::{SessionController, SessionDeps, TransitionSource};
use trackman_rs::dashboard::{start_dashboard, DashboardState};
use trackman_rs::error::{DispatchError, RegistrationError};
use trackman_rs::indicator::LogIndicator;
use trackman_rs::intent::RecordingDispatcher;
use trackman_rs::live_status::LiveStatus;
use trackman_rs::permissions::{Capability, PermissionGate, StaticPermissions};
use trackman_rs::signaler::{RecordingNoticeSink, Trackers};
use trackman_rs::status_store::StatusStore;

#[derive(Parser, Debug)]
#[command(name = "trackman")]
#[command(about = "Replay recorded activity transitions through the tracking pipeline", long_about = None)]
struct Args {
    /// Path to a JSON array of transition events (.json or .json.gz)
    #[arg(long)]
    events: PathBuf,

    /// Configuration file (JSON); defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pretend the activity recognition permission was not granted
    #[arg(long, default_value_t = false)]
    deny_activity_permission: bool,

    /// Package to treat as not installed (repeatable)
    #[arg(long)]
    missing_target: Vec<String>,

    /// Serve the status dashboard on this port during the replay
    #[arg(long)]
    dashboard_port: Option<u16>,

    /// Write live status JSON here after every event
    #[arg(long)]
    status_out: Option<PathBuf>,

    /// Delay between replayed events in milliseconds
    #[arg(long, default_value = "200")]
    interval_ms: u64,

    /// Platform API level used for the permission gate
    #[arg(long, default_value = "34")]
    sdk_int: i32,
}

/// Stand-in for the platform transition API, accepts every registration
#[derive(Default)]
struct SimulatedSource {
    registrations: AtomicUsize,
}

impl TransitionSource for SimulatedSource {
    fn register(&self, transitions: &[MonitoredTransition]) -> Result<(), RegistrationError> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        info!(target: "replay", "Registered {} transition monitored", transitions.len());
        Ok(())
    }

    fn unregister(&self) -> Result<(), RegistrationError> {
        info!(target: "replay", "Transition updates removed");
        Ok(())
    }
}

fn load_events(path: &Path) -> Result<Vec<TransitionEvent>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let reader = BufReader::new(GzDecoder::new(file));
        Ok(serde_json::from_reader(reader)?)
    } else {
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => TrackmanConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TrackmanConfig::default(),
    };
    let events = load_events(&args.events)?;

    println!("[{}] Trackman replay starting", ts_now());
    println!("  Events: {} ({})", events.len(), args.events.display());
    println!("  OpenTracks package: {}", config.open_tracks.package);
    println!("  Geo Tracker package: {}", config.geo_tracker.package);

    let dispatcher = Arc::new(RecordingDispatcher::new());
    for package in &args.missing_target {
        dispatcher.fail_package(package, DispatchError::ActivityNotFound);
    }

    let mut permissions = StaticPermissions::all();
    if args.deny_activity_permission {
        permissions = permissions.without(Capability::ActivityRecognition);
    }
    let permissions = Arc::new(permissions);

    let store = Arc::new(StatusStore::new());
    let notices = Arc::new(RecordingNoticeSink::new());
    let source = Arc::new(SimulatedSource::default());

    let deps = SessionDeps {
        store: store.clone(),
        trackers: Trackers::from_config(&config, dispatcher.clone()),
        indicator: Arc::new(LogIndicator),
        notices: notices.clone(),
        permissions: permissions.clone(),
        source: source.clone(),
        indicator_config: config.indicator.clone(),
    };
    let mut controller = SessionController::new(deps, Handle::current());

    if let Some(port) = args.dashboard_port {
        let state = DashboardState {
            store: store.clone(),
            session: controller.subscribe_state(),
        };
        tokio::spawn(async move {
            if let Err(err) = start_dashboard(state, port).await {
                error!(target: "replay", "Dashboard failed: {}", err);
            }
        });
    }

    let gate = PermissionGate::new(args.sdk_int);
    if let Err(err) = controller.apply(gate.toggle(true, permissions.as_ref())) {
        warn!(target: "replay", "Tracking not started: {}", err);
    }

    let adapter = ClassifierAdapter::new(store.clone());
    let interval = Duration::from_millis(args.interval_ms);
    for event in &events {
        adapter.on_receive(&TransitionBroadcast::transitions(vec![*event]));
        sleep(interval).await;

        if let Some(path) = &args.status_out {
            LiveStatus::new(&store.snapshot(), controller.state()).save(path)?;
        }
    }

    // Dispatches run detached; give the last ones a moment to land
    sleep(interval.max(Duration::from_millis(100))).await;
    let final_state = controller.state();
    let snapshot = store.snapshot();
    controller.stop();

    if let Some(path) = &args.status_out {
        LiveStatus::new(&store.snapshot(), controller.state()).save(path)?;
    }

    println!("\n=== Replay summary ===");
    println!("Session state at end:   {:?}", final_state);
    println!("Registrations:          {}", source.registrations.load(Ordering::SeqCst));
    println!("Transitions recorded:   {}", snapshot.update_count);
    println!("Last activity:          {}", snapshot.label());
    println!(
        "OpenTracks requests:    {}",
        dispatcher.sent_to(&config.open_tracks.package).len()
    );
    println!(
        "Geo Tracker requests:   {}",
        dispatcher.sent_to(&config.geo_tracker.package).len()
    );
    let messages = notices.messages();
    println!("Notices:                {}", messages.len());
    for message in messages {
        println!("  - {}", message);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use trackman_rs::activity::codes;

    const LOG: &str = r#"[
        {"activity_type": 0, "transition_type": 0},
        {"activity_type": 3, "transition_type": 0, "elapsed_realtime_nanos": 42}
    ]"#;

    #[test]
    fn test_load_plain_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        std::fs::write(&path, LOG).unwrap();

        let events = load_events(&path).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], TransitionEvent::new(codes::IN_VEHICLE, codes::TRANSITION_ENTER));
        assert_eq!(events[1].elapsed_realtime_nanos, 42);
    }

    #[test]
    fn test_load_gzip_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(LOG.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let events = load_events(&path).unwrap();
        assert_eq!(events[1].activity_type, codes::STILL);
    }
}
