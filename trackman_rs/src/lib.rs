//! Vehicle-triggered recording control for external GPS tracker apps.
//!
//! Activity transitions from the platform classifier land in a [`StatusStore`];
//! while a [`SessionController`] is running, every published activity is run
//! through the trigger policy and signalled to OpenTracks and Geo Tracker.

pub mod activity;
pub mod classifier;
pub mod config;
pub mod controller;
pub mod dashboard;
pub mod error;
pub mod indicator;
pub mod intent;
pub mod live_status;
pub mod permissions;
pub mod policy;
pub mod signaler;
pub mod status_store;

pub use activity::{ActivityCategory, TransitionEvent};
pub use classifier::{ClassifierAdapter, TransitionBroadcast};
pub use config::TrackmanConfig;
pub use controller::{SessionController, SessionDeps, SessionState, TransitionSource};
pub use error::{ControllerError, DispatchError, RegistrationError, SignalError};
pub use live_status::LiveStatus;
pub use policy::{decide, TrackerAction, TrackerKind, Verb};
pub use status_store::{StatusSnapshot, StatusStore};
