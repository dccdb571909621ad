use crate::policy::TrackerKind;
use thiserror::Error;

/// Failure reported by the platform when delivering an addressed request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("No activity found to handle the request")]
    ActivityNotFound,

    #[error("Security exception: {0}")]
    Security(String),

    #[error("Dispatch failed: {0}")]
    Other(String),
}

/// Outcome of a failed tracker signal
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    #[error("{target} is not installed or does not handle {detail}")]
    TargetNotInstalled { target: TrackerKind, detail: String },

    #[error("Permission denied addressing {target}: {reason}")]
    PermissionDenied { target: TrackerKind, reason: String },

    #[error("Unexpected failure signalling {target}: {reason}")]
    UnknownFailure { target: TrackerKind, reason: String },

    #[error("{target} does not support the {verb} action")]
    UnsupportedVerb { target: TrackerKind, verb: String },
}

impl SignalError {
    pub fn target(&self) -> TrackerKind {
        match self {
            SignalError::TargetNotInstalled { target, .. }
            | SignalError::PermissionDenied { target, .. }
            | SignalError::UnknownFailure { target, .. }
            | SignalError::UnsupportedVerb { target, .. } => *target,
        }
    }

    /// Short text for the transient user-visible notice
    pub fn notice(&self) -> String {
        match (self, self.target()) {
            (SignalError::TargetNotInstalled { .. }, TrackerKind::OpenTracks) => {
                "OpenTracks not found or API not available/enabled.".to_string()
            }
            (SignalError::TargetNotInstalled { .. }, TrackerKind::GeoTracker) => {
                "Geo Tracker not found or cannot handle action.".to_string()
            }
            (SignalError::PermissionDenied { .. }, TrackerKind::OpenTracks) => {
                "Permission denied. Enable OpenTracks Public API?".to_string()
            }
            (SignalError::PermissionDenied { .. }, TrackerKind::GeoTracker) => {
                "Permission denied for Geo Tracker action.".to_string()
            }
            (SignalError::UnsupportedVerb { verb, .. }, target) => {
                format!("{} cannot {}.", target, verb)
            }
            (SignalError::UnknownFailure { .. }, target) => format!("Failed to signal {}.", target),
        }
    }
}

/// Failure of the platform transition subscription
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Security exception during transition registration: {0}")]
    Security(String),

    #[error("Transition registration rejected: {0}")]
    Rejected(String),
}

/// Errors surfaced by the session controller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error("Permission missing: {0}")]
    PermissionMissing(String),

    #[error("Tracker unavailable: {0}")]
    TargetUnavailable(String),

    #[error("Registration failure: {0}")]
    RegistrationFailure(#[from] RegistrationError),

    #[error("Dispatch failure: {0}")]
    DispatchFailure(String),
}

impl From<SignalError> for ControllerError {
    fn from(err: SignalError) -> Self {
        match err {
            SignalError::TargetNotInstalled { .. } => {
                ControllerError::TargetUnavailable(err.to_string())
            }
            SignalError::PermissionDenied { .. } => {
                ControllerError::PermissionMissing(err.to_string())
            }
            SignalError::UnknownFailure { .. } | SignalError::UnsupportedVerb { .. } => {
                ControllerError::DispatchFailure(err.to_string())
            }
        }
    }
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
