use jni::JNIEnv;
use thiserror::Error;
use trackman_rs::error::{ControllerError, DispatchError};

/// Error types of the JNI shell
#[derive(Error, Debug, Clone)]
pub enum TrackmanJniError {
    #[error("Trackman not initialised, call init(context) first")]
    NotInitialized,

    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error("Failed to open system settings: {0}")]
    Settings(#[from] DispatchError),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("JNI error: {0}")]
    JniError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<jni::errors::Error> for TrackmanJniError {
    fn from(err: jni::errors::Error) -> Self {
        TrackmanJniError::JniError(err.to_string())
    }
}

/// Result type for JNI operations
pub type JResult<T> = Result<T, TrackmanJniError>;

/// Java exception class a given error is raised as
pub fn exception_class(error: &TrackmanJniError) -> &'static str {
    match error {
        TrackmanJniError::NotInitialized
        | TrackmanJniError::Controller(ControllerError::PermissionMissing(_))
        | TrackmanJniError::Controller(ControllerError::RegistrationFailure(_)) => {
            "java/lang/IllegalStateException"
        }
        TrackmanJniError::InvalidParameters(_) => "java/lang/IllegalArgumentException",
        TrackmanJniError::Controller(_)
        | TrackmanJniError::Settings(_)
        | TrackmanJniError::JniError(_)
        | TrackmanJniError::Internal(_) => "java/lang/RuntimeException",
    }
}

/// Throw Java exception from Rust error
pub fn throw_java_exception(env: &mut JNIEnv, error: &TrackmanJniError) -> JResult<()> {
    let message = error.to_string();
    env.throw_new(exception_class(error), message)
        .map_err(|_| TrackmanJniError::JniError("Failed to throw exception".to_string()))?;

    Ok(())
}
