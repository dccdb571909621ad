// Trackman Android JNI Library
// Exposes the Rust tracking core to Kotlin via JNI

pub mod android_jni;
pub mod error;
pub mod platform;
pub mod runtime;
pub mod transition_receiver;

pub use error::{JResult, TrackmanJniError};
pub use platform::AndroidPlatform;
pub use runtime::{PlatformSeams, TrackmanRuntime};
