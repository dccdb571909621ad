use crate::error::{throw_java_exception, JResult, TrackmanJniError};
use crate::platform::AndroidPlatform;
use crate::runtime::{PlatformSeams, TrackmanRuntime};
use crate::transition_receiver::broadcast_from_arrays;
use jni::objects::{JClass, JIntArray, JObject, JString};
use jni::sys::{jboolean, jint, jlong, jobjectArray, jstring, JNI_FALSE, JNI_TRUE};
use jni::JNIEnv;
use log::{info, warn};
use std::sync::{Arc, Mutex};
use trackman_rs::config::TrackmanConfig;
use trackman_rs::permissions::Capability;

// Process-wide runtime, stored as static to persist across JNI calls
lazy_static::lazy_static! {
    static ref GLOBAL_RUNTIME: Mutex<Option<Arc<TrackmanRuntime>>> = Mutex::new(None);
}

fn get_runtime() -> JResult<Arc<TrackmanRuntime>> {
    let guard = GLOBAL_RUNTIME.lock().map_err(|_| {
        TrackmanJniError::Internal("Failed to acquire global runtime lock".to_string())
    })?;
    guard.as_ref().map(Arc::clone).ok_or(TrackmanJniError::NotInitialized)
}

fn init_logging() {
    #[cfg(target_os = "android")]
    {
        let _ = android_log::init("Trackman");
    }
}

fn read_optional_string(env: &mut JNIEnv, value: &JString) -> JResult<Option<String>> {
    if value.is_null() {
        return Ok(None);
    }
    Ok(Some(env.get_string(value)?.into()))
}

fn read_optional_ints(env: &mut JNIEnv, array: &JIntArray) -> JResult<Option<Vec<i32>>> {
    if array.is_null() {
        return Ok(None);
    }
    let len = env.get_array_length(array)? as usize;
    let mut values = vec![0; len];
    env.get_int_array_region(array, 0, &mut values)?;
    Ok(Some(values))
}

fn to_jint(result: JResult<()>, env: &mut JNIEnv) -> jint {
    match result {
        Ok(_) => 0,
        Err(e) => {
            let _ = throw_java_exception(env, &e);
            -1
        }
    }
}

fn new_java_string(env: &mut JNIEnv, value: JResult<String>) -> jstring {
    let value = match value {
        Ok(value) => value,
        Err(e) => {
            let _ = throw_java_exception(env, &e);
            return std::ptr::null_mut();
        }
    };
    match env.new_string(&value) {
        Ok(jstr) => jstr.into_raw(),
        Err(_) => {
            let _ = throw_java_exception(
                env,
                &TrackmanJniError::JniError("Failed to create Java string".to_string()),
            );
            std::ptr::null_mut()
        }
    }
}

/// JNI: Wire the runtime to the application context. Repeated calls keep the
/// existing runtime.
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_chromian_trackman_TrackmanNative_init(
    mut env: JNIEnv,
    _class: JClass,
    context: JObject,
) -> jint {
    let result = init_impl(&mut env, &context);
    to_jint(result, &mut env)
}

fn init_impl(env: &mut JNIEnv, context: &JObject) -> JResult<()> {
    init_logging();
    let mut guard = GLOBAL_RUNTIME.lock().map_err(|_| {
        TrackmanJniError::Internal("Failed to acquire global runtime lock".to_string())
    })?;
    if guard.is_some() {
        info!(target: "jni", "Runtime already initialised");
        return Ok(());
    }
    if context.is_null() {
        return Err(TrackmanJniError::InvalidParameters("context is null".to_string()));
    }

    let config = TrackmanConfig::default();
    let sdk_int = AndroidPlatform::sdk_int(env)?;
    let app_package = AndroidPlatform::package_name(env, context)?;
    let platform = Arc::new(AndroidPlatform::new(env, context, config.indicator.clone())?);
    let seams = PlatformSeams {
        dispatcher: platform.clone(),
        permissions: platform.clone(),
        source: platform.clone(),
        indicator: platform.clone(),
        notices: platform,
    };
    *guard = Some(Arc::new(TrackmanRuntime::new(
        seams,
        &config,
        sdk_int,
        app_package,
    )?));
    Ok(())
}

/// JNI: Start tracking (foreground service onStartCommand)
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_chromian_trackman_TrackmanNative_startTracking(
    mut env: JNIEnv,
    _class: JClass,
) -> jint {
    let result = get_runtime().and_then(|rt| rt.start());
    to_jint(result, &mut env)
}

/// JNI: Stop tracking, idempotent
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_chromian_trackman_TrackmanNative_stopTracking(
    mut env: JNIEnv,
    _class: JClass,
) -> jint {
    let result = get_runtime().and_then(|rt| rt.stop());
    to_jint(result, &mut env)
}

/// JNI: Manual on/off switch, gated on the required permissions
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_chromian_trackman_TrackmanNative_setTrackingEnabled(
    mut env: JNIEnv,
    _class: JClass,
    enabled: jboolean,
) -> jint {
    let result = get_runtime().and_then(|rt| rt.set_enabled(enabled != JNI_FALSE));
    to_jint(result, &mut env)
}

/// JNI: Forward an activity transition broadcast
/// Parameters: intent action, parallel arrays of activity and transition types
/// (null when the intent had no transition result)
/// Returns: number of events recorded, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_chromian_trackman_TrackmanNative_onTransitionBroadcast(
    mut env: JNIEnv,
    _class: JClass,
    action: JString,
    activity_types: JIntArray,
    transition_types: JIntArray,
) -> jint {
    match on_transition_broadcast_impl(&mut env, &action, &activity_types, &transition_types) {
        Ok(count) => count as jint,
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            -1
        }
    }
}

fn on_transition_broadcast_impl(
    env: &mut JNIEnv,
    action: &JString,
    activity_types: &JIntArray,
    transition_types: &JIntArray,
) -> JResult<usize> {
    let runtime = get_runtime()?;
    let broadcast = broadcast_from_arrays(
        read_optional_string(env, action)?,
        read_optional_ints(env, activity_types)?,
        read_optional_ints(env, transition_types)?,
    )?;
    Ok(runtime.on_broadcast(&broadcast))
}

/// JNI: The transition registration was rejected after start returned
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_chromian_trackman_TrackmanNative_onRegistrationFailed(
    mut env: JNIEnv,
    _class: JClass,
    message: JString,
) -> jint {
    let result = read_optional_string(&mut env, &message).and_then(|message| {
        get_runtime()?.on_registration_failed(message.unwrap_or_else(|| "unknown".to_string()))
    });
    to_jint(result, &mut env)
}

/// JNI: Whether tracking is currently enabled
#[no_mangle]
pub extern "C" fn Java_com_chromian_trackman_TrackmanNative_isTracking(
    _env: JNIEnv,
    _class: JClass,
) -> jboolean {
    match get_runtime() {
        Ok(rt) if rt.is_tracking() => JNI_TRUE,
        _ => JNI_FALSE,
    }
}

/// JNI: Number of transitions processed since init
#[no_mangle]
pub extern "C" fn Java_com_chromian_trackman_TrackmanNative_getUpdateCount(
    _env: JNIEnv,
    _class: JClass,
) -> jlong {
    get_runtime().map(|rt| rt.update_count() as jlong).unwrap_or(0)
}

/// JNI: Export live status as JSON string
/// Returns: JSON string or null on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_chromian_trackman_TrackmanNative_getStatusJson(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    let json = get_runtime().and_then(|rt| rt.status_json());
    new_java_string(&mut env, json)
}

/// JNI: Permissions still missing for the manual switch
/// Returns: String[] of Android permission names, null on error
#[no_mangle]
pub extern "C" fn Java_com_chromian_trackman_TrackmanNative_missingPermissions(
    mut env: JNIEnv,
    _class: JClass,
) -> jobjectArray {
    match missing_permissions_impl(&mut env) {
        Ok(array) => array,
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            std::ptr::null_mut()
        }
    }
}

fn missing_permissions_impl(env: &mut JNIEnv) -> JResult<jobjectArray> {
    let missing = get_runtime()?.missing_permissions()?;
    let array = env.new_object_array(missing.len() as i32, "java/lang/String", JObject::null())?;
    for (i, capability) in missing.iter().enumerate() {
        let name = env.new_string(capability.permission())?;
        env.set_object_array_element(&array, i as i32, name)?;
    }
    Ok(array.into_raw())
}

/// JNI: Open this app's system settings page (offered after a denial)
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_chromian_trackman_TrackmanNative_openAppSettings(
    mut env: JNIEnv,
    _class: JClass,
) -> jint {
    let result = get_runtime().and_then(|rt| rt.open_app_settings());
    to_jint(result, &mut env)
}

/// JNI: Feed back a permission dialog result
/// Returns: true when the app settings link should be offered next
#[no_mangle]
pub extern "C" fn Java_com_chromian_trackman_TrackmanNative_onPermissionResult(
    mut env: JNIEnv,
    _class: JClass,
    permission: JString,
    granted: jboolean,
) -> jboolean {
    match on_permission_result_impl(&mut env, &permission, granted != JNI_FALSE) {
        Ok(true) => JNI_TRUE,
        Ok(false) => JNI_FALSE,
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            JNI_FALSE
        }
    }
}

fn on_permission_result_impl(env: &mut JNIEnv, permission: &JString, granted: bool) -> JResult<bool> {
    let name = read_optional_string(env, permission)?.unwrap_or_default();
    let Some(capability) = Capability::from_permission(&name) else {
        warn!(target: "jni", "Ignoring result for unrelated permission {}", name);
        return Ok(false);
    };
    get_runtime()?.on_permission_result(capability, granted)
}
