//! JNI implementations of the core platform seams.
//!
//! Intents and permission checks go straight through the stored `Context`.
//! Transition registration, the foreground notification and toasts need
//! Play Services or the main looper, so they are delegated to static methods
//! on the Kotlin `TrackmanBridge` class.

use crate::error::JResult;
use jni::objects::{GlobalRef, JClass, JObject, JString, JValue};
use jni::{JNIEnv, JavaVM};
use log::{debug, warn};
use trackman_rs::activity::MonitoredTransition;
use trackman_rs::config::IndicatorConfig;
use trackman_rs::controller::TransitionSource;
use trackman_rs::error::{DispatchError, RegistrationError};
use trackman_rs::indicator::{IndicatorContent, StatusIndicator};
use trackman_rs::intent::{Intent, IntentDispatcher};
use trackman_rs::permissions::{Capability, PermissionChecker};
use trackman_rs::signaler::NoticeSink;

pub const BRIDGE_CLASS: &str = "com/chromian/trackman/TrackmanBridge";

const PERMISSION_GRANTED: i32 = 0;
const FLAG_ACTIVITY_NEW_TASK: i32 = 0x1000_0000;
const LOCAL_FRAME_CAPACITY: i32 = 16;

const SIG_CONTEXT_VOID: &str = "(Landroid/content/Context;)V";
const SIG_REQUEST_TRANSITIONS: &str = "(Landroid/content/Context;[I[I)V";
const SIG_SHOW_NOTIFICATION: &str = "(Landroid/content/Context;Ljava/lang/String;Ljava/lang/String;Ljava/lang/String;ILjava/lang/String;Ljava/lang/String;)V";
const SIG_CANCEL_NOTIFICATION: &str = "(Landroid/content/Context;I)V";
const SIG_SHOW_TOAST: &str = "(Landroid/content/Context;Ljava/lang/String;)V";
const SIG_INTENT_STRING: &str = "(Ljava/lang/String;)Landroid/content/Intent;";

/// Java exception caught on the way back from a JNI call
#[derive(Debug, Clone, PartialEq, Eq)]
enum Thrown {
    ActivityNotFound(String),
    Security(String),
    Other(String),
}

impl Thrown {
    fn message(self) -> String {
        match self {
            Thrown::ActivityNotFound(m) | Thrown::Security(m) | Thrown::Other(m) => m,
        }
    }
}

/// Android side of every seam, backed by one application `Context`
pub struct AndroidPlatform {
    vm: JavaVM,
    context: GlobalRef,
    bridge: GlobalRef,
    indicator: IndicatorConfig,
}

impl AndroidPlatform {
    /// Must run on a thread that can see the app class loader, i.e. inside a
    /// JNI call from Kotlin, so the bridge class can be resolved and pinned.
    pub fn new(env: &mut JNIEnv, context: &JObject, indicator: IndicatorConfig) -> JResult<Self> {
        let vm = env.get_java_vm()?;
        let context = env.new_global_ref(context)?;
        let bridge_class = env.find_class(BRIDGE_CLASS)?;
        let bridge = env.new_global_ref(bridge_class)?;
        Ok(Self {
            vm,
            context,
            bridge,
            indicator,
        })
    }

    /// `Build.VERSION.SDK_INT` of the running device
    pub fn sdk_int(env: &mut JNIEnv) -> JResult<i32> {
        Ok(env
            .get_static_field("android/os/Build$VERSION", "SDK_INT", "I")?
            .i()?)
    }

    /// `Context.getPackageName()` of the application
    pub fn package_name(env: &mut JNIEnv, context: &JObject) -> JResult<String> {
        let name = env
            .call_method(context, "getPackageName", "()Ljava/lang/String;", &[])?
            .l()?;
        Ok(env.get_string(&JString::from(name))?.into())
    }

    fn bridge_class(&self) -> &JClass<'static> {
        self.bridge.as_obj().into()
    }

    /// Attach the current thread and run `f` inside its own local frame
    fn with_env<T>(
        &self,
        f: impl FnOnce(&mut JNIEnv) -> jni::errors::Result<T>,
    ) -> Result<T, Thrown> {
        let mut env = self
            .vm
            .attach_current_thread()
            .map_err(|e| Thrown::Other(e.to_string()))?;
        match env.with_local_frame(LOCAL_FRAME_CAPACITY, |env| f(env)) {
            Ok(value) => Ok(value),
            Err(jni::errors::Error::JavaException) => Err(take_exception(&mut env)),
            Err(err) => Err(Thrown::Other(err.to_string())),
        }
    }

    fn show_notification(&self, content: &IndicatorContent) {
        let result = self.with_env(|env| {
            let channel_id = env.new_string(&self.indicator.channel_id)?;
            let channel_name = env.new_string(&self.indicator.channel_name)?;
            let channel_description = env.new_string(&self.indicator.channel_description)?;
            let title = env.new_string(&content.title)?;
            let text = env.new_string(&content.text)?;
            env.call_static_method(
                self.bridge_class(),
                "showNotification",
                SIG_SHOW_NOTIFICATION,
                &[
                    JValue::Object(self.context.as_obj()),
                    JValue::Object(&channel_id),
                    JValue::Object(&channel_name),
                    JValue::Object(&channel_description),
                    JValue::Int(self.indicator.notification_id),
                    JValue::Object(&title),
                    JValue::Object(&text),
                ],
            )?;
            Ok(())
        });
        if let Err(thrown) = result {
            warn!(target: "indicator", "Failed to post notification: {}", thrown.message());
        }
    }
}

fn take_exception(env: &mut JNIEnv) -> Thrown {
    let throwable = match env.exception_occurred() {
        Ok(throwable) if !throwable.is_null() => throwable,
        _ => return Thrown::Other("Java exception".to_string()),
    };
    let _ = env.exception_clear();

    let message = env
        .call_method(&throwable, "toString", "()Ljava/lang/String;", &[])
        .and_then(|value| value.l())
        .and_then(|obj| {
            let text = JString::from(obj);
            let message: String = env.get_string(&text)?.into();
            Ok(message)
        })
        .unwrap_or_else(|_| "Java exception".to_string());

    if env
        .is_instance_of(&throwable, "android/content/ActivityNotFoundException")
        .unwrap_or(false)
    {
        Thrown::ActivityNotFound(message)
    } else if env
        .is_instance_of(&throwable, "java/lang/SecurityException")
        .unwrap_or(false)
    {
        Thrown::Security(message)
    } else {
        Thrown::Other(message)
    }
}

fn call_intent_setter(
    env: &mut JNIEnv,
    intent: &JObject,
    method: &str,
    value: &str,
) -> jni::errors::Result<()> {
    let value = env.new_string(value)?;
    env.call_method(intent, method, SIG_INTENT_STRING, &[JValue::Object(&value)])?;
    Ok(())
}

/// Build an `android.content.Intent` mirroring `intent`
fn new_java_intent<'local>(
    env: &mut JNIEnv<'local>,
    intent: &Intent,
) -> jni::errors::Result<JObject<'local>> {
    let java_intent = env.new_object("android/content/Intent", "()V", &[])?;

    if let Some(action) = &intent.action {
        call_intent_setter(env, &java_intent, "setAction", action)?;
    }
    if let Some(data) = &intent.data {
        let uri_string = env.new_string(data)?;
        let uri = env
            .call_static_method(
                "android/net/Uri",
                "parse",
                "(Ljava/lang/String;)Landroid/net/Uri;",
                &[JValue::Object(&uri_string)],
            )?
            .l()?;
        env.call_method(
            &java_intent,
            "setData",
            "(Landroid/net/Uri;)Landroid/content/Intent;",
            &[JValue::Object(&uri)],
        )?;
    }
    match &intent.component {
        Some(component) => {
            let package = env.new_string(&component.package)?;
            let class = env.new_string(&component.class)?;
            env.call_method(
                &java_intent,
                "setClassName",
                "(Ljava/lang/String;Ljava/lang/String;)Landroid/content/Intent;",
                &[JValue::Object(&package), JValue::Object(&class)],
            )?;
        }
        None => {
            if let Some(package) = &intent.package {
                call_intent_setter(env, &java_intent, "setPackage", package)?;
            }
        }
    }
    for (key, value) in &intent.extras {
        let key = env.new_string(key)?;
        let value = env.new_string(value)?;
        env.call_method(
            &java_intent,
            "putExtra",
            "(Ljava/lang/String;Ljava/lang/String;)Landroid/content/Intent;",
            &[JValue::Object(&key), JValue::Object(&value)],
        )?;
    }
    if intent.new_task {
        env.call_method(
            &java_intent,
            "addFlags",
            "(I)Landroid/content/Intent;",
            &[JValue::Int(FLAG_ACTIVITY_NEW_TASK)],
        )?;
    }
    Ok(java_intent)
}

impl IntentDispatcher for AndroidPlatform {
    fn start_activity(&self, intent: &Intent) -> Result<(), DispatchError> {
        self.with_env(|env| {
            let java_intent = new_java_intent(env, intent)?;
            env.call_method(
                self.context.as_obj(),
                "startActivity",
                "(Landroid/content/Intent;)V",
                &[JValue::Object(&java_intent)],
            )?;
            Ok(())
        })
        .map_err(|thrown| match thrown {
            Thrown::ActivityNotFound(_) => DispatchError::ActivityNotFound,
            Thrown::Security(message) => DispatchError::Security(message),
            Thrown::Other(message) => DispatchError::Other(message),
        })
    }
}

impl PermissionChecker for AndroidPlatform {
    fn is_granted(&self, capability: Capability) -> bool {
        let result = self.with_env(|env| {
            let permission = env.new_string(capability.permission())?;
            env.call_method(
                self.context.as_obj(),
                "checkSelfPermission",
                "(Ljava/lang/String;)I",
                &[JValue::Object(&permission)],
            )?
            .i()
        });
        match result {
            Ok(code) => code == PERMISSION_GRANTED,
            Err(thrown) => {
                warn!(
                    target: "permissions",
                    "checkSelfPermission({}) failed: {}",
                    capability.permission(),
                    thrown.message()
                );
                false
            }
        }
    }
}

impl TransitionSource for AndroidPlatform {
    fn register(&self, transitions: &[MonitoredTransition]) -> Result<(), RegistrationError> {
        let activity_types: Vec<i32> = transitions.iter().map(|t| t.activity_type).collect();
        let transition_types: Vec<i32> = transitions.iter().map(|t| t.transition.code()).collect();

        self.with_env(|env| {
            let types = env.new_int_array(activity_types.len() as i32)?;
            env.set_int_array_region(&types, 0, &activity_types)?;
            let kinds = env.new_int_array(transition_types.len() as i32)?;
            env.set_int_array_region(&kinds, 0, &transition_types)?;
            env.call_static_method(
                self.bridge_class(),
                "requestTransitionUpdates",
                SIG_REQUEST_TRANSITIONS,
                &[
                    JValue::Object(self.context.as_obj()),
                    JValue::Object(&types),
                    JValue::Object(&kinds),
                ],
            )?;
            Ok(())
        })
        .map_err(|thrown| match thrown {
            Thrown::Security(message) => RegistrationError::Security(message),
            other => RegistrationError::Rejected(other.message()),
        })
    }

    fn unregister(&self) -> Result<(), RegistrationError> {
        self.with_env(|env| {
            env.call_static_method(
                self.bridge_class(),
                "removeTransitionUpdates",
                SIG_CONTEXT_VOID,
                &[JValue::Object(self.context.as_obj())],
            )?;
            Ok(())
        })
        .map_err(|thrown| match thrown {
            Thrown::Security(message) => RegistrationError::Security(message),
            other => RegistrationError::Rejected(other.message()),
        })
    }
}

impl StatusIndicator for AndroidPlatform {
    fn show(&self, content: &IndicatorContent) {
        debug!(target: "indicator", "Showing notification: {}", content.text);
        self.show_notification(content);
    }

    fn update(&self, content: &IndicatorContent) {
        debug!(target: "indicator", "Updating notification: {}", content.text);
        self.show_notification(content);
    }

    fn clear(&self) {
        let result = self.with_env(|env| {
            env.call_static_method(
                self.bridge_class(),
                "cancelNotification",
                SIG_CANCEL_NOTIFICATION,
                &[
                    JValue::Object(self.context.as_obj()),
                    JValue::Int(self.indicator.notification_id),
                ],
            )?;
            Ok(())
        });
        if let Err(thrown) = result {
            warn!(target: "indicator", "Failed to cancel notification: {}", thrown.message());
        }
    }
}

impl NoticeSink for AndroidPlatform {
    fn notify(&self, message: &str) {
        let result = self.with_env(|env| {
            let text = env.new_string(message)?;
            env.call_static_method(
                self.bridge_class(),
                "showToast",
                SIG_SHOW_TOAST,
                &[JValue::Object(self.context.as_obj()), JValue::Object(&text)],
            )?;
            Ok(())
        });
        if let Err(thrown) = result {
            warn!(target: "notice", "Failed to show toast '{}': {}", message, thrown.message());
        }
    }
}
