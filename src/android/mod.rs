//! Android host for the share bridge.
//!
//! This module is only compiled on Android builds (`target_os = "android"`).
//! It provides:
//!
//! - **`JniHost`** - `ShareHost` and `MediatedStore` implemented over JNI
//!   (Intents, PackageManager, `grantUriPermission`, MediaStore.Downloads)
//! - **JNI exports** - `ShareBridge.nativeInit` / `ShareBridge.nativeCall`, the
//!   entry points the WebView's JavaScript interface forwards to
//!
//! ## Architecture
//!
//! The Java side registers a `@JavascriptInterface` object with the WebView.
//! Each method on it serializes its arguments to a JSON call
//! (`{"method": "shareFile", ...}`) and hands it to `nativeCall`, which runs it
//! through `Bridge::handle_json` and returns the outcome JSON. The Java side
//! also declares the `FileProvider` with the same authority and roots as
//! `BridgeConfig`, so the `content://` handles built here resolve there.

#![cfg(target_os = "android")]

pub mod exports;
pub mod jni_host;

pub use jni_host::JniHost;

use std::sync::OnceLock;

use jni::objects::{GlobalRef, JClass, JObject};
use jni::JavaVM;

/// Java class hosting the native methods and the notice helper
pub const BRIDGE_CLASS: &str = "com/webshare/bridge/ShareBridge";

/// Cached JavaVM reference
static JAVA_VM: OnceLock<JavaVM> = OnceLock::new();

/// Cached ClassLoader reference (needed to find app classes from native threads)
static CLASS_LOADER: OnceLock<GlobalRef> = OnceLock::new();

/// Store the JavaVM for later use. Called from `nativeInit`.
pub fn set_java_vm(vm: JavaVM) {
    let _ = JAVA_VM.set(vm);
}

/// Get the cached JavaVM reference.
pub fn get_java_vm() -> Result<&'static JavaVM, String> {
    JAVA_VM
        .get()
        .ok_or_else(|| "JavaVM not initialized. Call nativeInit first.".to_string())
}

/// Get or initialize the application's ClassLoader.
fn get_class_loader<'a>(env: &mut jni::JNIEnv<'a>) -> Result<JObject<'a>, String> {
    if let Some(cached) = CLASS_LOADER.get() {
        return env
            .new_local_ref(cached.as_obj())
            .map_err(|e| format!("Failed to create local ref from cached ClassLoader: {}", e));
    }

    tracing::debug!("[ShareBridge] Initializing ClassLoader from application context");

    let app = env
        .call_static_method(
            "android/app/ActivityThread",
            "currentApplication",
            "()Landroid/app/Application;",
            &[],
        )
        .map_err(|e| format!("Failed to get currentApplication: {}", e))?
        .l()
        .map_err(|e| format!("Failed to convert application: {}", e))?;

    let class_loader = env
        .call_method(&app, "getClassLoader", "()Ljava/lang/ClassLoader;", &[])
        .map_err(|e| format!("Failed to get ClassLoader: {}", e))?
        .l()
        .map_err(|e| format!("Failed to convert ClassLoader: {}", e))?;

    let global_ref = env
        .new_global_ref(&class_loader)
        .map_err(|e| format!("Failed to create global ref: {}", e))?;
    let _ = CLASS_LOADER.set(global_ref);

    Ok(class_loader)
}

/// Find a class using the application's ClassLoader.
/// `find_class` from an attached native thread only sees system classes.
pub(crate) fn find_app_class<'a>(env: &mut jni::JNIEnv<'a>, class_name: &str) -> Result<JClass<'a>, String> {
    if let Ok(class) = env.find_class(class_name) {
        return Ok(class);
    }
    if env.exception_check().unwrap_or(false) {
        let _ = env.exception_clear();
    }

    let class_loader = get_class_loader(env)?;
    let java_class_name = class_name.replace('/', ".");
    let class_name_jstring = env
        .new_string(&java_class_name)
        .map_err(|e| format!("Failed to create class name string: {}", e))?;

    let class_obj = env
        .call_method(
            &class_loader,
            "loadClass",
            "(Ljava/lang/String;)Ljava/lang/Class;",
            &[(&class_name_jstring).into()],
        )
        .map_err(|e| format!("Failed to call loadClass: {}", e))?
        .l()
        .map_err(|e| format!("Failed to convert class object: {}", e))?;

    Ok(JClass::from(class_obj))
}
