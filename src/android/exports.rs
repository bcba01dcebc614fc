//! JNI entry points called from `com.webshare.bridge.ShareBridge`.
//!
//! ```java
//! static native boolean nativeInit(String configJson, String cacheDir);
//! static native String nativeCall(String callJson);
//! ```

#![cfg(target_os = "android")]

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use jni::objects::{JClass, JString};
use jni::sys::{jboolean, jstring, JNI_FALSE, JNI_TRUE};
use jni::JNIEnv;

use super::{set_java_vm, JniHost};
use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use crate::error::BridgeError;

static BRIDGE: OnceLock<Bridge> = OnceLock::new();

fn read_string(env: &mut JNIEnv, value: &JString) -> Result<String, String> {
    if value.is_null() {
        return Ok(String::new());
    }
    env.get_string(value)
        .map(Into::into)
        .map_err(|e| format!("Failed to read string argument: {}", e))
}

fn init(env: &mut JNIEnv, config_json: &JString, cache_dir: &JString) -> Result<(), String> {
    let vm = env
        .get_java_vm()
        .map_err(|e| format!("Failed to get JavaVM: {}", e))?;
    set_java_vm(vm);
    crate::logging::init_logging();

    let config_json = read_string(env, config_json)?;
    let config = if config_json.trim().is_empty() {
        BridgeConfig::default()
    } else {
        serde_json::from_str::<BridgeConfig>(&config_json)
            .map_err(|e| format!("Invalid bridge config: {}", e))?
    };

    let host = Arc::new(JniHost::new()?);
    let mediated = host.supports_mediated_store();

    // Before Q there is no MediaStore.Downloads; durable writes go to the raw public path
    let downloads_dir = if mediated {
        None
    } else {
        match host.legacy_downloads_dir() {
            Ok(dir) => Some(dir),
            Err(e) => {
                tracing::warn!("[ShareBridge] No public downloads directory: {}", e);
                None
            }
        }
    };

    // App-private cache is the only sensible transient scope on Android
    let cache_dir = read_string(env, cache_dir)?;
    let cache_dir = (!cache_dir.is_empty()).then(|| PathBuf::from(cache_dir));
    let config = config.with_host_dirs(cache_dir.as_deref(), downloads_dir.as_deref());

    let mut bridge = Bridge::new(config, host.clone());
    if mediated {
        bridge = bridge.with_mediated_store(host);
    }

    if BRIDGE.set(bridge).is_err() {
        tracing::warn!("[ShareBridge] nativeInit called twice, keeping the first bridge");
    }
    Ok(())
}

#[no_mangle]
pub extern "system" fn Java_com_webshare_bridge_ShareBridge_nativeInit<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    config_json: JString<'local>,
    cache_dir: JString<'local>,
) -> jboolean {
    match init(&mut env, &config_json, &cache_dir) {
        Ok(()) => JNI_TRUE,
        Err(e) => {
            tracing::error!("[ShareBridge] nativeInit failed: {}", e);
            JNI_FALSE
        }
    }
}

#[no_mangle]
pub extern "system" fn Java_com_webshare_bridge_ShareBridge_nativeCall<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    call_json: JString<'local>,
) -> jstring {
    let response = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        match (read_string(&mut env, &call_json), BRIDGE.get()) {
            (Ok(json), Some(bridge)) => bridge.handle_json(&json),
            (Err(e), _) => BridgeError::Request(e).into_outcome().to_json(),
            (_, None) => BridgeError::Request("bridge not initialized".to_string())
                .into_outcome()
                .to_json(),
        }
    }))
    .unwrap_or_else(|_| {
        tracing::error!("[ShareBridge] nativeCall panicked");
        BridgeError::Request("bridge call panicked".to_string())
            .into_outcome()
            .to_json()
    });

    match env.new_string(response) {
        Ok(s) => s.into_raw(),
        Err(e) => {
            tracing::error!("[ShareBridge] Failed to return outcome: {}", e);
            std::ptr::null_mut()
        }
    }
}
