//! `ShareHost` and `MediatedStore` over JNI.
//!
//! Actions become `android.content.Intent`s; handler queries and package checks
//! go through the `PackageManager`; grants through `Context.grantUriPermission`.
//! Toasts must be shown on the UI thread, so notices are forwarded to
//! `ShareBridge.showNotice` on the Java side which posts them to the main looper.

#![cfg(target_os = "android")]

use std::io::{self, Write};
use std::path::PathBuf;

use jni::objects::{GlobalRef, JObject, JValue};
use jni::JNIEnv;

use super::{find_app_class, get_java_vm, BRIDGE_CLASS};
use crate::error::HostError;
use crate::host::{ActionKind, Notice, ShareAction, ShareHost};
use crate::storage::{MediaEntry, MediaHandle, MediatedStore};
use crate::types::SecureReference;

const FLAG_GRANT_READ_URI_PERMISSION: i32 = 0x0000_0001;
const FLAG_ACTIVITY_NEW_TASK: i32 = 0x1000_0000;

/// First release with `MediaStore.Downloads`
const MEDIASTORE_DOWNLOADS_SDK: i32 = 29;

/// Clear a pending Java exception so the next JNI call doesn't abort
fn clear_exception(env: &mut JNIEnv) {
    if env.exception_check().unwrap_or(false) {
        let _ = env.exception_clear();
    }
}

fn parse_uri<'a>(env: &mut JNIEnv<'a>, uri: &str) -> Result<JObject<'a>, String> {
    let j_uri = env
        .new_string(uri)
        .map_err(|e| format!("Failed to create uri string: {}", e))?;
    env.call_static_method(
        "android/net/Uri",
        "parse",
        "(Ljava/lang/String;)Landroid/net/Uri;",
        &[(&j_uri).into()],
    )
    .map_err(|e| format!("Failed to parse uri {}: {}", uri, e))?
    .l()
    .map_err(|e| format!("Failed to convert Uri: {}", e))
}

fn put_string_extra(env: &mut JNIEnv, intent: &JObject, key: &str, value: &str) -> Result<(), String> {
    let j_key = env
        .new_string(key)
        .map_err(|e| format!("Failed to create string: {}", e))?;
    let j_value = env
        .new_string(value)
        .map_err(|e| format!("Failed to create string: {}", e))?;
    env.call_method(
        intent,
        "putExtra",
        "(Ljava/lang/String;Ljava/lang/String;)Landroid/content/Intent;",
        &[(&j_key).into(), (&j_value).into()],
    )
    .map_err(|e| format!("Failed to putExtra {}: {}", key, e))?;
    Ok(())
}

fn add_flags(env: &mut JNIEnv, intent: &JObject, flags: i32) -> Result<(), String> {
    env.call_method(intent, "addFlags", "(I)Landroid/content/Intent;", &[JValue::Int(flags)])
        .map_err(|e| format!("Failed to addFlags: {}", e))?;
    Ok(())
}

fn sdk_int(env: &mut JNIEnv) -> i32 {
    env.get_static_field("android/os/Build$VERSION", "SDK_INT", "I")
        .and_then(|v| v.i())
        .unwrap_or(0)
}

pub struct JniHost {
    /// Application context
    context: GlobalRef,
}

impl JniHost {
    /// Build a host around the current application context
    pub fn new() -> Result<Self, String> {
        let vm = get_java_vm()?;
        let mut env = vm
            .attach_current_thread()
            .map_err(|e| format!("Failed to attach thread: {}", e))?;

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
        if app.is_null() {
            return Err("No application context available".to_string());
        }

        let context = env
            .new_global_ref(&app)
            .map_err(|e| format!("Failed to create global ref: {}", e))?;
        Ok(Self { context })
    }

    /// Whether this device can take durable writes through MediaStore
    pub fn supports_mediated_store(&self) -> bool {
        get_java_vm()
            .and_then(|vm| {
                vm.attach_current_thread()
                    .map_err(|e| format!("Failed to attach thread: {}", e))
            })
            .map(|mut env| sdk_int(&mut env) >= MEDIASTORE_DOWNLOADS_SDK)
            .unwrap_or(false)
    }

    /// `Environment.getExternalStoragePublicDirectory(DIRECTORY_DOWNLOADS)`,
    /// the raw public downloads path used before MediaStore.Downloads existed
    pub fn legacy_downloads_dir(&self) -> Result<PathBuf, String> {
        self.with_env(|env, _context| {
            let kind = env
                .get_static_field("android/os/Environment", "DIRECTORY_DOWNLOADS", "Ljava/lang/String;")
                .and_then(|v| v.l())
                .map_err(|e| format!("Failed to read DIRECTORY_DOWNLOADS: {}", e))?;
            let dir = env
                .call_static_method(
                    "android/os/Environment",
                    "getExternalStoragePublicDirectory",
                    "(Ljava/lang/String;)Ljava/io/File;",
                    &[(&kind).into()],
                )
                .and_then(|v| v.l())
                .map_err(|e| format!("Failed to get public downloads directory: {}", e))?;
            if dir.is_null() {
                return Err("External storage is not available".to_string());
            }
            let j_path = env
                .call_method(&dir, "getAbsolutePath", "()Ljava/lang/String;", &[])
                .and_then(|v| v.l())
                .map_err(|e| format!("Failed to read downloads path: {}", e))?;
            let path: String = env
                .get_string(&j_path.into())
                .map_err(|e| format!("Failed to read string: {}", e))?
                .into();
            Ok(PathBuf::from(path))
        })
    }

    fn with_env<T>(&self, f: impl FnOnce(&mut JNIEnv, &JObject) -> Result<T, String>) -> Result<T, String> {
        let vm = get_java_vm()?;
        let mut env = vm
            .attach_current_thread()
            .map_err(|e| format!("Failed to attach thread: {}", e))?;
        let result = f(&mut env, self.context.as_obj());
        clear_exception(&mut env);
        result
    }

    fn package_manager<'a>(env: &mut JNIEnv<'a>, context: &JObject) -> Result<JObject<'a>, String> {
        env.call_method(
            context,
            "getPackageManager",
            "()Landroid/content/pm/PackageManager;",
            &[],
        )
        .map_err(|e| format!("Failed to get PackageManager: {}", e))?
        .l()
        .map_err(|e| format!("Failed to convert PackageManager: {}", e))
    }

    /// Translate a `ShareAction` into an `Intent`
    fn build_intent<'a>(env: &mut JNIEnv<'a>, action: &ShareAction) -> Result<JObject<'a>, String> {
        let intent_action = match action.kind {
            ActionKind::Send => "android.intent.action.SEND",
            ActionKind::SendMultiple => "android.intent.action.SEND_MULTIPLE",
            ActionKind::View => "android.intent.action.VIEW",
        };
        let j_action = env
            .new_string(intent_action)
            .map_err(|e| format!("Failed to create string: {}", e))?;

        let intent = match action.uri.as_deref() {
            Some(uri) => {
                let j_uri = parse_uri(env, uri)?;
                env.new_object(
                    "android/content/Intent",
                    "(Ljava/lang/String;Landroid/net/Uri;)V",
                    &[(&j_action).into(), (&j_uri).into()],
                )
            }
            None => env.new_object(
                "android/content/Intent",
                "(Ljava/lang/String;)V",
                &[(&j_action).into()],
            ),
        }
        .map_err(|e| format!("Failed to create Intent: {}", e))?;

        if let Some(mime) = action.mime_type.as_deref() {
            let j_mime = env
                .new_string(mime)
                .map_err(|e| format!("Failed to create string: {}", e))?;
            env.call_method(
                &intent,
                "setType",
                "(Ljava/lang/String;)Landroid/content/Intent;",
                &[(&j_mime).into()],
            )
            .map_err(|e| format!("Failed to setType: {}", e))?;
        }

        let extra_stream = env
            .new_string("android.intent.extra.STREAM")
            .map_err(|e| format!("Failed to create string: {}", e))?;
        match action.kind {
            ActionKind::Send if !action.streams.is_empty() => {
                let j_uri = parse_uri(env, &action.streams[0].handle)?;
                env.call_method(
                    &intent,
                    "putExtra",
                    "(Ljava/lang/String;Landroid/os/Parcelable;)Landroid/content/Intent;",
                    &[(&extra_stream).into(), (&j_uri).into()],
                )
                .map_err(|e| format!("Failed to putExtra stream: {}", e))?;
            }
            ActionKind::SendMultiple => {
                let list = env
                    .new_object("java/util/ArrayList", "()V", &[])
                    .map_err(|e| format!("Failed to create ArrayList: {}", e))?;
                for reference in &action.streams {
                    let j_uri = parse_uri(env, &reference.handle)?;
                    env.call_method(&list, "add", "(Ljava/lang/Object;)Z", &[(&j_uri).into()])
                        .map_err(|e| format!("Failed to add uri: {}", e))?;
                }
                env.call_method(
                    &intent,
                    "putParcelableArrayListExtra",
                    "(Ljava/lang/String;Ljava/util/ArrayList;)Landroid/content/Intent;",
                    &[(&extra_stream).into(), (&list).into()],
                )
                .map_err(|e| format!("Failed to putParcelableArrayListExtra: {}", e))?;
            }
            _ => {}
        }

        if let Some(text) = action.text.as_deref() {
            put_string_extra(env, &intent, "android.intent.extra.TEXT", text)?;
        }
        for (key, value) in &action.extras {
            put_string_extra(env, &intent, key, value)?;
        }

        if let Some(package) = action.package.as_deref() {
            let j_package = env
                .new_string(package)
                .map_err(|e| format!("Failed to create string: {}", e))?;
            env.call_method(
                &intent,
                "setPackage",
                "(Ljava/lang/String;)Landroid/content/Intent;",
                &[(&j_package).into()],
            )
            .map_err(|e| format!("Failed to setPackage: {}", e))?;
        }

        if action.grant_read {
            add_flags(env, &intent, FLAG_GRANT_READ_URI_PERMISSION)?;
        }
        Ok(intent)
    }
}

impl ShareHost for JniHost {
    fn is_app_installed(&self, package: &str) -> bool {
        let result = self.with_env(|env, context| {
            let pm = Self::package_manager(env, context)?;
            let j_package = env
                .new_string(package)
                .map_err(|e| format!("Failed to create string: {}", e))?;
            // Throws NameNotFoundException when the package is absent
            let found = env
                .call_method(
                    &pm,
                    "getPackageInfo",
                    "(Ljava/lang/String;I)Landroid/content/pm/PackageInfo;",
                    &[(&j_package).into(), JValue::Int(0)],
                )
                .is_ok();
            clear_exception(env);
            Ok(found)
        });
        match result {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("[JniHost] Package check for {} failed: {}", package, e);
                false
            }
        }
    }

    fn query_handlers(&self, action: &ShareAction) -> Result<Vec<String>, HostError> {
        self.with_env(|env, context| {
            let intent = Self::build_intent(env, action)?;
            let pm = Self::package_manager(env, context)?;
            let list = env
                .call_method(
                    &pm,
                    "queryIntentActivities",
                    "(Landroid/content/Intent;I)Ljava/util/List;",
                    &[(&intent).into(), JValue::Int(0)],
                )
                .map_err(|e| format!("Failed to queryIntentActivities: {}", e))?
                .l()
                .map_err(|e| format!("Failed to convert List: {}", e))?;

            let size = env
                .call_method(&list, "size", "()I", &[])
                .and_then(|v| v.i())
                .map_err(|e| format!("Failed to get list size: {}", e))?;

            let mut packages = Vec::new();
            for i in 0..size {
                let info = env
                    .call_method(&list, "get", "(I)Ljava/lang/Object;", &[JValue::Int(i)])
                    .and_then(|v| v.l())
                    .map_err(|e| format!("Failed to get ResolveInfo: {}", e))?;
                let activity_info = env
                    .get_field(&info, "activityInfo", "Landroid/content/pm/ActivityInfo;")
                    .and_then(|v| v.l())
                    .map_err(|e| format!("Failed to read activityInfo: {}", e))?;
                let j_name = env
                    .get_field(&activity_info, "packageName", "Ljava/lang/String;")
                    .and_then(|v| v.l())
                    .map_err(|e| format!("Failed to read packageName: {}", e))?;
                let name: String = env
                    .get_string(&j_name.into())
                    .map_err(|e| format!("Failed to read string: {}", e))?
                    .into();
                if !packages.contains(&name) {
                    packages.push(name);
                }
            }
            Ok(packages)
        })
        .map_err(HostError::Call)
    }

    fn grant_read(&self, package: &str, reference: &SecureReference) -> Result<(), HostError> {
        self.with_env(|env, context| {
            let j_package = env
                .new_string(package)
                .map_err(|e| format!("Failed to create string: {}", e))?;
            let j_uri = parse_uri(env, &reference.handle)?;
            env.call_method(
                context,
                "grantUriPermission",
                "(Ljava/lang/String;Landroid/net/Uri;I)V",
                &[(&j_package).into(), (&j_uri).into(), JValue::Int(FLAG_GRANT_READ_URI_PERMISSION)],
            )
            .map_err(|e| format!("Failed to grantUriPermission: {}", e))?;
            Ok(())
        })
        .map_err(HostError::Call)
    }

    fn start(&self, action: &ShareAction) -> Result<(), HostError> {
        let vm = get_java_vm().map_err(HostError::Call)?;
        let mut env = vm
            .attach_current_thread()
            .map_err(|e| HostError::Call(format!("Failed to attach thread: {}", e)))?;
        let context = self.context.as_obj();

        let mut intent = Self::build_intent(&mut env, action).map_err(HostError::Call)?;

        if !action.is_targeted() && action.kind != ActionKind::View {
            let title = action.chooser_title.as_deref().unwrap_or("Share");
            let j_title = env
                .new_string(title)
                .map_err(|e| HostError::Call(format!("Failed to create string: {}", e)))?;
            intent = env
                .call_static_method(
                    "android/content/Intent",
                    "createChooser",
                    "(Landroid/content/Intent;Ljava/lang/CharSequence;)Landroid/content/Intent;",
                    &[(&intent).into(), (&j_title).into()],
                )
                .and_then(|v| v.l())
                .map_err(|e| HostError::Call(format!("Failed to createChooser: {}", e)))?;
            if action.grant_read {
                add_flags(&mut env, &intent, FLAG_GRANT_READ_URI_PERMISSION).map_err(HostError::Call)?;
            }
        }
        add_flags(&mut env, &intent, FLAG_ACTIVITY_NEW_TASK).map_err(HostError::Call)?;

        let started = env.call_method(
            context,
            "startActivity",
            "(Landroid/content/Intent;)V",
            &[(&intent).into()],
        );
        if let Err(e) = started {
            let not_found = match env.exception_occurred() {
                Ok(throwable) if !throwable.is_null() => {
                    let _ = env.exception_clear();
                    env.is_instance_of(&throwable, "android/content/ActivityNotFoundException")
                        .unwrap_or(false)
                }
                _ => false,
            };
            clear_exception(&mut env);
            return Err(if not_found {
                HostError::NoActivity
            } else {
                HostError::Rejected(format!("startActivity failed: {}", e))
            });
        }
        Ok(())
    }

    fn notify(&self, notice: &Notice) {
        let result = self.with_env(|env, context| {
            let class = find_app_class(env, BRIDGE_CLASS)?;
            let j_message = env
                .new_string(&notice.message)
                .map_err(|e| format!("Failed to create string: {}", e))?;
            env.call_static_method(
                &class,
                "showNotice",
                "(Landroid/content/Context;Ljava/lang/String;Z)V",
                &[context.into(), (&j_message).into(), JValue::Bool(notice.long as u8)],
            )
            .map_err(|e| format!("Failed to call showNotice: {}", e))?;
            Ok(())
        });
        if let Err(e) = result {
            tracing::warn!("[JniHost] Could not show notice {:?}: {}", notice.message, e);
        }
    }
}

/// `java.io.OutputStream` wrapped as `std::io::Write`
struct JavaOutputStream {
    stream: GlobalRef,
}

impl JavaOutputStream {
    /// Call a no-argument `void` method on the stream
    fn call_void(&self, name: &str) -> io::Result<()> {
        let vm = get_java_vm().map_err(io::Error::other)?;
        let mut env = vm.attach_current_thread().map_err(io::Error::other)?;
        env.call_method(self.stream.as_obj(), name, "()V", &[])
            .map_err(|e| {
                clear_exception(&mut env);
                io::Error::other(format!("OutputStream.{} failed: {}", name, e))
            })?;
        Ok(())
    }
}

impl Write for JavaOutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let vm = get_java_vm().map_err(io::Error::other)?;
        let mut env = vm.attach_current_thread().map_err(io::Error::other)?;
        let array = env.byte_array_from_slice(buf).map_err(io::Error::other)?;
        let result = env.call_method(self.stream.as_obj(), "write", "([B)V", &[(&array).into()]);
        let _ = env.delete_local_ref(array);
        result.map_err(|e| {
            clear_exception(&mut env);
            io::Error::other(format!("OutputStream.write failed: {}", e))
        })?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.call_void("flush")
    }
}

impl Drop for JavaOutputStream {
    fn drop(&mut self) {
        if let Err(e) = self.call_void("close") {
            tracing::warn!("[JniHost] Failed to close MediaStore stream: {}", e);
        }
    }
}

impl MediatedStore for JniHost {
    fn insert(&self, entry: &MediaEntry) -> io::Result<Option<MediaHandle>> {
        self.with_env(|env, context| {
            let values = env
                .new_object("android/content/ContentValues", "()V", &[])
                .map_err(|e| format!("Failed to create ContentValues: {}", e))?;
            for (key, value) in [
                ("_display_name", entry.display_name.as_str()),
                ("mime_type", entry.mime_type.as_str()),
                ("relative_path", entry.relative_path.as_str()),
            ] {
                let j_key = env
                    .new_string(key)
                    .map_err(|e| format!("Failed to create string: {}", e))?;
                let j_value = env
                    .new_string(value)
                    .map_err(|e| format!("Failed to create string: {}", e))?;
                env.call_method(
                    &values,
                    "put",
                    "(Ljava/lang/String;Ljava/lang/String;)V",
                    &[(&j_key).into(), (&j_value).into()],
                )
                .map_err(|e| format!("Failed to put {}: {}", key, e))?;
            }

            let collection = env
                .get_static_field(
                    "android/provider/MediaStore$Downloads",
                    "EXTERNAL_CONTENT_URI",
                    "Landroid/net/Uri;",
                )
                .and_then(|v| v.l())
                .map_err(|e| format!("Failed to read Downloads collection: {}", e))?;
            let resolver = env
                .call_method(context, "getContentResolver", "()Landroid/content/ContentResolver;", &[])
                .and_then(|v| v.l())
                .map_err(|e| format!("Failed to get ContentResolver: {}", e))?;

            let uri = env
                .call_method(
                    &resolver,
                    "insert",
                    "(Landroid/net/Uri;Landroid/content/ContentValues;)Landroid/net/Uri;",
                    &[(&collection).into(), (&values).into()],
                )
                .and_then(|v| v.l())
                .map_err(|e| format!("Failed to insert into MediaStore: {}", e))?;
            if uri.is_null() {
                return Ok(None);
            }

            let location: String = {
                let j_location = env
                    .call_method(&uri, "toString", "()Ljava/lang/String;", &[])
                    .and_then(|v| v.l())
                    .map_err(|e| format!("Failed to read uri: {}", e))?;
                env.get_string(&j_location.into())
                    .map_err(|e| format!("Failed to read string: {}", e))?
                    .into()
            };

            let stream = env
                .call_method(
                    &resolver,
                    "openOutputStream",
                    "(Landroid/net/Uri;)Ljava/io/OutputStream;",
                    &[(&uri).into()],
                )
                .and_then(|v| v.l())
                .map_err(|e| format!("Failed to open output stream: {}", e))?;
            if stream.is_null() {
                return Err(format!("No output stream for {}", location));
            }
            let stream = env
                .new_global_ref(&stream)
                .map_err(|e| format!("Failed to create global ref: {}", e))?;

            Ok(Some(MediaHandle {
                location,
                writer: Box::new(JavaOutputStream { stream }),
            }))
        })
        .map_err(io::Error::other)
    }
}
