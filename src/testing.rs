//! Test doubles for the host seam.
//!
//! Used by the unit tests and the integration tests under `tests/`, and handy
//! for shells that want to exercise the bridge without a device.

use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::error::HostError;
use crate::host::{Notice, ShareAction, ShareHost};
use crate::storage::{MediaEntry, MediaHandle, MediatedStore};
use crate::types::SecureReference;

/// Initialise a tracing subscriber for tests.
///
/// Respects `RUST_LOG`, defaults to `debug`. Safe to call multiple times.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Host calls in the order they happened
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostEvent {
    Grant { package: String, handle: String },
    /// A start attempt, successful or not
    Start { package: Option<String> },
}

/// A `ShareHost` that records everything and fails on request
#[derive(Default)]
pub struct RecordingHost {
    installed: BTreeSet<String>,
    handlers: Vec<String>,
    /// Package names or URI prefixes whose start fails
    failing: Vec<String>,
    attempts: Mutex<usize>,
    started: Mutex<Vec<ShareAction>>,
    grants: Mutex<Vec<(String, String)>>,
    notices: Mutex<Vec<Notice>>,
    events: Mutex<Vec<HostEvent>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_installed(mut self, packages: &[&str]) -> Self {
        self.installed.extend(packages.iter().map(|p| p.to_string()));
        self
    }

    /// Packages returned by `query_handlers` for send actions
    pub fn with_handlers(mut self, packages: &[&str]) -> Self {
        self.handlers.extend(packages.iter().map(|p| p.to_string()));
        self
    }

    /// Make `start` fail for a package (Rejected) or a URI prefix (NoActivity)
    pub fn failing_start_for(mut self, key: &str) -> Self {
        self.failing.push(key.to_string());
        self
    }

    pub fn started(&self) -> Vec<ShareAction> {
        self.started.lock().unwrap().clone()
    }

    pub fn start_attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }

    /// (package, handle) pairs in grant order
    pub fn grants(&self) -> Vec<(String, String)> {
        self.grants.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    /// Grants and start attempts, interleaved as they were called
    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ShareHost for RecordingHost {
    fn is_app_installed(&self, package: &str) -> bool {
        self.installed.contains(package)
    }

    fn query_handlers(&self, _action: &ShareAction) -> Result<Vec<String>, HostError> {
        Ok(self.handlers.clone())
    }

    fn grant_read(&self, package: &str, reference: &SecureReference) -> Result<(), HostError> {
        self.grants
            .lock()
            .unwrap()
            .push((package.to_string(), reference.handle.clone()));
        self.events.lock().unwrap().push(HostEvent::Grant {
            package: package.to_string(),
            handle: reference.handle.clone(),
        });
        Ok(())
    }

    fn start(&self, action: &ShareAction) -> Result<(), HostError> {
        *self.attempts.lock().unwrap() += 1;
        self.events.lock().unwrap().push(HostEvent::Start {
            package: action.package.clone(),
        });

        if let Some(package) = &action.package {
            if self.failing.iter().any(|f| f == package) {
                return Err(HostError::Rejected(format!("{} refused the action", package)));
            }
        }
        if let Some(uri) = &action.uri {
            if self.failing.iter().any(|f| uri.starts_with(f.as_str())) {
                return Err(HostError::NoActivity);
            }
        }

        self.started.lock().unwrap().push(action.clone());
        Ok(())
    }

    fn notify(&self, notice: &Notice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}

/// In-memory mediated store: entries keyed by display name
#[derive(Default)]
pub struct RecordingStore {
    deny: bool,
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    entries: Mutex<Vec<MediaEntry>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that refuses every insert
    pub fn denying() -> Self {
        Self {
            deny: true,
            ..Self::default()
        }
    }

    pub fn contents(&self, display_name: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(display_name).cloned()
    }

    pub fn entries(&self) -> Vec<MediaEntry> {
        self.entries.lock().unwrap().clone()
    }
}

struct EntryWriter {
    name: String,
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl Write for EntryWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.files
            .lock()
            .unwrap()
            .entry(self.name.clone())
            .or_default()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl MediatedStore for RecordingStore {
    fn insert(&self, entry: &MediaEntry) -> std::io::Result<Option<MediaHandle>> {
        self.entries.lock().unwrap().push(entry.clone());
        if self.deny {
            return Ok(None);
        }
        self.files
            .lock()
            .unwrap()
            .insert(entry.display_name.clone(), Vec::new());
        Ok(Some(MediaHandle {
            location: format!(
                "content://media/external/downloads/{}/{}",
                entry.relative_path, entry.display_name
            ),
            writer: Box::new(EntryWriter {
                name: entry.display_name.clone(),
                files: self.files.clone(),
            }),
        }))
    }
}
