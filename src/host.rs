//! The seam between the bridge and the native host shell.
//!
//! The bridge decides *what* to dispatch; the host knows *how*: which apps are
//! installed, which can handle an action, how to grant URI permissions, how to
//! start an activity and how to show a toast. On Android this is implemented
//! over JNI (`crate::android`); tests use `crate::testing::RecordingHost`.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::HostError;
use crate::types::SecureReference;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    /// Single attachment or text-only send
    Send,
    /// Several attachments in one action
    SendMultiple,
    /// Open a URI (deep link into another app)
    View,
}

/// An outbound action, fully described before it reaches the host
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareAction {
    pub kind: ActionKind,
    pub mime_type: Option<String>,
    pub streams: Vec<SecureReference>,
    pub text: Option<String>,
    /// Target URI for `View` actions
    pub uri: Option<String>,
    /// Restricts the action to one application. None = open to any capable app.
    pub package: Option<String>,
    /// Application-specific string extras (e.g. a routing token)
    pub extras: BTreeMap<String, String>,
    /// Shown when the action is presented through a chooser
    pub chooser_title: Option<String>,
    /// Ask the host to propagate read permission on the streams
    pub grant_read: bool,
}

impl ShareAction {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            mime_type: None,
            streams: Vec::new(),
            text: None,
            uri: None,
            package: None,
            extras: BTreeMap::new(),
            chooser_title: None,
            grant_read: false,
        }
    }

    pub fn view(uri: impl Into<String>) -> Self {
        let mut action = Self::new(ActionKind::View);
        action.uri = Some(uri.into());
        action
    }

    pub fn is_targeted(&self) -> bool {
        self.package.is_some()
    }

    pub fn is_text_only(&self) -> bool {
        self.kind == ActionKind::Send && self.streams.is_empty()
    }
}

/// A transient user-visible notice (a toast on Android)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    /// Show for longer (errors)
    pub long: bool,
}

impl Notice {
    pub fn short(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            long: false,
        }
    }

    pub fn long(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            long: true,
        }
    }
}

/// Capabilities the host shell provides to the bridge.
///
/// All methods may block. `notify` must be safe to call from any thread; the
/// host marshals it onto its UI thread.
pub trait ShareHost: Send + Sync {
    /// Whether an application with this package identity is installed
    fn is_app_installed(&self, package: &str) -> bool;

    /// Packages of every application that can handle `action`
    fn query_handlers(&self, action: &ShareAction) -> Result<Vec<String>, HostError>;

    /// Grant `package` read access to the reference
    fn grant_read(&self, package: &str, reference: &SecureReference) -> Result<(), HostError>;

    /// Start the action. Open actions are presented through a chooser titled
    /// `chooser_title`; targeted actions go straight to `package`.
    fn start(&self, action: &ShareAction) -> Result<(), HostError>;

    fn notify(&self, notice: &Notice);
}
