//! Core data types for the share bridge
//!
//! This module contains the data structures passed between components:
//! - Share requests as they arrive from web content
//! - Files materialized by the storage writer
//! - Secure references handed to other applications
//! - Outcomes reported back to the caller

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// What a share request carries. Exactly one is populated per entry point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// Raw bytes to materialize (shareFile / downloadFile)
    Bytes(Vec<u8>),
    /// Paths of files that already exist (shareFiles)
    Paths(Vec<String>),
}

/// A normalized share request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShareRequest {
    pub payload: Payload,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub caption: Option<String>,
    pub target_address: Option<String>,
}

impl ShareRequest {
    pub fn bytes(bytes: Vec<u8>) -> Self {
        Self {
            payload: Payload::Bytes(bytes),
            file_name: None,
            mime_type: None,
            caption: None,
            target_address: None,
        }
    }

    pub fn paths(paths: Vec<String>) -> Self {
        Self {
            payload: Payload::Paths(paths),
            file_name: None,
            mime_type: None,
            caption: None,
            target_address: None,
        }
    }
}

/// A file written by the storage writer
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedFile {
    /// Filesystem path, or the mediated-store display location when the
    /// durable scope went through the host's media API
    pub absolute_path: PathBuf,
    pub mime_type: String,
    pub size_bytes: u64,
    /// Per-request arena the file lives in (transient scope only)
    #[serde(skip)]
    pub arena: Option<PathBuf>,
}

/// Access granted on a secure reference. Only read access is ever handed out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Access {
    Read,
}

/// An opaque, permission-scoped handle standing in for a file path
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureReference {
    /// `content://<authority>/<root>/<relative path>`
    pub handle: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub granted_to: BTreeSet<String>,
    pub access: Access,
}

impl SecureReference {
    pub fn is_granted_to(&self, package: &str) -> bool {
        self.granted_to.contains(package)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    /// The host accepted the action for presentation
    Sent,
    /// No installed application can handle the action
    NoHandler,
    Failed,
}

/// Result of a bridge call, returned to the web content as JSON
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub kind: OutcomeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl DispatchOutcome {
    pub fn sent(detail: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Sent,
            detail: Some(detail.into()),
        }
    }

    pub fn is_sent(&self) -> bool {
        self.kind == OutcomeKind::Sent
    }

    /// Serialize for the web content boundary
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"kind":"FAILED"}"#.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_json() {
        let outcome = DispatchOutcome::sent("com.whatsapp");
        assert_eq!(outcome.to_json(), r#"{"kind":"SENT","detail":"com.whatsapp"}"#);

        let no_handler = DispatchOutcome {
            kind: OutcomeKind::NoHandler,
            detail: None,
        };
        assert_eq!(no_handler.to_json(), r#"{"kind":"NO_HANDLER"}"#);

        let parsed: DispatchOutcome = serde_json::from_str(r#"{"kind":"FAILED"}"#).unwrap();
        assert_eq!(parsed.kind, OutcomeKind::Failed);
        assert!(parsed.detail.is_none());
    }
}
