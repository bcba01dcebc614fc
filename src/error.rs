//! Error taxonomy for the share bridge
//!
//! Each component has its own error type. `BridgeError` aggregates them so the
//! bridge boundary can map any failure onto a `DispatchOutcome`.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{DispatchOutcome, OutcomeKind};

/// Malformed encoded payload
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is empty")]
    Empty,
    #[error("payload is not valid base64: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),
    #[error("payload too large ({size} bytes, maximum {max} bytes)")]
    TooLarge { size: usize, max: usize },
}

/// Failure while materializing bytes in a storage scope
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("storage scope unavailable: {0}")]
    ScopeUnavailable(String),
    #[error("file name is not a single path segment: {0}")]
    InvalidName(String),
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("mediated storage refused to insert {0}")]
    InsertDenied(String),
    #[error("mediated storage write failed for {name}: {source}")]
    Mediated {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure converting a path into a secure reference
#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("path is not absolute: {0}")]
    NotAbsolute(PathBuf),
    #[error("failed to resolve {path}: {source}")]
    Unresolvable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("path is outside every declared provider root: {0}")]
    OutsideRoots(PathBuf),
}

/// Errors reported by the host shell
#[derive(Debug, Error)]
pub enum HostError {
    /// No activity on the device can handle the action
    #[error("no activity found to handle the action")]
    NoActivity,
    /// The host (or the target package) refused to start the action
    #[error("host rejected the action: {0}")]
    Rejected(String),
    #[error("host call failed: {0}")]
    Call(String),
}

/// Everything that can go wrong between a bridge call and the host dispatch
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error(transparent)]
    Reference(#[from] ReferenceError),
    #[error("no application can handle this action: {0}")]
    NoHandler(String),
    #[error("dispatch failed: {0}")]
    Dispatch(String),
    #[error("invalid request: {0}")]
    Request(String),
}

impl BridgeError {
    pub fn outcome_kind(&self) -> OutcomeKind {
        match self {
            BridgeError::NoHandler(_) => OutcomeKind::NoHandler,
            _ => OutcomeKind::Failed,
        }
    }

    pub fn into_outcome(self) -> DispatchOutcome {
        DispatchOutcome {
            kind: self.outcome_kind(),
            detail: Some(self.to_string()),
        }
    }
}

impl From<HostError> for BridgeError {
    fn from(e: HostError) -> Self {
        let detail = e.to_string();
        match e {
            HostError::NoActivity => BridgeError::NoHandler(detail),
            _ => BridgeError::Dispatch(detail),
        }
    }
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_mapping() {
        let no_handler = BridgeError::NoHandler("nothing installed".into()).into_outcome();
        assert_eq!(no_handler.kind, OutcomeKind::NoHandler);

        let failed = BridgeError::from(DecodeError::Empty).into_outcome();
        assert_eq!(failed.kind, OutcomeKind::Failed);
        assert_eq!(failed.detail.as_deref(), Some("payload is empty"));
    }

    #[test]
    fn test_host_error_conversion() {
        assert!(matches!(
            BridgeError::from(HostError::NoActivity),
            BridgeError::NoHandler(_)
        ));
        assert!(matches!(
            BridgeError::from(HostError::Rejected("denied".into())),
            BridgeError::Dispatch(_)
        ));
    }
}
