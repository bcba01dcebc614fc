//! WebShare Bridge
//!
//! Lets web content running inside a native WebView shell hand documents to
//! other applications on the device: share a base64 payload through the system
//! chooser or straight to a messaging app, save it to the public downloads
//! area, or share files that already exist on disk.
//!
//! The crate owns the decisions (decoding, naming, staging, secure references,
//! action shape, targeting) and talks to the platform through the
//! [`host::ShareHost`] and [`storage::MediatedStore`] traits. The Android
//! implementation of those lives in [`android`]; shells on other platforms
//! provide their own.
//!
//! ```text
//! web content ──JSON──> Bridge ──> decoder ─> filename ─> storage ─> reference ─> dispatch ──> ShareHost
//! ```

pub mod bridge;
pub mod config;
pub mod decoder;
pub mod dispatch;
pub mod error;
pub mod filename;
pub mod host;
pub mod logging;
pub mod multi;
pub mod reference;
pub mod storage;
pub mod testing;
pub mod types;
pub mod utils;

#[cfg(target_os = "android")]
pub mod android;

pub use bridge::{Bridge, BridgeCall};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use host::{Notice, ShareAction, ShareHost};
pub use storage::{MediatedStore, StorageWriter};
pub use types::{DispatchOutcome, OutcomeKind, ShareRequest};
