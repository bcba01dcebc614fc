//! The host-callable bridge surface.
//!
//! Web content calls into the bridge through a fixed method table. Each call
//! arrives as JSON tagged with the method name, is validated and normalized
//! here, and only then reaches the components. Every call returns a
//! `DispatchOutcome`; failures are also surfaced as a host notice.
//!
//! ## Methods
//!
//! | method         | arguments                                                       |
//! |----------------|-----------------------------------------------------------------|
//! | `shareFile`    | `payloadBase64`, `fileName?`, `mimeType?`, `caption?`, `targetAddress?` |
//! | `downloadFile` | `payloadBase64`, `fileName`, `mimeType`                         |
//! | `shareFiles`   | `caption`, `filePathsJson` (JSON array of absolute paths)       |
//! | `openChat`     | `address`, `text`                                               |

use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

use crate::config::BridgeConfig;
use crate::decoder;
use crate::dispatch::{DispatchBuilder, DispatchRequest};
use crate::error::{BridgeError, Result, WriteError};
use crate::filename::FilenameResolver;
use crate::host::{Notice, ShareHost};
use crate::multi::MultiFileDispatcher;
use crate::reference::ReferenceProvider;
use crate::storage::{MediatedStore, StorageWriter};
use crate::types::{DispatchOutcome, OutcomeKind, Payload, ShareRequest};
use crate::utils::{self, WILDCARD_MIME};

/// One call across the bridge boundary
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BridgeCall {
    ShareFile {
        payload_base64: String,
        #[serde(default)]
        file_name: Option<String>,
        #[serde(default)]
        mime_type: Option<String>,
        #[serde(default)]
        caption: Option<String>,
        #[serde(default)]
        target_address: Option<String>,
    },
    DownloadFile {
        payload_base64: String,
        #[serde(default)]
        file_name: String,
        #[serde(default)]
        mime_type: String,
    },
    ShareFiles {
        #[serde(default)]
        caption: String,
        file_paths_json: String,
    },
    OpenChat {
        address: String,
        #[serde(default)]
        text: String,
    },
}

impl BridgeCall {
    pub fn method(&self) -> &'static str {
        match self {
            BridgeCall::ShareFile { .. } => "shareFile",
            BridgeCall::DownloadFile { .. } => "downloadFile",
            BridgeCall::ShareFiles { .. } => "shareFiles",
            BridgeCall::OpenChat { .. } => "openChat",
        }
    }
}

/// Web content passes "" for absent arguments
fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Parse the path list; non-string entries are skipped
fn parse_paths(file_paths_json: &str) -> Result<Vec<String>> {
    let values: Vec<serde_json::Value> = serde_json::from_str(file_paths_json)
        .map_err(|e| BridgeError::Request(format!("filePathsJson is not a JSON array: {}", e)))?;
    Ok(values
        .into_iter()
        .filter_map(|v| match v {
            serde_json::Value::String(s) => Some(s),
            _ => None,
        })
        .collect())
}

pub struct Bridge {
    config: BridgeConfig,
    host: Arc<dyn ShareHost>,
    resolver: FilenameResolver,
    storage: StorageWriter,
    provider: ReferenceProvider,
    dispatcher: DispatchBuilder,
}

impl Bridge {
    /// The fixed method table exposed to web content
    pub const METHODS: &'static [&'static str] = &["shareFile", "downloadFile", "shareFiles", "openChat"];

    pub fn new(config: BridgeConfig, host: Arc<dyn ShareHost>) -> Self {
        let resolver = FilenameResolver::new(config.fallback_name_prefix.clone());
        let storage = StorageWriter::new(config.transient_root(), config.durable_root())
            .with_transient_ttl(config.transient_ttl())
            .with_relative_folder(config.storage.durable_relative_folder.clone());
        let provider = ReferenceProvider::new(config.provider.authority.clone(), config.provider_roots());
        let dispatcher = DispatchBuilder::new(config.messaging.clone());

        tracing::info!(
            "[ShareBridge] Initialized (authority: {}, {} provider roots)",
            provider.authority(),
            provider.roots().len()
        );

        Self {
            config,
            host,
            resolver,
            storage,
            provider,
            dispatcher,
        }
    }

    /// Route durable writes through the host's mediated public storage
    pub fn with_mediated_store(mut self, store: Arc<dyn MediatedStore>) -> Self {
        self.storage = self.storage.with_mediated_store(store);
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn storage(&self) -> &StorageWriter {
        &self.storage
    }

    /// Entry point for the JSON boundary: `{"method": "...", ...}` in, outcome JSON out
    pub fn handle_json(&self, json: &str) -> String {
        let outcome = match serde_json::from_str::<BridgeCall>(json) {
            Ok(call) => self.call(call),
            Err(e) => {
                tracing::error!("[ShareBridge] Rejected call: {}", e);
                BridgeError::Request(format!("unknown or malformed call: {}", e)).into_outcome()
            }
        };
        outcome.to_json()
    }

    pub fn call(&self, call: BridgeCall) -> DispatchOutcome {
        let method = call.method();
        tracing::debug!("[ShareBridge] {} called", method);
        match call {
            BridgeCall::ShareFile {
                payload_base64,
                file_name,
                mime_type,
                caption,
                target_address,
            } => self.share_file(
                &payload_base64,
                file_name.as_deref(),
                mime_type.as_deref(),
                caption.as_deref(),
                target_address.as_deref(),
            ),
            BridgeCall::DownloadFile {
                payload_base64,
                file_name,
                mime_type,
            } => self.download_file(&payload_base64, &file_name, &mime_type),
            BridgeCall::ShareFiles {
                caption,
                file_paths_json,
            } => self.share_files(&caption, &file_paths_json),
            BridgeCall::OpenChat { address, text } => self.open_chat(&address, &text),
        }
    }

    /// Run a call on the blocking pool so async hosts keep disk I/O and
    /// activity starts off their event loop
    pub async fn call_async(self: Arc<Self>, call: BridgeCall) -> DispatchOutcome {
        let method = call.method();
        match tokio::task::spawn_blocking(move || self.call(call)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("[ShareBridge] {} panicked or was cancelled: {}", method, e);
                DispatchOutcome {
                    kind: OutcomeKind::Failed,
                    detail: Some(format!("{} did not complete: {}", method, e)),
                }
            }
        }
    }

    /// Materialize a payload in the transient scope and share it
    pub fn share_file(
        &self,
        payload_base64: &str,
        file_name: Option<&str>,
        mime_type: Option<&str>,
        caption: Option<&str>,
        target_address: Option<&str>,
    ) -> DispatchOutcome {
        let result = self.decode_request(payload_base64, file_name, mime_type).and_then(|mut request| {
            request.caption = non_empty(caption);
            request.target_address = non_empty(target_address);
            self.execute(request)
        });
        self.finish("shareFile", result, None)
    }

    /// Save a payload to the durable/public scope. No dispatch.
    pub fn download_file(&self, payload_base64: &str, file_name: &str, mime_type: &str) -> DispatchOutcome {
        let result = self
            .decode_request(payload_base64, Some(file_name), Some(mime_type))
            .and_then(|request| self.save(request));
        self.finish("downloadFile", result, Some("Saved to Downloads"))
    }

    /// Share files that already exist on disk
    pub fn share_files(&self, caption: &str, file_paths_json: &str) -> DispatchOutcome {
        let result = parse_paths(file_paths_json).and_then(|paths| {
            let mut request = ShareRequest::paths(paths);
            request.caption = Some(caption.to_string());
            self.execute(request)
        });
        self.finish("shareFiles", result, None)
    }

    /// Open a chat with `address` prefilled with `text`
    pub fn open_chat(&self, address: &str, text: &str) -> DispatchOutcome {
        let result = self.dispatcher.open_chat(self.host.as_ref(), address, text);
        self.finish("openChat", result, None)
    }

    /// Drop a transient arena once the receiver is known to be done with it
    pub fn release(&self, arena: &Path) -> Result<(), WriteError> {
        self.storage.release(arena)
    }

    /// Decode the payload and normalize the naming arguments
    fn decode_request(
        &self,
        payload_base64: &str,
        file_name: Option<&str>,
        mime_type: Option<&str>,
    ) -> Result<ShareRequest> {
        let bytes = decoder::decode_payload(payload_base64, self.config.max_payload_bytes)?;
        let mut request = ShareRequest::bytes(bytes);
        request.file_name = non_empty(file_name);
        // Caller's type wins; a data-URI prefix is the next best source
        request.mime_type = non_empty(mime_type)
            .or_else(|| decoder::declared_mime(payload_base64).map(str::to_string))
            .map(|m| utils::normalize_mime(&m));
        Ok(request)
    }

    /// Final file name and MIME type for a byte payload
    fn name_and_mime(&self, request: &ShareRequest) -> (String, String) {
        let name = self
            .resolver
            .resolve(request.file_name.as_deref(), request.mime_type.as_deref());
        let mime = request
            .mime_type
            .clone()
            .or_else(|| utils::get_mime_type(Path::new(&name)).map(str::to_string))
            .unwrap_or_else(|| WILDCARD_MIME.to_string());
        (name, mime)
    }

    fn execute(&self, request: ShareRequest) -> Result<DispatchOutcome> {
        match &request.payload {
            Payload::Bytes(bytes) => {
                let (name, mime) = self.name_and_mime(&request);
                let file = self.storage.write_transient(&name, &mime, bytes)?;
                let reference = self.provider.reference_for(&file.absolute_path)?;
                let dispatch = DispatchRequest {
                    references: vec![reference],
                    mime_type: Some(file.mime_type.clone()),
                    caption: request.caption.clone(),
                    target_address: request.target_address.clone(),
                    chooser_title: Some(self.config.share_chooser_title.clone()),
                };
                self.dispatcher.dispatch(self.host.as_ref(), &dispatch)
            }
            Payload::Paths(paths) => MultiFileDispatcher::new(
                &self.provider,
                &self.dispatcher,
                &self.config.multi_chooser_title,
            )
            .dispatch(
                self.host.as_ref(),
                request.caption.as_deref().unwrap_or(""),
                paths,
            ),
        }
    }

    fn save(&self, request: ShareRequest) -> Result<DispatchOutcome> {
        let Payload::Bytes(bytes) = &request.payload else {
            return Err(BridgeError::Request("downloadFile needs a byte payload".to_string()));
        };
        let (name, mime) = self.name_and_mime(&request);
        let mime = if mime == WILDCARD_MIME {
            "application/octet-stream".to_string()
        } else {
            mime
        };
        let file = self.storage.write_durable(&name, &mime, bytes)?;
        Ok(DispatchOutcome::sent(file.absolute_path.to_string_lossy()))
    }

    /// Log the outcome, show a notice, and hand the outcome back
    fn finish(&self, method: &str, result: Result<DispatchOutcome>, success_notice: Option<&str>) -> DispatchOutcome {
        match result {
            Ok(outcome) => {
                tracing::info!("[ShareBridge] {} sent: {}", method, outcome.detail.as_deref().unwrap_or(""));
                if let Some(message) = success_notice {
                    self.notify(Notice::short(message));
                }
                outcome
            }
            Err(e) => {
                let outcome = e.into_outcome();
                let detail = outcome.detail.clone().unwrap_or_default();
                match outcome.kind {
                    OutcomeKind::NoHandler => {
                        tracing::warn!("[ShareBridge] {} found no handler: {}", method, detail);
                        self.notify(Notice::short("No app available to handle this action."));
                    }
                    _ => {
                        tracing::error!("[ShareBridge] {} failed: {}", method, detail);
                        let prefix = if method == "downloadFile" { "Download failed" } else { "Share failed" };
                        self.notify(Notice::long(format!("{}: {}", prefix, detail)));
                    }
                }
                outcome
            }
        }
    }

    fn notify(&self, notice: Notice) {
        if self.config.notices_enabled {
            self.host.notify(&notice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_parsing() {
        let call: BridgeCall = serde_json::from_str(
            r#"{"method":"shareFile","payloadBase64":"aGk=","fileName":"a.pdf","targetAddress":""}"#,
        )
        .unwrap();
        assert_eq!(
            call,
            BridgeCall::ShareFile {
                payload_base64: "aGk=".into(),
                file_name: Some("a.pdf".into()),
                mime_type: None,
                caption: None,
                target_address: Some(String::new()),
            }
        );

        let call: BridgeCall =
            serde_json::from_str(r#"{"method":"shareFiles","caption":"x","filePathsJson":"[]"}"#).unwrap();
        assert_eq!(call.method(), "shareFiles");

        assert!(serde_json::from_str::<BridgeCall>(r#"{"method":"vibrate","duration":10}"#).is_err());
    }

    #[test]
    fn test_method_table_matches_calls() {
        for method in Bridge::METHODS {
            let json = match *method {
                "shareFile" | "downloadFile" => format!(r#"{{"method":"{}","payloadBase64":"aGk="}}"#, method),
                "shareFiles" => format!(r#"{{"method":"{}","filePathsJson":"[]"}}"#, method),
                _ => format!(r#"{{"method":"{}","address":"1"}}"#, method),
            };
            let call: BridgeCall = serde_json::from_str(&json).unwrap();
            assert_eq!(call.method(), *method);
        }
    }

    #[test]
    fn test_non_empty_and_paths() {
        assert_eq!(non_empty(Some("  ")), None);
        assert_eq!(non_empty(Some(" a ")), Some("a".to_string()));
        assert_eq!(non_empty(None), None);

        assert_eq!(
            parse_paths(r#"["/a.pdf", null, 3, "/b.png"]"#).unwrap(),
            vec!["/a.pdf", "/b.png"]
        );
        assert!(parse_paths("not json").is_err());
    }
}
