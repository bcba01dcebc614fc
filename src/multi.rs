//! Multi-file dispatch
//!
//! Shares files that something else already wrote to disk. Paths that don't
//! exist, or that the provider won't expose, are dropped; if nothing survives
//! the caption still goes out as a text-only share.

use std::path::Path;

use crate::dispatch::{DispatchBuilder, DispatchRequest};
use crate::error::BridgeError;
use crate::host::ShareHost;
use crate::reference::ReferenceProvider;
use crate::types::{DispatchOutcome, SecureReference};
use crate::utils::WILDCARD_MIME;

pub struct MultiFileDispatcher<'a> {
    provider: &'a ReferenceProvider,
    builder: &'a DispatchBuilder,
    chooser_title: &'a str,
}

impl<'a> MultiFileDispatcher<'a> {
    pub fn new(provider: &'a ReferenceProvider, builder: &'a DispatchBuilder, chooser_title: &'a str) -> Self {
        Self {
            provider,
            builder,
            chooser_title,
        }
    }

    /// References for the paths that exist and lie under a declared root, in order
    pub fn collect_references(&self, paths: &[String]) -> Vec<SecureReference> {
        paths
            .iter()
            .filter_map(|raw| {
                let trimmed = raw.trim();
                // Web layers hand over file:// URIs as often as plain paths
                let decoded = trimmed
                    .strip_prefix("file://")
                    .map(|p| urlencoding::decode(p).map(|c| c.into_owned()).unwrap_or_else(|_| p.to_string()))
                    .unwrap_or_else(|| trimmed.to_string());
                let path = Path::new(&decoded);

                if decoded.is_empty() || !path.exists() {
                    tracing::warn!("[MultiShare] Skipping missing file: {:?}", raw);
                    return None;
                }
                match self.provider.reference_for(path) {
                    Ok(reference) => Some(reference),
                    Err(e) => {
                        tracing::warn!("[MultiShare] Skipping {:?}: {}", raw, e);
                        None
                    }
                }
            })
            .collect()
    }

    /// Share `paths` with `caption`. Missing files only degrade the share.
    pub fn dispatch(&self, host: &dyn ShareHost, caption: &str, paths: &[String]) -> Result<DispatchOutcome, BridgeError> {
        let references = self.collect_references(paths);
        tracing::info!(
            "[MultiShare] {} of {} paths usable",
            references.len(),
            paths.len()
        );

        let mime_type = if references.is_empty() {
            None
        } else {
            Some(WILDCARD_MIME.to_string())
        };

        let request = DispatchRequest {
            references,
            mime_type,
            caption: Some(caption.to_string()),
            target_address: None,
            chooser_title: Some(self.chooser_title.to_string()),
        };
        self.builder.dispatch(host, &request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MessagingConfig;
    use crate::host::ActionKind;
    use crate::reference::ProviderRoot;
    use crate::testing::RecordingHost;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (ReferenceProvider, DispatchBuilder, TempDir) {
        let temp = TempDir::new().unwrap();
        let cache = temp.path().join("cache");
        fs::create_dir_all(&cache).unwrap();
        fs::write(cache.join("ledger.pdf"), b"%PDF").unwrap();
        fs::write(cache.join("chart.png"), b"\x89PNG").unwrap();
        fs::write(temp.path().join("outside.txt"), b"x").unwrap();
        let provider = ReferenceProvider::new("test.provider", vec![ProviderRoot::new("cache", cache)]);
        (provider, DispatchBuilder::new(MessagingConfig::default()), temp)
    }

    #[test]
    fn test_all_missing_degrades_to_text() {
        let (provider, builder, temp) = setup();
        let host = RecordingHost::new().with_handlers(&["com.whatsapp"]);
        let paths = vec![
            temp.path().join("cache/gone.pdf").to_string_lossy().to_string(),
            "/definitely/not/here.png".to_string(),
        ];

        let outcome = MultiFileDispatcher::new(&provider, &builder, "Share Via")
            .dispatch(&host, "Monthly statement", &paths)
            .unwrap();
        assert!(outcome.is_sent());

        let started = host.started();
        assert_eq!(started.len(), 1);
        assert!(started[0].is_text_only());
        assert_eq!(started[0].mime_type.as_deref(), Some("text/plain"));
        assert_eq!(started[0].text.as_deref(), Some("Monthly statement"));
    }

    #[test]
    fn test_survivors_go_out_as_multiple() {
        let (provider, builder, temp) = setup();
        let host = RecordingHost::new().with_handlers(&["com.whatsapp"]);
        let cache = temp.path().join("cache");
        let paths = vec![
            cache.join("ledger.pdf").to_string_lossy().to_string(),
            cache.join("missing.pdf").to_string_lossy().to_string(),
            temp.path().join("outside.txt").to_string_lossy().to_string(),
            format!("file://{}", cache.join("chart.png").to_string_lossy()),
        ];

        MultiFileDispatcher::new(&provider, &builder, "Share Via")
            .dispatch(&host, "Reports", &paths)
            .unwrap();

        let started = host.started();
        assert_eq!(started[0].kind, ActionKind::SendMultiple);
        assert_eq!(started[0].mime_type.as_deref(), Some("*/*"));
        let handles: Vec<_> = started[0].streams.iter().map(|r| r.handle.as_str()).collect();
        assert_eq!(
            handles,
            vec![
                "content://test.provider/cache/ledger.pdf",
                "content://test.provider/cache/chart.png"
            ]
        );
        assert!(started[0].streams.iter().all(|r| r.is_granted_to("com.whatsapp")));
    }

    #[test]
    fn test_empty_list_is_text_only() {
        let (provider, builder, _temp) = setup();
        let host = RecordingHost::new().with_handlers(&["com.android.messaging"]);
        MultiFileDispatcher::new(&provider, &builder, "Share Via")
            .dispatch(&host, "Hello", &[])
            .unwrap();
        assert!(host.started()[0].is_text_only());
    }
}
