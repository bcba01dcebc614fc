//! Dispatch builder
//!
//! Turns secure references plus caller intent into a `ShareAction` and issues
//! it through the host. Each dispatch walks a small state machine:
//!
//! ```text
//! BUILD -> RESOLVE_TARGET -> ISSUE -> { DELIVERED | NO_HANDLER | FAILED }
//! ```
//!
//! - **BUILD** picks the action shape: single or multiple attachments, or a
//!   text-only send when there is nothing to attach.
//! - **RESOLVE_TARGET** turns a target address into a routing token and pins the
//!   action to the primary messaging app, or its business variant when only that
//!   one is installed. Without an address the action stays open.
//! - **ISSUE** grants read access and starts the action. Open actions grant every
//!   capable handler explicitly before the chooser is shown, since some hosts
//!   don't propagate the grant flag through the chooser. A targeted action that
//!   the chosen app rejects is FAILED; it is not retried on the other variant.

use std::path::Path;

use crate::config::MessagingConfig;
use crate::error::{BridgeError, HostError};
use crate::host::{ActionKind, ShareAction, ShareHost};
use crate::reference::ReferenceProvider;
use crate::types::{DispatchOutcome, SecureReference};
use crate::utils::{self, WILDCARD_MIME};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchState {
    Build,
    ResolveTarget,
    Issue,
    Delivered,
    NoHandler,
    Failed,
}

fn transition(from: DispatchState, to: DispatchState) {
    tracing::debug!("[Dispatch] {:?} -> {:?}", from, to);
}

/// Everything the builder needs for one dispatch
#[derive(Clone, Debug, Default)]
pub struct DispatchRequest {
    pub references: Vec<SecureReference>,
    /// Caller-given MIME type; inferred from the attachments when absent
    pub mime_type: Option<String>,
    pub caption: Option<String>,
    pub target_address: Option<String>,
    pub chooser_title: Option<String>,
}

/// Where a targeted action is sent
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub package: String,
    pub token: String,
}

#[derive(Clone, Debug)]
pub struct DispatchBuilder {
    messaging: MessagingConfig,
}

impl DispatchBuilder {
    pub fn new(messaging: MessagingConfig) -> Self {
        Self { messaging }
    }

    /// Digits of the address, cut down to the configured trailing count.
    /// Returns None when the address has no digits at all.
    pub fn normalize_address(&self, address: &str) -> Option<String> {
        let digits = utils::digits_only(address);
        if digits.is_empty() {
            return None;
        }
        let keep = self.messaging.address_digits;
        if keep > 0 && digits.len() > keep {
            Some(digits[digits.len() - keep..].to_string())
        } else {
            Some(digits)
        }
    }

    /// `<country code><last digits><domain>`, e.g. `919876543210@s.whatsapp.net`
    pub fn routing_token(&self, address: &str) -> Option<String> {
        self.normalize_address(address).map(|digits| {
            format!(
                "{}{}{}",
                self.messaging.country_code, digits, self.messaging.address_domain
            )
        })
    }

    /// BUILD: choose the action shape
    pub fn build(&self, request: &DispatchRequest) -> ShareAction {
        let caption = request.caption.clone().filter(|c| !c.is_empty());
        let mut action = match request.references.len() {
            0 => {
                let mut action = ShareAction::new(ActionKind::Send);
                action.mime_type = Some("text/plain".to_string());
                action
            }
            1 => {
                let mut action = ShareAction::new(ActionKind::Send);
                action.mime_type = Some(
                    request
                        .mime_type
                        .clone()
                        .or_else(|| infer_mime(&request.references))
                        .unwrap_or_else(|| WILDCARD_MIME.to_string()),
                );
                action
            }
            _ => {
                let mut action = ShareAction::new(ActionKind::SendMultiple);
                action.mime_type = Some(
                    request
                        .mime_type
                        .clone()
                        .or_else(|| infer_mime(&request.references))
                        .unwrap_or_else(|| WILDCARD_MIME.to_string()),
                );
                action
            }
        };

        action.streams = request.references.clone();
        action.text = caption;
        action.grant_read = !action.streams.is_empty();
        action.chooser_title = request.chooser_title.clone();
        action
    }

    /// RESOLVE_TARGET: pin the action to an installed messaging app
    pub fn resolve_target(&self, host: &dyn ShareHost, address: &str) -> Result<Target, BridgeError> {
        let token = self
            .routing_token(address)
            .ok_or_else(|| BridgeError::Request(format!("target address has no digits: {:?}", address)))?;

        let primary = &self.messaging.primary_package;
        let business = &self.messaging.business_package;
        let package = if host.is_app_installed(primary) {
            primary.clone()
        } else if host.is_app_installed(business) {
            business.clone()
        } else {
            return Err(BridgeError::NoHandler(format!(
                "neither {} nor {} is installed",
                primary, business
            )));
        };

        tracing::info!("[Dispatch] Targeting {} for {}", package, token);
        Ok(Target { package, token })
    }

    fn apply_target(&self, action: &mut ShareAction, target: &Target) {
        action.package = Some(target.package.clone());
        action
            .extras
            .insert(self.messaging.token_extra.clone(), target.token.clone());
    }

    /// ISSUE: grant and start. Returns the detail for the SENT outcome.
    pub fn issue(&self, host: &dyn ShareHost, action: &mut ShareAction) -> Result<String, BridgeError> {
        match action.package.clone() {
            Some(package) => {
                for reference in action.streams.iter_mut() {
                    host.grant_read(&package, reference)
                        .map_err(|e| BridgeError::Dispatch(format!("grant to {} failed: {}", package, e)))?;
                    ReferenceProvider::record_grant(reference, &package);
                }
                // Once a variant is chosen there is no fallback to the other one
                host.start(action)
                    .map_err(|e| BridgeError::Dispatch(format!("{} could not handle the share: {}", package, e)))?;
                Ok(package)
            }
            None => {
                let handlers = host.query_handlers(action).map_err(BridgeError::from)?;
                if handlers.is_empty() {
                    return Err(BridgeError::NoHandler("no application can receive this share".to_string()));
                }

                for handler in &handlers {
                    for reference in action.streams.iter_mut() {
                        match host.grant_read(handler, reference) {
                            Ok(()) => ReferenceProvider::record_grant(reference, handler),
                            Err(e) => tracing::warn!("[Dispatch] Grant to {} failed: {}", handler, e),
                        }
                    }
                }

                host.start(action).map_err(|e| match e {
                    HostError::NoActivity => BridgeError::from(HostError::NoActivity),
                    other => BridgeError::Dispatch(format!("failed to open share dialog: {}", other)),
                })?;
                Ok(format!("chooser ({} handlers)", handlers.len()))
            }
        }
    }

    /// Run the full state machine for one request
    pub fn dispatch(&self, host: &dyn ShareHost, request: &DispatchRequest) -> Result<DispatchOutcome, BridgeError> {
        let result = self.run(host, request);
        match &result {
            Ok(_) => transition(DispatchState::Issue, DispatchState::Delivered),
            Err(BridgeError::NoHandler(_)) => transition(DispatchState::Issue, DispatchState::NoHandler),
            Err(_) => transition(DispatchState::Issue, DispatchState::Failed),
        }
        result.map(DispatchOutcome::sent)
    }

    fn run(&self, host: &dyn ShareHost, request: &DispatchRequest) -> Result<String, BridgeError> {
        let mut action = self.build(request);
        transition(DispatchState::Build, DispatchState::ResolveTarget);

        if let Some(address) = request.target_address.as_deref() {
            let target = self.resolve_target(host, address)?;
            self.apply_target(&mut action, &target);
        }
        transition(DispatchState::ResolveTarget, DispatchState::Issue);

        self.issue(host, &mut action)
    }

    /// Deep link straight into a chat with `address`, prefilled with `text`.
    /// Falls back to the web link when the app scheme cannot be opened.
    pub fn open_chat(&self, host: &dyn ShareHost, address: &str, text: &str) -> Result<DispatchOutcome, BridgeError> {
        let digits = self
            .normalize_address(address)
            .ok_or_else(|| BridgeError::Request(format!("chat address has no digits: {:?}", address)))?;
        let phone = format!("{}{}", self.messaging.country_code, digits);
        let encoded = urlencoding::encode(text);

        let app_uri = format!("{}?phone={}&text={}", self.messaging.chat_scheme_url, phone, encoded);
        match host.start(&ShareAction::view(app_uri.clone())) {
            Ok(()) => return Ok(DispatchOutcome::sent(app_uri)),
            Err(e) => tracing::warn!("[Dispatch] {} failed ({}), falling back to web link", app_uri, e),
        }

        let web_uri = format!("{}{}?text={}", self.messaging.chat_web_url, phone, encoded);
        host.start(&ShareAction::view(web_uri.clone()))?;
        Ok(DispatchOutcome::sent(web_uri))
    }
}

/// Common MIME type of all attachments, if they agree
fn infer_mime(references: &[SecureReference]) -> Option<String> {
    let mut mimes = references.iter().map(|r| mime_of(&r.path));
    let first = mimes.next()??;
    if mimes.all(|m| m == Some(first)) {
        Some(first.to_string())
    } else {
        None
    }
}

fn mime_of(path: &Path) -> Option<&'static str> {
    utils::get_mime_type(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{HostEvent, RecordingHost};
    use crate::types::{Access, OutcomeKind};
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn reference(name: &str) -> SecureReference {
        SecureReference {
            handle: format!("content://test.provider/temp_share/{}", name),
            path: PathBuf::from("/data/cache/temp_share").join(name),
            granted_to: BTreeSet::new(),
            access: Access::Read,
        }
    }

    fn builder() -> DispatchBuilder {
        DispatchBuilder::new(MessagingConfig::default())
    }

    #[test]
    fn test_routing_token_keeps_last_ten_digits() {
        let b = builder();
        assert_eq!(
            b.routing_token("+91 98765 43210 1").as_deref(),
            Some("918765432101@s.whatsapp.net")
        );
        // 13 digits -> last 10
        assert_eq!(
            b.routing_token("0919876543210").as_deref(),
            Some("919876543210@s.whatsapp.net")
        );
        assert_eq!(b.routing_token("98765").as_deref(), Some("9198765@s.whatsapp.net"));
        assert_eq!(b.routing_token("n/a"), None);
    }

    #[test]
    fn test_build_shapes() {
        let b = builder();

        let text_only = b.build(&DispatchRequest {
            caption: Some("Statement attached".into()),
            ..Default::default()
        });
        assert!(text_only.is_text_only());
        assert_eq!(text_only.mime_type.as_deref(), Some("text/plain"));
        assert_eq!(text_only.text.as_deref(), Some("Statement attached"));
        assert!(!text_only.grant_read);

        let single = b.build(&DispatchRequest {
            references: vec![reference("a.pdf")],
            ..Default::default()
        });
        assert_eq!(single.kind, ActionKind::Send);
        assert_eq!(single.mime_type.as_deref(), Some("application/pdf"));
        assert!(single.grant_read);

        let mixed = b.build(&DispatchRequest {
            references: vec![reference("a.pdf"), reference("b.png")],
            ..Default::default()
        });
        assert_eq!(mixed.kind, ActionKind::SendMultiple);
        assert_eq!(mixed.mime_type.as_deref(), Some("*/*"));

        let same = b.build(&DispatchRequest {
            references: vec![reference("a.png"), reference("b.png")],
            ..Default::default()
        });
        assert_eq!(same.mime_type.as_deref(), Some("image/png"));

        let unknown = b.build(&DispatchRequest {
            references: vec![reference("blob")],
            ..Default::default()
        });
        assert_eq!(unknown.mime_type.as_deref(), Some("*/*"));
    }

    #[test]
    fn test_open_dispatch_grants_every_handler() {
        let host = RecordingHost::new().with_handlers(&["com.whatsapp", "org.telegram.messenger"]);
        let outcome = builder()
            .dispatch(
                &host,
                &DispatchRequest {
                    references: vec![reference("a.pdf")],
                    chooser_title: Some("Share Document".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(outcome.kind, OutcomeKind::Sent);

        let grants = host.grants();
        assert_eq!(grants.len(), 2);
        assert!(grants.contains(&("org.telegram.messenger".to_string(), reference("a.pdf").handle)));

        let started = host.started();
        assert_eq!(started.len(), 1);
        assert!(!started[0].is_targeted());
        assert_eq!(started[0].chooser_title.as_deref(), Some("Share Document"));
    }

    #[test]
    fn test_grants_complete_before_start() {
        let host = RecordingHost::new().with_handlers(&["com.whatsapp", "org.telegram.messenger"]);
        builder()
            .dispatch(
                &host,
                &DispatchRequest {
                    references: vec![reference("a.pdf"), reference("b.png")],
                    ..Default::default()
                },
            )
            .unwrap();

        let events = host.events();
        assert_eq!(events.len(), 5);
        let (last, grants) = events.split_last().unwrap();
        assert_eq!(*last, HostEvent::Start { package: None });
        assert!(grants.iter().all(|e| matches!(e, HostEvent::Grant { .. })));

        // Targeted: the single grant also lands before the start
        let host = RecordingHost::new().with_installed(&["com.whatsapp"]);
        builder()
            .dispatch(
                &host,
                &DispatchRequest {
                    references: vec![reference("a.pdf")],
                    target_address: Some("9876543210".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(
            host.events(),
            vec![
                HostEvent::Grant {
                    package: "com.whatsapp".into(),
                    handle: reference("a.pdf").handle,
                },
                HostEvent::Start {
                    package: Some("com.whatsapp".into()),
                },
            ]
        );
    }

    #[test]
    fn test_open_dispatch_without_handlers_is_no_handler() {
        let host = RecordingHost::new();
        let err = builder()
            .dispatch(
                &host,
                &DispatchRequest {
                    references: vec![reference("a.pdf")],
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, BridgeError::NoHandler(_)));
        assert!(host.started().is_empty());
    }

    #[test]
    fn test_targeted_prefers_primary() {
        let host = RecordingHost::new().with_installed(&["com.whatsapp", "com.whatsapp.w4b"]);
        builder()
            .dispatch(
                &host,
                &DispatchRequest {
                    references: vec![reference("a.pdf")],
                    target_address: Some("98765 43210".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        let started = host.started();
        assert_eq!(started[0].package.as_deref(), Some("com.whatsapp"));
        assert_eq!(
            started[0].extras.get("jid").map(String::as_str),
            Some("919876543210@s.whatsapp.net")
        );
        assert!(started[0].streams[0].is_granted_to("com.whatsapp"));
    }

    #[test]
    fn test_targeted_uses_business_when_only_one_installed() {
        let host = RecordingHost::new().with_installed(&["com.whatsapp.w4b"]);
        let outcome = builder()
            .dispatch(
                &host,
                &DispatchRequest {
                    references: vec![reference("a.pdf")],
                    target_address: Some("9876543210".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(outcome.detail.as_deref(), Some("com.whatsapp.w4b"));
    }

    #[test]
    fn test_targeted_without_messaging_app_is_no_handler() {
        let host = RecordingHost::new().with_handlers(&["org.telegram.messenger"]);
        let err = builder()
            .dispatch(
                &host,
                &DispatchRequest {
                    references: vec![reference("a.pdf")],
                    target_address: Some("9876543210".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.outcome_kind(), OutcomeKind::NoHandler);
        assert!(host.started().is_empty());
    }

    #[test]
    fn test_targeted_rejection_is_failed_without_retry() {
        let host = RecordingHost::new()
            .with_installed(&["com.whatsapp", "com.whatsapp.w4b"])
            .failing_start_for("com.whatsapp");
        let err = builder()
            .dispatch(
                &host,
                &DispatchRequest {
                    references: vec![reference("a.pdf")],
                    target_address: Some("9876543210".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, BridgeError::Dispatch(_)));
        // No second attempt against the business variant
        assert_eq!(host.start_attempts(), 1);
    }

    #[test]
    fn test_open_chat_falls_back_to_web() {
        let host = RecordingHost::new().failing_start_for("whatsapp://");
        let outcome = builder().open_chat(&host, "98765-43210", "Payment due").unwrap();
        assert_eq!(
            outcome.detail.as_deref(),
            Some("https://wa.me/919876543210?text=Payment%20due")
        );
        assert_eq!(host.start_attempts(), 2);
    }

    #[test]
    fn test_open_chat_uses_app_scheme_first() {
        let host = RecordingHost::new();
        let outcome = builder().open_chat(&host, "9876543210", "hi").unwrap();
        assert_eq!(
            outcome.detail.as_deref(),
            Some("whatsapp://send?phone=919876543210&text=hi")
        );
        assert_eq!(host.started()[0].kind, ActionKind::View);
    }
}
