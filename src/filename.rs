//! File name resolution
//!
//! Turns whatever name web content supplies (or none) into a single safe path
//! segment with an extension that matches the MIME type. Bad characters are
//! corrected silently, never reported.

use regex::Regex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::LazyLock;

use crate::utils;

static UNSAFE_CHARS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^A-Za-z0-9._-]")
        .expect("Failed to compile UNSAFE_CHARS_REGEX - this is a bug in the regex pattern")
});

/// Last timestamp handed out, so two names in the same millisecond still differ
static LAST_STAMP: AtomicI64 = AtomicI64::new(0);

/// Monotonic millisecond stamp: the current time, bumped past the last one issued
fn unique_stamp() -> i64 {
    let now = utils::now_millis();
    let mut last = LAST_STAMP.load(Ordering::Relaxed);
    loop {
        let next = if now > last { now } else { last + 1 };
        match LAST_STAMP.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// `<prefix><millis>`, unique within the process
pub fn fallback_name(prefix: &str) -> String {
    format!("{}{}", prefix, unique_stamp())
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`.
/// Names made only of dots would be relative-path components, so they become underscores.
pub fn sanitize(name: &str) -> String {
    let cleaned = UNSAFE_CHARS_REGEX.replace_all(name, "_").into_owned();
    if !cleaned.is_empty() && cleaned.chars().all(|c| c == '.') {
        return "_".repeat(cleaned.len());
    }
    cleaned
}

/// True when the name has a non-empty stem and a non-empty extension
pub fn has_extension(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((stem, ext)) => !stem.trim_matches('.').is_empty() && !ext.is_empty(),
        None => false,
    }
}

/// Extension to append for a MIME type: table lookup first, then the coarse fallbacks
fn extension_for(mime: &str) -> Option<&'static str> {
    if let Some(ext) = utils::extension_for_mime(mime) {
        return Some(ext);
    }
    let mime = utils::normalize_mime(mime);
    if mime.contains("pdf") {
        Some("pdf")
    } else if mime.contains("image") {
        Some("jpg")
    } else {
        None
    }
}

/// Resolves caller-supplied names into safe file names
#[derive(Clone, Debug)]
pub struct FilenameResolver {
    fallback_prefix: String,
}

impl FilenameResolver {
    pub fn new(fallback_prefix: impl Into<String>) -> Self {
        let prefix = sanitize(&fallback_prefix.into());
        Self {
            fallback_prefix: if prefix.is_empty() { "file_".to_string() } else { prefix },
        }
    }

    /// Resolve a name. The result is never empty and never contains a path separator.
    pub fn resolve(&self, name: Option<&str>, mime_type: Option<&str>) -> String {
        let mut resolved = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) => sanitize(n),
            None => fallback_name(&self.fallback_prefix),
        };

        if !has_extension(&resolved) {
            if let Some(ext) = mime_type.and_then(extension_for) {
                resolved.push('.');
                resolved.push_str(ext);
            }
        }

        tracing::debug!("[Filename] {:?} ({:?}) -> {}", name, mime_type, resolved);
        resolved
    }
}

impl Default for FilenameResolver {
    fn default() -> Self {
        Self::new("Shared_Doc_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sanitize_blocks_traversal() {
        assert_eq!(sanitize("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize("..\\Windows\\win.ini"), ".._Windows_win.ini");
        assert_eq!(sanitize(".."), "__");
        assert_eq!(sanitize("."), "_");
        assert_eq!(sanitize("Invoice #42 (final).pdf"), "Invoice__42__final_.pdf");
        assert_eq!(sanitize("naïve.txt"), "na_ve.txt");
    }

    #[test]
    fn test_no_name_pdf_gets_pdf_extension() {
        let resolver = FilenameResolver::default();
        let name = resolver.resolve(None, Some("application/pdf"));
        assert!(name.starts_with("Shared_Doc_"));
        assert!(name.ends_with(".pdf"));
    }

    #[test]
    fn test_extension_appended_only_when_missing() {
        let resolver = FilenameResolver::default();
        assert_eq!(resolver.resolve(Some("report"), Some("application/pdf")), "report.pdf");
        assert_eq!(resolver.resolve(Some("report.pdf"), Some("image/png")), "report.pdf");
        assert_eq!(resolver.resolve(Some("photo"), Some("image/x-custom")), "photo.jpg");
        assert_eq!(resolver.resolve(Some("scan"), Some("application/x-pdf-ish")), "scan.pdf");
        assert_eq!(resolver.resolve(Some("blob"), Some("application/x-unknown")), "blob");
        assert_eq!(resolver.resolve(Some(".hidden"), Some("text/plain")), ".hidden.txt");
        assert_eq!(resolver.resolve(Some("notes"), None), "notes");
    }

    #[test]
    fn test_blank_name_falls_back() {
        let resolver = FilenameResolver::new("RCM_Doc_");
        let name = resolver.resolve(Some("   "), Some("image/png"));
        assert!(name.starts_with("RCM_Doc_"));
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn test_fallback_names_are_unique() {
        let a = fallback_name("x_");
        let b = fallback_name("x_");
        let c = fallback_name("x_");
        assert_ne!(a, b);
        assert_ne!(b, c);
    }

    proptest! {
        #[test]
        fn prop_resolved_names_are_safe_and_non_empty(
            name in proptest::option::of(".{0,40}"),
            mime in proptest::option::of("[a-z]{1,10}/[a-z.+-]{1,20}"),
        ) {
            let resolved = FilenameResolver::default().resolve(name.as_deref(), mime.as_deref());
            prop_assert!(!resolved.is_empty());
            prop_assert!(resolved.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'));
            prop_assert!(resolved != "." && resolved != "..");
        }

        #[test]
        fn prop_sanitize_is_deterministic(name in ".{1,40}") {
            prop_assert_eq!(sanitize(&name), sanitize(&name));
        }
    }
}
