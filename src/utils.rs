//! Utility functions for the share bridge
//!
//! This module contains common helpers used by several components:
//! - MIME type detection from file names, and extension lookup from MIME types
//! - Path normalization
//! - Digit extraction for chat addresses

use std::path::{Path, PathBuf};

/// Generic MIME type used when nothing better is known
pub const WILDCARD_MIME: &str = "*/*";

/// Strip parameters and normalize case: `"Application/PDF; q=1"` -> `"application/pdf"`
pub fn normalize_mime(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Get MIME type from file extension
pub fn get_mime_type(path: &Path) -> Option<&'static str> {
    let mime = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        // Images
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("bmp") => "image/bmp",
        Some("heic") | Some("heif") => "image/heic",
        // Audio / video
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("ogg") => "audio/ogg",
        Some("wav") => "audio/wav",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("3gp") => "video/3gpp",
        // Documents
        Some("pdf") => "application/pdf",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("xls") => "application/vnd.ms-excel",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("ppt") => "application/vnd.ms-powerpoint",
        Some("pptx") => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        // Text
        Some("txt") => "text/plain",
        Some("html") | Some("htm") => "text/html",
        Some("csv") => "text/csv",
        Some("vcf") => "text/x-vcard",
        // Archives
        Some("zip") => "application/zip",
        Some("gz") => "application/gzip",
        _ => return None,
    };
    Some(mime)
}

/// Canonical file extension for a MIME type (without the dot)
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let ext = match normalize_mime(mime).as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "image/bmp" => "bmp",
        "image/heic" | "image/heif" => "heic",
        "audio/mpeg" => "mp3",
        "audio/mp4" => "m4a",
        "audio/ogg" => "ogg",
        "audio/wav" | "audio/x-wav" => "wav",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/3gpp" => "3gp",
        "application/pdf" => "pdf",
        "application/json" => "json",
        "application/xml" | "text/xml" => "xml",
        "application/msword" => "doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "application/vnd.ms-excel" => "xls",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => "xlsx",
        "application/vnd.ms-powerpoint" => "ppt",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => "pptx",
        "text/plain" => "txt",
        "text/html" => "html",
        "text/csv" => "csv",
        "text/x-vcard" | "text/vcard" => "vcf",
        "application/zip" => "zip",
        "application/gzip" => "gz",
        _ => return None,
    };
    Some(ext)
}

/// Keep only ASCII digits: `"+91 (987) 654-3210"` -> `"919876543210"`
pub fn digits_only(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Normalize a path for cross-platform compatibility
/// On Windows: removes \\?\ prefixes
pub fn normalize_path(path: PathBuf) -> PathBuf {
    dunce::simplified(&path).to_path_buf()
}

/// Canonical form of `path` when it exists, the simplified input otherwise
pub fn resolve_path(path: &Path) -> PathBuf {
    dunce::canonicalize(path).unwrap_or_else(|_| normalize_path(path.to_path_buf()))
}

/// Milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
