//! Payload decoding
//!
//! Web content hands payloads over either as bare base64 or as a data URI
//! (`data:application/pdf;base64,JVBERi0...`). Everything up to the first comma
//! is metadata and is dropped before decoding.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

use crate::error::DecodeError;

/// Standard alphabet, padding optional (web encoders are not consistent about it)
const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Drop everything up to and including the first comma.
/// Input without a comma is returned unchanged.
pub fn strip_prefix(encoded: &str) -> &str {
    match encoded.split_once(',') {
        Some((_, rest)) => rest,
        None => encoded,
    }
}

/// MIME type declared in a data-URI prefix, if any
pub fn declared_mime(encoded: &str) -> Option<&str> {
    let (meta, _) = encoded.split_once(',')?;
    let meta = meta.strip_prefix("data:")?;
    let mime = meta.split(';').next()?.trim();
    if mime.is_empty() {
        None
    } else {
        Some(mime)
    }
}

/// Decode a (possibly prefixed) base64 payload into raw bytes.
///
/// ASCII whitespace in the body is ignored, as line-wrapped base64 is common.
/// `max_bytes` bounds the decoded size.
pub fn decode_payload(encoded: &str, max_bytes: usize) -> Result<Vec<u8>, DecodeError> {
    let body = strip_prefix(encoded);
    let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Err(DecodeError::Empty);
    }

    // 4 base64 chars -> 3 bytes; reject before allocating the decoded buffer
    let estimated = compact.len() / 4 * 3;
    if estimated > max_bytes.saturating_add(3) {
        return Err(DecodeError::TooLarge {
            size: estimated,
            max: max_bytes,
        });
    }

    let bytes = LENIENT_STANDARD.decode(compact.as_bytes())?;
    if bytes.len() > max_bytes {
        return Err(DecodeError::TooLarge {
            size: bytes.len(),
            max: max_bytes,
        });
    }

    tracing::debug!("[Decoder] Decoded {} bytes", bytes.len());
    Ok(bytes)
}
