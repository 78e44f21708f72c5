//! Compact URL-safe slugs for UUIDs.
//!
//! A slug is the URL-safe base64 encoding of the 16 raw UUID bytes with the
//! `=` padding stripped, which always yields 22 characters.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use uuid::Uuid;

use crate::errors::MapperError;

/// Length of every slug produced by [`uuid_to_slug`].
pub const SLUG_LEN: usize = 22;

/// Encode a UUID as a 22-character URL-safe slug.
pub fn uuid_to_slug(uuid: &Uuid) -> String {
    URL_SAFE_NO_PAD.encode(uuid.as_bytes())
}

/// Decode a slug produced by [`uuid_to_slug`].
///
/// Trailing `=` padding is tolerated so that slugs copied from padded
/// encoders still decode.
pub fn slug_to_uuid(slug: &str) -> Result<Uuid, MapperError> {
    let malformed = |detail: String| MapperError::MalformedIdentifier {
        kind: "uuid slug",
        value: slug.to_string(),
        detail,
    };

    let trimmed = slug.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(trimmed)
        .map_err(|e| malformed(e.to_string()))?;

    Uuid::from_slice(&bytes).map_err(|_| malformed(format!("expected 16 bytes, got {}", bytes.len())))
}
