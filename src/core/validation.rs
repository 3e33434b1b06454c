//! Request validation for the resolution endpoint
//!
//! Checks, in order:
//! - both `url` and `format` are present and non-empty
//! - `url` points at instagram.com (http or https, optional `www.`)
//! - `format` is one of `mp4` / `mp3`
//!
//! Validation is pure: nothing here touches the store or the extractor.

use lazy_regex::{lazy_regex, Lazy, Regex};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::types::MediaFormat;

/// Accepted source URLs. Anchored at the start so a foreign URL that merely
/// embeds an instagram.com link does not slip through.
static INSTAGRAM_URL: Lazy<Regex> = lazy_regex!(r"^https?://(www\.)?instagram\.com/");

/// Validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("URL and format are required")]
    MissingFields,

    #[error("Invalid Instagram URL")]
    InvalidUrl(String),

    #[error("Unsupported format")]
    UnsupportedFormat(String),
}

/// Raw body of `POST /api/download`.
///
/// Fields are kept as raw JSON so a value of the wrong type is reported by
/// the check it fails (`{"format": 5}` is an unsupported format) instead of
/// as an unreadable body.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DownloadBody {
    pub url: Option<Value>,
    pub format: Option<Value>,
}

/// Text of a body field. `null`, `false`, `0` and blank strings count as
/// absent; other non-strings are checked as their JSON text.
fn field_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Null | Value::Bool(false) => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub url: String,
    pub format: MediaFormat,
}

/// Returns true if the URL looks like an Instagram link.
///
/// # Examples
/// ```
/// use reelgrab::core::validation::is_instagram_url;
///
/// assert!(is_instagram_url("https://www.instagram.com/p/ABC/"));
/// assert!(is_instagram_url("http://instagram.com/reel/XYZ/"));
/// assert!(!is_instagram_url("https://evil.com/?next=https://instagram.com/p/ABC/"));
/// ```
pub fn is_instagram_url(url: &str) -> bool {
    INSTAGRAM_URL.is_match(url)
}

/// Validates the download body and returns the typed request.
pub fn validate_download_request(body: &DownloadBody) -> Result<ValidatedRequest, ValidationError> {
    let (Some(url), Some(format)) = (field_text(body.url.as_ref()), field_text(body.format.as_ref())) else {
        return Err(ValidationError::MissingFields);
    };

    if !is_instagram_url(&url) {
        return Err(ValidationError::InvalidUrl(url));
    }

    let format = format
        .parse::<MediaFormat>()
        .map_err(|_| ValidationError::UnsupportedFormat(format))?;

    Ok(ValidatedRequest { url, format })
}
