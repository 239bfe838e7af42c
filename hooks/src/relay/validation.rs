//! Input validation for relay requests

use url::Url;

use crate::errors::RelayError;

pub const MAX_URL_LENGTH: usize = 2048;
pub const FORMAT_ID_MAX_LENGTH: usize = 200;
pub const DOWNLOAD_ID_MIN_LENGTH: usize = 40;
pub const DOWNLOAD_ID_MAX_LENGTH: usize = 50;

/// Trim and check a media URL: http(s) with a host, bounded length.
pub fn validate_url(raw: &str) -> Result<String, RelayError> {
    let url = raw.trim();
    if url.is_empty() {
        return Err(invalid("URL cannot be empty"));
    }
    if url.len() > MAX_URL_LENGTH {
        return Err(invalid(format!(
            "URL too long (max {} characters)",
            MAX_URL_LENGTH
        )));
    }

    let parsed = Url::parse(url).map_err(|_| invalid(INVALID_URL))?;
    let has_host = parsed.host_str().is_some_and(|h| !h.is_empty());
    if !matches!(parsed.scheme(), "http" | "https") || !has_host {
        return Err(invalid(INVALID_URL));
    }
    if url.chars().any(char::is_whitespace) {
        return Err(invalid(INVALID_URL));
    }

    Ok(url.to_string())
}

const INVALID_URL: &str = "Invalid URL format. URL must start with http:// or https://";

/// Empty means `best`; otherwise a bounded yt-dlp format selector.
pub fn validate_format_id(raw: &str) -> Result<String, RelayError> {
    let format_id = raw.trim();
    if format_id.is_empty() {
        return Ok("best".to_string());
    }
    if format_id.len() > FORMAT_ID_MAX_LENGTH {
        return Err(invalid(format!(
            "Format ID too long (max {} characters)",
            FORMAT_ID_MAX_LENGTH
        )));
    }

    let allowed = |c: char| c.is_ascii_alphanumeric() || "+/-_.[]<>=!:".contains(c);
    if !format_id.chars().all(allowed) {
        return Err(invalid(
            "Invalid format ID. Only alphanumeric characters and +/-_.[]<>=!: are allowed",
        ));
    }

    Ok(format_id.to_string())
}

/// Download ids are URL-safe base64 tokens.
pub fn validate_download_id(download_id: &str) -> Result<&str, RelayError> {
    if download_id.is_empty() {
        return Err(invalid("Download ID cannot be empty"));
    }
    if !(DOWNLOAD_ID_MIN_LENGTH..=DOWNLOAD_ID_MAX_LENGTH).contains(&download_id.len()) {
        return Err(invalid(format!(
            "Invalid download ID length (expected {}-{} characters)",
            DOWNLOAD_ID_MIN_LENGTH, DOWNLOAD_ID_MAX_LENGTH
        )));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_';
    if !download_id.chars().all(allowed) {
        return Err(invalid("Invalid download ID format"));
    }
    Ok(download_id)
}

fn invalid(message: impl Into<String>) -> RelayError {
    RelayError::InvalidInput(message.into())
}
