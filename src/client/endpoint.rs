use crate::types::{RealtimeError, Result};
use url::Url;

/// Normalizes a user-entered server address into `scheme://host[:port]`.
///
/// Accepts `http`/`https` URLs as-is (trailing slashes trimmed). A bare
/// `host:port` is read as `http://host:port`. Anything else, including an empty
/// string, is rejected.
pub fn validate_server_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(RealtimeError::InvalidServerUrl(raw.to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else if trimmed.contains(':') {
        format!("http://{trimmed}")
    } else {
        return Err(RealtimeError::InvalidServerUrl(raw.to_string()));
    };

    let url =
        Url::parse(&candidate).map_err(|_| RealtimeError::InvalidServerUrl(raw.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(RealtimeError::InvalidServerUrl(raw.to_string()));
    }
    Ok(url)
}

/// `scheme://host[:port]` without the trailing slash `Url` adds
pub fn display_origin(url: &Url) -> String {
    url.as_str().trim_end_matches('/').to_string()
}
