//! Pure helpers: endpoint URLs, header parsing, error bodies (no HTTP, no status logic).

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};

/// Longest error body excerpt carried into an error message.
const ERROR_BODY_LIMIT: usize = 200;

/// Join a base URL and an endpoint path with exactly one slash.
pub(crate) fn endpoint_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// `Retry-After` in seconds, if present and numeric.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// First characters of an error body, or the status text when empty.
pub(crate) fn error_excerpt(body: &str, status: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        status.to_string()
    } else {
        body.chars().take(ERROR_BODY_LIMIT).collect()
    }
}
