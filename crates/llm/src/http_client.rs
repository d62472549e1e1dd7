//! HTTP Client Factory
//!
//! Builds the reqwest client shared by the HTTP-based adapters and holds
//! the small helpers they have in common (base URL validation, error
//! response decoding).

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use url::Url;

use crate::provider::parse_http_error;
use crate::types::{LlmError, LlmResult};

/// Build a `reqwest::Client` with the given per-request timeout.
///
/// Proxy settings come from the standard environment variables, which
/// reqwest honors by default.
pub fn build_http_client(timeout_secs: u64) -> LlmResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(timeout_secs));
    }
    builder
        .build()
        .map_err(|e| LlmError::config(format!("Failed to build HTTP client: {}", e)))
}

/// Validate a configured API root and strip any trailing slash.
pub fn normalize_base_url(raw: &str) -> LlmResult<String> {
    let trimmed = raw.trim();
    let parsed = Url::parse(trimmed)
        .map_err(|e| LlmError::config(format!("Invalid base URL '{}': {}", trimmed, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(LlmError::config(format!(
            "Unsupported base URL scheme '{}'",
            parsed.scheme()
        )));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

/// Seconds from a `retry-after` header, when it holds a number.
pub fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| secs.ceil() as u64)
}

/// Turn a non-success response into an `LlmError`.
pub async fn error_from_response(response: reqwest::Response, provider: &str) -> LlmError {
    let status = response.status().as_u16();
    let retry_after = retry_after_secs(response.headers());
    match response.text().await {
        Ok(body) => parse_http_error(status, &body, retry_after, provider),
        Err(e) => parse_http_error(status, &e.to_string(), retry_after, provider),
    }
}

/// Map a transport failure to `LlmError::NetworkError`.
pub fn network_error(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::NetworkError {
            message: format!("request timed out: {}", err),
        }
    } else {
        LlmError::network(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(30).is_ok());
        assert!(build_http_client(0).is_ok());
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("https://api.example.com/v1/").unwrap(),
            "https://api.example.com/v1"
        );
        assert_eq!(
            normalize_base_url(" http://localhost:11434 ").unwrap(),
            "http://localhost:11434"
        );
        assert!(matches!(
            normalize_base_url("not a url"),
            Err(LlmError::Configuration { .. })
        ));
        assert!(normalize_base_url("ftp://example.com").is_err());
    }

    #[test]
    fn test_retry_after_secs() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after_secs(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(retry_after_secs(&headers), Some(12));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("0.5"));
        assert_eq!(retry_after_secs(&headers), Some(1));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after_secs(&headers), None);
    }
}
