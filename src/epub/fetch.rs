//! Ways of getting resource bytes.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

/// Request for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Locator of the resource.
    pub url: String,
}

/// Fetched resource bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchResponse {
    /// Raw body.
    pub content: Vec<u8>,
    /// `Content-Type` as reported by the source.
    pub mime_header: Option<String>,
}

/// Something able to fetch a resource on the loader's behalf.
///
/// The loader tries its direct fetcher first and falls back to an optional
/// delegate, which may sit behind a permission prompt or another process. The
/// loader only sees success or failure.
#[async_trait]
pub trait ResourceFetchDelegate: Send + Sync {
    /// Fetch one resource.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse>;
}

/// Direct HTTP fetcher.
#[derive(Clone)]
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with a user agent and a per-request timeout.
    pub fn new(user_agent: &str, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(request_timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ResourceFetchDelegate for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        if request.url.starts_with("data:") {
            return decode_data_uri(&request.url);
        }

        let load_error = |reason: String| AppError::ResourceLoad {
            src: request.url.clone(),
            reason,
        };

        let response = self
            .http
            .get(&request.url)
            .send()
            .await
            .map_err(|e| load_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(load_error(format!("HTTP {}", status)));
        }

        let mime_header = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let content = response
            .bytes()
            .await
            .map_err(|e| load_error(e.to_string()))?;

        Ok(FetchResponse {
            content: content.to_vec(),
            mime_header,
        })
    }
}

/// Decode an RFC 2397 `data:` URI.
pub fn decode_data_uri(uri: &str) -> Result<FetchResponse> {
    let malformed = |reason: &str| AppError::ResourceLoad {
        src: truncate(uri, 64),
        reason: reason.to_string(),
    };

    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| malformed("not a data URI"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| malformed("missing ',' separator"))?;

    let (media, is_base64) = match header.strip_suffix(";base64") {
        Some(media) => (media, true),
        None => (header, false),
    };

    let content = if is_base64 {
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        STANDARD
            .decode(compact)
            .map_err(|e| malformed(&format!("invalid base64: {}", e)))?
    } else {
        urlencoding::decode_binary(payload.as_bytes()).into_owned()
    };

    let mime_header = media
        .split(';')
        .next()
        .filter(|m| !m.is_empty())
        .map(String::from);

    Ok(FetchResponse {
        content,
        mime_header,
    })
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_data_uri() {
        let response = decode_data_uri("data:image/gif;base64,R0lGODlh").unwrap();
        assert_eq!(response.content, b"GIF89a");
        assert_eq!(response.mime_header.as_deref(), Some("image/gif"));
    }

    #[test]
    fn percent_encoded_data_uri() {
        let response = decode_data_uri("data:,a%20b").unwrap();
        assert_eq!(response.content, b"a b");
        assert_eq!(response.mime_header, None);
    }

    #[test]
    fn malformed_data_uri() {
        let err = decode_data_uri("data:image/png;base64").unwrap_err();
        assert!(matches!(err, AppError::ResourceLoad { .. }));
    }

    #[tokio::test]
    async fn unreachable_host_fails() {
        let fetcher = HttpFetcher::new("web2epub-test", Duration::from_secs(5)).unwrap();
        let result = fetcher
            .fetch(&FetchRequest {
                url: "http://127.0.0.1:9/missing.png".to_string(),
            })
            .await;
        assert!(matches!(result, Err(AppError::ResourceLoad { .. })));
    }
}
