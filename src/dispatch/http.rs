use std::time::Duration;

use reqwest::Client;

use crate::error::FrameQaError;
use crate::parsers::{ParsedResponse, ResponseParser};

pub const MAX_RESPONSE_BYTES: usize = 8 * 1024 * 1024; // 8MB

/// Default whole-request timeout. Reasoning models over many frames are slow.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Shared HTTP transport for every REST provider.
#[derive(Clone)]
pub struct HttpDispatch {
    client: Client,
}

impl HttpDispatch {
    pub fn new(request_timeout: Duration) -> Result<Self, FrameQaError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(request_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(16)
            .build()
            .map_err(|e| FrameQaError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// POST a JSON body and decode the response with `parser`.
    ///
    /// Status mapping: 429 → `RateLimited`, 401/403 → `AuthFailed`,
    /// any other non-2xx → `Upstream` with the (capped) body as message.
    pub async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, String)],
        body: &serde_json::Value,
        provider: &str,
        parser: &dyn ResponseParser,
    ) -> Result<ParsedResponse, FrameQaError> {
        let mut request = self.client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, value);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FrameQaError::RateLimited {
                provider: provider.to_string(),
            });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(FrameQaError::AuthFailed {
                provider: provider.to_string(),
                message: format!("{status}"),
            });
        }

        // Catch-all for any non-success status (4xx, 5xx, 3xx that wasn't followed)
        if !status.is_success() {
            let error_bytes = response.bytes().await.unwrap_or_default();
            let truncated = &error_bytes[..error_bytes.len().min(4096)];
            let text = String::from_utf8_lossy(truncated);
            return Err(FrameQaError::Upstream {
                provider: provider.to_string(),
                message: format!("{status}: {}", text.trim()),
                status: Some(status.as_u16()),
            });
        }

        if let Some(len) = response.content_length()
            && len as usize > MAX_RESPONSE_BYTES
        {
            return Err(FrameQaError::Upstream {
                provider: provider.to_string(),
                message: format!("response too large: {len} bytes (max {MAX_RESPONSE_BYTES})"),
                status: None,
            });
        }

        let bytes = response.bytes().await.map_err(|e| FrameQaError::Upstream {
            provider: provider.to_string(),
            message: format!("failed to read response body: {e}"),
            status: None,
        })?;

        if bytes.len() > MAX_RESPONSE_BYTES {
            return Err(FrameQaError::Upstream {
                provider: provider.to_string(),
                message: format!(
                    "response too large: {} bytes (max {})",
                    bytes.len(),
                    MAX_RESPONSE_BYTES
                ),
                status: None,
            });
        }

        parser.parse(&bytes)
    }
}
