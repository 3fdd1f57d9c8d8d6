//! HTTP layer: status mapping and retry.
//!
//! This is the ONLY place for status code handling. client/mod.rs never
//! interprets status codes.

use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use tracing::warn;

use crate::auth::TokenProvider;
use crate::error::{GateError, GateResult};
use crate::types::ServiceConfig;

use super::helpers::{error_excerpt, parse_retry_after};

/// HTTP backend for making requests (holds reqwest client, auth, config).
#[derive(Debug, Clone)]
pub(crate) struct HttpBackend {
    pub(crate) client: reqwest::Client,
    pub(crate) base_url: String,
    pub(crate) token_provider: TokenProvider,
    pub(crate) config: ServiceConfig,
}

impl HttpBackend {
    /// Make a request, retrying transient failures with jittered backoff.
    pub(crate) async fn request(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> GateResult<reqwest::Response> {
        use rand::Rng;

        let mut retries = 0;
        let max_retries = self.config.max_retries;

        loop {
            let result = self.request_once(method.clone(), url, body).await;

            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && retries < max_retries => {
                    retries += 1;

                    let backoff = match &e {
                        GateError::RateLimited {
                            retry_after: Some(retry_after),
                        } => {
                            let capped = (*retry_after).min(Duration::from_secs(30));
                            let base_ms = capped.as_millis() as u64;
                            let jitter_factor: f64 =
                                rand::thread_rng().gen_range(0.9_f64..=1.1_f64);
                            let jittered_ms = ((base_ms as f64) * jitter_factor).round() as u64;
                            Duration::from_millis(jittered_ms.max(100))
                        }
                        _ => {
                            let base_backoff =
                                Duration::from_secs(1 << retries).min(Duration::from_secs(30));
                            let jittered_ms =
                                rand::thread_rng().gen_range(0..=base_backoff.as_millis() as u64);
                            Duration::from_millis(jittered_ms.max(10))
                        }
                    };

                    warn!(
                        error = %e,
                        url = %url,
                        retry = retries,
                        max_retries = max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "retrying request"
                    );

                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Single attempt, no retry.
    pub(crate) async fn request_once(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> GateResult<reqwest::Response> {
        let mut request = self.client.request(method, url);

        if let Some(token) = self.token_provider.token() {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        match status.as_u16() {
            200..=299 => Ok(response),

            401 | 403 => Err(GateError::Unauthorized {
                message: "invalid or expired token".to_string(),
            }),

            429 => Err(GateError::RateLimited {
                retry_after: parse_retry_after(response.headers()),
            }),

            500..=599 => {
                let body = response.text().await.unwrap_or_default();
                Err(GateError::Network {
                    message: format!(
                        "HTTP {}: {}",
                        status.as_u16(),
                        error_excerpt(&body, status.as_str())
                    ),
                })
            }

            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(GateError::InvalidResponse {
                    message: format!(
                        "HTTP {}: {}",
                        status.as_u16(),
                        error_excerpt(&body, status.as_str())
                    ),
                })
            }
        }
    }
}
