//! Trust service client: policy and revocation endpoints.
//!
//! Public API: no status code knowledge. All HTTP/status mapping in http.rs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

use crate::auth::TokenProvider;
use crate::error::{GateError, GateResult};
use crate::revocation::RevocationOracle;
use crate::trust::PolicySource;
use crate::types::{PolicyDocument, RevocationRequest, RevocationVerdict, ServiceConfig};

mod helpers;
mod http;

use helpers::endpoint_url;
use http::HttpBackend;

/// User-Agent sent with every request.
pub const SAFELOAD_USER_AGENT: &str = concat!("safeload/", env!("CARGO_PKG_VERSION"));

/// Client for the trust service.
#[derive(Debug, Clone)]
pub struct TrustServiceClient {
    http: HttpBackend,
}

impl TrustServiceClient {
    pub fn new(config: ServiceConfig) -> GateResult<Self> {
        let token_provider = config
            .token
            .as_ref()
            .map(TokenProvider::static_token)
            .unwrap_or_else(TokenProvider::from_env);

        Self::with_token_provider(config, token_provider)
    }

    pub fn with_token_provider(
        config: ServiceConfig,
        token_provider: TokenProvider,
    ) -> GateResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(SAFELOAD_USER_AGENT));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| GateError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        let base_url = config.url.trim_end_matches('/').to_string();

        Ok(Self {
            http: HttpBackend {
                client,
                base_url,
                token_provider,
                config,
            },
        })
    }

    pub fn from_env() -> GateResult<Self> {
        Self::new(ServiceConfig::from_env())
    }

    /// `GET` the policy document, retrying transient failures.
    pub async fn fetch_policy(&self) -> GateResult<PolicyDocument> {
        let url = self.policy_url();
        debug!(url = %url, "fetching trust policy");

        let response = self.http.request(reqwest::Method::GET, &url, None).await?;
        parse_policy(response).await
    }

    /// `GET` the policy document once.
    ///
    /// Used by [`TrustConfigLoader`](crate::TrustConfigLoader), which owns the
    /// retry cadence.
    pub async fn fetch_policy_once(&self) -> GateResult<PolicyDocument> {
        let url = self.policy_url();
        debug!(url = %url, "fetching trust policy (single attempt)");

        let response = self
            .http
            .request_once(reqwest::Method::GET, &url, None)
            .await?;
        parse_policy(response).await
    }

    /// `POST` the signer certificate and return the authority's verdict.
    ///
    /// Anything short of a well-formed verdict is `RevocationUnavailable`,
    /// except an authentication failure, which stays `Unauthorized`.
    pub async fn check_certificate(&self, certificate_pem: &str) -> GateResult<RevocationVerdict> {
        let url = self.revocation_url();
        debug!(url = %url, "checking certificate revocation");

        let body = serde_json::to_value(RevocationRequest {
            certificate: certificate_pem.to_string(),
        })
        .map_err(|e| GateError::RevocationUnavailable {
            message: format!("failed to encode request: {}", e),
        })?;

        let response = self
            .http
            .request(reqwest::Method::POST, &url, Some(&body))
            .await
            .map_err(|e| match e {
                GateError::Unauthorized { .. } => e,
                other => GateError::RevocationUnavailable {
                    message: other.to_string(),
                },
            })?;

        let verdict: RevocationVerdict =
            response
                .json()
                .await
                .map_err(|e| GateError::RevocationUnavailable {
                    message: format!("malformed revocation response: {}", e),
                })?;

        debug!(valid = verdict.valid, reasons = ?verdict.reasons, "revocation verdict");
        Ok(verdict)
    }

    pub fn policy_url(&self) -> String {
        endpoint_url(&self.http.base_url, &self.http.config.policy_path)
    }

    pub fn revocation_url(&self) -> String {
        endpoint_url(&self.http.base_url, &self.http.config.revocation_path)
    }

    pub fn base_url(&self) -> &str {
        &self.http.base_url
    }

    pub fn is_authenticated(&self) -> bool {
        self.http.token_provider.is_authenticated()
    }
}

async fn parse_policy(response: reqwest::Response) -> GateResult<PolicyDocument> {
    response
        .json()
        .await
        .map_err(|e| GateError::InvalidResponse {
            message: format!("failed to parse policy document: {}", e),
        })
}

#[async_trait]
impl PolicySource for TrustServiceClient {
    async fn fetch_policy(&self) -> GateResult<PolicyDocument> {
        self.fetch_policy_once().await
    }
}

#[async_trait]
impl RevocationOracle for TrustServiceClient {
    async fn check_certificate(&self, certificate_pem: &str) -> GateResult<RevocationVerdict> {
        TrustServiceClient::check_certificate(self, certificate_pem).await
    }
}
