//! Trust policy: permitted domains, permitted formats and the CA root.
//!
//! Policy is fetched from the trust service by a [`TrustConfigLoader`] and
//! published once into a [`TrustContext`]. Until then every allow-list query
//! answers `false` and [`TrustContext::require_snapshot`] fails with
//! [`GateError::PolicyUnavailable`].

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::certificate::Certificate;
use crate::error::{GateError, GateResult};
use crate::types::PolicyDocument;

/// Immutable policy snapshot.
#[derive(Debug, Clone)]
pub struct TrustSnapshot {
    permitted_domains: HashSet<String>,
    permitted_formats: HashSet<String>,
    ca_root: Certificate,
}

impl TrustSnapshot {
    /// Build a snapshot from already-decoded parts.
    ///
    /// Formats are normalized to lower case with any leading dot removed.
    pub fn new<D, F>(domains: D, formats: F, ca_root: Certificate) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        F: IntoIterator,
        F::Item: AsRef<str>,
    {
        Self {
            permitted_domains: domains.into_iter().map(Into::into).collect(),
            permitted_formats: formats
                .into_iter()
                .map(|f| normalize_format(f.as_ref()))
                .filter(|f| !f.is_empty())
                .collect(),
            ca_root,
        }
    }

    /// Build a snapshot from the policy endpoint's response.
    ///
    /// Fails if the CA root does not decode.
    pub fn from_document(document: &PolicyDocument) -> GateResult<Self> {
        let ca_root = Certificate::from_pem(&document.ca_root_certificate).map_err(|e| {
            GateError::InvalidResponse {
                message: format!("policy CA root does not decode: {}", e),
            }
        })?;

        Ok(Self::new(
            document.permitted_domains.iter().cloned(),
            &document.permitted_formats,
            ca_root,
        ))
    }

    /// Exact hostname match for the URL's host.
    pub fn domain_permitted(&self, url: &str) -> bool {
        match host_of(url) {
            Some(host) => self.permitted_domains.contains(&host),
            None => false,
        }
    }

    /// Exact match against the lower-cased format set.
    pub fn format_permitted(&self, extension: &str) -> bool {
        self.permitted_formats.contains(extension)
    }

    pub fn ca_root(&self) -> &Certificate {
        &self.ca_root
    }

    pub fn permitted_domains(&self) -> &HashSet<String> {
        &self.permitted_domains
    }

    pub fn permitted_formats(&self) -> &HashSet<String> {
        &self.permitted_formats
    }
}

/// Readiness view of the policy.
#[derive(Debug, Clone)]
pub enum TrustConfig {
    NotReady,
    Ready(Arc<TrustSnapshot>),
}

impl TrustConfig {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn domain_permitted(&self, url: &str) -> bool {
        match self {
            Self::Ready(snapshot) => snapshot.domain_permitted(url),
            Self::NotReady => false,
        }
    }

    pub fn format_permitted(&self, extension: &str) -> bool {
        match self {
            Self::Ready(snapshot) => snapshot.format_permitted(extension),
            Self::NotReady => false,
        }
    }
}

/// Process-wide handle to the published policy. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct TrustContext {
    published: Arc<OnceLock<Arc<TrustSnapshot>>>,
}

impl TrustContext {
    /// A context with no policy yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that is ready from the start.
    pub fn ready(snapshot: TrustSnapshot) -> Self {
        let context = Self::new();
        let _ = context.published.set(Arc::new(snapshot));
        context
    }

    /// Publish the snapshot. Only the first publish takes effect.
    pub fn publish(&self, snapshot: TrustSnapshot) -> GateResult<Arc<TrustSnapshot>> {
        let snapshot = Arc::new(snapshot);
        self.published
            .set(Arc::clone(&snapshot))
            .map_err(|_| GateError::Config {
                message: "trust policy already published".to_string(),
            })?;
        Ok(snapshot)
    }

    pub fn config(&self) -> TrustConfig {
        match self.published.get() {
            Some(snapshot) => TrustConfig::Ready(Arc::clone(snapshot)),
            None => TrustConfig::NotReady,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.published.get().is_some()
    }

    pub fn domain_permitted(&self, url: &str) -> bool {
        self.config().domain_permitted(url)
    }

    pub fn format_permitted(&self, extension: &str) -> bool {
        self.config().format_permitted(extension)
    }

    /// The published snapshot, or `PolicyUnavailable`.
    pub fn require_snapshot(&self) -> GateResult<Arc<TrustSnapshot>> {
        self.published
            .get()
            .cloned()
            .ok_or_else(|| GateError::PolicyUnavailable {
                message: "trust policy has not been loaded".to_string(),
            })
    }
}

/// Where policy documents come from.
#[async_trait]
pub trait PolicySource: Send + Sync {
    async fn fetch_policy(&self) -> GateResult<PolicyDocument>;
}

/// Fetches policy until it succeeds, then publishes it.
pub struct TrustConfigLoader<S: PolicySource + ?Sized> {
    source: Arc<S>,
    context: TrustContext,
    retry_delay: Duration,
}

impl<S: PolicySource + ?Sized + 'static> TrustConfigLoader<S> {
    pub fn new(source: Arc<S>, context: TrustContext, retry_delay: Duration) -> Self {
        Self {
            source,
            context,
            retry_delay,
        }
    }

    /// One fetch-and-publish attempt.
    pub async fn load_once(&self) -> GateResult<Arc<TrustSnapshot>> {
        let document = self.source.fetch_policy().await?;
        let snapshot = TrustSnapshot::from_document(&document)?;
        self.context.publish(snapshot)
    }

    /// Retry with a fixed delay until a snapshot is published.
    pub async fn load(&self) -> Arc<TrustSnapshot> {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            if let Ok(existing) = self.context.require_snapshot() {
                return existing;
            }

            match self.load_once().await {
                Ok(snapshot) => {
                    info!(
                        attempt,
                        domains = snapshot.permitted_domains().len(),
                        formats = snapshot.permitted_formats().len(),
                        root = %snapshot.ca_root().subject(),
                        "trust policy loaded"
                    );
                    return snapshot;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        attempt,
                        retry_ms = self.retry_delay.as_millis() as u64,
                        "trust policy load failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    /// Run [`load`](Self::load) in the background.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let snapshot = self.load().await;
            debug!(root = %snapshot.ca_root().fingerprint(), "trust loader finished");
        })
    }
}

fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

fn normalize_format(format: &str) -> String {
    format.trim().trim_start_matches('.').to_ascii_lowercase()
}
