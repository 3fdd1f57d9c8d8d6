//! The host download manager, as seen by the gate.
//!
//! The host owns the downloads: it fetches bytes, writes them to disk and
//! keeps the history list. The gate only steers it through [`DownloadHost`]
//! and listens to its [`DownloadEvent`] stream.

use std::fmt;

use async_trait::async_trait;

use crate::error::GateResult;

/// Host-assigned download identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DownloadId(pub u64);

impl fmt::Display for DownloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Host-side download state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    InProgress,
    Interrupted,
    Complete,
}

/// A download as reported at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadItem {
    pub id: DownloadId,
    pub url: String,
    /// Target filename; may be empty when the host has not chosen one yet.
    pub filename: String,
    pub state: DownloadState,
}

impl DownloadItem {
    pub fn new(id: u64, url: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            id: DownloadId(id),
            url: url.into(),
            filename: filename.into(),
            state: DownloadState::InProgress,
        }
    }
}

/// Events from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    Created(DownloadItem),
    Changed { id: DownloadId, state: DownloadState },
}

/// Primitives the host offers the gate.
#[async_trait]
pub trait DownloadHost: Send + Sync {
    async fn pause(&self, id: DownloadId) -> GateResult<()>;

    async fn resume(&self, id: DownloadId) -> GateResult<()>;

    async fn cancel(&self, id: DownloadId) -> GateResult<()>;

    /// Delete the downloaded file from disk.
    async fn remove_file(&self, id: DownloadId) -> GateResult<()>;

    /// Drop the download from the host's history.
    async fn erase(&self, id: DownloadId) -> GateResult<()>;

    /// Bytes of a completed download.
    async fn read_file(&self, id: DownloadId) -> GateResult<Vec<u8>>;

    /// Save `bytes` as a new download named `file_name`.
    async fn emit_artifact(&self, file_name: &str, bytes: Vec<u8>) -> GateResult<()>;
}
