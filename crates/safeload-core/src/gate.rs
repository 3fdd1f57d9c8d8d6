//! Download gate: intercept, decide, and rewrite downloads.
//!
//! ```text
//! Evaluating -> [AwaitingPolicyReady] -> Passed    -> Resumed                (left as is)
//!                                     -> Held      -> Resumed -> Completed
//!                                                              -> Revalidating -> Replaced | Failed
//!                                     -> Cancelled
//! ```
//!
//! One event loop ([`DownloadGate::run`]) owns the tracked set. Each
//! intercepted download runs as its own task; results come back to the loop
//! through a `JoinSet` and are applied serially. An interruption reported
//! while a download is still being evaluated is remembered and wins over
//! whatever the evaluation decides.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::container::is_container_name;
use crate::error::GateError;
use crate::host::{DownloadEvent, DownloadHost, DownloadId, DownloadItem, DownloadState};
use crate::revocation::RevocationOracle;
use crate::trust::{TrustContext, TrustSnapshot};
use crate::types::{GateConfig, ReadinessFallback};
use crate::verify::verify_signed_download;

pub const REASON_DOMAIN: &str = "domain not permitted";
pub const REASON_FORMAT: &str = "format not permitted";
pub const REASON_POLICY_TIMEOUT: &str = "trust policy not ready before timeout";

/// Lifecycle of one download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Evaluating,
    AwaitingPolicyReady,
    Passed,
    Held,
    Resumed,
    Cancelled,
    Completed,
    Revalidating,
    Replaced,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A download the gate is working on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRecord {
    pub id: DownloadId,
    pub url: String,
    pub filename: String,
    pub phase: Phase,
}

impl DownloadRecord {
    fn new(item: &DownloadItem) -> Self {
        Self {
            id: item.id,
            url: item.url.clone(),
            filename: item.filename.clone(),
            phase: Phase::Evaluating,
        }
    }

    fn enter(&mut self, phase: Phase) {
        debug!(id = %self.id, from = %self.phase, to = %phase, "download phase");
        self.phase = phase;
    }

    fn effective_name(&self) -> String {
        effective_name(&self.url, &self.filename)
    }
}

/// Filename, or the last URL path segment when the host has none yet.
pub fn effective_name(url: &str, filename: &str) -> String {
    if !filename.is_empty() {
        return filename.to_string();
    }
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .unwrap_or_default()
}

/// Terminal report for one download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateOutcome {
    pub id: DownloadId,
    pub url: String,
    pub filename: String,
    pub phase: Phase,
    pub reasons: Vec<String>,
    /// Name of the emitted clean file, for `Replaced`.
    pub artifact: Option<String>,
}

impl GateOutcome {
    fn from_record(record: &DownloadRecord, reasons: Vec<String>) -> Self {
        Self {
            id: record.id,
            url: record.url.clone(),
            filename: record.filename.clone(),
            phase: record.phase,
            reasons,
            artifact: None,
        }
    }
}

/// Interception decision once policy is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Signed container: let it finish, verify on completion.
    Defer,
    /// Permitted domain or format: let it through untouched.
    Allow,
    /// Neither permitted nor signed.
    Deny(Vec<String>),
}

/// Decide what to do with a download under `snapshot`.
pub fn decide(snapshot: &TrustSnapshot, url: &str, filename: &str) -> Decision {
    if is_container_name(filename) {
        return Decision::Defer;
    }

    let extension = extension_of(url, filename);
    if snapshot.domain_permitted(url) || snapshot.format_permitted(&extension) {
        Decision::Allow
    } else {
        Decision::Deny(vec![REASON_DOMAIN.to_string(), REASON_FORMAT.to_string()])
    }
}

/// Lower-cased text after the last dot of the file name (or the URL path
/// when there is no file name); empty without a dot.
pub fn extension_of(url: &str, filename: &str) -> String {
    let source = if filename.is_empty() {
        url::Url::parse(url)
            .map(|u| u.path().to_string())
            .unwrap_or_default()
    } else {
        filename.to_string()
    };

    let name = source.rsplit(['/', '\\']).next().unwrap_or_default();
    match name.rsplit_once('.') {
        Some((_, extension)) => extension.to_ascii_lowercase(),
        None => String::new(),
    }
}

/// What an interception task hands back to the loop.
#[derive(Debug)]
enum Verdict {
    Decided(Decision),
    PolicyTimeout,
    /// The evaluation died without a decision.
    Unresolved(String),
    HostFailed(String),
}

#[derive(Debug)]
enum FlowResult {
    Intercepted {
        record: DownloadRecord,
        verdict: Verdict,
    },
    Revalidated(GateOutcome),
}

/// The gate.
pub struct DownloadGate<H: ?Sized, O: ?Sized> {
    host: Arc<H>,
    trust: TrustContext,
    oracle: Arc<O>,
    config: GateConfig,
    tracked: HashMap<DownloadId, DownloadRecord>,
    intercepting: HashSet<DownloadId>,
    interrupted: HashSet<DownloadId>,
    /// The record each running task started from, for when the task dies.
    in_flight: HashMap<task::Id, DownloadRecord>,
    outcomes: Option<mpsc::UnboundedSender<GateOutcome>>,
}

impl<H, O> DownloadGate<H, O>
where
    H: DownloadHost + ?Sized + 'static,
    O: RevocationOracle + ?Sized + 'static,
{
    pub fn new(host: Arc<H>, trust: TrustContext, oracle: Arc<O>, config: GateConfig) -> Self {
        Self {
            host,
            trust,
            oracle,
            config,
            tracked: HashMap::new(),
            intercepting: HashSet::new(),
            interrupted: HashSet::new(),
            in_flight: HashMap::new(),
            outcomes: None,
        }
    }

    /// Report every terminal outcome to `sink`.
    pub fn with_outcomes(mut self, sink: mpsc::UnboundedSender<GateOutcome>) -> Self {
        self.outcomes = Some(sink);
        self
    }

    /// Downloads held for verification on completion.
    pub fn tracked(&self) -> impl Iterator<Item = &DownloadRecord> {
        self.tracked.values()
    }

    /// Drive the gate until the event stream closes and every task settles.
    pub async fn run(mut self, mut events: mpsc::Receiver<DownloadEvent>) {
        let mut flows: JoinSet<FlowResult> = JoinSet::new();

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event, &mut flows),
                    None => break,
                },
                Some(joined) = flows.join_next_with_id(), if !flows.is_empty() => {
                    self.handle_flow(joined).await;
                }
            }
        }

        while let Some(joined) = flows.join_next_with_id().await {
            self.handle_flow(joined).await;
        }
        debug!(tracked = self.tracked.len(), "download gate stopped");
    }

    fn handle_event(&mut self, event: DownloadEvent, flows: &mut JoinSet<FlowResult>) {
        match event {
            DownloadEvent::Created(item) => self.intercept(item, flows),
            DownloadEvent::Changed { id, state } => match state {
                DownloadState::Complete => self.complete(id, flows),
                DownloadState::Interrupted => {
                    if let Some(record) = self.tracked.remove(&id) {
                        info!(id = %id, url = %record.url, "tracked download interrupted");
                    } else if self.intercepting.contains(&id) {
                        debug!(id = %id, "download interrupted during evaluation");
                        self.interrupted.insert(id);
                    }
                }
                DownloadState::InProgress => {}
            },
        }
    }

    fn intercept(&mut self, item: DownloadItem, flows: &mut JoinSet<FlowResult>) {
        if item.state != DownloadState::InProgress || item.url.starts_with("blob:") {
            debug!(id = %item.id, url = %item.url, "ignoring download");
            return;
        }
        if self.tracked.contains_key(&item.id) || !self.intercepting.insert(item.id) {
            return;
        }

        let record = DownloadRecord::new(&item);
        debug!(id = %record.id, url = %record.url, filename = %record.filename, "intercepted download");

        let host = Arc::clone(&self.host);
        let trust = self.trust.clone();
        let poll = self.config.ready_poll_interval;
        let timeout = self.config.ready_timeout;
        let handle = flows.spawn(evaluate(host, trust, record.clone(), poll, timeout));
        self.in_flight.insert(handle.id(), record);
    }

    fn complete(&mut self, id: DownloadId, flows: &mut JoinSet<FlowResult>) {
        let Some(mut record) = self.tracked.remove(&id) else {
            return;
        };
        record.enter(Phase::Completed);
        record.enter(Phase::Revalidating);

        let host = Arc::clone(&self.host);
        let oracle = Arc::clone(&self.oracle);
        let trust = self.trust.clone();
        let fallback = self.config.revocation_fallback;
        let started = record.clone();
        let handle = flows.spawn(async move {
            FlowResult::Revalidated(revalidate(host, oracle, trust, record, fallback).await)
        });
        self.in_flight.insert(handle.id(), started);
    }

    async fn handle_flow(&mut self, joined: Result<(task::Id, FlowResult), JoinError>) {
        match joined {
            Ok((task_id, result)) => {
                self.in_flight.remove(&task_id);
                match result {
                    FlowResult::Intercepted { record, verdict } => {
                        self.intercepting.remove(&record.id);
                        if self.interrupted.remove(&record.id) {
                            info!(id = %record.id, url = %record.url, "interrupted download dropped");
                            return;
                        }
                        self.apply(record, verdict).await;
                    }
                    FlowResult::Revalidated(outcome) => self.report(outcome),
                }
            }
            Err(e) => {
                error!(error = %e, "download task failed");
                let Some(record) = self.in_flight.remove(&e.id()) else {
                    return;
                };
                self.recover(record, e).await;
            }
        }
    }

    /// A task died before reporting; settle its download anyway.
    async fn recover(&mut self, mut record: DownloadRecord, error: JoinError) {
        let reason = format!("download task failed: {}", error);

        if record.phase == Phase::Revalidating {
            // The original goes in every case.
            let mut reasons = vec![reason];
            for result in [
                self.host.remove_file(record.id).await,
                self.host.erase(record.id).await,
            ] {
                if let Err(e) = result {
                    reasons.push(e.to_string());
                }
            }
            record.enter(Phase::Failed);
            self.report(GateOutcome::from_record(&record, reasons));
            return;
        }

        self.intercepting.remove(&record.id);
        if self.interrupted.remove(&record.id) {
            return;
        }
        self.apply(record, Verdict::Unresolved(reason)).await;
    }

    async fn apply(&mut self, mut record: DownloadRecord, verdict: Verdict) {
        match verdict {
            Verdict::Decided(Decision::Defer) => {
                record.enter(Phase::Held);
                record.enter(Phase::Resumed);
                let id = record.id;
                // Track before resuming so the completion event finds the record.
                self.tracked.insert(id, record);
                if let Err(e) = self.host.resume(id).await {
                    if let Some(mut record) = self.tracked.remove(&id) {
                        record.enter(Phase::Failed);
                        self.report_host_failure(&record, e);
                    }
                }
            }
            Verdict::Decided(Decision::Allow) => {
                record.enter(Phase::Passed);
                self.resume(record, Vec::new()).await;
            }
            Verdict::Decided(Decision::Deny(reasons)) => self.cancel(record, reasons).await,
            Verdict::PolicyTimeout => {
                self.fall_back(record, REASON_POLICY_TIMEOUT.to_string())
                    .await;
            }
            Verdict::Unresolved(reason) => self.fall_back(record, reason).await,
            Verdict::HostFailed(message) => {
                record.enter(Phase::Failed);
                self.report(GateOutcome::from_record(&record, vec![message]));
            }
        }
    }

    /// No decision could be made: apply the readiness fallback.
    async fn fall_back(&mut self, record: DownloadRecord, reason: String) {
        match self.config.readiness_fallback {
            ReadinessFallback::Cancel => {
                warn!(id = %record.id, url = %record.url, reason = %reason, "no decision, cancelling download");
                self.cancel(record, vec![reason]).await;
            }
            ReadinessFallback::Resume => {
                warn!(id = %record.id, url = %record.url, reason = %reason, "no decision, resuming download unverified");
                self.resume(record, vec![reason]).await;
            }
        }
    }

    async fn resume(&mut self, mut record: DownloadRecord, reasons: Vec<String>) {
        match self.host.resume(record.id).await {
            Ok(()) => {
                record.enter(Phase::Resumed);
                info!(id = %record.id, url = %record.url, "download allowed");
                self.report(GateOutcome::from_record(&record, reasons));
            }
            Err(e) => {
                record.enter(Phase::Failed);
                self.report_host_failure(&record, e);
            }
        }
    }

    async fn cancel(&mut self, mut record: DownloadRecord, reasons: Vec<String>) {
        if let Err(e) = self.host.cancel(record.id).await {
            record.enter(Phase::Failed);
            self.report_host_failure(&record, e);
            return;
        }
        record.enter(Phase::Cancelled);
        warn!(id = %record.id, url = %record.url, reasons = ?reasons, "download cancelled");
        self.report(GateOutcome::from_record(&record, reasons));
    }

    fn report_host_failure(&self, record: &DownloadRecord, error: GateError) {
        error!(id = %record.id, error = %error, "host call failed");
        self.report(GateOutcome::from_record(record, vec![error.to_string()]));
    }

    fn report(&self, outcome: GateOutcome) {
        if let Some(sink) = &self.outcomes {
            let _ = sink.send(outcome);
        }
    }
}

/// Pause, wait for policy, decide.
async fn evaluate<H: DownloadHost + ?Sized>(
    host: Arc<H>,
    trust: TrustContext,
    mut record: DownloadRecord,
    poll: Duration,
    timeout: Duration,
) -> FlowResult {
    if let Err(e) = host.pause(record.id).await {
        return FlowResult::Intercepted {
            record,
            verdict: Verdict::HostFailed(e.to_string()),
        };
    }

    if !trust.is_ready() {
        record.enter(Phase::AwaitingPolicyReady);
        if !wait_for_policy(&trust, poll, timeout).await {
            return FlowResult::Intercepted {
                record,
                verdict: Verdict::PolicyTimeout,
            };
        }
    }

    let verdict = match trust.require_snapshot() {
        Ok(snapshot) => {
            Verdict::Decided(decide(&snapshot, &record.url, &record.effective_name()))
        }
        Err(_) => Verdict::PolicyTimeout,
    };
    FlowResult::Intercepted { record, verdict }
}

async fn wait_for_policy(trust: &TrustContext, poll: Duration, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if trust.is_ready() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        tokio::time::sleep(poll.min(deadline - now)).await;
    }
}

/// Re-read a completed container and replace it with its verified payload.
async fn revalidate<H, O>(
    host: Arc<H>,
    oracle: Arc<O>,
    trust: TrustContext,
    mut record: DownloadRecord,
    fallback: crate::types::RevocationFallback,
) -> GateOutcome
where
    H: DownloadHost + ?Sized,
    O: RevocationOracle + ?Sized,
{
    let verified = match host.read_file(record.id).await {
        Ok(bytes) => match trust.require_snapshot() {
            Ok(snapshot) => verify_signed_download(
                &bytes,
                &record.effective_name(),
                snapshot.ca_root(),
                &*oracle,
                fallback,
            )
            .await
            .map_err(|rejection| rejection.reasons),
            Err(e) => Err(vec![e.to_string()]),
        },
        Err(e) => Err(vec![e.to_string()]),
    };

    // The original goes in every case.
    let mut reasons = Vec::new();
    for result in [host.remove_file(record.id).await, host.erase(record.id).await] {
        if let Err(e) = result {
            warn!(id = %record.id, error = %e, "cleanup of original download failed");
            reasons.push(e.to_string());
        }
    }

    match verified {
        Ok(verified) => {
            let file_name = verified.file_name.clone();
            match host.emit_artifact(&file_name, verified.payload).await {
                Ok(()) => {
                    record.enter(Phase::Replaced);
                    info!(id = %record.id, artifact = %file_name, subject = %verified.subject, "signed download replaced");
                    GateOutcome {
                        artifact: Some(file_name),
                        ..GateOutcome::from_record(&record, reasons)
                    }
                }
                Err(e) => {
                    record.enter(Phase::Failed);
                    reasons.push(e.to_string());
                    error!(id = %record.id, error = %e, "emitting verified payload failed");
                    GateOutcome::from_record(&record, reasons)
                }
            }
        }
        Err(mut failures) => {
            record.enter(Phase::Failed);
            warn!(id = %record.id, url = %record.url, reasons = ?failures, "signed download rejected");
            failures.append(&mut reasons);
            GateOutcome::from_record(&record, failures)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::root_certificate;

    fn snapshot() -> TrustSnapshot {
        TrustSnapshot::new(["files.example.com"], ["pdf", "txt"], root_certificate())
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("https://x/y", "report.PDF"), "pdf");
        assert_eq!(extension_of("https://x/y", "archive.tar.gz"), "gz");
        assert_eq!(extension_of("https://x/y", "README"), "");
        assert_eq!(extension_of("https://x/y", "/home/u/dl.d/README"), "");
        assert_eq!(extension_of("https://x/a/setup.EXE?v=2", ""), "exe");
        assert_eq!(extension_of("https://x/", ""), "");
        assert_eq!(extension_of("not a url", ""), "");
    }

    #[test]
    fn test_decide_allow_by_domain() {
        assert_eq!(
            decide(&snapshot(), "https://files.example.com/setup.exe", "setup.exe"),
            Decision::Allow
        );
    }

    #[test]
    fn test_decide_allow_by_format() {
        assert_eq!(
            decide(&snapshot(), "https://elsewhere.test/a.pdf", "a.PDF"),
            Decision::Allow
        );
    }

    #[test]
    fn test_decide_deny() {
        assert_eq!(
            decide(&snapshot(), "https://elsewhere.test/setup.exe", "setup.exe"),
            Decision::Deny(vec![REASON_DOMAIN.to_string(), REASON_FORMAT.to_string()])
        );
    }

    #[test]
    fn test_decide_defers_containers_even_on_permitted_domain() {
        assert_eq!(
            decide(&snapshot(), "https://files.example.com/a.pdf.safe", "a.pdf.safe"),
            Decision::Defer
        );
    }

    #[test]
    fn test_effective_name_falls_back_to_url() {
        let record = DownloadRecord::new(&DownloadItem::new(1, "https://x.test/d/a.pdf.safe", ""));
        assert_eq!(record.effective_name(), "a.pdf.safe");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_policy_times_out() {
        let start = Instant::now();
        let ready = wait_for_policy(
            &TrustContext::new(),
            Duration::from_millis(500),
            Duration::from_secs(10),
        )
        .await;
        assert!(!ready);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_policy_sees_late_publish() {
        let trust = TrustContext::new();
        let publisher = trust.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1200)).await;
            publisher.publish(snapshot()).unwrap();
        });

        let start = Instant::now();
        let ready = wait_for_policy(&trust, Duration::from_millis(500), Duration::from_secs(10)).await;
        assert!(ready);
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }
}
