//! Shared helpers for integration tests: fixtures, a signer and an in-memory host.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::sha2::Sha256;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use safeload_core::{
    container, Certificate, DownloadEvent, DownloadGate, DownloadHost, DownloadId, DownloadState,
    GateConfig, GateError, GateOutcome, GateResult, RevocationOracle, RevocationVerdict,
    TrustContext, TrustSnapshot, SIGNATURE_SIZE,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const ROOT_PEM: &str = include_str!("../fixtures/root_ca.pem");
pub const LEAF_PEM: &str = include_str!("../fixtures/leaf_cert.pem");
pub const LEAF_KEY_PEM: &str = include_str!("../fixtures/leaf_key.pem");
pub const FOREIGN_LEAF_PEM: &str = include_str!("../fixtures/foreign_leaf_cert.pem");

pub const TRUSTED_DOMAIN: &str = "trusted.example.com";

pub fn sign(payload: &[u8]) -> [u8; SIGNATURE_SIZE] {
    let key = RsaPrivateKey::from_pkcs8_pem(LEAF_KEY_PEM).expect("fixture key parses");
    let signature = SigningKey::<Sha256>::new(key).sign(payload).to_vec();
    signature.try_into().expect("RSA-2048 signature")
}

/// A container signed by the fixture leaf.
pub fn signed_container(payload: &[u8]) -> Vec<u8> {
    container::build(LEAF_PEM, &sign(payload), payload)
}

pub fn root() -> Certificate {
    Certificate::from_pem(ROOT_PEM).expect("fixture root parses")
}

/// Policy permitting `trusted.example.com` and `.txt` files.
pub fn snapshot() -> TrustSnapshot {
    TrustSnapshot::new([TRUSTED_DOMAIN], ["txt"], root())
}

pub fn policy_json() -> serde_json::Value {
    serde_json::json!({
        "permittedDomains": [TRUSTED_DOMAIN],
        "permittedFormats": ["txt"],
        "caRootCertificate": ROOT_PEM,
    })
}

/// Host primitive as recorded by [`MemoryHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Pause(u64),
    Resume(u64),
    Cancel(u64),
    RemoveFile(u64),
    Erase(u64),
    ReadFile(u64),
    Emit(String),
}

/// In-memory download manager.
///
/// Resuming a download whose bytes are registered completes it, the way a
/// real host reports completion some time after resume.
pub struct MemoryHost {
    calls: Mutex<Vec<HostCall>>,
    files: Mutex<HashMap<DownloadId, Vec<u8>>>,
    artifacts: Mutex<Vec<(String, Vec<u8>)>>,
    events: mpsc::Sender<DownloadEvent>,
    complete_on_resume: bool,
    crash_on: Mutex<Vec<HostCall>>,
}

impl MemoryHost {
    pub fn new(events: mpsc::Sender<DownloadEvent>, complete_on_resume: bool) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            files: Mutex::new(HashMap::new()),
            artifacts: Mutex::new(Vec::new()),
            events,
            complete_on_resume,
            crash_on: Mutex::new(Vec::new()),
        }
    }

    pub fn add_file(&self, id: u64, bytes: Vec<u8>) {
        self.files.lock().unwrap().insert(DownloadId(id), bytes);
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, id: u64) -> Vec<HostCall> {
        self.calls()
            .into_iter()
            .filter(|call| match call {
                HostCall::Pause(i)
                | HostCall::Resume(i)
                | HostCall::Cancel(i)
                | HostCall::RemoveFile(i)
                | HostCall::Erase(i)
                | HostCall::ReadFile(i) => *i == id,
                HostCall::Emit(_) => false,
            })
            .collect()
    }

    pub fn artifacts(&self) -> Vec<(String, Vec<u8>)> {
        self.artifacts.lock().unwrap().clone()
    }

    /// Panic the calling task when `call` is made.
    pub fn crash_on(&self, call: HostCall) {
        self.crash_on.lock().unwrap().push(call);
    }

    fn record(&self, call: HostCall) {
        let crash = self.crash_on.lock().unwrap().contains(&call);
        self.calls.lock().unwrap().push(call.clone());
        if crash {
            panic!("host crashed on {:?}", call);
        }
    }
}

#[async_trait]
impl DownloadHost for MemoryHost {
    async fn pause(&self, id: DownloadId) -> GateResult<()> {
        self.record(HostCall::Pause(id.0));
        Ok(())
    }

    async fn resume(&self, id: DownloadId) -> GateResult<()> {
        self.record(HostCall::Resume(id.0));
        let has_file = self.files.lock().unwrap().contains_key(&id);
        if self.complete_on_resume && has_file {
            let _ = self
                .events
                .send(DownloadEvent::Changed {
                    id,
                    state: DownloadState::Complete,
                })
                .await;
        }
        Ok(())
    }

    async fn cancel(&self, id: DownloadId) -> GateResult<()> {
        self.record(HostCall::Cancel(id.0));
        Ok(())
    }

    async fn remove_file(&self, id: DownloadId) -> GateResult<()> {
        self.record(HostCall::RemoveFile(id.0));
        self.files.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn erase(&self, id: DownloadId) -> GateResult<()> {
        self.record(HostCall::Erase(id.0));
        Ok(())
    }

    async fn read_file(&self, id: DownloadId) -> GateResult<Vec<u8>> {
        self.record(HostCall::ReadFile(id.0));
        self.files
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| GateError::Host {
                message: format!("no file for download {}", id),
            })
    }

    async fn emit_artifact(&self, file_name: &str, bytes: Vec<u8>) -> GateResult<()> {
        self.record(HostCall::Emit(file_name.to_string()));
        self.artifacts
            .lock()
            .unwrap()
            .push((file_name.to_string(), bytes));
        Ok(())
    }
}

/// Oracle with a fixed answer that counts its calls.
pub struct ScriptedOracle {
    answer: Option<RevocationVerdict>,
    calls: Mutex<usize>,
}

impl ScriptedOracle {
    pub fn valid() -> Self {
        Self::answering(Some(RevocationVerdict {
            valid: true,
            reasons: vec![],
        }))
    }

    pub fn revoked(reason: &str) -> Self {
        Self::answering(Some(RevocationVerdict {
            valid: false,
            reasons: vec![reason.to_string()],
        }))
    }

    pub fn down() -> Self {
        Self::answering(None)
    }

    fn answering(answer: Option<RevocationVerdict>) -> Self {
        Self {
            answer,
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl RevocationOracle for ScriptedOracle {
    async fn check_certificate(&self, _certificate_pem: &str) -> GateResult<RevocationVerdict> {
        *self.calls.lock().unwrap() += 1;
        self.answer.clone().ok_or_else(|| GateError::Network {
            message: "connection refused".to_string(),
        })
    }
}

/// A running gate wired to a [`MemoryHost`].
pub struct Harness {
    pub host: Arc<MemoryHost>,
    pub oracle: Arc<ScriptedOracle>,
    pub events: mpsc::Sender<DownloadEvent>,
    pub outcomes: mpsc::UnboundedReceiver<GateOutcome>,
    pub gate: JoinHandle<()>,
}

impl Harness {
    pub fn start(trust: TrustContext, oracle: ScriptedOracle, config: GateConfig) -> Self {
        let (events, events_rx) = mpsc::channel(64);
        let (outcomes_tx, outcomes) = mpsc::unbounded_channel();
        let host = Arc::new(MemoryHost::new(events.clone(), true));
        let oracle = Arc::new(oracle);

        let gate = DownloadGate::new(Arc::clone(&host), trust, Arc::clone(&oracle), config)
            .with_outcomes(outcomes_tx);
        let gate = tokio::spawn(gate.run(events_rx));

        Self {
            host,
            oracle,
            events,
            outcomes,
            gate,
        }
    }

    pub async fn send(&self, event: DownloadEvent) {
        self.events.send(event).await.expect("gate is running");
    }

    pub async fn next_outcome(&mut self) -> GateOutcome {
        self.outcomes.recv().await.expect("gate reports an outcome")
    }

    /// Let every pending task run to quiescence.
    pub async fn settle(&self) {
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
    }
}
