//! Target abstraction: a uniform dispatch/collect contract over a local
//! in-process sandbox and an external runner fleet.

pub mod external;
pub mod local;
pub mod process;
pub mod runner;

pub use runner::{Emit, Runner};

use crate::error::XjetError;
use crate::packet::{self, Packet};
use crate::queue::Queue;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, oneshot};

/// One routed packet, paired with the suite path it belongs to, handed
/// to the message router.
#[derive(Debug, Clone)]
pub struct TargetEvent {
    pub packet: Packet,
    pub path: PathBuf,
}

/// Public facts about a configured runner, independent of its live
/// connection state.
#[derive(Debug, Clone)]
pub struct RunnerInfo {
    pub id: String,
    pub name: String,
}

/// A suite's lifecycle state on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteState {
    Queued,
    Running,
    Completed,
    Failed,
}

pub(crate) fn running_key(runner_id: &str, suite_id: &str) -> String {
    format!("{runner_id}{suite_id}")
}

/// State shared by every `Target` implementation: suite indices, the
/// `RunningSuite` table, the dispatch queue, and the event channel to
/// the message router.
pub struct TargetShared {
    suite_paths: RwLock<HashMap<String, PathBuf>>,
    logical_to_suite: RwLock<HashMap<String, String>>,
    running: RwLock<HashMap<String, oneshot::Sender<Result<(), XjetError>>>>,
    pub queue: Queue,
    events: mpsc::UnboundedSender<TargetEvent>,
    bail: bool,
}

impl TargetShared {
    pub fn new(parallel: usize, bail: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<TargetEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Self {
            suite_paths: RwLock::new(HashMap::new()),
            logical_to_suite: RwLock::new(HashMap::new()),
            running: RwLock::new(HashMap::new()),
            queue: Queue::new(parallel),
            events: tx,
            bail,
        });
        (shared, rx)
    }

    /// Replace the suite indices wholesale. Rejects an empty map.
    pub fn set_suites(&self, files: &std::collections::BTreeMap<String, PathBuf>) -> Result<(), XjetError> {
        if files.is_empty() {
            return Err(XjetError::NoTestFiles { what: "files" });
        }
        let mut paths = self.suite_paths.write().unwrap();
        let mut logical = self.logical_to_suite.write().unwrap();
        paths.clear();
        logical.clear();
        for (key, path) in files {
            let suite_id = crate::id::generate_id();
            paths.insert(suite_id.clone(), path.clone());
            logical.insert(key.clone(), suite_id);
        }
        Ok(())
    }

    pub fn suite_id_for(&self, logical_key: &str) -> Option<String> {
        self.logical_to_suite.read().unwrap().get(logical_key).cloned()
    }

    fn path_for(&self, suite_id: &str) -> Result<PathBuf, XjetError> {
        self.suite_paths
            .read()
            .unwrap()
            .get(suite_id)
            .cloned()
            .ok_or_else(|| XjetError::MissingSuite(suite_id.to_string()))
    }

    /// Register a fresh `RunningSuite` handle for `runner_id`/`suite_id`,
    /// returning the receiver side for callers awaiting completion.
    pub fn register_running(&self, runner_id: &str, suite_id: &str) -> oneshot::Receiver<Result<(), XjetError>> {
        let (tx, rx) = oneshot::channel();
        self.running.write().unwrap().insert(running_key(runner_id, suite_id), tx);
        rx
    }

    /// Completes the suite handle. The bail path `.await`s the queue's
    /// `stop`/`clear` inline, *before* signaling the oneshot: per
    /// spec.md's invariant that no further task is dequeued once a bail
    /// event begins execution, the queue must already be stopped and
    /// drained by the time any other caller (including the
    /// suite-completion waiter) could observe this suite as finished and
    /// react to it.
    async fn complete_suite_key(&self, key: &str, suite_id: &str, had_error: bool) {
        let handle = self.running.write().unwrap().remove(key);
        let Some(handle) = handle else { return };

        if had_error && self.bail {
            self.queue.stop().await;
            self.queue.clear().await;
            let _ = handle.send(Err(XjetError::SuiteFatal { suite_id: suite_id.to_string(), message: "bailed".into() }));
        } else if had_error {
            let _ = handle.send(Err(XjetError::SuiteFatal { suite_id: suite_id.to_string(), message: "suite failed".into() }));
        } else {
            let _ = handle.send(Ok(()));
        }
    }

    /// Complete by the already-concatenated `runner_id ⧺ suite_id` key,
    /// as exposed on the `Target` trait (spec.md §4.4 `complete_suite`).
    pub async fn complete_suite_by_key(&self, key: &str, had_error: bool) {
        // The suite id is whatever trails after the 14-char runner id.
        let suite_id = if key.len() > packet::ID_FIELD_LEN { &key[packet::ID_FIELD_LEN..] } else { key };
        self.complete_suite_key(key, suite_id, had_error).await;
    }

    /// Decode `bytes`, resolve the suite path, and emit the routed
    /// event. Suite completion is *not* triggered here: per §5's
    /// ordering guarantee ("the router's handling of `EndSuite`...
    /// completes the suite handle last"), the message router calls
    /// back into [`Target::complete_suite`] only after it has finished
    /// reporting the terminal event, so a suite's handle never
    /// resolves before its `suite_end` hook has run.
    pub fn route_incoming(&self, bytes: &[u8]) -> Result<(), XjetError> {
        let packet = packet::decode(bytes)?;
        let path = self.path_for(&packet.suite_id)?;
        let _ = self.events.send(TargetEvent { packet, path });
        Ok(())
    }

    pub fn emit_synthetic_error(&self, suite_id: &str, runner_id: &str, message: &str) {
        let error = serde_json::json!({ "name": "Error", "message": message }).to_string();
        let payload = crate::packet::Payload::Error(crate::packet::ErrorPayload { error });
        if let Ok(bytes) = packet::encode(packet::Kind::Error, suite_id, runner_id, &now_iso8601(), &payload) {
            let _ = self.route_incoming(&bytes);
        }
    }
}

pub fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Polymorphic over `{Local, External}`. See §4.4 for the full contract.
#[async_trait]
pub trait Target: Send + Sync {
    async fn init(&self) -> Result<(), XjetError>;
    async fn free(&self) -> Result<(), XjetError>;
    fn get_runners(&self) -> Vec<RunnerInfo>;
    fn get_runner_name(&self, runner_id: &str) -> Result<String, XjetError> {
        self.get_runners()
            .into_iter()
            .find(|r| r.id == runner_id)
            .map(|r| r.name)
            .ok_or_else(|| XjetError::UnknownRunner(runner_id.to_string()))
    }
    async fn execute_suites(
        &self,
        bundles: Vec<crate::bundle::Bundle>,
        files: std::collections::BTreeMap<String, PathBuf>,
    ) -> Result<(), XjetError>;
    async fn complete_suite(&self, key: &str, had_error: bool);
    fn generate_id(&self) -> String {
        crate::id::generate_id()
    }
}
