//! Connects to configured runners, dispatches bundled suites with a
//! prepended runtime context, and enforces connect/dispatch timeouts.

use super::{now_iso8601, RunnerInfo, Runner, Target, TargetShared};
use crate::bundle::Bundle;
use crate::config::Configuration;
use crate::error::XjetError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

struct Connected {
    id: String,
    name: String,
    runner: Arc<dyn Runner>,
}

pub struct ExternalTarget {
    shared: Arc<TargetShared>,
    configured: Vec<Arc<dyn Runner>>,
    connected: tokio::sync::RwLock<Vec<Connected>>,
    config: Configuration,
}

impl ExternalTarget {
    pub fn new(config: Configuration, runners: Vec<Arc<dyn Runner>>) -> (Self, mpsc::UnboundedReceiver<super::TargetEvent>) {
        let (shared, rx) = TargetShared::new(config.parallel, config.bail);
        (Self { shared, configured: runners, connected: tokio::sync::RwLock::new(Vec::new()), config }, rx)
    }

    pub fn shared(&self) -> &Arc<TargetShared> {
        &self.shared
    }
}

#[async_trait]
impl Target for ExternalTarget {
    async fn init(&self) -> Result<(), XjetError> {
        if self.configured.is_empty() {
            return Err(XjetError::NoRunnersConfigured);
        }

        let mut connected = Vec::new();
        for runner in &self.configured {
            let id = runner.configured_id().map(str::to_string).unwrap_or_else(crate::id::generate_id);
            let (emit_tx, mut emit_rx) = mpsc::unbounded_channel::<Vec<u8>>();

            let shared = self.shared.clone();
            tokio::spawn(async move {
                while let Some(bytes) = emit_rx.recv().await {
                    if let Err(err) = shared.route_incoming(&bytes) {
                        tracing::warn!(%err, "failed to route externally-emitted packet");
                    }
                }
            });

            let argv: HashMap<String, String> = self.config.user_argv.clone();
            let connect = runner.connect(emit_tx, &id, &argv);
            match tokio::time::timeout(runner.connection_timeout(), connect).await {
                Ok(Ok(())) => {
                    connected.push(Connected { id, name: runner.name().to_string(), runner: runner.clone() });
                }
                Ok(Err(err)) => tracing::warn!(runner = %runner.name(), %err, "runner connect failed"),
                Err(_) => tracing::warn!(runner = %runner.name(), "runner connect timed out"),
            }
        }

        *self.connected.write().await = connected;
        Ok(())
    }

    async fn free(&self) -> Result<(), XjetError> {
        let connected = self.connected.read().await;
        let disconnects = connected.iter().map(|c| c.runner.disconnect());
        for result in futures::future::join_all(disconnects).await {
            if let Err(err) = result {
                tracing::warn!(%err, "runner disconnect failed");
            }
        }
        Ok(())
    }

    fn get_runners(&self) -> Vec<RunnerInfo> {
        self.connected
            .try_read()
            .map(|c| c.iter().map(|r| RunnerInfo { id: r.id.clone(), name: r.name.clone() }).collect())
            .unwrap_or_default()
    }

    async fn execute_suites(
        &self,
        bundles: Vec<Bundle>,
        files: BTreeMap<String, PathBuf>,
    ) -> Result<(), XjetError> {
        self.shared.set_suites(&files)?;
        self.shared.queue.start().await;

        let connected = self.connected.read().await;
        if connected.is_empty() {
            return Err(XjetError::NoRunnersConfigured);
        }

        // Each queued task spans the suite's *entire* lifecycle — dispatch
        // plus awaiting its completion oneshot — not just the initiating
        // `dispatch` call. Only that way does the queue's concurrency
        // slot stay occupied for as long as the suite is actually
        // running, so a bail's `queue.stop()`/`clear()` (awaited inline
        // by `complete_suite`, see target/mod.rs) is guaranteed to run
        // before any later suite's slot is freed and dequeued.
        let mut tasks = Vec::new();
        for bundle in &bundles {
            let Some(suite_id) = self.shared.suite_id_for(&bundle.logical_key) else { continue };
            for runner in connected.iter() {
                let code = prepare_code(bundle, &self.config, &suite_id, &runner.id);
                let shared = self.shared.clone();
                let runner_handle = runner.runner.clone();
                let runner_id = runner.id.clone();
                let suite_id_task = suite_id.clone();
                let dispatch_timeout = runner.runner.dispatch_timeout();

                let task = self.shared.queue.enqueue(Some(runner.id.clone()), move || async move {
                    let completion = shared.register_running(&runner_id, &suite_id_task);
                    let dispatch = runner_handle.dispatch(code.into_bytes(), &suite_id_task);
                    match tokio::time::timeout(dispatch_timeout, dispatch).await {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            shared.emit_synthetic_error(&suite_id_task, &runner_id, &err.to_string());
                        }
                        Err(_) => {
                            shared.emit_synthetic_error(
                                &suite_id_task,
                                &runner_id,
                                &format!("dispatch timed out after {}ms", dispatch_timeout.as_millis()),
                            );
                        }
                    }
                    if let Ok(Err(err)) = completion.await {
                        tracing::debug!(%err, "suite completed with error");
                    }
                });
                tasks.push(task);
            }
        }

        futures::future::join_all(tasks).await;
        Ok(())
    }

    async fn complete_suite(&self, key: &str, had_error: bool) {
        self.shared.complete_suite_by_key(key, had_error).await;
    }
}

fn prepare_code(bundle: &Bundle, config: &Configuration, suite_id: &str, runner_id: &str) -> String {
    let context = serde_json::json!({
        "bail": config.bail,
        "filter": config.filter,
        "timeout": config.timeout_ms,
        "suite_id": suite_id,
        "runner_id": runner_id,
        "randomize": config.randomize,
    });
    let dirname = serde_json::to_string(&bundle.original_path.parent().unwrap_or(&bundle.original_path)).unwrap();
    let filename = serde_json::to_string(&bundle.original_path).unwrap();
    format!(
        "__dirname={dirname}; __filename={filename}; globalThis.__XJET = {context}; {}",
        bundle.code
    )
}

pub fn now() -> String {
    now_iso8601()
}
