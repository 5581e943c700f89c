//! Runs bundled suites in an in-process sandbox.
//!
//! The source evaluates the bundle inside a JS VM context carrying
//! ambient globals (`__XJET`, `dispatch`, `__filename`/`__dirname`).
//! Per §9 Design Notes, a systems-language port drops global-mutation
//! semantics and instead calls the bundle's entry function with an
//! explicit, typed context. Since the actual bundle execution is the
//! (out-of-scope) collaborator's job, this target accepts a `Sandbox`
//! trait object standing in for "run this bundle, return its raw
//! packet frames"; production wiring plugs in the real bundler-produced
//! runtime, tests plug in a scripted fake.

use super::{now_iso8601, RunnerInfo, Target, TargetShared};
use crate::bundle::Bundle;
use crate::config::Configuration;
use crate::error::XjetError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Ambient context made available to a suite bundle, replacing the
/// source's `globalThis.__XJET` injection with an explicit struct.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RuntimeContext {
    pub bail: bool,
    pub path: PathBuf,
    pub filter: Vec<String>,
    pub timeout: u64,
    pub suite_id: String,
    pub runner_id: String,
    pub randomize: bool,
}

/// Stands in for the bundle's entry function: executes one suite and
/// returns every packet frame it produced (or an execution error).
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn run(&self, bundle: &Bundle, context: RuntimeContext) -> Result<Vec<Vec<u8>>, String>;
}

/// The always-present single local runner.
pub const LOCAL_RUNNER_NAME: &str = "local";

pub struct LocalTarget {
    shared: Arc<TargetShared>,
    sandbox: Arc<dyn Sandbox>,
    runner_id: String,
    config: Configuration,
}

impl LocalTarget {
    pub fn new(config: Configuration, sandbox: Arc<dyn Sandbox>) -> (Self, tokio::sync::mpsc::UnboundedReceiver<super::TargetEvent>) {
        let (shared, rx) = TargetShared::new(config.parallel, config.bail);
        let runner_id = crate::id::generate_id();
        (Self { shared, sandbox, runner_id, config }, rx)
    }

    pub fn shared(&self) -> &Arc<TargetShared> {
        &self.shared
    }
}

#[async_trait]
impl Target for LocalTarget {
    async fn init(&self) -> Result<(), XjetError> {
        Ok(())
    }

    async fn free(&self) -> Result<(), XjetError> {
        Ok(())
    }

    fn get_runners(&self) -> Vec<RunnerInfo> {
        vec![RunnerInfo { id: self.runner_id.clone(), name: LOCAL_RUNNER_NAME.to_string() }]
    }

    async fn execute_suites(
        &self,
        bundles: Vec<Bundle>,
        files: BTreeMap<String, PathBuf>,
    ) -> Result<(), XjetError> {
        self.shared.set_suites(&files)?;
        self.shared.queue.start().await;

        // As in the external target, each queued task spans the suite's
        // entire lifecycle (run the sandbox, then await its completion
        // oneshot) so the queue's concurrency slot stays occupied until
        // the suite is actually finished, not just dispatched.
        let mut tasks = Vec::with_capacity(bundles.len());
        for bundle in bundles {
            let Some(suite_id) = self.shared.suite_id_for(&bundle.logical_key) else { continue };

            let shared = self.shared.clone();
            let sandbox = self.sandbox.clone();
            let runner_id = self.runner_id.clone();
            let cfg = self.config.clone();
            let context = RuntimeContext {
                bail: cfg.bail,
                path: bundle.original_path.clone(),
                filter: cfg.filter.clone(),
                timeout: cfg.timeout_ms,
                suite_id: suite_id.clone(),
                runner_id: runner_id.clone(),
                randomize: cfg.randomize,
            };

            let task = self.shared.queue.enqueue(None, move || async move {
                let completion = shared.register_running(&runner_id, &suite_id);
                match sandbox.run(&bundle, context).await {
                    Ok(frames) => {
                        for frame in frames {
                            if let Err(err) = shared.route_incoming(&frame) {
                                tracing::warn!(%err, "failed to route locally-produced packet");
                            }
                        }
                    }
                    Err(message) => {
                        tracing::error!(%message, suite = %suite_id, "local sandbox execution failed");
                        shared.emit_synthetic_error(&suite_id, &runner_id, &message);
                    }
                }
                if let Ok(Err(err)) = completion.await {
                    tracing::debug!(%err, "suite completed with error");
                }
            });
            tasks.push(task);
        }

        futures::future::join_all(tasks).await;
        Ok(())
    }

    async fn complete_suite(&self, key: &str, had_error: bool) {
        self.shared.complete_suite_by_key(key, had_error).await;
    }
}

pub fn now() -> String {
    now_iso8601()
}
