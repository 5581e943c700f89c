//! Reporter contract: the abstract hook set normalized suite/test events
//! are forwarded to, plus the three built-in implementations.

pub mod console;
pub mod custom;
pub mod json;
pub mod junit;

use crate::sourcemap::Frame;
use serde::Serialize;

/// A single resolved log line.
#[derive(Debug, Clone, Serialize)]
pub struct LogMessage {
    pub level: u8,
    pub level_id: &'static str,
    pub suite: String,
    pub runner: String,
    pub message: String,
    pub ancestry: Vec<String>,
    pub timestamp: String,
    pub invocation: Option<ResolvedInvocation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedInvocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuiteEvent {
    pub suite: String,
    pub runner: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuiteEndEvent {
    pub suite: String,
    pub runner: String,
    pub duration: u32,
    pub error: Option<SuiteError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuiteError {
    pub errors: Vec<crate::error_envelope::SerializedError>,
    #[serde(skip)]
    pub frames: Vec<Frame>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DescribeEvent {
    pub suite: String,
    pub runner: String,
    pub ancestry: Vec<String>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestStartEvent {
    pub suite: String,
    pub runner: String,
    pub ancestry: Vec<String>,
    pub description: String,
    pub todo: bool,
    pub skipped: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestEndEvent {
    pub suite: String,
    pub runner: String,
    pub ancestry: Vec<String>,
    pub description: String,
    pub duration: u32,
    pub passed: bool,
    pub todo: bool,
    pub skipped: bool,
    pub errors: Vec<crate::error_envelope::SerializedError>,
}

/// Consumer of normalized suite/test events. All hooks are no-ops by
/// default; built-ins override the ones they care about.
pub trait Reporter: Send + Sync {
    fn init(&self, _paths: &std::collections::BTreeMap<String, std::path::PathBuf>, _runners: &[crate::target::RunnerInfo]) {}
    fn log(&self, _event: &LogMessage) {}
    fn suite_start(&self, _event: &SuiteEvent) {}
    fn suite_end(&self, _event: &SuiteEndEvent) {}
    fn describe_start(&self, _event: &DescribeEvent) {}
    fn describe_end(&self, _event: &DescribeEvent) {}
    fn test_start(&self, _event: &TestStartEvent) {}
    fn test_end(&self, _event: &TestEndEvent) {}
    fn finish(&self) {}
}

/// Run a reporter hook, catching panics so a misbehaving reporter can't
/// take the orchestrator down with it (§7: "errors within a reporter
/// hook ... are logged and the hook is considered a no-op").
pub fn guard(label: &str, f: impl FnOnce() + std::panic::UnwindSafe) {
    if let Err(payload) = std::panic::catch_unwind(f) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::warn!(hook = label, %message, "reporter hook panicked; ignoring");
    }
}
