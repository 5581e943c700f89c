//! Message router: subscribes to target events, decodes embedded
//! errors, and normalizes everything to reporter-facing messages.

use crate::error_envelope::decode_errors;
use crate::packet::{Payload, StatusType};
use crate::reporter::{
    guard, DescribeEvent, LogMessage, Reporter, ResolvedInvocation, SuiteEndEvent, SuiteError, SuiteEvent,
    TestEndEvent, TestStartEvent,
};
use crate::sourcemap::{Frame, SourceMapRegistry, StackFormatter};
use crate::target::{running_key, Target, TargetEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Identifies one in-flight test between its `TestStart` status and the
/// matching `Events` packet that closes it.
type TestKey = (String, String, Vec<String>, String);

/// Normalizes the wire-level packet stream into reporter hook calls,
/// tracking the two outcome flags the orchestrator's exit code depends
/// on (spec.md §8 invariant 6).
pub struct MessageRouter {
    target: Arc<dyn Target>,
    reporter: Arc<dyn Reporter>,
    registry: SourceMapRegistry,
    formatter: StackFormatter,
    runner_names: HashMap<String, String>,
    has_error: Arc<AtomicBool>,
    has_suite_error: Arc<AtomicBool>,
    /// `todo`/`skipped`, recorded at `TestStart` time (the only point the
    /// wire carries them) and consumed by the matching `Events` packet
    /// that closes the test (spec.md §4's Status-to-Events mapping).
    pending_tests: Mutex<HashMap<TestKey, (bool, bool)>>,
}

/// Normalize the wire's inconsistent ancestry delimiter (SPEC_FULL.md
/// §9 Design Notes, unresolved behavior (b)) to a `,`-delimited `Vec`.
fn normalize_ancestry(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

impl MessageRouter {
    pub fn new(
        target: Arc<dyn Target>,
        reporter: Arc<dyn Reporter>,
        registry: SourceMapRegistry,
        with_native_frames: bool,
        with_framework_frames: bool,
        runners: &[crate::target::RunnerInfo],
    ) -> Self {
        Self {
            target,
            reporter,
            formatter: StackFormatter::new(registry.clone(), with_native_frames, with_framework_frames),
            registry,
            runner_names: runners.iter().map(|r| (r.id.clone(), r.name.clone())).collect(),
            has_error: Arc::new(AtomicBool::new(false)),
            has_suite_error: Arc::new(AtomicBool::new(false)),
            pending_tests: Mutex::new(HashMap::new()),
        }
    }

    pub fn has_error(&self) -> bool {
        self.has_error.load(Ordering::SeqCst)
    }

    pub fn has_suite_error(&self) -> bool {
        self.has_suite_error.load(Ordering::SeqCst)
    }

    /// Clear the outcome flags ahead of a fresh run (a plain re-run, or
    /// a watch-triggered re-execution of the affected suites).
    pub fn reset(&self) {
        self.has_error.store(false, Ordering::SeqCst);
        self.has_suite_error.store(false, Ordering::SeqCst);
        self.pending_tests.lock().unwrap().clear();
    }

    fn runner_name(&self, runner_id: &str) -> String {
        self.runner_names.get(runner_id).cloned().unwrap_or_else(|| runner_id.to_string())
    }

    pub fn registry(&self) -> &SourceMapRegistry {
        &self.registry
    }

    pub fn reporter(&self) -> &Arc<dyn Reporter> {
        &self.reporter
    }

    /// Drain `rx` until the target's event channel closes (once all
    /// suites have completed and senders are dropped).
    pub async fn run(&self, mut rx: mpsc::UnboundedReceiver<TargetEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle(event).await;
        }
    }

    async fn handle(&self, event: TargetEvent) {
        let suite = event.path.to_string_lossy().to_string();
        let runner = self.runner_name(&event.packet.runner_id);

        match &event.packet.payload {
            Payload::Log(log) => {
                let invocation = self.registry.lookup(&event.path).and_then(|map| {
                    map.lookup_token(log.invocation.line.saturating_sub(1), log.invocation.column.saturating_sub(1))
                        .map(|t| ResolvedInvocation {
                            file: t.get_source().unwrap_or(&log.invocation.source).to_string(),
                            line: t.get_src_line() + 1,
                            column: t.get_src_col() + 1,
                        })
                });
                let message = LogMessage {
                    level: log.level,
                    level_id: level_name(log.level),
                    suite: suite.clone(),
                    runner: runner.clone(),
                    message: log.message.clone(),
                    ancestry: normalize_ancestry(&log.ancestry),
                    timestamp: event.packet.timestamp.clone(),
                    invocation,
                };
                let reporter = self.reporter.clone();
                guard("log", move || reporter.log(&message));
            }

            Payload::Error(err) => {
                self.has_suite_error.store(true, Ordering::SeqCst);
                let errors = decode_errors(&err.error);
                let frames: Vec<Frame> = errors
                    .iter()
                    .filter_map(|e| e.stack.as_deref())
                    .map(parse_stack_frame)
                    .collect();
                let formatted = self.formatter.format(&frames, 2, 3, |_| None);
                let end = SuiteEndEvent {
                    suite: suite.clone(),
                    runner: runner.clone(),
                    duration: 0,
                    error: Some(SuiteError { errors, frames: formatted.stacks }),
                };
                let reporter = self.reporter.clone();
                guard("suite_end", move || reporter.suite_end(&end));
                self.target.complete_suite(&running_key(&event.packet.runner_id, &event.packet.suite_id), true).await;
            }

            Payload::Status(status) => {
                let ancestry = normalize_ancestry(&status.ancestry);
                let reporter = self.reporter.clone();
                match status.r#type {
                    StatusType::StartSuite => {
                        let ev = SuiteEvent { suite: suite.clone(), runner: runner.clone() };
                        guard("suite_start", move || reporter.suite_start(&ev));
                    }
                    StatusType::EndSuite => {
                        let ev = SuiteEndEvent { suite: suite.clone(), runner: runner.clone(), duration: status.duration, error: None };
                        guard("suite_end", move || reporter.suite_end(&ev));
                        self.target.complete_suite(&running_key(&event.packet.runner_id, &event.packet.suite_id), false).await;
                    }
                    StatusType::TestStart => {
                        let key: TestKey = (suite.clone(), runner.clone(), ancestry.clone(), status.description.clone());
                        self.pending_tests.lock().unwrap().insert(key, (status.todo, status.skipped));
                        let ev = TestStartEvent {
                            suite: suite.clone(),
                            runner: runner.clone(),
                            ancestry,
                            description: status.description.clone(),
                            todo: status.todo,
                            skipped: status.skipped,
                        };
                        guard("test_start", move || reporter.test_start(&ev));
                    }
                    StatusType::Describe => {
                        let ev = DescribeEvent {
                            suite: suite.clone(),
                            runner: runner.clone(),
                            ancestry,
                            description: status.description.clone(),
                        };
                        guard("describe_start", move || reporter.describe_start(&ev));
                    }
                    StatusType::CompileSuite => {
                        tracing::debug!(suite = %suite, "suite compiled");
                    }
                }
            }

            Payload::Events(events) => {
                let errors = decode_errors(&events.errors);
                let passed = events.passed && errors.is_empty();
                if !errors.is_empty() {
                    self.has_error.store(true, Ordering::SeqCst);
                }
                let ancestry = normalize_ancestry(&events.ancestry);
                // `Events.type` reuses the `Status` sub-kind numbering: 2 is
                // `Describe`, everything else is a test-level assertion.
                let is_describe = events.r#type == StatusType::Describe as u8;
                let reporter = self.reporter.clone();

                if is_describe {
                    let ev = DescribeEvent { suite, runner, ancestry, description: events.description.clone() };
                    guard("describe_end", move || reporter.describe_end(&ev));
                } else {
                    let key: TestKey = (suite.clone(), runner.clone(), ancestry.clone(), events.description.clone());
                    let (todo, skipped) = self.pending_tests.lock().unwrap().remove(&key).unwrap_or((false, false));
                    let ev = TestEndEvent {
                        suite,
                        runner,
                        ancestry,
                        description: events.description.clone(),
                        duration: events.duration,
                        passed,
                        todo,
                        skipped,
                        errors,
                    };
                    guard("test_end", move || reporter.test_end(&ev));
                }
            }
        }
    }
}

fn level_name(level: u8) -> &'static str {
    match level {
        0 => "silent",
        1 => "error",
        2 => "warn",
        3 => "info",
        _ => "debug",
    }
}

/// Best-effort extraction of a `file:line:column` location from a raw
/// JS-style stack string's first frame line.
fn parse_stack_frame(stack: &str) -> Frame {
    let first_line = stack.lines().next().unwrap_or("");
    let re = regex::Regex::new(r"([^\s(]+):(\d+):(\d+)").unwrap();
    if let Some(caps) = re.captures(first_line) {
        return Frame {
            file: Some(caps[1].to_string()),
            function: Some("<anonymous>".to_string()),
            line: caps[2].parse().ok(),
            column: caps[3].parse().ok(),
            is_native: false,
            source_root: None,
        };
    }
    Frame { file: None, function: None, line: None, column: None, is_native: false, source_root: None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_ancestry_delimiter() {
        assert_eq!(normalize_ancestry("A,B,C"), vec!["A", "B", "C"]);
        assert_eq!(normalize_ancestry(""), Vec::<String>::new());
    }

    #[test]
    fn extracts_file_line_column_from_stack() {
        let frame = parse_stack_frame("at fn (src/a.ts:12:4)");
        assert_eq!(frame.file.as_deref(), Some("src/a.ts"));
        assert_eq!(frame.line, Some(12));
        assert_eq!(frame.column, Some(4));
    }
}
