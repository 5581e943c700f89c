//! Integration tests exercising the external-target dispatch path end
//! to end with a scripted [`FakeRunner`] standing in for a real
//! process, covering the orchestrator scenarios.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use xjet::bundler::FileBundler;
use xjet::config::{Configuration, ReporterSpec, RunnerConfig};
use xjet::error::XjetError;
use xjet::orchestrator::{resolve_reporter, run_once, ExitCode};
use xjet::packet::{self, ErrorPayload, Kind, Payload, StatusPayload, StatusType};
use xjet::router::MessageRouter;
use xjet::sourcemap::SourceMapRegistry;
use xjet::target::external::ExternalTarget;
use xjet::target::{Emit, Runner, Target};

/// Behaviors a [`FakeRunner`] can script, one dispatch call at a time
/// (`nth_call` is 0-indexed, consumed in the order `dispatch` is
/// actually invoked by the queue).
enum Script {
    /// Emits `StartSuite` then a fatal `Error` (no `EndSuite`).
    FailSuite,
    /// Emits `StartSuite`, a passing `Events`, then `EndSuite`.
    PassSuite,
    /// Never resolves and never emits anything — exercises the
    /// dispatch-timeout path.
    Hang,
}

struct FakeRunner {
    emit: Mutex<Option<Emit>>,
    runner_id: Mutex<String>,
    scripts: Vec<Script>,
    calls: AtomicUsize,
}

impl FakeRunner {
    fn new(scripts: Vec<Script>) -> Self {
        Self { emit: Mutex::new(None), runner_id: Mutex::new(String::new()), scripts, calls: AtomicUsize::new(0) }
    }

    fn send(&self, kind: Kind, suite_id: &str, payload: &Payload) {
        let runner_id = self.runner_id.lock().unwrap().clone();
        let bytes = packet::encode(kind, suite_id, &runner_id, "2024-01-01T00:00:00.000Z", payload).unwrap();
        if let Some(emit) = self.emit.lock().unwrap().as_ref() {
            let _ = emit.send(bytes);
        }
    }
}

#[async_trait]
impl Runner for FakeRunner {
    fn name(&self) -> &str {
        "fake"
    }

    fn dispatch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(50)
    }

    async fn connect(&self, emit: Emit, runner_id: &str, _argv: &HashMap<String, String>) -> Result<(), XjetError> {
        *self.emit.lock().unwrap() = Some(emit);
        *self.runner_id.lock().unwrap() = runner_id.to_string();
        Ok(())
    }

    async fn dispatch(&self, _bytes: Vec<u8>, suite_id: &str) -> Result<(), XjetError> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.scripts.get(idx).unwrap_or(&Script::PassSuite) {
            Script::FailSuite => {
                self.send(
                    Kind::Status,
                    suite_id,
                    &Payload::Status(StatusPayload {
                        r#type: StatusType::StartSuite,
                        todo: false,
                        skipped: false,
                        duration: 0,
                        ancestry: String::new(),
                        description: String::new(),
                    }),
                );
                self.send(Kind::Error, suite_id, &Payload::Error(ErrorPayload { error: r#"{"name":"AssertionError","message":"boom"}"#.into() }));
            }
            Script::PassSuite => {
                self.send(
                    Kind::Status,
                    suite_id,
                    &Payload::Status(StatusPayload {
                        r#type: StatusType::StartSuite,
                        todo: false,
                        skipped: false,
                        duration: 0,
                        ancestry: String::new(),
                        description: String::new(),
                    }),
                );
                self.send(
                    Kind::Status,
                    suite_id,
                    &Payload::Status(StatusPayload {
                        r#type: StatusType::EndSuite,
                        todo: false,
                        skipped: false,
                        duration: 5,
                        ancestry: String::new(),
                        description: String::new(),
                    }),
                );
            }
            Script::Hang => {
                std::future::pending::<()>().await;
            }
        }
        Ok(())
    }
}

fn write_suite(dir: &std::path::Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, "// fake suite body, never actually executed\n").unwrap();
    path
}

async fn run_with(
    dir: &std::path::Path,
    config: Configuration,
    runner: Arc<FakeRunner>,
) -> (Result<ExitCode, XjetError>, Arc<MessageRouter>) {
    let (external, rx) = ExternalTarget::new(config.clone(), vec![runner as Arc<dyn Runner>]);
    let target: Arc<dyn Target> = Arc::new(external);
    target.init().await.unwrap();

    let reporter = resolve_reporter(&config).unwrap();
    let registry = SourceMapRegistry::new();
    let router = Arc::new(MessageRouter::new(target.clone(), reporter.clone(), registry, false, false, &target.get_runners()));

    let router_task = {
        let router = router.clone();
        tokio::spawn(async move { router.run(rx).await })
    };

    let bundler = FileBundler;
    let result = run_once(dir, &config, &target, &bundler, &router).await;

    reporter.finish();
    target.free().await.unwrap();
    router_task.abort();

    (result, router)
}

#[tokio::test]
async fn s1_single_passing_suite() {
    let dir = tempfile::tempdir().unwrap();
    write_suite(dir.path(), "a.test.ts");

    let config = Configuration {
        files: vec!["**/*.test.ts".into()],
        reporter: ReporterSpec::Json,
        test_runners: vec![RunnerConfig { id: None, name: "fake".into(), connection_timeout_ms: None, dispatch_timeout_ms: None }],
        ..Configuration::default()
    };

    let runner = Arc::new(FakeRunner::new(vec![Script::PassSuite]));
    let (result, router) = run_with(dir.path(), config, runner).await;

    assert!(matches!(result, Ok(ExitCode::Success)));
    assert!(!router.has_error());
    assert!(!router.has_suite_error());
}

#[tokio::test]
async fn s2_bail_on_failure_stops_remaining_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    write_suite(dir.path(), "a.test.ts");
    write_suite(dir.path(), "b.test.ts");

    let config = Configuration {
        files: vec!["**/*.test.ts".into()],
        parallel: 1,
        bail: true,
        reporter: ReporterSpec::Json,
        test_runners: vec![RunnerConfig { id: None, name: "fake".into(), connection_timeout_ms: None, dispatch_timeout_ms: None }],
        ..Configuration::default()
    };

    // Suite A (dispatched first) fails fatally; suite B would pass but
    // `bail` must prevent it from ever being dequeued.
    let runner = Arc::new(FakeRunner::new(vec![Script::FailSuite, Script::PassSuite]));
    let (result, router) = run_with(dir.path(), config, runner.clone()).await;

    assert!(matches!(result, Ok(ExitCode::SuiteFatal)));
    assert!(router.has_suite_error());
    // With concurrency 1 and bail, suite B must never be dequeued: the
    // queue stays occupied for A's entire lifecycle, so `stop`/`clear`
    // run before B's slot could ever be freed.
    assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn s4_dispatch_timeout_synthesizes_error() {
    let dir = tempfile::tempdir().unwrap();
    write_suite(dir.path(), "a.test.ts");

    let config = Configuration {
        files: vec!["**/*.test.ts".into()],
        reporter: ReporterSpec::Json,
        test_runners: vec![RunnerConfig {
            id: None,
            name: "fake".into(),
            connection_timeout_ms: None,
            dispatch_timeout_ms: Some(50),
        }],
        ..Configuration::default()
    };

    let runner = Arc::new(FakeRunner::new(vec![Script::Hang]));
    let (result, router) = run_with(dir.path(), config, runner).await;

    assert!(matches!(result, Ok(ExitCode::SuiteFatal)));
    assert!(router.has_suite_error());
}

#[tokio::test]
async fn s3_suite_fatal_before_any_status() {
    let dir = tempfile::tempdir().unwrap();
    write_suite(dir.path(), "a.test.ts");

    let config = Configuration {
        files: vec!["**/*.test.ts".into()],
        reporter: ReporterSpec::Json,
        test_runners: vec![RunnerConfig { id: None, name: "fake".into(), connection_timeout_ms: None, dispatch_timeout_ms: None }],
        ..Configuration::default()
    };

    struct FatalFirstRunner(Mutex<Option<Emit>>, Mutex<String>);

    #[async_trait]
    impl Runner for FatalFirstRunner {
        fn name(&self) -> &str {
            "fake"
        }
        async fn connect(&self, emit: Emit, runner_id: &str, _argv: &HashMap<String, String>) -> Result<(), XjetError> {
            *self.0.lock().unwrap() = Some(emit);
            *self.1.lock().unwrap() = runner_id.to_string();
            Ok(())
        }
        async fn dispatch(&self, _bytes: Vec<u8>, suite_id: &str) -> Result<(), XjetError> {
            let runner_id = self.1.lock().unwrap().clone();
            let payload = Payload::Error(ErrorPayload { error: r#"{"name":"Error","message":"fatal before any status"}"#.into() });
            let bytes = packet::encode(Kind::Error, suite_id, &runner_id, "2024-01-01T00:00:00.000Z", &payload).unwrap();
            if let Some(emit) = self.0.lock().unwrap().as_ref() {
                let _ = emit.send(bytes);
            }
            Ok(())
        }
    }

    let runner = Arc::new(FatalFirstRunner(Mutex::new(None), Mutex::new(String::new())));
    let (external, rx) = ExternalTarget::new(config.clone(), vec![runner as Arc<dyn Runner>]);
    let target: Arc<dyn Target> = Arc::new(external);
    target.init().await.unwrap();

    let reporter = resolve_reporter(&config).unwrap();
    let registry = SourceMapRegistry::new();
    let router = Arc::new(MessageRouter::new(target.clone(), reporter.clone(), registry, false, false, &target.get_runners()));
    let router_task = {
        let router = router.clone();
        tokio::spawn(async move { router.run(rx).await })
    };

    let bundler = FileBundler;
    let result = run_once(dir.path(), &config, &target, &bundler, &router).await;
    router_task.abort();

    assert!(matches!(result, Ok(ExitCode::SuiteFatal)));
    assert!(router.has_suite_error());
}
