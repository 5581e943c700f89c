//! xJet CLI: wires configuration, discovery, bundling, target dispatch,
//! reporting, and (optionally) the watch loop into one process.

use clap::Parser;
use eyre::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use xjet::bundler::FileBundler;
use xjet::config::{Configuration, LogLevel, ReporterSpec};
use xjet::orchestrator::{resolve_reporter, run_once, ExitCode};
use xjet::router::MessageRouter;
use xjet::sourcemap::SourceMapRegistry;
use xjet::target::external::ExternalTarget;
use xjet::target::process::ProcessRunner;
use xjet::target::Target;

/// JavaScript/TypeScript test-execution orchestrator.
#[derive(Parser, Debug)]
#[command(
    name = "xjet",
    version,
    about = "Discover, bundle, and run JS/TS test suites across local and external runners",
    before_help = "xJet — suite orchestration engine"
)]
struct Cli {
    /// Test files or directories to run (merged with `--files`).
    files: Vec<String>,

    #[arg(long = "files")]
    files_flag: Vec<String>,

    #[arg(long = "suites", short = 's')]
    suites: Vec<String>,

    #[arg(long = "filter", short = 'f')]
    filter: Vec<String>,

    #[arg(long = "config", short = 'c')]
    config: Option<PathBuf>,

    #[arg(long = "reporter", short = 'r')]
    reporter: Option<String>,

    #[arg(long = "outputFile")]
    output_file: Option<PathBuf>,

    #[arg(long = "verbose", short = 'v')]
    verbose: bool,

    #[arg(long = "silent")]
    silent: bool,

    #[arg(long = "timeout", short = 't')]
    timeout: Option<u64>,

    #[arg(long = "bail", short = 'b')]
    bail: bool,

    #[arg(long = "watch", short = 'w')]
    watch: bool,

    #[arg(long = "randomize")]
    randomize: bool,
}

fn apply_cli_overlay(mut config: Configuration, cli: &Cli) -> Configuration {
    if !cli.files.is_empty() {
        config.files = cli.files.clone();
    }
    if !cli.files_flag.is_empty() {
        config.files = cli.files_flag.clone();
    }
    if !cli.suites.is_empty() {
        config.suites = cli.suites.clone();
    }
    if !cli.filter.is_empty() {
        config.filter = cli.filter.clone();
    }
    if let Some(reporter) = &cli.reporter {
        config.reporter = ReporterSpec::from(reporter.as_str());
    }
    if cli.output_file.is_some() {
        config.output_file = cli.output_file.clone();
    }
    if let Some(timeout) = cli.timeout {
        config.timeout_ms = timeout;
    }
    if cli.bail {
        config.bail = true;
    }
    if cli.watch {
        config.watch = true;
    }
    if cli.randomize {
        config.randomize = true;
    }
    config.verbose = cli.verbose;
    if cli.silent {
        config.log_level = LogLevel::Silent;
    } else if cli.verbose {
        config.log_level = LogLevel::Debug;
    }
    config.normalize()
}

fn init_tracing(level: LogLevel) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.as_filter_str()));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let base = Configuration::load(cli.config.as_deref()).wrap_err("failed to load configuration")?;
    let config = apply_cli_overlay(base, &cli);

    init_tracing(config.log_level);

    if config.test_runners.is_empty() {
        eyre::bail!(
            "no test runners configured: xjet's local in-process sandbox is an out-of-scope \
             collaborator; configure `test_runners` in your config file to run suites externally"
        );
    }

    let runners: Vec<Arc<dyn xjet::target::Runner>> = config
        .test_runners
        .iter()
        .map(|rc| {
            Arc::new(ProcessRunner::new(rc.clone(), rc.name.clone(), Vec::new())) as Arc<dyn xjet::target::Runner>
        })
        .collect();

    let (external, rx) = ExternalTarget::new(config.clone(), runners);
    let target: Arc<dyn Target> = Arc::new(external);

    target.init().await.wrap_err("failed to initialize target")?;

    let reporter = resolve_reporter(&config).wrap_err("failed to resolve reporter")?;
    let registry = SourceMapRegistry::new();
    let bundler = FileBundler;
    let root = std::env::current_dir().wrap_err("failed to resolve working directory")?;

    let router = Arc::new(MessageRouter::new(target.clone(), reporter.clone(), registry, false, false, &target.get_runners()));
    let router_task = {
        let router = router.clone();
        tokio::spawn(async move { router.run(rx).await })
    };

    let exit_code = run_once(&root, &config, &target, &bundler, &router).await;

    if config.watch {
        tracing::info!("watch mode is not yet wired to a live filesystem subscription for this run; exiting after the initial pass");
    }

    reporter.finish();
    target.free().await.wrap_err("failed to tear down target")?;
    router_task.abort();

    let code = match exit_code {
        Ok(ExitCode::Success) => 0,
        Ok(ExitCode::TestFailure) => 1,
        Ok(ExitCode::SuiteFatal) => 2,
        Err(err) => {
            tracing::error!(%err, "run failed");
            2
        }
    };
    std::process::exit(code);
}
