//! Suite orchestrator: the top-level discover → bundle → dispatch →
//! report flow (spec.md §4.7), and the process exit code it resolves to.

use crate::bundler::Bundler;
use crate::config::{Configuration, ReporterSpec};
use crate::discovery::{discover, Filters};
use crate::error::XjetError;
use crate::reporter::{console::ConsoleReporter, custom::CustomReporter, json::JsonReporter, junit::JunitReporter, Reporter};
use crate::router::MessageRouter;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Process exit codes per §7.1: `0` clean, `1` any test failure, `2` any
/// suite-level fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    TestFailure = 1,
    SuiteFatal = 2,
}

/// Resolve `config.reporter` to a concrete [`Reporter`]. Built-ins are
/// constructed in-process; anything else is loaded as a `cdylib`
/// plugin (§4.9.a).
pub fn resolve_reporter(config: &Configuration) -> Result<Arc<dyn Reporter>, XjetError> {
    Ok(match &config.reporter {
        ReporterSpec::Spec => Arc::new(ConsoleReporter::new(config.log_level, config.output_file.clone())),
        ReporterSpec::Json => Arc::new(JsonReporter::new(config.output_file.clone())),
        ReporterSpec::Junit => Arc::new(JunitReporter::new(config.output_file.clone())),
        ReporterSpec::Custom(path) => Arc::new(CustomReporter::load(path)?),
    })
}

/// One discover→bundle→dispatch→report pass against an already
/// initialized `target`/`router` pair. Called once for the initial run
/// and again, with a narrower `config.suites`/`config.files` filter,
/// for every watch-triggered re-execution.
pub async fn run_once(
    root: &Path,
    config: &Configuration,
    target: &Arc<dyn crate::target::Target>,
    bundler: &dyn Bundler,
    router: &MessageRouter,
) -> Result<ExitCode, XjetError> {
    let filters = Filters::compile(&config.files, &config.suites, &config.exclude)?;
    let files = discover(root, &filters)?;
    if files.is_empty() {
        let what = if config.suites.is_empty() { "files" } else { "suites" };
        return Err(XjetError::NoTestFiles { what });
    }

    router.reporter().init(&files, &target.get_runners());

    let bundles = bundle_all(root, &files, config, bundler, router.registry()).await?;
    router.reset();
    target.execute_suites(bundles, files).await?;

    if router.has_suite_error() {
        Ok(ExitCode::SuiteFatal)
    } else if router.has_error() {
        Ok(ExitCode::TestFailure)
    } else {
        Ok(ExitCode::Success)
    }
}

async fn bundle_all(
    root: &Path,
    files: &BTreeMap<String, PathBuf>,
    config: &Configuration,
    bundler: &dyn Bundler,
    registry: &crate::sourcemap::SourceMapRegistry,
) -> Result<Vec<crate::bundle::Bundle>, XjetError> {
    let mut entries: Vec<_> = files.iter().collect();
    if config.randomize {
        entries.shuffle(&mut rand::rng());
    }

    // Bundling is the out-of-scope collaborator's job (§1); per §5 it's
    // "a single suspension per run" on the bundler's side, but the core
    // still makes one call per discovered suite.
    let mut bundles = Vec::with_capacity(entries.len());
    for (key, rel_path) in entries {
        let full_path = root.join(rel_path);
        let mut bundle = bundler.bundle(key, &full_path, &config.build).await?;
        bundle.logical_key = key.clone();
        if let Some(map) = &bundle.source_map {
            registry.set_from_string(map, &bundle.original_path)?;
        }
        bundles.push(bundle);
    }
    Ok(bundles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_ordering_matches_severity() {
        assert_eq!(ExitCode::Success as u8, 0);
        assert_eq!(ExitCode::TestFailure as u8, 1);
        assert_eq!(ExitCode::SuiteFatal as u8, 2);
    }
}
