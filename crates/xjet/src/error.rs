//! Error taxonomy for the orchestration core.
//!
//! Each variant corresponds to one of the error kinds in the design's
//! error-handling section. Library code returns [`XjetError`]; the CLI
//! binary wraps it in `eyre::Result` for display.

use std::path::PathBuf;

/// The library-facing error type for every fallible core operation.
#[derive(Debug, thiserror::Error)]
pub enum XjetError {
    /// No test files matched the configured filters.
    #[error("no test files found matching {what}")]
    NoTestFiles {
        /// Which filter came up empty (`"suites"` or `"files"`).
        what: &'static str,
    },

    /// A reporter name/path could not be resolved to a usable reporter.
    #[error("invalid reporter `{spec}`: {reason}")]
    InvalidReporter {
        /// The `--reporter` value as given.
        spec: String,
        reason: String,
    },

    /// No runners were configured for the external target.
    #[error("no test runners configured")]
    NoRunnersConfigured,

    /// A packet referenced a runner id the target has no record of.
    #[error("unknown runner id `{0}`")]
    UnknownRunner(String),

    /// A bundle/suite map was registered with no entries, or dispatch
    /// referenced a suite id absent from the index.
    #[error("missing suite registration: {0}")]
    MissingSuite(String),

    /// The bundler collaborator reported one or more compile errors.
    #[error("bundle failed: {0}")]
    Bundle(#[from] BundleError),

    /// Loading a config file or a dynamic-library reporter/runner failed.
    #[error("failed to load {path}: {source}")]
    SandboxRuntime {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A suite reported a fatal, suite-scoped error.
    #[error("suite {suite_id} failed fatally: {message}")]
    SuiteFatal { suite_id: String, message: String },

    /// A connect/dispatch/execution watchdog elapsed.
    #[error("{scope} timed out after {timeout_ms}ms at {location}")]
    Timeout {
        scope: &'static str,
        timeout_ms: u64,
        location: String,
    },

    /// Packet encode/decode failure, or dispatch of an unrecognized kind.
    #[error("protocol error: {0}")]
    Protocol(#[from] crate::packet::ProtocolError),

    /// Malformed configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Errors produced by the (out-of-scope) bundler collaborator, surfaced
/// with enough detail to render a useful diagnostic.
#[derive(Debug, thiserror::Error)]
#[error("{file}:{line}:{column}: {message}")]
pub struct BundleError {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
    pub line_text: String,
    pub notes: Vec<String>,
}
