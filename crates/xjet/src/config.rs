//! The frozen configuration shape the orchestrator consumes, and the
//! `Runner` capability record external targets dispatch to.

use serde::Deserialize;
use std::path::PathBuf;

/// Verbosity of the orchestrator's own logging, independent of reporter
/// output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Silent,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    /// The `tracing_subscriber::EnvFilter` directive for this level.
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Silent => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

/// Built-in reporter selection, or a path to a custom reporter plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReporterSpec {
    Spec,
    Json,
    Junit,
    Custom(PathBuf),
}

impl Default for ReporterSpec {
    fn default() -> Self {
        ReporterSpec::Spec
    }
}

impl From<&str> for ReporterSpec {
    fn from(s: &str) -> Self {
        match s {
            "spec" => ReporterSpec::Spec,
            "json" => ReporterSpec::Json,
            "junit" => ReporterSpec::Junit,
            other => ReporterSpec::Custom(PathBuf::from(other)),
        }
    }
}

impl<'de> Deserialize<'de> for ReporterSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(ReporterSpec::from(String::deserialize(deserializer)?.as_str()))
    }
}

/// Options forwarded to the (out-of-scope) bundler collaborator.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildOpts {
    pub minify: Option<bool>,
    pub target: Option<String>,
    pub external: Vec<String>,
}

/// The immutable option struct the orchestrator consumes for one run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub files: Vec<String>,
    pub suites: Vec<String>,
    pub filter: Vec<String>,
    pub exclude: Vec<String>,
    pub bail: bool,
    pub watch: bool,
    pub parallel: usize,
    pub timeout_ms: u64,
    pub randomize: bool,
    pub log_level: LogLevel,
    pub reporter: ReporterSpec,
    pub output_file: Option<PathBuf>,
    pub test_runners: Vec<RunnerConfig>,
    pub build: BuildOpts,
    pub verbose: bool,
    /// User-defined CLI options merged additionally, forwarded verbatim
    /// to external runners' `connect`/`argv`.
    pub user_argv: std::collections::HashMap<String, String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            files: vec!["**/*.test.ts".to_string()],
            suites: Vec::new(),
            filter: Vec::new(),
            exclude: Vec::new(),
            bail: false,
            watch: false,
            parallel: 1,
            timeout_ms: 5000,
            randomize: false,
            log_level: LogLevel::default(),
            reporter: ReporterSpec::default(),
            output_file: None,
            test_runners: Vec::new(),
            build: BuildOpts::default(),
            verbose: false,
            user_argv: Default::default(),
        }
    }
}

impl Configuration {
    /// Clamp/validate fields whose invariants aren't expressible in the
    /// type alone (`parallel >= 1`).
    pub fn normalize(mut self) -> Self {
        if self.parallel == 0 {
            self.parallel = 1;
        }
        self
    }

    /// Load from a TOML or JSON file (by extension), merged with no CLI
    /// overlay. When `path` is `None`, probes the default resolution
    /// order `./xjet.toml`, then `./xjet.config.json`, falling back to
    /// `Configuration::default()` if neither exists.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, crate::error::XjetError> {
        let resolved = match path {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let toml_default = std::path::Path::new("xjet.toml");
                let json_default = std::path::Path::new("xjet.config.json");
                if toml_default.exists() {
                    Some(toml_default.to_path_buf())
                } else if json_default.exists() {
                    Some(json_default.to_path_buf())
                } else {
                    None
                }
            }
        };
        let Some(path) = resolved else { return Ok(Self::default()) };
        let text = std::fs::read_to_string(&path)?;
        let cfg: Self = if path.extension().and_then(|e| e.to_str()) == Some("json") {
            serde_json::from_str(&text)?
        } else {
            toml::from_str(&text).map_err(|e| crate::error::XjetError::Config(e.to_string()))?
        };
        Ok(cfg.normalize())
    }
}

/// A connection target external runners are configured with.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    pub id: Option<String>,
    pub name: String,
    pub connection_timeout_ms: Option<u64>,
    pub dispatch_timeout_ms: Option<u64>,
}

impl RunnerConfig {
    pub fn connection_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.connection_timeout_ms.unwrap_or(5000))
    }

    pub fn dispatch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.dispatch_timeout_ms.unwrap_or(5000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Configuration::default();
        assert_eq!(cfg.parallel, 1);
        assert!(!cfg.bail);
    }

    #[test]
    fn normalize_clamps_parallel() {
        let mut cfg = Configuration::default();
        cfg.parallel = 0;
        let cfg = cfg.normalize();
        assert_eq!(cfg.parallel, 1);
    }

    #[test]
    fn loads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xjet.toml");
        std::fs::write(&path, "bail = true\nparallel = 4\n").unwrap();
        let cfg = Configuration::load(Some(&path)).unwrap();
        assert!(cfg.bail);
        assert_eq!(cfg.parallel, 4);
    }
}
