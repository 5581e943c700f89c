//! Custom reporter plugin loader (SPEC_FULL.md §4.9.a). The original
//! system loads a user reporter by dynamically evaluating JS; the
//! closest idiomatic Rust equivalent is an out-of-process `cdylib`
//! loaded with `libloading`, exposing a single stable ABI entry point.

use super::Reporter;
use crate::error::XjetError;
use libloading::{Library, Symbol};
use std::ffi::c_void;
use std::path::Path;

/// Signature every custom reporter plugin must export under the symbol
/// name `xjet_reporter_new`. Trait objects are not FFI-safe, so the
/// plugin boxes its `Box<dyn Reporter>` a second time and hands back
/// the resulting thin pointer; ownership transfers to the caller,
/// which reconstructs it via `Box::from_raw`.
type ReporterCtor = unsafe extern "C" fn() -> *mut c_void;

/// Wraps a loaded reporter plugin, keeping the owning `Library` alive
/// for as long as the reporter instance is in use.
pub struct CustomReporter {
    inner: Box<dyn Reporter>,
    _library: Library,
}

impl CustomReporter {
    /// Load `path` as a `cdylib`, resolve `xjet_reporter_new`, and
    /// construct the reporter instance.
    ///
    /// # Safety contract
    /// The plugin must export a symbol matching [`ReporterCtor`] and
    /// must not assume anything about the loading process beyond the
    /// `Reporter` trait contract. We cannot verify this at compile
    /// time; a malformed plugin is a process-level safety hazard, not
    /// something this loader can defend against.
    pub fn load(path: &Path) -> Result<Self, XjetError> {
        let library = unsafe { Library::new(path) }.map_err(|err| XjetError::InvalidReporter {
            spec: path.display().to_string(),
            reason: err.to_string(),
        })?;

        let ctor: Symbol<ReporterCtor> = unsafe { library.get(b"xjet_reporter_new") }.map_err(|err| {
            XjetError::InvalidReporter { spec: path.display().to_string(), reason: err.to_string() }
        })?;

        let raw = unsafe { ctor() };
        if raw.is_null() {
            return Err(XjetError::InvalidReporter {
                spec: path.display().to_string(),
                reason: "xjet_reporter_new returned a null pointer".to_string(),
            });
        }
        let inner = *unsafe { Box::from_raw(raw as *mut Box<dyn Reporter>) };
        Ok(Self { inner, _library: library })
    }
}

impl Reporter for CustomReporter {
    fn init(&self, paths: &std::collections::BTreeMap<String, std::path::PathBuf>, runners: &[crate::target::RunnerInfo]) {
        self.inner.init(paths, runners);
    }

    fn log(&self, event: &super::LogMessage) {
        self.inner.log(event);
    }

    fn suite_start(&self, event: &super::SuiteEvent) {
        self.inner.suite_start(event);
    }

    fn suite_end(&self, event: &super::SuiteEndEvent) {
        self.inner.suite_end(event);
    }

    fn describe_start(&self, event: &super::DescribeEvent) {
        self.inner.describe_start(event);
    }

    fn describe_end(&self, event: &super::DescribeEvent) {
        self.inner.describe_end(event);
    }

    fn test_start(&self, event: &super::TestStartEvent) {
        self.inner.test_start(event);
    }

    fn test_end(&self, event: &super::TestEndEvent) {
        self.inner.test_end(event);
    }

    fn finish(&self) {
        self.inner.finish();
    }
}

// Safety: plugins are required to behave as a normal `Reporter` (see
// `load`'s doc comment); `Library` itself is `Send + Sync` once loaded.
unsafe impl Send for CustomReporter {}
unsafe impl Sync for CustomReporter {}
