//! The bundler/transpiler is an out-of-scope collaborator (spec.md §1);
//! this trait pins down only the call shape the orchestrator needs.

use crate::bundle::Bundle;
use crate::config::BuildOpts;
use crate::error::XjetError;
use async_trait::async_trait;
use std::path::Path;

/// Produces a runnable bundle for one discovered suite entry point.
/// Implementations own the actual transpile/minify/sourcemap pipeline;
/// the orchestrator only needs `(logical_key, path) -> Bundle`.
#[async_trait]
pub trait Bundler: Send + Sync {
    async fn bundle(&self, logical_key: &str, path: &Path, build: &BuildOpts) -> Result<Bundle, XjetError>;
}

/// Reads each suite's source bytes verbatim with no transpile step and
/// no source map. A real deployment wires in the actual bundler
/// collaborator (esbuild-equivalent); this stand-in exists so the CLI
/// has something to drive end to end when none is configured.
pub struct FileBundler;

#[async_trait]
impl Bundler for FileBundler {
    async fn bundle(&self, logical_key: &str, path: &Path, _build: &BuildOpts) -> Result<Bundle, XjetError> {
        let code = tokio::fs::read_to_string(path).await?;
        Ok(Bundle {
            logical_key: logical_key.to_string(),
            original_path: path.to_path_buf(),
            code,
            source_map: None,
        })
    }
}
