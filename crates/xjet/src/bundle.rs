//! The bundler is an out-of-scope collaborator (spec.md §1); this module
//! pins down only the shape the core consumes: bytes plus a source map
//! string, one per discovered suite entry point.

use std::path::PathBuf;

/// One suite's compiled bundle, ready for dispatch.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub logical_key: String,
    pub original_path: PathBuf,
    pub code: String,
    pub source_map: Option<String>,
}
