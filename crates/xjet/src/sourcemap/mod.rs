//! Source map registry: caches one parsed source map per normalized path.

mod stack;

pub use stack::{Frame, FormattedTrace, StackFormatter};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

fn normalize(path: &Path) -> PathBuf {
    // `dunce`-style normalization is overkill for our purposes; the
    // registry only needs a stable key, so a lexical clean is enough.
    let mut out = PathBuf::new();
    for component in path.components() {
        out.push(component);
    }
    out
}

/// Caches parsed source maps keyed by normalized path. Inserts are
/// idempotent: re-inserting the same path retains the existing parser.
#[derive(Clone, Default)]
pub struct SourceMapRegistry {
    maps: Arc<RwLock<HashMap<PathBuf, Arc<sourcemap::SourceMap>>>>,
}

impl SourceMapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `text` and insert it under `path`. An empty mappings string
    /// is silently ignored.
    pub fn set_from_string(&self, text: &str, path: &Path) -> Result<(), crate::error::XjetError> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let key = normalize(path);
        {
            let maps = self.maps.read().unwrap();
            if maps.contains_key(&key) {
                return Ok(());
            }
        }
        let map = sourcemap::SourceMap::from_slice(text.as_bytes())
            .map_err(|e| crate::error::XjetError::Config(format!("invalid source map: {e}")))?;
        self.maps.write().unwrap().entry(key).or_insert_with(|| Arc::new(map));
        Ok(())
    }

    /// Read `path` + `.map` and insert it the same way as
    /// [`Self::set_from_string`].
    pub fn set_from_file(&self, path: &Path) -> Result<(), crate::error::XjetError> {
        let map_path = {
            let mut s = path.as_os_str().to_owned();
            s.push(".map");
            PathBuf::from(s)
        };
        let text = std::fs::read_to_string(&map_path)?;
        self.set_from_string(&text, path)
    }

    pub fn lookup(&self, path: &Path) -> Option<Arc<sourcemap::SourceMap>> {
        self.maps.read().unwrap().get(&normalize(path)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{"version":3,"sources":["a.ts"],"names":[],"mappings":"AAAA"}"#;

    #[test]
    fn idempotent_insert_keeps_original() {
        let registry = SourceMapRegistry::new();
        let path = Path::new("out/a.js");
        registry.set_from_string(SAMPLE, path).unwrap();
        let first = registry.lookup(path).unwrap();
        registry.set_from_string(SAMPLE, path).unwrap();
        let second = registry.lookup(path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn empty_mappings_are_ignored() {
        let registry = SourceMapRegistry::new();
        let path = Path::new("out/b.js");
        registry.set_from_string("", path).unwrap();
        assert!(registry.lookup(path).is_none());
    }
}
