//! Incremental watcher (spec.md §4.8): a dependency graph over import
//! edges, debounced batching of filesystem events, and re-execution of
//! only the affected suites.

use crate::discovery::Filters;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Resolves a file's direct import edges. Actual import parsing belongs
/// to the (out-of-scope) bundler/transpiler collaborator; this trait
/// pins down only the shape the graph needs.
pub trait ImportResolver: Send + Sync {
    fn direct_deps(&self, file: &Path) -> Vec<PathBuf>;
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        out.push(component);
    }
    out
}

/// `file -> set<test_file>` reverse-dependency index, plus a
/// `test_file -> [direct deps]` forward cache.
#[derive(Default)]
pub struct DependencyGraph {
    graph: HashMap<PathBuf, HashSet<PathBuf>>,
    direct_deps: HashMap<PathBuf, Vec<PathBuf>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from scratch for every known test file.
    pub fn init(&mut self, test_files: &[PathBuf], resolver: &dyn ImportResolver) {
        self.graph.clear();
        self.direct_deps.clear();
        for test_file in test_files {
            self.update_graph(test_file, true, resolver);
        }
    }

    /// Dependents of `file` — every known test file reachable from it
    /// through import edges (spec's `graph[file]`).
    pub fn dependents_of(&self, file: &Path) -> Vec<PathBuf> {
        self.graph.get(&normalize(file)).into_iter().flatten().cloned().collect()
    }

    pub fn contains(&self, file: &Path) -> bool {
        self.graph.contains_key(&normalize(file))
    }

    /// Purge `file` entirely: its own key, its direct-deps cache entry,
    /// and its membership in every dependent set.
    pub fn remove_from_graph(&mut self, file: &Path) {
        let key = normalize(file);
        self.graph.remove(&key);
        self.direct_deps.remove(&key);
        for deps in self.graph.values_mut() {
            deps.remove(&key);
        }
    }

    /// Recompute `file`'s place in the graph: if it's itself a test
    /// file, its direct deps are recomputed and `[file]` is propagated
    /// through them; otherwise the existing dependents of `file` are
    /// propagated through its newly recomputed deps.
    pub fn update_graph(&mut self, file: &Path, is_test_file: bool, resolver: &dyn ImportResolver) {
        let key = normalize(file);
        let deps: Vec<PathBuf> = resolver.direct_deps(file).into_iter().map(|d| normalize(&d)).collect();

        if is_test_file {
            self.direct_deps.insert(key.clone(), deps.clone());
            self.link_dependency(&[key], &deps);
        } else {
            let dependents: Vec<PathBuf> = self.dependents_of(&key);
            self.direct_deps.insert(key, deps.clone());
            self.link_dependency(&dependents, &deps);
        }
    }

    /// Add every `test_file` to `graph[dep]` for each `dep`; when a
    /// dep's set actually grows, recurse into that dep's own cached
    /// deps (bounded by set-growth monotonicity, so this always
    /// terminates even on import cycles).
    pub fn link_dependency(&mut self, test_files: &[PathBuf], deps: &[PathBuf]) {
        if test_files.is_empty() {
            return;
        }
        for dep in deps {
            let entry = self.graph.entry(dep.clone()).or_default();
            let before = entry.len();
            entry.extend(test_files.iter().cloned());
            let grew = entry.len() > before;

            if grew {
                if let Some(nested) = self.direct_deps.get(dep).cloned() {
                    self.link_dependency(test_files, &nested);
                }
            }
        }
    }
}

/// Debounced change accumulator driving re-execution. Owns the graph
/// and the pending change-set; the actual filesystem subscription
/// (`watchexec`) lives in [`run`], which calls back into
/// [`WatchState::on_fs_event`] for every raw event.
pub struct WatchState {
    graph: Mutex<DependencyGraph>,
    pending: Mutex<HashSet<PathBuf>>,
    filters: Filters,
    root: PathBuf,
}

impl WatchState {
    pub fn new(root: PathBuf, filters: Filters, test_files: &[PathBuf], resolver: &dyn ImportResolver) -> Self {
        let mut graph = DependencyGraph::new();
        graph.init(test_files, resolver);
        Self { graph: Mutex::new(graph), pending: Mutex::new(HashSet::new()), filters, root }
    }

    /// Record a raw filesystem event path into the pending change-set,
    /// after normalizing and dropping excluded paths.
    pub fn on_fs_event(&self, path: &Path) {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        let rel_str = rel.to_string_lossy().replace('\\', "/");
        if self.filters.is_excluded(&rel_str) {
            return;
        }
        self.pending.lock().unwrap().insert(normalize(path));
    }

    /// Snapshot and clear the change-set, apply each change to the
    /// graph, and return the set of suites to re-run (logical-key-less
    /// paths — the caller maps these back to logical keys before
    /// invoking the orchestrator).
    pub fn drain_and_resolve(&self, resolver: &dyn ImportResolver) -> HashSet<PathBuf> {
        let changed: Vec<PathBuf> = {
            let mut pending = self.pending.lock().unwrap();
            pending.drain().collect()
        };

        let mut graph = self.graph.lock().unwrap();
        let mut marked = HashSet::new();

        for file in changed {
            if !file.exists() {
                graph.remove_from_graph(&file);
                continue;
            }

            let rel = file.strip_prefix(&self.root).unwrap_or(&file);
            let rel_str = rel.to_string_lossy().replace('\\', "/");

            if self.filters.is_test_file(&rel_str) {
                graph.update_graph(&file, true, resolver);
                marked.insert(file);
            } else if graph.contains(&file) {
                let dependents = graph.dependents_of(&file);
                graph.update_graph(&file, false, resolver);
                marked.extend(dependents);
            }
        }

        marked
    }
}

/// Wire up the real filesystem watcher. Forwards every changed path
/// `watchexec` reports onto an unbounded channel [`run`] debounces;
/// `watchexec`'s own debounce is disabled (`Duration::ZERO`) since
/// §4.8 specifies our own 400 ms change-set debounce on top.
pub fn spawn_fs_watcher(root: PathBuf) -> Result<tokio::sync::mpsc::UnboundedReceiver<PathBuf>, crate::error::XjetError> {
    use watchexec::Watchexec;
    use watchexec_events::filekind::FileEventKind;
    use watchexec_events::Tag;

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    let wx = Watchexec::new(move |mut action| {
        for event in action.events.iter() {
            let is_fs_change = event.tags.iter().any(|tag| matches!(tag, Tag::FileEventKind(_)));
            if !is_fs_change {
                continue;
            }
            for tag in &event.tags {
                if let Tag::Path { path, file_type: _ } = tag {
                    let _ = tx.send(path.clone());
                }
            }
            let _ = FileEventKind::Any;
        }

        if action.signals().next().is_some() {
            action.quit();
        }
        action
    })
    .map_err(|e| crate::error::XjetError::Config(format!("failed to start filesystem watcher: {e}")))?;

    wx.config.pathset([root]);
    wx.config.throttle(Duration::ZERO);

    tokio::spawn(async move {
        if let Err(err) = wx.main().await {
            tracing::error!(%err, "filesystem watcher exited with an error");
        }
    });

    Ok(rx)
}

/// Run the watch loop: debounce filesystem events (default 400 ms,
/// restarting the timer on every new event) and invoke `exec` with the
/// set of affected test file paths once a debounce window elapses with
/// pending changes.
pub async fn run(
    state: std::sync::Arc<WatchState>,
    resolver: std::sync::Arc<dyn ImportResolver>,
    mut events: tokio::sync::mpsc::UnboundedReceiver<PathBuf>,
    debounce: Duration,
    mut exec: impl FnMut(HashSet<PathBuf>) + Send,
) {
    loop {
        let Some(first) = events.recv().await else { return };
        state.on_fs_event(&first);

        loop {
            match tokio::time::timeout(debounce, events.recv()).await {
                Ok(Some(path)) => state.on_fs_event(&path),
                Ok(None) => return,
                Err(_) => break,
            }
        }

        let marked = state.drain_and_resolve(resolver.as_ref());
        if !marked.is_empty() {
            exec(marked);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeResolver(HashMap<PathBuf, Vec<PathBuf>>);

    impl ImportResolver for FakeResolver {
        fn direct_deps(&self, file: &Path) -> Vec<PathBuf> {
            self.0.get(file).cloned().unwrap_or_default()
        }
    }

    #[test]
    fn propagates_through_transitive_deps() {
        let mut deps = HashMap::new();
        deps.insert(PathBuf::from("a.test.ts"), vec![PathBuf::from("helper.ts")]);
        deps.insert(PathBuf::from("helper.ts"), vec![PathBuf::from("shared.ts")]);
        let resolver = FakeResolver(deps);

        let mut graph = DependencyGraph::new();
        graph.init(&[PathBuf::from("a.test.ts")], &resolver);

        assert!(graph.dependents_of(Path::new("shared.ts")).contains(&PathBuf::from("a.test.ts")));
        assert!(graph.dependents_of(Path::new("helper.ts")).contains(&PathBuf::from("a.test.ts")));
    }

    #[test]
    fn remove_from_graph_purges_every_dependent_set() {
        let mut deps = HashMap::new();
        deps.insert(PathBuf::from("a.test.ts"), vec![PathBuf::from("shared.ts")]);
        let resolver = FakeResolver(deps);

        let mut graph = DependencyGraph::new();
        graph.init(&[PathBuf::from("a.test.ts")], &resolver);
        assert!(graph.contains(Path::new("a.test.ts")));

        graph.remove_from_graph(Path::new("a.test.ts"));
        assert!(!graph.contains(Path::new("a.test.ts")));
        assert!(graph.dependents_of(Path::new("shared.ts")).is_empty());
    }

    #[test]
    fn link_dependency_terminates_on_cycles() {
        let mut deps = HashMap::new();
        deps.insert(PathBuf::from("a.ts"), vec![PathBuf::from("b.ts")]);
        deps.insert(PathBuf::from("b.ts"), vec![PathBuf::from("a.ts")]);
        let resolver = FakeResolver(deps);

        let mut graph = DependencyGraph::new();
        graph.update_graph(Path::new("a.ts"), true, &resolver);
        // Must return rather than loop forever.
        assert!(graph.contains(Path::new("b.ts")));
    }

    #[test]
    fn watch_state_drops_excluded_paths() {
        let filters = Filters::compile(&["**/*.test.ts".into()], &[], &["ignored/**".into()]).unwrap();
        let resolver = FakeResolver(HashMap::new());
        let state = WatchState::new(PathBuf::from("/root"), filters, &[], &resolver);
        state.on_fs_event(Path::new("/root/ignored/a.test.ts"));
        let marked = state.drain_and_resolve(&resolver);
        assert!(marked.is_empty());
    }
}
