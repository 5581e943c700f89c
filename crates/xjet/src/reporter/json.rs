//! JSON reporter: accumulates a `runner -> suite -> rootDescribe` tree
//! in memory and writes it once, at `finish()`.

use super::{DescribeEvent, LogMessage, Reporter, SuiteEndEvent, SuiteEvent, TestEndEvent, TestStartEvent};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Debug, Clone, Default, Serialize)]
struct DescribeNode {
    description: String,
    describes: Vec<DescribeNode>,
    tests: Vec<TestNode>,
}

#[derive(Debug, Clone, Serialize)]
struct TestNode {
    description: String,
    duration: u32,
    passed: bool,
    todo: bool,
    skipped: bool,
    errors: Vec<crate::error_envelope::SerializedError>,
}

#[derive(Debug, Clone, Default, Serialize)]
struct SuiteNode {
    duration: u32,
    passed: bool,
    root: DescribeNode,
    error: Option<crate::reporter::SuiteError>,
}

#[derive(Debug, Default, Serialize)]
struct Tree(BTreeMap<String, BTreeMap<String, SuiteNode>>);

impl Tree {
    fn suite_mut(&mut self, runner: &str, suite: &str) -> &mut SuiteNode {
        self.0.entry(runner.to_string()).or_default().entry(suite.to_string()).or_default()
    }

    /// Find the describe node addressed by `ancestry`, creating any
    /// missing intermediate nodes.
    fn describe_mut<'a>(root: &'a mut DescribeNode, ancestry: &[String]) -> &'a mut DescribeNode {
        let mut node = root;
        for name in ancestry {
            let idx = node.describes.iter().position(|d| &d.description == name);
            let idx = idx.unwrap_or_else(|| {
                node.describes.push(DescribeNode { description: name.clone(), ..Default::default() });
                node.describes.len() - 1
            });
            node = &mut node.describes[idx];
        }
        node
    }
}

pub struct JsonReporter {
    output_file: Option<PathBuf>,
    tree: Mutex<Tree>,
}

impl JsonReporter {
    pub fn new(output_file: Option<PathBuf>) -> Self {
        Self { output_file, tree: Mutex::new(Tree::default()) }
    }
}

impl Reporter for JsonReporter {
    fn suite_start(&self, event: &SuiteEvent) {
        let mut tree = self.tree.lock().unwrap();
        tree.suite_mut(&event.runner, &event.suite);
    }

    fn suite_end(&self, event: &SuiteEndEvent) {
        let mut tree = self.tree.lock().unwrap();
        let suite = tree.suite_mut(&event.runner, &event.suite);
        suite.duration = event.duration;
        suite.passed = event.error.is_none();
        suite.error = event.error.clone();
    }

    fn describe_end(&self, event: &DescribeEvent) {
        let mut tree = self.tree.lock().unwrap();
        let suite = tree.suite_mut(&event.runner, &event.suite);
        Tree::describe_mut(&mut suite.root, &event.ancestry);
    }

    fn test_end(&self, event: &TestEndEvent) {
        let mut tree = self.tree.lock().unwrap();
        let suite = tree.suite_mut(&event.runner, &event.suite);
        let node = Tree::describe_mut(&mut suite.root, &event.ancestry);
        node.tests.push(TestNode {
            description: event.description.clone(),
            duration: event.duration,
            passed: event.passed,
            todo: event.todo,
            skipped: event.skipped,
            errors: event.errors.clone(),
        });
    }

    fn finish(&self) {
        let tree = self.tree.lock().unwrap();
        let text = match serde_json::to_string_pretty(&*tree) {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(%err, "failed to serialize json reporter tree");
                return;
            }
        };
        println!("{text}");
        if let Some(path) = &self.output_file {
            if let Err(err) = std::fs::write(path, &text) {
                tracing::error!(%err, path = %path.display(), "failed to write json report");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_nested_describe_tree() {
        let reporter = JsonReporter::new(None);
        reporter.suite_start(&SuiteEvent { suite: "s".into(), runner: "local".into() });
        reporter.test_end(&TestEndEvent {
            suite: "s".into(),
            runner: "local".into(),
            ancestry: vec!["outer".into(), "inner".into()],
            description: "does a thing".into(),
            duration: 3,
            passed: true,
            todo: false,
            skipped: false,
            errors: vec![],
        });
        let tree = reporter.tree.lock().unwrap();
        let suite = &tree.0["local"]["s"];
        let outer = &suite.root.describes[0];
        assert_eq!(outer.description, "outer");
        let inner = &outer.describes[0];
        assert_eq!(inner.tests[0].description, "does a thing");
    }
}
