//! Live-ish console reporter. ANSI/terminal rendering is out of scope
//! (spec.md §1 Non-goals), so this renders as a scrolling, line-oriented
//! log plus a `comfy-table` summary at `finish()` rather than redrawing
//! a fixed status region in place.

use super::{DescribeEvent, LogMessage, Reporter, SuiteEndEvent, SuiteEvent, TestEndEvent, TestStartEvent};
use comfy_table::{Cell, Table};
use std::sync::Mutex;

#[derive(Default)]
struct Counters {
    total: u32,
    passed: u32,
    failed: u32,
    skipped: u32,
    todo: u32,
    suites: u32,
}

pub struct ConsoleReporter {
    log_level: crate::config::LogLevel,
    counters: Mutex<Counters>,
    widest_runner: Mutex<usize>,
}

impl ConsoleReporter {
    pub fn new(log_level: crate::config::LogLevel, _output_file: Option<std::path::PathBuf>) -> Self {
        Self { log_level, counters: Mutex::new(Counters::default()), widest_runner: Mutex::new(0) }
    }

    fn runner_prefix(&self, runner: &str) -> String {
        let mut widest = self.widest_runner.lock().unwrap();
        *widest = (*widest).max(runner.len());
        if *widest == 0 {
            String::new()
        } else {
            format!("[{runner:<width$}] ", width = *widest)
        }
    }
}

impl Reporter for ConsoleReporter {
    fn init(&self, paths: &std::collections::BTreeMap<String, std::path::PathBuf>, runners: &[crate::target::RunnerInfo]) {
        if matches!(self.log_level, crate::config::LogLevel::Silent) {
            return;
        }
        println!("xjet: discovered {} suite(s) across {} runner(s)", paths.len(), runners.len());
    }

    fn suite_start(&self, event: &SuiteEvent) {
        if matches!(self.log_level, crate::config::LogLevel::Silent) {
            return;
        }
        self.counters.lock().unwrap().suites += 1;
        println!("{}RUNS  {}", self.runner_prefix(&event.runner), event.suite);
    }

    fn suite_end(&self, event: &SuiteEndEvent) {
        if matches!(self.log_level, crate::config::LogLevel::Silent) {
            return;
        }
        let status = if event.error.is_some() { "FAIL" } else { "PASS" };
        println!("{}{status}  {} ({} ms)", self.runner_prefix(&event.runner), event.suite, event.duration);
        if let Some(error) = &event.error {
            for e in &error.errors {
                println!("    {}: {}", e.name, e.message);
            }
        }
    }

    fn describe_start(&self, event: &DescribeEvent) {
        if matches!(self.log_level, crate::config::LogLevel::Debug) {
            println!("  describe {}", event.description);
        }
    }

    fn describe_end(&self, _event: &DescribeEvent) {}

    fn test_start(&self, event: &TestStartEvent) {
        if matches!(self.log_level, crate::config::LogLevel::Debug) {
            println!("    test {}", event.description);
        }
    }

    fn test_end(&self, event: &TestEndEvent) {
        let mut counters = self.counters.lock().unwrap();
        counters.total += 1;
        if event.skipped {
            counters.skipped += 1;
        } else if event.todo {
            counters.todo += 1;
        } else if event.passed {
            counters.passed += 1;
        } else {
            counters.failed += 1;
        }
        drop(counters);

        if matches!(self.log_level, crate::config::LogLevel::Silent) {
            return;
        }
        let mark = if event.skipped { "SKIP" } else if event.todo { "TODO" } else if event.passed { " OK " } else { "FAIL" };
        println!("      [{mark}] {} ({} ms)", event.description, event.duration);
    }

    fn log(&self, event: &LogMessage) {
        if matches!(self.log_level, crate::config::LogLevel::Silent) {
            return;
        }
        println!("{}[{}] {}", self.runner_prefix(&event.runner), event.level_id, event.message);
    }

    fn finish(&self) {
        let counters = self.counters.lock().unwrap();
        let mut table = Table::new();
        table.set_header(vec!["Suites", "Tests", "Passed", "Failed", "Skipped"]);
        table.add_row(vec![
            Cell::new(counters.suites),
            Cell::new(counters.total),
            Cell::new(counters.passed),
            Cell::new(counters.failed),
            Cell::new(counters.skipped),
        ]);
        println!("{table}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_totals_monotonically() {
        let reporter = ConsoleReporter::new(crate::config::LogLevel::Silent, None);
        reporter.test_end(&TestEndEvent {
            suite: "s".into(),
            runner: "local".into(),
            ancestry: vec![],
            description: "t1".into(),
            duration: 1,
            passed: true,
            todo: false,
            skipped: false,
            errors: vec![],
        });
        reporter.test_end(&TestEndEvent {
            suite: "s".into(),
            runner: "local".into(),
            ancestry: vec![],
            description: "t2".into(),
            duration: 1,
            passed: false,
            todo: false,
            skipped: false,
            errors: vec![],
        });
        let counters = reporter.counters.lock().unwrap();
        assert_eq!(counters.total, counters.passed + counters.failed + counters.skipped + counters.todo);
        assert_eq!(counters.passed, 1);
        assert_eq!(counters.failed, 1);
    }
}
