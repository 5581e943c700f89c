//! JUnit XML reporter, built on `quick-junit` (the same crate the
//! nextest-style aggregators in this ecosystem use) rather than
//! hand-rolled XML escaping.

use super::{SuiteEndEvent, SuiteEvent, TestEndEvent};
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

struct AccSuite {
    runner: String,
    cases: Vec<TestCase>,
    duration_ms: u32,
    suite_error: Option<super::SuiteError>,
}

pub struct JunitReporter {
    output_file: Option<PathBuf>,
    suites: Mutex<BTreeMap<String, AccSuite>>,
}

impl JunitReporter {
    pub fn new(output_file: Option<PathBuf>) -> Self {
        Self { output_file, suites: Mutex::new(BTreeMap::new()) }
    }
}

impl super::Reporter for JunitReporter {
    fn suite_start(&self, event: &SuiteEvent) {
        self.suites.lock().unwrap().entry(event.suite.clone()).or_insert_with(|| AccSuite {
            runner: event.runner.clone(),
            cases: Vec::new(),
            duration_ms: 0,
            suite_error: None,
        });
    }

    fn suite_end(&self, event: &SuiteEndEvent) {
        let mut suites = self.suites.lock().unwrap();
        let acc = suites.entry(event.suite.clone()).or_insert_with(|| AccSuite {
            runner: event.runner.clone(),
            cases: Vec::new(),
            duration_ms: 0,
            suite_error: None,
        });
        acc.duration_ms = event.duration;
        acc.suite_error = event.error.clone();
    }

    fn test_end(&self, event: &TestEndEvent) {
        let mut status = if event.skipped {
            TestCaseStatus::skipped()
        } else if event.passed {
            TestCaseStatus::success()
        } else {
            let mut failure = TestCaseStatus::non_success(NonSuccessKind::Failure);
            if let Some(first) = event.errors.first() {
                failure.set_message(first.message.clone());
                if let Some(stack) = &first.stack {
                    failure.set_description(stack.clone());
                }
            }
            failure
        };
        status.set_type(if event.todo { "todo" } else { "test" });

        let mut case = TestCase::new(event.description.clone(), status);
        case.set_time(Duration::from_millis(event.duration as u64));
        if !event.ancestry.is_empty() {
            case.set_classname(event.ancestry.join("::"));
        }

        let mut suites = self.suites.lock().unwrap();
        let acc = suites.entry(event.suite.clone()).or_insert_with(|| AccSuite {
            runner: event.runner.clone(),
            cases: Vec::new(),
            duration_ms: 0,
            suite_error: None,
        });
        acc.cases.push(case);
    }

    fn finish(&self) {
        let suites = self.suites.lock().unwrap();
        let mut report = Report::new("xjet");
        for (name, acc) in suites.iter() {
            let mut suite = TestSuite::new(name.clone());
            suite.set_time(Duration::from_millis(acc.duration_ms as u64));
            for case in &acc.cases {
                suite.add_test_case(case.clone());
            }
            if let Some(error) = &acc.suite_error {
                for e in &error.errors {
                    let mut status = TestCaseStatus::non_success(NonSuccessKind::Error);
                    status.set_message(e.message.clone());
                    let mut case = TestCase::new(format!("{} (suite error)", e.name), status);
                    case.set_classname(acc.runner.clone());
                    suite.add_test_case(case);
                }
            }
            report.add_test_suite(suite);
        }

        let text = match report.to_string() {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(%err, "failed to serialize junit report");
                return;
            }
        };
        println!("{text}");
        if let Some(path) = &self.output_file {
            if let Err(err) = std::fs::write(path, &text) {
                tracing::error!(%err, path = %path.display(), "failed to write junit report");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::Reporter;

    #[test]
    fn accumulates_cases_per_suite() {
        let reporter = JunitReporter::new(None);
        reporter.suite_start(&SuiteEvent { suite: "s".into(), runner: "local".into() });
        reporter.test_end(&TestEndEvent {
            suite: "s".into(),
            runner: "local".into(),
            ancestry: vec![],
            description: "t".into(),
            duration: 5,
            passed: true,
            todo: false,
            skipped: false,
            errors: vec![],
        });
        let suites = reporter.suites.lock().unwrap();
        assert_eq!(suites["s"].cases.len(), 1);
    }
}
