//! Host-toolchain test execution.
//!
//! Runs a project's tests through `go test -json`, scoped to a single test
//! function, and maps the NDJSON event stream to a coarse outcome.

use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

/// The outcome of running one test function.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TestExecutionResult {
    #[default]
    Unknown,
    Pass,
    Fail,
}

impl TestExecutionResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestExecutionResult::Unknown => "unknown",
            TestExecutionResult::Pass => "pass",
            TestExecutionResult::Fail => "fail",
        }
    }
}

/// Something that can execute a single named test inside a project
/// directory. The refactorer is generic over this seam so verification can
/// be exercised without a Go toolchain.
pub trait TestExecutor: Send + Sync {
    /// Run the named test. `Ok(Fail)` is a normal test failure; `Err` is an
    /// abnormal toolchain problem and maps to `Unknown` at the caller.
    fn execute(&self, project_dir: &Path, test_name: &str) -> Result<TestExecutionResult>;
}

/// Executes tests with the host `go` toolchain.
#[derive(Clone, Copy, Debug, Default)]
pub struct GoToolExecutor;

impl TestExecutor for GoToolExecutor {
    fn execute(&self, project_dir: &Path, test_name: &str) -> Result<TestExecutionResult> {
        let pattern = format!("^{test_name}$");
        debug!(test = test_name, dir = ?project_dir, "running go test");

        let output = Command::new("go")
            .args(["test", "-json", "-count=1", "-run", &pattern, "./..."])
            .current_dir(project_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .context("failed to spawn go test")?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_test_events(&stdout, test_name))
    }
}

/// A single event from `go test -json` output.
#[derive(Debug, Deserialize)]
struct GoTestEvent {
    #[serde(rename = "Action")]
    action: String,
    #[serde(rename = "Test")]
    test: Option<String>,
}

/// Fold the NDJSON event stream into an outcome for one test. A `fail`
/// action for the test (or any of its subtests) wins over `pass`; a stream
/// that never mentions the test yields `Unknown`.
fn parse_test_events(stdout: &str, test_name: &str) -> TestExecutionResult {
    let mut result = TestExecutionResult::Unknown;

    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(event) = serde_json::from_str::<GoTestEvent>(line) else {
            continue;
        };
        let Some(test) = &event.test else {
            continue;
        };
        // Subtests report as `TestName/subtest`.
        if test != test_name && !test.starts_with(&format!("{test_name}/")) {
            continue;
        }
        match event.action.as_str() {
            "fail" => return TestExecutionResult::Fail,
            "pass" if result == TestExecutionResult::Unknown => {
                result = TestExecutionResult::Pass;
            }
            _ => {}
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pass_events() {
        let stream = concat!(
            r#"{"Action":"run","Test":"TestAdd"}"#,
            "\n",
            r#"{"Action":"output","Test":"TestAdd","Output":"=== RUN TestAdd\n"}"#,
            "\n",
            r#"{"Action":"pass","Test":"TestAdd","Elapsed":0.01}"#,
            "\n",
            r#"{"Action":"pass","Elapsed":0.02}"#,
            "\n",
        );
        assert_eq!(parse_test_events(stream, "TestAdd"), TestExecutionResult::Pass);
    }

    #[test]
    fn test_parse_fail_wins_over_pass() {
        let stream = concat!(
            r#"{"Action":"pass","Test":"TestAdd/one"}"#,
            "\n",
            r#"{"Action":"fail","Test":"TestAdd"}"#,
            "\n",
        );
        assert_eq!(parse_test_events(stream, "TestAdd"), TestExecutionResult::Fail);
    }

    #[test]
    fn test_parse_subtest_failure_counts() {
        let stream = r#"{"Action":"fail","Test":"TestAdd/two"}"#;
        assert_eq!(parse_test_events(stream, "TestAdd"), TestExecutionResult::Fail);
    }

    #[test]
    fn test_parse_other_test_ignored() {
        let stream = r#"{"Action":"fail","Test":"TestOther"}"#;
        assert_eq!(
            parse_test_events(stream, "TestAdd"),
            TestExecutionResult::Unknown
        );
    }

    #[test]
    fn test_parse_malformed_lines_skipped() {
        let stream = "not json\n{\"Action\":\"pass\",\"Test\":\"TestAdd\"}\n";
        assert_eq!(parse_test_events(stream, "TestAdd"), TestExecutionResult::Pass);
    }
}
