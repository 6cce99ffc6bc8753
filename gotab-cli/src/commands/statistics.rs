//! The `statistics` command: project-level counters about test code.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};

use gotab::analysis::{is_valid_test_case, TestCase};
use gotab::driver::{ParseContext, ParseTask};
use gotab::output::{FileFormat, FileWriter, Payload};
use gotab::project::Package;
use tracing::error;

use super::GlobalOptions;

/// Default report file for the statistics command.
pub const DEFAULT_OUTPUT: &str = "statistics_report.csv";

const CSV_HEADERS: [&str; 7] = [
    "projectDir",
    "testCases",
    "testFiles",
    "totalFiles",
    "testLines",
    "avgLinesPerTest",
    "percentTestLines",
];

/// Collects statistics about a Go project's tests.
pub struct StatisticsTask {
    globals: GlobalOptions,

    /// Shared by reference across clones; thread-safe.
    output: Arc<FileWriter>,

    test_count: usize,
    test_file_count: usize,
    total_file_count: usize,
    total_test_lines: usize,
    total_lines: usize,
}

impl StatisticsTask {
    pub fn new(globals: GlobalOptions, output: Arc<FileWriter>) -> Self {
        Self {
            globals,
            output,
            test_count: 0,
            test_file_count: 0,
            total_file_count: 0,
            total_test_lines: 0,
            total_lines: 0,
        }
    }

    fn avg_test_lines(&self) -> f64 {
        if self.test_count == 0 {
            0.0
        } else {
            self.total_test_lines as f64 / self.test_count as f64
        }
    }

    fn percent_test_lines(&self) -> f64 {
        if self.total_lines == 0 {
            0.0
        } else {
            self.total_test_lines as f64 / self.total_lines as f64 * 100.0
        }
    }

    fn report_lines(&self) -> Vec<String> {
        let mut lines = vec![
            String::new(),
            format!(
                "=============  Statistics Report for {:?}:  =============",
                self.globals.project_dir
            ),
            String::new(),
        ];

        if self.test_count == 0 {
            lines.push("No test cases found in the specified project.".to_string());
            return lines;
        }

        lines.push(format!("Total number of test cases: {}", self.test_count));
        lines.push(String::new());
        lines.push(format!("Number of '_test.go' files: {}", self.test_file_count));
        lines.push(format!("Total number of Go files: {}", self.total_file_count));
        lines.push(String::new());
        lines.push(format!("Total lines of test code: {}", self.total_test_lines));
        lines.push(format!("Average lines per test case: {:.1}", self.avg_test_lines()));
        lines.push(format!(
            "Percentage of total lines for test cases: {:.1}%",
            self.percent_test_lines()
        ));
        lines
    }
}

impl ParseTask for StatisticsTask {
    fn name(&self) -> &str {
        "statistics"
    }

    fn visit(&mut self, pkg: &mut Package, file: usize, _cx: &mut ParseContext) {
        let project_name = self.globals.project_name();
        let source_file = &pkg.files[file];

        self.total_file_count += 1;
        if source_file.is_test_file() {
            self.test_file_count += 1;
        }
        self.total_lines += source_file.line_count();

        // Only top-level declarations can be test functions.
        for decl_idx in 0..source_file.ast.decls.len() {
            let Some(func) = pkg.files[file].ast.decls[decl_idx].as_func() else {
                continue;
            };
            let (valid, _) = is_valid_test_case(func);
            if !valid {
                continue;
            }

            match TestCase::new(pkg, file, decl_idx, &project_name, &self.globals.project_dir) {
                Ok(tc) => {
                    self.test_count += 1;
                    self.total_test_lines += tc.num_lines(pkg);
                }
                Err(err) => error!(%err, "failed to create test case"),
            }
        }
    }

    fn clone_task(&self) -> Box<dyn ParseTask> {
        Box::new(StatisticsTask::new(
            self.globals.clone(),
            Arc::clone(&self.output),
        ))
    }

    fn set_project_dir(&mut self, dir: &Path) {
        self.globals.project_dir = dir.to_path_buf();
    }

    fn report_results(&mut self) -> Result<()> {
        let lines = self.report_lines();
        println!("{}", lines.join("\n"));

        match self.output.format() {
            FileFormat::Txt => self.output.write(Payload::Lines(lines)),
            FileFormat::Csv => {
                let fields = vec![
                    self.globals.project_dir.display().to_string(),
                    self.test_count.to_string(),
                    self.test_file_count.to_string(),
                    self.total_file_count.to_string(),
                    self.total_test_lines.to_string(),
                    format!("{:.1}", self.avg_test_lines()),
                    format!("{:.1}", self.percent_test_lines()),
                ];
                self.output.write(Payload::Record {
                    fields,
                    headers: CSV_HEADERS.iter().map(|h| h.to_string()).collect(),
                })
            }
            _ => bail!("unsupported output format (file {:?})", self.output.path()),
        }
    }

    fn close(&mut self) {
        self.output.close();
    }
}
