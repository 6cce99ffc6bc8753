//! The `analyze` command: per-test analysis, optional subtest refactoring,
//! per-test JSON documents, and a project summary.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::{error, warn};

use gotab::analysis::{
    analyze, attempt_refactoring, is_valid_test_case, RefactorGenerationStatus, RefactorStrategy,
    TestCase, TestExecutionResult, TestExecutor, ANALYZE_CSV_HEADERS,
};
use gotab::driver::{ParseContext, ParseTask};
use gotab::output::{FileFormat, FileWriter, Payload};
use gotab::project::Package;

use super::GlobalOptions;

/// Default report file for the analyze command.
pub const DEFAULT_OUTPUT: &str = "analyze_report.csv";

/// Analyzes every test case in a project, optionally refactoring
/// table-driven tests to use subtests.
pub struct AnalyzeTask {
    globals: GlobalOptions,
    strategy: RefactorStrategy,
    keep_refactored_files: bool,

    /// Shared by reference across clones; thread-safe.
    output: Arc<FileWriter>,
    executor: Arc<dyn TestExecutor>,

    /// Per-test CSV rows, encoded eagerly during visits.
    rows: Vec<Vec<String>>,
    test_count: usize,
    table_driven_count: usize,
    refactor_attempts: usize,
    generation_successes: usize,
    /// Refactors whose pre- and post-rewrite executions both passed.
    verified_successes: usize,
}

impl AnalyzeTask {
    pub fn new(
        globals: GlobalOptions,
        strategy: RefactorStrategy,
        keep_refactored_files: bool,
        output: Arc<FileWriter>,
        executor: Arc<dyn TestExecutor>,
    ) -> Self {
        Self {
            globals,
            strategy,
            keep_refactored_files,
            output,
            executor,
            rows: Vec::new(),
            test_count: 0,
            table_driven_count: 0,
            refactor_attempts: 0,
            generation_successes: 0,
            verified_successes: 0,
        }
    }

    fn report_lines(&self) -> Vec<String> {
        let mut lines = vec![
            String::new(),
            format!(
                "=============  Analysis Report for {:?}:  =============",
                self.globals.project_dir
            ),
            String::new(),
        ];

        if self.test_count == 0 {
            lines.push("No test cases found in the specified project.".to_string());
            return lines;
        }

        lines.push(format!("Number of test cases: {}", self.test_count));
        lines.push(format!("Table-driven test cases: {}", self.table_driven_count));
        lines.push(String::new());
        lines.push(format!("Refactoring strategy: {:?}", self.strategy.as_str()));
        lines.push(format!("Refactoring attempts: {}", self.refactor_attempts));
        lines.push(format!(
            "Refactoring generation successes: {}",
            self.generation_successes
        ));
        lines.push(format!(
            "Refactorings verified by execution: {}",
            self.verified_successes
        ));
        lines
    }
}

impl ParseTask for AnalyzeTask {
    fn name(&self) -> &str {
        "analyze"
    }

    fn visit(&mut self, pkg: &mut Package, file: usize, cx: &mut ParseContext) {
        let project_name = self.globals.project_name();

        // Only top-level declarations can be test functions.
        let decl_count = pkg.files[file].ast.decls.len();
        for decl_idx in 0..decl_count {
            let Some(func) = pkg.files[file].ast.decls[decl_idx].as_func() else {
                continue;
            };

            let (valid, bad_format) = is_valid_test_case(func);
            if !valid {
                continue;
            }
            if bad_format {
                warn!(
                    test = func.name.name,
                    file = ?pkg.files[file].path,
                    "test name is not of the form TestXxx"
                );
            }

            let tc = match TestCase::new(
                pkg,
                file,
                decl_idx,
                &project_name,
                &self.globals.project_dir,
            ) {
                Ok(tc) => tc,
                Err(err) => {
                    error!(%err, "failed to create test case");
                    continue;
                }
            };

            let mut result = analyze(&tc, pkg, &mut cx.definitions);
            self.test_count += 1;
            if result.is_table_driven() {
                self.table_driven_count += 1;
            }

            let refactor = attempt_refactoring(
                &mut result,
                pkg,
                self.strategy,
                self.keep_refactored_files,
                self.executor.as_ref(),
            );
            if refactor.strategy != RefactorStrategy::None
                && refactor.generation_status != RefactorGenerationStatus::None
            {
                self.refactor_attempts += 1;
                if refactor.generation_status == RefactorGenerationStatus::Success {
                    self.generation_successes += 1;
                    // A refactor only counts as verified when both runs pass;
                    // matching failures are logged but not counted.
                    if refactor.original_execution_result == TestExecutionResult::Pass
                        && refactor.refactored_execution_result == TestExecutionResult::Pass
                    {
                        self.verified_successes += 1;
                    }
                }
            }

            // The bulk of the data goes into one JSON document per test.
            let json_path = tc.json_report_path(&self.output.path_dir());
            if let Err(err) = gotab::output::write_to_file(
                &json_path,
                Payload::Json {
                    value: result.to_json(pkg),
                    flatten: false,
                },
            ) {
                error!(%err, test = tc.test_name, "saving test case analysis as JSON");
            }

            self.rows.push(result.encode_csv());
        }
    }

    fn clone_task(&self) -> Box<dyn ParseTask> {
        Box::new(AnalyzeTask::new(
            self.globals.clone(),
            self.strategy,
            self.keep_refactored_files,
            Arc::clone(&self.output),
            Arc::clone(&self.executor),
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
                if self.rows.is_empty() {
                    return Ok(());
                }
                let headers: Vec<String> =
                    ANALYZE_CSV_HEADERS.iter().map(|h| h.to_string()).collect();
                let payloads = self
                    .rows
                    .drain(..)
                    .map(|fields| Payload::Record {
                        fields,
                        headers: headers.clone(),
                    })
                    .collect();
                self.output.write_multiple(payloads)
            }
            _ => bail!("unsupported output format (file {:?})", self.output.path()),
        }
    }

    fn close(&mut self) {
        self.output.close();
    }
}
