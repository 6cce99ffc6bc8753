//! Task-level integration: the analyze and statistics tasks driven over
//! real on-disk fixtures.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use gotab::analysis::{TestExecutionResult, TestExecutor};
use gotab::output::FileWriter;

use gotab::analysis::RefactorStrategy;
use gotab_cli::commands::{AnalyzeTask, GlobalOptions, StatisticsTask};

/// Executor stub that always passes; keeps the tests toolchain-free.
struct AlwaysPass;

impl TestExecutor for AlwaysPass {
    fn execute(&self, _dir: &Path, _test: &str) -> anyhow::Result<TestExecutionResult> {
        Ok(TestExecutionResult::Pass)
    }
}

fn globals(project_dir: &Path, split: bool) -> GlobalOptions {
    GlobalOptions {
        project_dir: project_dir.to_path_buf(),
        output_path: None,
        append_output: false,
        split_by_dir: split,
        threads: 2,
    }
}

const SIMPLE_TEST: &str = r#"package %PKG%

import "testing"

func Test%NAME%(t *testing.T) {
	cases := []struct {
		Name string
		Want int
	}{
		{"one", 1},
		{"two", 2},
	}
	for _, tt := range cases {
		if tt.Want == 0 {
			t.Error(tt.Name)
		}
	}
}
"#;

fn write_test_package(root: &Path, pkg: &str, test: &str) {
    let dir = root.join(pkg);
    fs::create_dir_all(&dir).unwrap();
    let source = SIMPLE_TEST.replace("%PKG%", pkg).replace("%NAME%", test);
    fs::write(dir.join(format!("{pkg}_test.go")), source).unwrap();
    fs::write(
        dir.join(format!("{pkg}.go")),
        format!("package {pkg}\n\nfunc Used() int {{ return 1 }}\n"),
    )
    .unwrap();
}

#[test]
fn statistics_task_writes_one_csv_row() {
    let project = TempDir::new().unwrap();
    fs::write(project.path().join("go.mod"), "module example.com/stats\n").unwrap();
    write_test_package(project.path(), "alpha", "Alpha");

    let out = TempDir::new().unwrap();
    let report = out.path().join("statistics_report.csv");
    let writer = Arc::new(FileWriter::new(&report, false).unwrap());

    let mut task = StatisticsTask::new(globals(project.path(), false), writer);
    gotab::parse(&mut task, project.path(), false, 1).unwrap();

    let contents = fs::read_to_string(&report).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2, "expected header plus one row, got:\n{contents}");
    assert!(lines[0].starts_with("projectDir,testCases,testFiles"));
    let fields: Vec<&str> = lines[1].split(',').collect();
    assert_eq!(fields[1], "1", "one test case expected");
    assert_eq!(fields[2], "1", "one test file expected");
    assert_eq!(fields[3], "2", "two Go files expected");
}

#[test]
fn analyze_task_emits_csv_rows_and_json_documents() {
    let project = TempDir::new().unwrap();
    fs::write(project.path().join("go.mod"), "module example.com/one\n").unwrap();
    write_test_package(project.path(), "alpha", "Alpha");

    let out = TempDir::new().unwrap();
    let report = out.path().join("analyze_report.csv");
    let writer = Arc::new(FileWriter::new(&report, false).unwrap());

    let mut task = AnalyzeTask::new(
        globals(project.path(), false),
        RefactorStrategy::Subtest,
        false,
        Arc::clone(&writer),
        Arc::new(AlwaysPass),
    );
    gotab::parse(&mut task, project.path(), false, 1).unwrap();

    let contents = fs::read_to_string(&report).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].contains("TestAlpha"));
    assert!(lines[1].contains("structList"));
    assert!(lines[1].contains("subtest"));
    assert!(lines[1].contains("success"));

    let project_name = project.path().file_name().unwrap().to_string_lossy();
    let json_path = out
        .path()
        .join(project_name.as_ref())
        .join(format!("{project_name}_alpha_TestAlpha.json"));
    let doc: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(doc["scenarioSet"]["dataStructure"], "structList");
    assert_eq!(doc["refactorResult"]["generationStatus"], "success");
}

#[test]
fn split_by_dir_reports_each_subproject() {
    let project = TempDir::new().unwrap();
    fs::write(project.path().join("go.mod"), "module example.com/multi\n").unwrap();
    write_test_package(project.path(), "a", "A");
    write_test_package(project.path(), "b", "B");
    write_test_package(project.path(), "c", "C");
    // One subdirectory with a broken file: its file is skipped, the run
    // still succeeds.
    fs::write(
        project.path().join("c").join("broken.go"),
        "package c\n\nfunc Broken( {\n",
    )
    .unwrap();

    let out = TempDir::new().unwrap();
    let report = out.path().join("analyze_report.csv");
    let writer = Arc::new(FileWriter::new(&report, false).unwrap());

    let mut task = AnalyzeTask::new(
        globals(project.path(), true),
        RefactorStrategy::None,
        false,
        Arc::clone(&writer),
        Arc::new(AlwaysPass),
    );
    gotab::parse(&mut task, project.path(), true, 2).unwrap();

    let contents = fs::read_to_string(&report).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    // One shared header, then one row per subproject test.
    assert_eq!(lines.len(), 4, "got:\n{contents}");
    assert_eq!(
        lines.iter().filter(|l| l.starts_with("project,")).count(),
        1
    );

    for (dir, test) in [("a", "TestA"), ("b", "TestB"), ("c", "TestC")] {
        let json_path = out
            .path()
            .join(dir)
            .join(format!("{dir}_{dir}_{test}.json"));
        assert!(json_path.is_file(), "missing JSON report {json_path:?}");
    }
}