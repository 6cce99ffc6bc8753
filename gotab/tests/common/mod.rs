//! Shared fixtures for integration tests: tiny Go projects on disk and a
//! scripted test executor.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use tempfile::TempDir;

use gotab::analysis::{
    analyze, is_valid_test_case, AnalysisResult, DefinitionCache, TestCase, TestExecutionResult,
    TestExecutor,
};
use gotab::project::{load_packages, Package};

/// Write a Go project into a fresh temp dir. Paths are relative; a go.mod
/// is added automatically.
pub fn write_project(files: &[(&str, &str)]) -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("go.mod"), "module example.com/fixture\n\ngo 1.22\n").unwrap();
    for (rel, contents) in files {
        let path = temp.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }
    temp
}

/// Load the package containing the given test function.
pub fn load_package_with_test(dir: &Path, test_name: &str) -> Package {
    let packages = load_packages(dir).unwrap();
    packages
        .into_iter()
        .find(|p| find_test(p, test_name).is_some())
        .unwrap_or_else(|| panic!("no package contains {test_name}"))
}

/// Locate a valid test function by name inside a package.
pub fn find_test(pkg: &Package, name: &str) -> Option<(usize, usize)> {
    for (file_idx, file) in pkg.files.iter().enumerate() {
        for (decl_idx, decl) in file.ast.decls.iter().enumerate() {
            if let Some(func) = decl.as_func() {
                if func.name.name == name && is_valid_test_case(func).0 {
                    return Some((file_idx, decl_idx));
                }
            }
        }
    }
    None
}

/// Build a test case and run the analysis for it.
pub fn analyze_test(pkg: &Package, dir: &Path, name: &str) -> AnalysisResult {
    let (file, decl) = find_test(pkg, name).unwrap_or_else(|| panic!("test {name} not found"));
    let tc = TestCase::new(pkg, file, decl, "fixture", dir).unwrap();
    let mut cache = DefinitionCache::default();
    analyze(&tc, pkg, &mut cache)
}

/// A scripted executor: pops pre-seeded results, defaulting to `Pass`, and
/// records every invocation.
#[derive(Default)]
pub struct StubExecutor {
    results: Mutex<VecDeque<TestExecutionResult>>,
    pub calls: Mutex<Vec<String>>,
}

impl StubExecutor {
    pub fn with_results(results: &[TestExecutionResult]) -> Self {
        Self {
            results: Mutex::new(results.iter().copied().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl TestExecutor for StubExecutor {
    fn execute(&self, _dir: &Path, test_name: &str) -> anyhow::Result<TestExecutionResult> {
        self.calls.lock().unwrap().push(test_name.to_string());
        Ok(self
            .results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(TestExecutionResult::Pass))
    }
}
