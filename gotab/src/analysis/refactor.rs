//! Subtest refactoring: rewriting a table-driven test's runner loop so each
//! scenario runs as an independently-named subtest, then verifying the
//! rewrite by executing the test before and after the on-disk edit.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::analysis::execute::{TestExecutionResult, TestExecutor};
use crate::analysis::result::AnalysisResult;
use crate::gosrc::ast::*;
use crate::gosrc::print::ToGo;
use crate::gosrc::tools::{
    find_stmt_by_span, find_stmt_by_span_mut, new_call_expr_stmt, new_pointer_type,
    new_selector_expr, param_name_by_type, save_file_contents,
};
use crate::project::Package;
use crate::types::{is_basic, BasicKind};

/// A refactoring strategy that can be applied to a test case.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RefactorStrategy {
    #[default]
    None,
    /// Wrap the runner-loop body in a call to `t.Run()`.
    Subtest,
}

impl RefactorStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefactorStrategy::None => "none",
            RefactorStrategy::Subtest => "subtest",
        }
    }

    pub fn from_str(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "subtest" => RefactorStrategy::Subtest,
            "none" => RefactorStrategy::None,
            other => {
                warn!(strategy = other, "unknown refactoring strategy");
                RefactorStrategy::None
            }
        }
    }
}

/// The outcome of generating (not executing) a refactoring.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RefactorGenerationStatus {
    /// No refactoring was attempted.
    #[default]
    None,
    /// An internal invariant failed.
    Error,
    /// No usable scenario name field exists.
    BadFields,
    /// No `*testing.T`-style parameter was found in the runner's function.
    NoTester,
    /// The test's AST shape is unsupported.
    Fail,
    Success,
}

impl RefactorGenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefactorGenerationStatus::None => "none",
            RefactorGenerationStatus::Error => "error",
            RefactorGenerationStatus::BadFields => "badFields",
            RefactorGenerationStatus::NoTester => "noTester",
            RefactorGenerationStatus::Fail => "fail",
            RefactorGenerationStatus::Success => "success",
        }
    }
}

/// Restores a function declaration to its pre-refactor state. Present only
/// when the refactoring touched a helper function rather than the test
/// function itself.
#[derive(Clone, Debug)]
pub struct RestoreDecl {
    pub file: usize,
    pub decl: usize,
    original: FuncDecl,
}

impl RestoreDecl {
    /// Put the original declaration back into the package AST, matching by
    /// name like the forward replacement did.
    pub fn run(&self, pkg: &mut Package) {
        let Some(file) = pkg.files.get_mut(self.file) else {
            error!(file = self.file, "could not restore original function declaration");
            return;
        };
        if let Err(err) = crate::gosrc::tools::replace_func_decl(&mut file.ast, self.original.clone())
        {
            error!(%err, "failed to restore original function declaration");
        }
    }
}

/// One function rewritten by a refactoring.
#[derive(Clone, Debug)]
pub struct RefactoredFunction {
    /// Snapshot of the refactored declaration.
    pub func: FuncDecl,
    /// The declaration's printed source.
    pub text: String,
    pub file: usize,
    pub decl: usize,
    /// Absolute path of the enclosing file.
    pub file_path: PathBuf,
    /// AST restore step, `None` when the refactoring happened inside the
    /// test's own function.
    pub cleanup: Option<RestoreDecl>,
}

/// The result of a refactoring attempt.
#[derive(Clone, Debug, Default)]
pub struct RefactorResult {
    pub strategy: RefactorStrategy,
    pub generation_status: RefactorGenerationStatus,
    pub refactorings: Vec<RefactoredFunction>,
    pub original_execution_result: TestExecutionResult,
    pub refactored_execution_result: TestExecutionResult,
}

/// Attempt to refactor an analyzed test case with the given strategy.
///
/// On generation success the test is executed before and after the rewrite
/// is saved to disk; unless `keep_refactored_files` is set the original
/// file contents are restored afterwards, and helper-function ASTs are
/// always reverted so later analyses stay independent.
pub fn attempt_refactoring(
    ar: &mut AnalysisResult,
    pkg: &mut Package,
    strategy: RefactorStrategy,
    keep_refactored_files: bool,
    executor: &dyn TestExecutor,
) -> RefactorResult {
    let mut rr = RefactorResult {
        strategy,
        ..Default::default()
    };

    if strategy == RefactorStrategy::None {
        ar.refactor_result = rr.clone();
        return rr;
    }

    match strategy {
        RefactorStrategy::Subtest => {
            let candidate = ar
                .scenario_set
                .as_ref()
                .map(|ss| ss.is_table_driven() && !ss.uses_subtest)
                .unwrap_or(false);
            if !candidate {
                ar.refactor_result = rr.clone();
                return rr;
            }

            let (refactorings, status) = refactor_to_subtests(ar, pkg);
            rr.generation_status = status;
            rr.refactorings = refactorings;
            if status != RefactorGenerationStatus::Success {
                info!(
                    status = status.as_str(),
                    test = ar.test_case.test_name,
                    "issue performing subtest refactoring for test case"
                );
                ar.refactor_result = rr.clone();
                return rr;
            }
        }
        RefactorStrategy::None => unreachable!(),
    }

    info!(test = ar.test_case.test_name, "successfully generated a refactoring for test case");
    verify_refactoring(ar, pkg, &mut rr, keep_refactored_files, executor);
    ar.refactor_result = rr.clone();
    rr
}

/// Execute before, write the rewrite, execute after, and restore.
fn verify_refactoring(
    ar: &AnalysisResult,
    pkg: &mut Package,
    rr: &mut RefactorResult,
    keep_refactored_files: bool,
    executor: &dyn TestExecutor,
) {
    let tc = &ar.test_case;

    // Execution is slow, so it only happens once generation has succeeded.
    rr.original_execution_result = run_test(executor, ar, "before refactoring");

    // Group the rewritten declarations by file, then back up and overwrite
    // each file exactly once.
    let mut per_file: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for refactoring in &rr.refactorings {
        per_file
            .entry(refactoring.file)
            .or_default()
            .push(refactoring.decl);
    }

    let mut original_contents: BTreeMap<usize, Vec<u8>> = BTreeMap::new();
    let mut written: Vec<usize> = Vec::new();
    for (&file_idx, decls) in &per_file {
        let source_file = &pkg.files[file_idx];
        let contents = match fs::read(&source_file.path) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!(%err, file = ?source_file.path, test = tc.test_name, "error reading original file contents");
                restore_files(pkg, &original_contents, &written, tc);
                run_cleanups(pkg, rr);
                return;
            }
        };
        original_contents.insert(file_idx, contents);

        if let Err(err) =
            save_file_contents(&source_file.path, &source_file.ast, &source_file.source, decls)
        {
            error!(%err, file = ?source_file.path, test = tc.test_name, "error saving refactored file");
            restore_files(pkg, &original_contents, &written, tc);
            run_cleanups(pkg, rr);
            return;
        }
        written.push(file_idx);
    }

    rr.refactored_execution_result = run_test(executor, ar, "after refactoring");
    if rr.original_execution_result != rr.refactored_execution_result {
        warn!(
            original = rr.original_execution_result.as_str(),
            refactored = rr.refactored_execution_result.as_str(),
            test = tc.test_name,
            "refactored test case execution results do not match original results"
        );
    }

    // Restore disk state (unless asked to keep it) and always revert the
    // in-memory ASTs so refactorings don't interfere with each other.
    if !keep_refactored_files {
        restore_files(pkg, &original_contents, &written, tc);
    }
    run_cleanups(pkg, rr);
}

fn run_test(executor: &dyn TestExecutor, ar: &AnalysisResult, phase: &str) -> TestExecutionResult {
    let tc = &ar.test_case;
    match executor.execute(&tc.project_dir, &tc.test_name) {
        Ok(TestExecutionResult::Fail) => {
            info!(test = tc.test_name, "test case execution failed normally {phase}");
            TestExecutionResult::Fail
        }
        Ok(result) => result,
        Err(err) => {
            error!(%err, test = tc.test_name, "error executing test case {phase}");
            TestExecutionResult::Unknown
        }
    }
}

fn restore_files(
    pkg: &Package,
    original_contents: &BTreeMap<usize, Vec<u8>>,
    written: &[usize],
    tc: &crate::analysis::testcase::TestCase,
) {
    for file_idx in written {
        let Some(contents) = original_contents.get(file_idx) else {
            continue;
        };
        let path = &pkg.files[*file_idx].path;
        if let Err(err) = fs::write(path, contents) {
            error!(%err, file = ?path, test = tc.test_name, "error restoring original test file contents after refactoring");
        }
    }
}

fn run_cleanups(pkg: &mut Package, rr: &RefactorResult) {
    for refactoring in &rr.refactorings {
        if let Some(cleanup) = &refactoring.cleanup {
            cleanup.run(pkg);
        }
    }
}

/// Generate the subtest rewrite, mutating the package AST in place. When
/// the runner lives in a helper function the helper's original declaration
/// is snapshotted first and handed back as the cleanup step, isolating the
/// mutation from other tests that share the helper.
fn refactor_to_subtests(
    ar: &AnalysisResult,
    pkg: &mut Package,
) -> (Vec<RefactoredFunction>, RefactorGenerationStatus) {
    let tc = &ar.test_case;
    let Some(ss) = ar.scenario_set.as_ref() else {
        error!(test = tc.test_name, "cannot refactor test case that is not table-driven");
        return (Vec::new(), RefactorGenerationStatus::Error);
    };
    let Some(runner) = ss.runner else {
        error!(test = tc.test_name, "cannot refactor test case without a runner loop");
        return (Vec::new(), RefactorGenerationStatus::Error);
    };

    let Some(enclosing) = pkg
        .files
        .get(runner.file)
        .and_then(|f| f.ast.decls.get(runner.decl))
        .and_then(Decl::as_func)
    else {
        error!(test = tc.test_name, "cannot refactor test case with missing function declaration");
        return (Vec::new(), RefactorGenerationStatus::Error);
    };

    // A runner hosted outside the test function means we are about to edit
    // a helper shared with other tests: keep its original for restoration.
    let in_helper = (runner.file, runner.decl) != (tc.file, tc.decl);
    let cleanup = in_helper.then(|| {
        debug!(
            function = enclosing.name.name,
            test = tc.test_name,
            "statement is part of a helper function"
        );
        RestoreDecl {
            file: runner.file,
            decl: runner.decl,
            original: enclosing.clone(),
        }
    });

    // Loop variable extraction; only range loops are supported.
    let (key_name, value_name) = match find_stmt_by_span(enclosing.statements(), runner.span) {
        Some(Stmt::Range(range)) => {
            let key = range.key.as_ref().and_then(Expr::as_ident);
            let value = range.value.as_ref().and_then(Expr::as_ident);
            match (key, value) {
                (Some(k), Some(v)) => (k.name.clone(), v.name.clone()),
                _ => {
                    warn!(
                        test = tc.test_name,
                        "cannot refactor test case with range loop with nil key or value variable"
                    );
                    return (Vec::new(), RefactorGenerationStatus::Fail);
                }
            }
        }
        Some(other) => {
            warn!(
                test = tc.test_name,
                kind = ?std::mem::discriminant(other),
                "cannot refactor test case with unsupported loop type"
            );
            return (Vec::new(), RefactorGenerationStatus::Fail);
        }
        None => {
            error!(test = tc.test_name, "runner statement not locatable in its function");
            return (Vec::new(), RefactorGenerationStatus::Error);
        }
    };

    // Use the detected scenario name field, falling back to the first
    // string-typed struct field.
    let mut name_field = ss.name_field.clone();
    if name_field.is_empty() {
        for field in ss.fields() {
            if is_basic(&field.ty, BasicKind::String) {
                name_field = field.name.clone();
                break;
            }
        }
    }
    if name_field.is_empty() {
        debug!(test = tc.test_name, "no valid scenario name field was detected");
        return (Vec::new(), RefactorGenerationStatus::BadFields);
    }

    // The subtest name expression: either the (possibly renamed) map key,
    // or a field selector on the loop value like `tt.Name`.
    let mut renamed_key = None;
    let scenario_name_expr = if name_field == "map key" {
        let final_key = if key_name == "_" {
            renamed_key = Some("testName".to_string());
            "testName"
        } else {
            key_name.as_str()
        };
        Expr::Ident(Ident::new(final_key))
    } else {
        new_selector_expr(&value_name, &name_field)
    };

    // Find the tester parameter instead of hardcoding `t`.
    let tester = match param_name_by_type(
        enclosing,
        &[
            new_pointer_type("testing", "T"),
            new_pointer_type("require", "TestingT"),
        ],
    ) {
        Ok(name) => name,
        Err(_) => {
            warn!(
                function = enclosing.name.name,
                test = tc.test_name,
                "cannot refactor test case because a `*testing.T` parameter was not detected"
            );
            return (Vec::new(), RefactorGenerationStatus::NoTester);
        }
    };

    // Build the new loop body on clones of the original statements, turning
    // top-level `continue`s into `return`s: inside the subtest closure a
    // `continue` no longer compiles, while `return` keeps the skip-this-row
    // meaning.
    let Some(Stmt::Range(range)) = find_stmt_by_span(enclosing.statements(), runner.span) else {
        return (Vec::new(), RefactorGenerationStatus::Error);
    };
    let mut runner_statements = range.body.stmts.clone();
    rewrite_continues(&mut runner_statements);

    let t_run_call = new_call_expr_stmt(
        new_selector_expr(&tester, "Run"),
        vec![
            scenario_name_expr,
            Expr::FuncLit(FuncLit {
                params: vec![Field {
                    names: vec![Ident::new(&tester)],
                    ty: new_pointer_type("testing", "T"),
                    tag: None,
                    span: Span::SYNTHETIC,
                }],
                results: None,
                body: Block {
                    stmts: runner_statements,
                    span: Span::SYNTHETIC,
                },
                span: Span::SYNTHETIC,
            }),
        ],
    );

    // Apply the rewrite to the underlying AST.
    {
        let stmts = pkg.files[runner.file].ast.decls[runner.decl]
            .as_func_mut()
            .and_then(|f| f.body.as_mut())
            .map(|b| &mut b.stmts);
        let Some(stmts) = stmts else {
            return (Vec::new(), RefactorGenerationStatus::Error);
        };
        let Some(Stmt::Range(range)) = find_stmt_by_span_mut(stmts, runner.span) else {
            error!(test = tc.test_name, "runner statement not locatable for rewriting");
            return (Vec::new(), RefactorGenerationStatus::Error);
        };
        range.body.stmts = vec![t_run_call];
        if let Some(new_key) = &renamed_key {
            if let Some(Expr::Ident(key)) = range.key.as_mut() {
                key.name = new_key.clone();
            }
        }
    }

    // Snapshot the refactored declaration and refresh its printed form.
    let Some(refactored) = pkg.files[runner.file].ast.decls[runner.decl].as_func() else {
        return (Vec::new(), RefactorGenerationStatus::Error);
    };
    let result = RefactoredFunction {
        func: refactored.clone(),
        text: refactored.to_go(),
        file: runner.file,
        decl: runner.decl,
        file_path: pkg.files[runner.file].path.clone(),
        cleanup,
    };
    (vec![result], RefactorGenerationStatus::Success)
}

/// Replace unlabeled `continue` statements with bare `return`s, without
/// descending into nested loops where `continue` keeps its meaning.
fn rewrite_continues(stmts: &mut [Stmt]) {
    for stmt in stmts {
        match stmt {
            Stmt::Branch(branch)
                if branch.tok == BranchTok::Continue && branch.label.is_none() =>
            {
                *stmt = Stmt::Return(ReturnStmt {
                    results: Vec::new(),
                    span: Span::SYNTHETIC,
                });
            }
            Stmt::Range(_) | Stmt::For(_) => {}
            Stmt::If(i) => {
                if let Some(init) = i.init.as_deref_mut() {
                    rewrite_continues(std::slice::from_mut(init));
                }
                rewrite_continues(&mut i.body.stmts);
                if let Some(else_branch) = i.else_branch.as_deref_mut() {
                    rewrite_continues(std::slice::from_mut(else_branch));
                }
            }
            Stmt::Switch(sw) => {
                for case in &mut sw.cases {
                    rewrite_continues(&mut case.body);
                }
            }
            Stmt::Block(b) => rewrite_continues(&mut b.stmts),
            Stmt::Labeled(l) => rewrite_continues(std::slice::from_mut(&mut l.stmt)),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gosrc::tools::string_to_stmt;

    fn rewrite(src: &str) -> String {
        let mut stmt = string_to_stmt(src).unwrap();
        rewrite_continues(std::slice::from_mut(&mut stmt));
        stmt.to_go()
    }

    #[test]
    fn test_continue_becomes_return() {
        let out = rewrite("if skip {\n\tcontinue\n}");
        assert!(out.contains("return"));
        assert!(!out.contains("continue"));
    }

    #[test]
    fn test_labeled_continue_untouched() {
        let out = rewrite("if skip {\n\tcontinue outer\n}");
        assert!(out.contains("continue outer"));
    }

    #[test]
    fn test_continue_in_nested_loop_untouched() {
        let out = rewrite("for _, x := range xs {\n\tcontinue\n}");
        assert!(out.contains("continue"));
        assert!(!out.contains("return"));
    }

    #[test]
    fn test_strategy_round_trip() {
        assert_eq!(RefactorStrategy::from_str("Subtest"), RefactorStrategy::Subtest);
        assert_eq!(RefactorStrategy::from_str("none"), RefactorStrategy::None);
        assert_eq!(RefactorStrategy::from_str("bogus"), RefactorStrategy::None);
        assert_eq!(RefactorStrategy::Subtest.as_str(), "subtest");
    }
}
