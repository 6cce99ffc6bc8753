//! Test-case analysis: the test-case model, statement expansion, scenario
//! recognition, refactoring, and host-toolchain execution.

pub mod execute;
pub mod expand;
pub mod refactor;
pub mod result;
pub mod scenario;
pub mod testcase;

pub use execute::{GoToolExecutor, TestExecutionResult, TestExecutor};
pub use expand::{DefinitionCache, ExpandedStatement};
pub use refactor::{
    attempt_refactoring, RefactorGenerationStatus, RefactorResult, RefactorStrategy,
    RefactoredFunction,
};
pub use result::{analyze, AnalysisResult, ANALYZE_CSV_HEADERS};
pub use scenario::{ScenarioDataStructure, ScenarioSet};
pub use testcase::{is_valid_test_case, TestCase};
