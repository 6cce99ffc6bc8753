//! Analysis results: the per-test container grouping the test case, its
//! scenario set, the expanded statements, and any refactoring outcome,
//! together with the CSV and JSON encodings of all of it.

use serde::Serialize;
use tracing::{debug, error};

use crate::analysis::expand::{expand_statement, DefinitionCache, ExpandedStatement, StmtOrigin};
use crate::analysis::refactor::RefactorResult;
use crate::analysis::scenario::{identify_scenario_set, ScenarioSet};
use crate::analysis::testcase::TestCase;
use crate::gosrc::print::ToGo;
use crate::gosrc::tools::imported_packages;
use crate::project::Package;

/// Everything the analysis learned about one test case.
#[derive(Clone, Debug)]
pub struct AnalysisResult {
    pub test_case: TestCase,
    /// The recognized scenario set, when the body had statements at all.
    pub scenario_set: Option<ScenarioSet>,
    /// One expansion tree per top-level body statement.
    pub parsed_statements: Vec<ExpandedStatement>,
    /// Unquoted import paths of the defining file.
    pub imported_packages: Vec<String>,
    /// Populated by `attempt_refactoring`.
    pub refactor_result: RefactorResult,
}

impl AnalysisResult {
    pub fn is_table_driven(&self) -> bool {
        self.scenario_set
            .as_ref()
            .map(|ss| ss.is_table_driven())
            .unwrap_or(false)
    }
}

/// Analyze a test case: expand every top-level statement (restricted to
/// test-file definitions), recognize the scenario set, and collect imports.
pub fn analyze(tc: &TestCase, pkg: &Package, cache: &mut DefinitionCache) -> AnalysisResult {
    debug!(test = tc.test_name, file = ?tc.file_path, "analyzing test case");

    let mut result = AnalysisResult {
        test_case: tc.clone(),
        scenario_set: None,
        parsed_statements: Vec::new(),
        imported_packages: Vec::new(),
        refactor_result: RefactorResult::default(),
    };

    if tc.func_decl(pkg).is_none() {
        error!(test = tc.test_name, "cannot analyze test case with missing declaration");
        return result;
    }

    let stmts: Vec<_> = tc.statements(pkg).to_vec();
    for stmt in &stmts {
        let origin = StmtOrigin {
            file: tc.file,
            decl: tc.decl,
            span: stmt.span(),
        };
        result
            .parsed_statements
            .push(expand_statement(pkg, tc, stmt, origin, cache, true));
    }

    result.scenario_set = identify_scenario_set(tc, pkg, &result.parsed_statements);
    result.imported_packages = imported_packages(&pkg.files[tc.file].ast);

    result
}

/// CSV header row for analysis reports.
pub const ANALYZE_CSV_HEADERS: [&str; 13] = [
    "project",
    "filePath",
    "package",
    "name",
    "scenarioDataStructure",
    "scenarioCount",
    "scenarioNameField",
    "scenarioExpectedFields",
    "scenarioHasFunctionFields",
    "scenarioUsesSubtest",
    "refactorStrategy",
    "refactorStatus",
    "importedPackages",
];

impl AnalysisResult {
    /// Encode as one CSV record matching [`ANALYZE_CSV_HEADERS`].
    pub fn encode_csv(&self) -> Vec<String> {
        let tc = &self.test_case;
        let empty = ScenarioSet::default();
        let ss = self.scenario_set.as_ref().unwrap_or(&empty);
        let rr = &self.refactor_result;

        vec![
            tc.project_name.clone(),
            tc.file_path.display().to_string(),
            tc.package_name.clone(),
            tc.test_name.clone(),
            ss.data_structure.as_str().to_string(),
            ss.scenarios.len().to_string(),
            ss.name_field.clone(),
            ss.expected_fields.join(", "),
            ss.has_function_fields.to_string(),
            ss.uses_subtest.to_string(),
            rr.strategy.as_str().to_string(),
            rr.generation_status.as_str().to_string(),
            self.imported_packages.join(", "),
        ]
    }

    /// Encode as the per-test JSON document. AST nodes become formatted
    /// source strings; enums become their string forms.
    pub fn to_json(&self, pkg: &Package) -> serde_json::Value {
        let tc = &self.test_case;
        let func_decl = tc.func_decl(pkg).map(|f| f.to_go()).unwrap_or_default();

        let scenario_set = self.scenario_set.as_ref().map(|ss| ScenarioSetJson {
            scenario_type: ss
                .scenario_type
                .as_ref()
                .map(|t| t.to_string())
                .unwrap_or_default(),
            data_structure: ss.data_structure.as_str(),
            scenarios: ss.scenarios.iter().map(|s| s.to_go()).collect(),
            runner: ss
                .runner_range(pkg)
                .map(|r| {
                    crate::gosrc::ast::Stmt::Range(r.clone()).to_go()
                })
                .unwrap_or_default(),
            name_field: ss.name_field.clone(),
            expected_fields: ss.expected_fields.clone(),
            has_function_fields: ss.has_function_fields,
            uses_subtest: ss.uses_subtest,
        });

        let doc = AnalysisResultJson {
            test_case: TestCaseJson {
                project: &tc.project_name,
                package: &tc.package_name,
                file_path: tc.file_path.display().to_string(),
                name: &tc.test_name,
                func_decl,
            },
            scenario_set,
            parsed_statements: self
                .parsed_statements
                .iter()
                .map(expanded_to_json)
                .collect(),
            imported_packages: &self.imported_packages,
            refactor_result: RefactorResultJson {
                strategy: self.refactor_result.strategy.as_str(),
                generation_status: self.refactor_result.generation_status.as_str(),
                refactorings: self
                    .refactor_result
                    .refactorings
                    .iter()
                    .map(|r| r.text.clone())
                    .collect(),
                original_execution_result: self.refactor_result.original_execution_result.as_str(),
                refactored_execution_result: self
                    .refactor_result
                    .refactored_execution_result
                    .as_str(),
            },
        };

        serde_json::to_value(&doc).unwrap_or(serde_json::Value::Null)
    }
}

fn expanded_to_json(es: &ExpandedStatement) -> ExpandedStatementJson {
    ExpandedStatementJson {
        stmt: es.stmt.to_go(),
        children: es.children.iter().map(expanded_to_json).collect(),
    }
}

#[derive(Serialize)]
struct AnalysisResultJson<'a> {
    #[serde(rename = "testCase")]
    test_case: TestCaseJson<'a>,
    #[serde(rename = "scenarioSet")]
    scenario_set: Option<ScenarioSetJson>,
    #[serde(rename = "parsedStatements")]
    parsed_statements: Vec<ExpandedStatementJson>,
    #[serde(rename = "importedPackages")]
    imported_packages: &'a [String],
    #[serde(rename = "refactorResult")]
    refactor_result: RefactorResultJson,
}

#[derive(Serialize)]
struct TestCaseJson<'a> {
    project: &'a str,
    package: &'a str,
    #[serde(rename = "filePath")]
    file_path: String,
    name: &'a str,
    #[serde(rename = "funcDecl")]
    func_decl: String,
}

#[derive(Serialize)]
struct ScenarioSetJson {
    #[serde(rename = "scenarioType")]
    scenario_type: String,
    #[serde(rename = "dataStructure")]
    data_structure: &'static str,
    scenarios: Vec<String>,
    runner: String,
    #[serde(rename = "nameField")]
    name_field: String,
    #[serde(rename = "expectedFields")]
    expected_fields: Vec<String>,
    #[serde(rename = "hasFunctionFields")]
    has_function_fields: bool,
    #[serde(rename = "usesSubtest")]
    uses_subtest: bool,
}

#[derive(Serialize)]
struct ExpandedStatementJson {
    stmt: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<ExpandedStatementJson>,
}

#[derive(Serialize)]
struct RefactorResultJson {
    strategy: &'static str,
    #[serde(rename = "generationStatus")]
    generation_status: &'static str,
    refactorings: Vec<String>,
    #[serde(rename = "originalExecutionResult")]
    original_execution_result: &'static str,
    #[serde(rename = "refactoredExecutionResult")]
    refactored_execution_result: &'static str,
}
