//! Table-driven-test recognition.
//!
//! Multi-phase analysis over a test's expanded statements: find the runner
//! loop, classify the scenario container, locate the concrete scenario
//! expressions (which may live elsewhere in the file), and derive naming
//! and expectation properties.

use tracing::debug;

use crate::analysis::expand::ExpandedStatement;
use crate::analysis::testcase::TestCase;
use crate::gosrc::ast::*;
use crate::gosrc::tools::selector_func_call;
use crate::project::Package;
use crate::types::resolve::from_type_expr;
use crate::types::{identical, is_basic, BasicKind, FnScope, GoType};

/// The shape of the container a table-driven test ranges over.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScenarioDataStructure {
    #[default]
    None,
    /// A slice or array whose element unpoints to a struct.
    StructList,
    /// A map with any key type; the value need not be a struct.
    Map,
}

impl ScenarioDataStructure {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioDataStructure::None => "none",
            ScenarioDataStructure::StructList => "structList",
            ScenarioDataStructure::Map => "map",
        }
    }
}

/// A location reference to the runner loop inside the package.
#[derive(Clone, Copy, Debug)]
pub struct RunnerRef {
    pub file: usize,
    pub decl: usize,
    pub span: Span,
}

/// The set of scenarios defined by a table-driven test, plus derived
/// analysis results.
#[derive(Clone, Debug, Default)]
pub struct ScenarioSet {
    /// The underlying type of one scenario element, when recognized.
    pub scenario_type: Option<GoType>,
    pub data_structure: ScenarioDataStructure,
    /// The scenario expressions: slice/array elements, or the key/value
    /// entries for maps.
    pub scenarios: Vec<Expr>,
    /// The iteration statement executing one scenario per pass.
    pub runner: Option<RunnerRef>,

    /// The struct field naming each scenario, the literal `"map key"`, or
    /// empty when no name source was recognized.
    pub name_field: String,
    /// Struct fields that look like expected results.
    pub expected_fields: Vec<String>,
    /// Whether any scenario field's underlying type is a function.
    pub has_function_fields: bool,
    /// Whether the loop body already launches subtests via `t.Run`.
    pub uses_subtest: bool,
}

impl ScenarioSet {
    /// Whether the analyzed test is table-driven.
    pub fn is_table_driven(&self) -> bool {
        self.data_structure != ScenarioDataStructure::None
    }

    /// The fields of the scenario struct, or an empty slice when the
    /// scenario type is not a struct.
    pub fn fields(&self) -> &[crate::types::StructField] {
        self.scenario_type
            .as_ref()
            .and_then(|t| t.as_struct())
            .map(|s| s.fields.as_slice())
            .unwrap_or(&[])
    }

    /// Look up the runner as a range statement in the current package state.
    pub fn runner_range<'p>(&self, pkg: &'p Package) -> Option<&'p RangeStmt> {
        let runner = self.runner?;
        let func = pkg
            .files
            .get(runner.file)?
            .ast
            .decls
            .get(runner.decl)
            .and_then(Decl::as_func)?;
        match crate::gosrc::tools::find_stmt_by_span(func.statements(), runner.span)? {
            Stmt::Range(r) => Some(r),
            _ => None,
        }
    }
}

/// Identify the scenario set of a test case from its expanded statements.
/// Returns `None` when the body has no statements at all.
pub fn identify_scenario_set(
    tc: &TestCase,
    pkg: &Package,
    expanded: &[ExpandedStatement],
) -> Option<ScenarioSet> {
    if expanded.is_empty() {
        debug!(test = tc.test_name, "cannot identify scenario set without statements");
        return None;
    }

    let mut ss = ScenarioSet::default();

    // Phase A: find the runner loop, scanning in reverse since it is
    // typically the last statement. Expansion children are considered so a
    // runner hosted in a helper function is still found.
    'outer: for root in expanded.iter().rev() {
        for node in root.iter() {
            let Some(origin) = node.origin else { continue };
            let Stmt::Range(range) = &node.stmt else { continue };

            debug!(test = tc.test_name, "found range statement in test case");
            let ty = type_in_origin(pkg, origin, &range.x);
            detect_scenario_data_structure(&mut ss, pkg, &ty);

            if ss.data_structure == ScenarioDataStructure::None {
                debug!(
                    test = tc.test_name,
                    "range loop found, but the data structure is unknown"
                );
                continue;
            }

            // The container may be declared inline in the range clause.
            if range.x.as_composite().is_some()
                && identify_scenarios(&mut ss, pkg, origin, &range.x)
            {
                debug!(
                    test = tc.test_name,
                    scenarios = ss.scenarios.len(),
                    "found scenario definition directly in the range statement"
                );
            }

            ss.runner = Some(RunnerRef {
                file: origin.file,
                decl: origin.decl,
                span: node.stmt.span(),
            });
            break 'outer;
        }
        // `for i := 0; ...` index loops are deliberately not recognized.
    }

    // Phase B: find the scenario expressions, descending into expansions.
    if ss.scenarios.is_empty() && scenario_container_known(&ss) {
        'search: for root in expanded {
            for node in root.iter() {
                let Some(origin) = node.origin else { continue };
                match &node.stmt {
                    Stmt::Assign(assign) => {
                        for rhs in &assign.rhs {
                            if identify_scenarios(&mut ss, pkg, origin, rhs) {
                                debug!(
                                    test = tc.test_name,
                                    scenarios = ss.scenarios.len(),
                                    "found scenario definition in function body"
                                );
                                break 'search;
                            }
                        }
                    }
                    Stmt::Decl(decl) if decl.decl.tok == GenTok::Var => {
                        for spec in &decl.decl.specs {
                            let Spec::Value(vs) = spec else { continue };
                            for value in &vs.values {
                                if identify_scenarios(&mut ss, pkg, origin, value) {
                                    debug!(
                                        test = tc.test_name,
                                        scenarios = ss.scenarios.len(),
                                        "found scenario definition in function body"
                                    );
                                    break 'search;
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    // The scenarios may be declared at file level, outside any function.
    if ss.scenarios.is_empty() && scenario_container_known(&ss) {
        debug!(test = tc.test_name, "no scenarios found in the test case, checking file declarations");
        let file = &pkg.files[tc.file].ast;
        'decls: for (decl_idx, decl) in file.decls.iter().enumerate() {
            let Decl::Gen(gen) = decl else { continue };
            if gen.tok != GenTok::Var {
                continue;
            }
            for spec in &gen.specs {
                let Spec::Value(vs) = spec else { continue };
                for value in &vs.values {
                    let origin = crate::analysis::expand::StmtOrigin {
                        file: tc.file,
                        decl: decl_idx,
                        span: value.span(),
                    };
                    if identify_scenarios(&mut ss, pkg, origin, value) {
                        debug!(
                            test = tc.test_name,
                            scenarios = ss.scenarios.len(),
                            "found scenario definition in file declarations"
                        );
                        break 'decls;
                    }
                }
            }
        }
    }

    analyze_derived(&mut ss, pkg);
    Some(ss)
}

/// Whether the recognized container shape admits a scenario search: struct
/// scenarios for lists, anything for maps.
fn scenario_container_known(ss: &ScenarioSet) -> bool {
    match ss.data_structure {
        ScenarioDataStructure::None => false,
        ScenarioDataStructure::StructList => {
            matches!(ss.scenario_type, Some(GoType::Struct(_)))
        }
        ScenarioDataStructure::Map => ss.scenario_type.is_some(),
    }
}

fn type_in_origin(pkg: &Package, origin: crate::analysis::expand::StmtOrigin, expr: &Expr) -> GoType {
    let scope = pkg
        .files
        .get(origin.file)
        .and_then(|f| f.ast.decls.get(origin.decl))
        .and_then(Decl::as_func)
        .map(|func| FnScope {
            func,
            at: expr.span().start,
        });
    pkg.type_of(origin.file, scope, expr)
}

/// Classify the ranged-over type and record the scenario element type.
/// For maps with a basic-string key, the key doubles as the scenario name.
fn detect_scenario_data_structure(ss: &mut ScenarioSet, pkg: &Package, ty: &GoType) {
    let table = &pkg.types.table;
    ss.data_structure = ScenarioDataStructure::None;
    ss.scenario_type = None;

    if !ty.is_valid() {
        return;
    }

    match table.underlying(ty) {
        GoType::Slice(elem) | GoType::Array(_, elem) => {
            let elem = table.underlying(&table.unpointer(&elem));
            if let GoType::Struct(_) = elem {
                ss.data_structure = ScenarioDataStructure::StructList;
                ss.scenario_type = Some(elem);
            }
        }
        GoType::Map(key, value) => {
            ss.data_structure = ScenarioDataStructure::Map;
            ss.scenario_type = Some(table.underlying(&table.unpointer(&value)));
            if is_basic(&key, BasicKind::String) {
                ss.name_field = "map key".to_string();
            }
        }
        _ => {}
    }
}

/// Check whether an expression is a matching scenario container literal and,
/// if so, record its scenarios. Always false while the data structure is
/// unknown.
fn identify_scenarios(
    ss: &mut ScenarioSet,
    pkg: &Package,
    origin: crate::analysis::expand::StmtOrigin,
    expr: &Expr,
) -> bool {
    let Some(scenario_type) = ss.scenario_type.clone() else {
        return false;
    };
    let Expr::Composite(lit) = expr else {
        return false;
    };
    if lit.elts.is_empty() {
        return false;
    }

    let table = &pkg.types.table;
    let container_ty = match &lit.ty {
        Some(ty) => from_type_expr(ty),
        None => type_in_origin(pkg, origin, expr),
    };
    let container_underlying = table.underlying(&container_ty);

    match ss.data_structure {
        ScenarioDataStructure::StructList => {
            let elem_ty = element_type(pkg, &container_underlying, &lit.elts[0], ElementRole::Element);
            if identical(&table.underlying(&elem_ty), &scenario_type) {
                ss.scenarios = lit.elts.clone();
                return true;
            }
        }
        ScenarioDataStructure::Map => {
            let Expr::KeyValue(kv) = &lit.elts[0] else {
                return false;
            };
            let value_ty = element_type(pkg, &container_underlying, &kv.value, ElementRole::MapValue);
            if identical(&table.underlying(&value_ty), &scenario_type) {
                ss.scenarios = lit
                    .elts
                    .iter()
                    .filter(|e| matches!(e, Expr::KeyValue(_)))
                    .cloned()
                    .collect();
                return true;
            }
        }
        ScenarioDataStructure::None => {}
    }
    false
}

enum ElementRole {
    Element,
    MapValue,
}

/// The type of one element of a container literal: its own explicit type if
/// it has one, otherwise the element/value type inherited from the
/// container.
fn element_type(pkg: &Package, container: &GoType, elt: &Expr, role: ElementRole) -> GoType {
    if let Expr::Composite(lit) = elt {
        if let Some(ty) = &lit.ty {
            return from_type_expr(ty);
        }
    }
    if let Expr::Unary(u) = elt {
        if u.op == "&" {
            if let Expr::Composite(lit) = u.x.as_ref() {
                if let Some(ty) = &lit.ty {
                    return GoType::Pointer(Box::new(from_type_expr(ty)));
                }
            }
        }
    }
    let inherited = match (role, container) {
        (ElementRole::Element, GoType::Slice(e)) => Some(e.as_ref().clone()),
        (ElementRole::Element, GoType::Array(_, e)) => Some(e.as_ref().clone()),
        (ElementRole::MapValue, GoType::Map(_, v)) => Some(v.as_ref().clone()),
        _ => None,
    };
    match inherited {
        Some(ty) => pkg.types.table.unpointer(&ty),
        None => GoType::Invalid,
    }
}

/// Derived properties: subtest usage, name field, expected fields, function
/// fields. Only meaningful once a scenario type was recognized.
fn analyze_derived(ss: &mut ScenarioSet, pkg: &Package) {
    if ss.scenario_type.is_none() {
        return;
    }

    let trun_call = detect_subtest(ss, pkg);
    ss.uses_subtest = trun_call.is_some();
    ss.name_field = detect_name_field(ss, trun_call.as_ref());
    ss.expected_fields = detect_expected_fields(ss);
    ss.has_function_fields = detect_function_fields(ss, pkg);
}

/// A `t.Run(...)` call at the top level of the runner body, if present.
/// The receiver is matched as the literal identifier `t`.
fn detect_subtest(ss: &ScenarioSet, pkg: &Package) -> Option<CallExpr> {
    let range = ss.runner_range(pkg)?;
    for stmt in &range.body.stmts {
        if let Some(call) = selector_func_call(stmt, "t", "Run") {
            return Some(call.clone());
        }
    }
    None
}

fn detect_name_field(ss: &ScenarioSet, trun_call: Option<&CallExpr>) -> String {
    // A string map key claimed the name during data-structure detection.
    if ss.data_structure == ScenarioDataStructure::Map && !ss.name_field.is_empty() {
        return ss.name_field.clone();
    }

    // An existing subtest call names its own scenarios: a selector field
    // that matches a struct field wins over any substring heuristic.
    if let Some(call) = trun_call {
        if let Some(Expr::Selector(sel)) = call.args.first() {
            if ss.fields().iter().any(|f| f.name == sel.sel.name) {
                return sel.sel.name.clone();
            }
        }
        return String::new();
    }

    for field in ss.fields() {
        let lower = field.name.to_lowercase();
        if (lower.contains("name") || lower.contains("desc"))
            && is_basic(&field.ty, BasicKind::String)
        {
            return field.name.clone();
        }
    }
    String::new()
}

fn detect_expected_fields(ss: &ScenarioSet) -> Vec<String> {
    ss.fields()
        .iter()
        .filter(|f| {
            let lower = f.name.to_lowercase();
            lower.contains("expect") || lower.contains("want") || lower.contains("result")
        })
        .map(|f| f.name.clone())
        .collect()
}

fn detect_function_fields(ss: &ScenarioSet, pkg: &Package) -> bool {
    ss.fields()
        .iter()
        .any(|f| matches!(pkg.types.table.underlying(&f.ty), GoType::Signature(_)))
}
