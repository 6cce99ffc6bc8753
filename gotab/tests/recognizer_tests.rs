//! End-to-end recognizer behavior over real on-disk fixtures.

mod common;

use common::{analyze_test, load_package_with_test, write_project};
use gotab::analysis::ScenarioDataStructure;
use gotab::types::GoType;

const INLINE_STRUCT_LIST: &str = r#"package demo

import "testing"

func TestAdd(t *testing.T) {
	cases := []struct {
		Name string
		A    int
		B    int
		Want int
	}{
		{"one", 1, 2, 3},
		{"two", 2, 2, 4},
	}
	for _, tt := range cases {
		if got := tt.A + tt.B; got != tt.Want {
			t.Fatalf("%s: %d", tt.Name, got)
		}
	}
}
"#;

#[test]
fn inline_struct_list_is_recognized() {
    let project = write_project(&[("demo/add_test.go", INLINE_STRUCT_LIST)]);
    let pkg = load_package_with_test(project.path(), "TestAdd");
    let result = analyze_test(&pkg, project.path(), "TestAdd");

    let ss = result.scenario_set.as_ref().unwrap();
    assert_eq!(ss.data_structure, ScenarioDataStructure::StructList);
    assert_eq!(ss.scenarios.len(), 2);
    assert_eq!(ss.name_field, "Name");
    assert_eq!(ss.expected_fields, vec!["Want".to_string()]);
    assert!(!ss.has_function_fields);
    assert!(!ss.uses_subtest);
    assert!(result.is_table_driven());
    assert!(result.imported_packages.contains(&"testing".to_string()));
}

#[test]
fn map_with_string_key_uses_map_key_name() {
    let src = r#"package demo

import "testing"

func TestLookup(t *testing.T) {
	expected := 1
	for name, v := range map[string]int{"a": 1, "b": 2} {
		if v != expected {
			t.Log(name)
		}
	}
}
"#;
    let project = write_project(&[("demo/lookup_test.go", src)]);
    let pkg = load_package_with_test(project.path(), "TestLookup");
    let result = analyze_test(&pkg, project.path(), "TestLookup");

    let ss = result.scenario_set.as_ref().unwrap();
    assert_eq!(ss.data_structure, ScenarioDataStructure::Map);
    assert_eq!(ss.name_field, "map key");
    assert_eq!(ss.scenarios.len(), 2);
    // The scenario type is the map's value underlying, struct or not.
    assert!(matches!(ss.scenario_type, Some(GoType::Basic(_))));
    assert!(result.is_table_driven());
}

#[test]
fn helper_hosted_runner_is_found_through_expansion() {
    let src = r#"package demo

import "testing"

type tc struct {
	Name string
	In   int
	Want int
}

func TestDouble(t *testing.T) {
	cases := []tc{
		{"one", 1, 2},
		{"two", 2, 4},
	}
	runCases(t, cases)
}

func runCases(t *testing.T, cases []tc) {
	for _, tt := range cases {
		if tt.In*2 != tt.Want {
			t.Errorf("%s", tt.Name)
		}
	}
}
"#;
    let project = write_project(&[("demo/double_test.go", src)]);
    let pkg = load_package_with_test(project.path(), "TestDouble");
    let result = analyze_test(&pkg, project.path(), "TestDouble");

    let ss = result.scenario_set.as_ref().unwrap();
    assert_eq!(ss.data_structure, ScenarioDataStructure::StructList);
    assert_eq!(ss.scenarios.len(), 2);
    assert_eq!(ss.name_field, "Name");

    // The runner lives in the helper declaration, not the test.
    let runner = ss.runner.unwrap();
    let helper = pkg.files[runner.file].ast.decls[runner.decl].as_func().unwrap();
    assert_eq!(helper.name.name, "runCases");
}

#[test]
fn existing_subtests_are_detected() {
    let src = r#"package demo

import "testing"

func TestNamed(t *testing.T) {
	cases := []struct {
		Desc string
		In   int
	}{
		{"first", 1},
		{"second", 2},
	}
	for _, tt := range cases {
		t.Run(tt.Desc, func(t *testing.T) {
			_ = tt.In
		})
	}
}
"#;
    let project = write_project(&[("demo/named_test.go", src)]);
    let pkg = load_package_with_test(project.path(), "TestNamed");
    let result = analyze_test(&pkg, project.path(), "TestNamed");

    let ss = result.scenario_set.as_ref().unwrap();
    assert!(ss.uses_subtest);
    // The t.Run name argument matches a struct field and wins.
    assert_eq!(ss.name_field, "Desc");
}

#[test]
fn index_loop_is_not_table_driven() {
    let src = r#"package demo

import "testing"

func TestIndexed(t *testing.T) {
	cases := []struct {
		Name string
	}{
		{"one"},
	}
	for i := 0; i < len(cases); i++ {
		t.Log(cases[i].Name)
	}
}
"#;
    let project = write_project(&[("demo/indexed_test.go", src)]);
    let pkg = load_package_with_test(project.path(), "TestIndexed");
    let result = analyze_test(&pkg, project.path(), "TestIndexed");

    let ss = result.scenario_set.as_ref().unwrap();
    assert_eq!(ss.data_structure, ScenarioDataStructure::None);
    assert!(ss.scenarios.is_empty());
    assert!(ss.scenario_type.is_none());
    assert!(!result.is_table_driven());
}

#[test]
fn scenarios_declared_at_file_level_are_found() {
    let src = r#"package demo

import "testing"

type scenario struct {
	Name   string
	Input  int
	Expect int
}

var scenarios = []scenario{
	{"a", 1, 1},
	{"b", 2, 2},
	{"c", 3, 3},
}

func TestFileLevel(t *testing.T) {
	for _, tt := range scenarios {
		if tt.Input != tt.Expect {
			t.Fail()
		}
	}
}
"#;
    let project = write_project(&[("demo/filelevel_test.go", src)]);
    let pkg = load_package_with_test(project.path(), "TestFileLevel");
    let result = analyze_test(&pkg, project.path(), "TestFileLevel");

    let ss = result.scenario_set.as_ref().unwrap();
    assert_eq!(ss.data_structure, ScenarioDataStructure::StructList);
    assert_eq!(ss.scenarios.len(), 3);
    assert_eq!(ss.expected_fields, vec!["Expect".to_string()]);
}

#[test]
fn function_typed_fields_are_flagged() {
    let src = r#"package demo

import "testing"

func TestChecks(t *testing.T) {
	cases := []struct {
		Name  string
		Check func(int) bool
	}{
		{"positive", func(n int) bool { return n > 0 }},
		{"negative", func(n int) bool { return n < 0 }},
	}
	for _, tt := range cases {
		if !tt.Check(1) {
			t.Error(tt.Name)
		}
	}
}
"#;
    let project = write_project(&[("demo/checks_test.go", src)]);
    let pkg = load_package_with_test(project.path(), "TestChecks");
    let result = analyze_test(&pkg, project.path(), "TestChecks");

    let ss = result.scenario_set.as_ref().unwrap();
    assert!(ss.has_function_fields);
}

#[test]
fn recursive_helpers_do_not_expand_forever() {
    let src = r#"package demo

import "testing"

func TestLoop(t *testing.T) {
	ping(t, 1)
}

func ping(t *testing.T, n int) {
	pong(t, n)
}

func pong(t *testing.T, n int) {
	ping(t, n)
}
"#;
    let project = write_project(&[("demo/loop_test.go", src)]);
    let pkg = load_package_with_test(project.path(), "TestLoop");
    let result = analyze_test(&pkg, project.path(), "TestLoop");

    // The call graph is mutually recursive; the expansion must terminate
    // with no function appearing twice on any root-to-leaf path.
    fn max_depth(es: &gotab::analysis::ExpandedStatement) -> usize {
        1 + es.children.iter().map(max_depth).max().unwrap_or(0)
    }
    let depth = result.parsed_statements.iter().map(max_depth).max().unwrap();
    assert!(depth <= 4, "expansion depth {depth} suggests a broken recursion guard");
}

#[test]
fn non_table_test_has_no_scenarios() {
    let src = r#"package demo

import "testing"

func TestPlain(t *testing.T) {
	if 1+1 != 2 {
		t.Fatal("arithmetic is broken")
	}
}
"#;
    let project = write_project(&[("demo/plain_test.go", src)]);
    let pkg = load_package_with_test(project.path(), "TestPlain");
    let result = analyze_test(&pkg, project.path(), "TestPlain");

    let ss = result.scenario_set.as_ref().unwrap();
    assert_eq!(ss.data_structure, ScenarioDataStructure::None);
    assert!(ss.scenarios.is_empty());
    assert!(!result.is_table_driven());
}
