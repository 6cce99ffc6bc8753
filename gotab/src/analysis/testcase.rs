//! The test-case model: a handle to one top-level test function inside a
//! loaded package.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use tracing::debug;

use crate::gosrc::ast::{Decl, Expr, FuncDecl, Stmt};
use crate::project::Package;

/// An immutable handle to one top-level test function. Holds locations into
/// the owning [`Package`] rather than nodes, so the package can be mutated
/// (and restored) by the refactorer while handles stay valid.
#[derive(Clone, Debug)]
pub struct TestCase {
    pub test_name: String,
    /// The package name as written in the source.
    pub package_name: String,
    /// Absolute path of the defining file.
    pub file_path: PathBuf,
    pub project_name: String,
    /// The directory of the project this test belongs to.
    pub project_dir: PathBuf,
    /// Index of the defining file in the package.
    pub file: usize,
    /// Index of the function declaration inside the file.
    pub decl: usize,
}

impl TestCase {
    /// Create a handle for the declaration at `(file, decl)`. Refuses to
    /// construct when the location does not name a function declaration.
    pub fn new(
        pkg: &Package,
        file: usize,
        decl: usize,
        project_name: &str,
        project_dir: &Path,
    ) -> Result<Self> {
        let Some(source_file) = pkg.files.get(file) else {
            bail!("cannot create test case: file index {file} out of bounds");
        };
        let Some(func) = source_file.ast.decls.get(decl).and_then(Decl::as_func) else {
            bail!("cannot create test case: declaration {decl} is not a function");
        };

        Ok(Self {
            test_name: func.name.name.clone(),
            package_name: source_file.ast.package_name.name.clone(),
            // The path is taken from the file, not the function, so it stays
            // stable across declaration rewrites.
            file_path: source_file.path.clone(),
            project_name: project_name.to_string(),
            project_dir: project_dir.to_path_buf(),
            file,
            decl,
        })
    }

    /// The function declaration node, looked up in the current package state.
    pub fn func_decl<'p>(&self, pkg: &'p Package) -> Option<&'p FuncDecl> {
        pkg.files
            .get(self.file)?
            .ast
            .decls
            .get(self.decl)
            .and_then(Decl::as_func)
    }

    /// The statements of the test body.
    pub fn statements<'p>(&self, pkg: &'p Package) -> &'p [Stmt] {
        self.func_decl(pkg).map(|f| f.statements()).unwrap_or(&[])
    }

    pub fn num_statements(&self, pkg: &Package) -> usize {
        self.statements(pkg).len()
    }

    /// The number of source lines the test function spans.
    pub fn num_lines(&self, pkg: &Package) -> usize {
        let Some(func) = self.func_decl(pkg) else {
            return 0;
        };
        let Some(file) = pkg.files.get(self.file) else {
            return 0;
        };
        file.line_of(func.span.end) - file.line_of(func.span.start) + 1
    }

    /// The repository-root part of the package import path: everything
    /// before the third slash (or the whole path with fewer segments).
    pub fn import_path_root(pkg: &Package) -> String {
        let path = &pkg.import_path;
        let mut slashes = 0;
        for (i, c) in path.char_indices() {
            if c == '/' {
                slashes += 1;
                if slashes == 3 {
                    return path[..i].to_string();
                }
            }
        }
        path.clone()
    }

    /// File name for this test's JSON report:
    /// `<project>/<project>_<package>_<testName>.json`.
    pub fn json_report_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.project_name).join(format!(
            "{}_{}_{}.json",
            self.project_name, self.package_name, self.test_name
        ))
    }
}

/// Decide whether a function declaration is a valid test case.
///
/// Returns `(valid, bad_format)`. A test is valid when its name starts with
/// `Test`, it has no receiver, no type parameters, no results, and exactly
/// one `*testing.T` parameter. `bad_format` marks names whose fifth
/// character is missing or not an ASCII capital; it is only a demotion and
/// is always false when `valid` is false.
pub fn is_valid_test_case(func: &FuncDecl) -> (bool, bool) {
    let name = &func.name.name;

    if !name.starts_with("Test") {
        return (false, false);
    }

    let bad_format = match name.as_bytes().get(4) {
        Some(c) => !c.is_ascii_uppercase(),
        None => true,
    };

    if func.recv.is_some() || func.has_type_params || func.results.is_some() {
        return (false, false);
    }

    if func.params.len() != 1 {
        return (false, false);
    }

    // The single parameter must be exactly `*testing.T`.
    let is_testing_t = match &func.params[0].ty {
        Expr::Star(star) => match star.x.as_ref() {
            Expr::Qualified(q) => q.pkg.name == "testing" && q.name.name == "T",
            _ => false,
        },
        _ => false,
    };
    if !is_testing_t {
        return (false, false);
    }

    debug!(name, "found valid test case");
    (true, bad_format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gosrc::tools::{string_to_node, ParsedNode};

    fn func_of(src: &str) -> FuncDecl {
        match string_to_node(src).unwrap() {
            ParsedNode::Decl(Decl::Func(f)) => f,
            other => panic!("expected function declaration, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_test_case() {
        let func = func_of("func TestAdd(t *testing.T) {}");
        assert_eq!(is_valid_test_case(&func), (true, false));
    }

    #[test]
    fn test_lowercase_fifth_char_is_bad_format_but_valid() {
        let func = func_of("func Testadd(t *testing.T) {}");
        assert_eq!(is_valid_test_case(&func), (true, true));
    }

    #[test]
    fn test_bare_test_name_is_bad_format() {
        let func = func_of("func Test(t *testing.T) {}");
        assert_eq!(is_valid_test_case(&func), (true, true));
    }

    #[test]
    fn test_result_disqualifies() {
        let func = func_of("func TestAdd(t *testing.T) error { return nil }");
        assert_eq!(is_valid_test_case(&func), (false, false));
    }

    #[test]
    fn test_receiver_disqualifies() {
        let func = func_of("func (s *suite) TestAdd(t *testing.T) {}");
        assert_eq!(is_valid_test_case(&func), (false, false));
    }

    #[test]
    fn test_wrong_param_type_disqualifies() {
        let func = func_of("func TestAdd(t *testing.TB) {}");
        assert_eq!(is_valid_test_case(&func), (false, false));
        let func = func_of("func TestAdd(t testing.T) {}");
        assert_eq!(is_valid_test_case(&func), (false, false));
    }

    #[test]
    fn test_non_test_prefix_disqualifies() {
        let func = func_of("func BenchmarkAdd(b *testing.B) {}");
        assert_eq!(is_valid_test_case(&func), (false, false));
    }

    #[test]
    fn test_extra_param_disqualifies() {
        let func = func_of("func TestAdd(t *testing.T, n int) {}");
        assert_eq!(is_valid_test_case(&func), (false, false));
    }
}
