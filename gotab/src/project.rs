//! Project loading: discovering Go packages under a directory and building
//! fully-lowered package handles with type information.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::gosrc::ast::GoFile;
use crate::gosrc::lower::{lower_file, Diagnostic};
use crate::parser::GoParser;
use crate::types::{build_package_types, FnScope, GoType, PackageTypes, Typing};

/// A position inside a loaded package: which file, and the byte offset in it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilePos {
    pub file: usize,
    pub offset: u32,
}

/// One parsed source file of a package.
#[derive(Clone, Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub source: String,
    pub ast: GoFile,
    /// Parse-level problems; a file with any diagnostic is skipped by the
    /// task driver.
    pub diagnostics: Vec<Diagnostic>,
}

impl SourceFile {
    /// 1-based line number of a byte offset.
    pub fn line_of(&self, offset: u32) -> usize {
        let offset = (offset as usize).min(self.source.len());
        self.source[..offset].bytes().filter(|b| *b == b'\n').count() + 1
    }

    /// Total number of lines in the file.
    pub fn line_count(&self) -> usize {
        if self.source.is_empty() {
            0
        } else {
            self.source.bytes().filter(|b| *b == b'\n').count() + 1
        }
    }

    pub fn is_test_file(&self) -> bool {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with("_test.go"))
            .unwrap_or(false)
    }

    /// Whether the file lives under a `vendor/` directory.
    pub fn is_vendored(&self) -> bool {
        self.path
            .components()
            .any(|c| c.as_os_str() == "vendor")
    }
}

/// One loaded package: its files, and the resolved type/object tables.
/// The handle lives for one directory's parse and is released when the task
/// finishes with the directory.
#[derive(Clone, Debug)]
pub struct Package {
    /// The package name as written in the `package` clause.
    pub name: String,
    pub dir: PathBuf,
    /// Fully-qualified import path, derived from the nearest `go.mod`.
    pub import_path: String,
    pub files: Vec<SourceFile>,
    pub types: PackageTypes,
}

impl Package {
    /// A typing context for expressions inside the given file.
    pub fn typing_for(&self, file: usize) -> Typing<'_> {
        Typing::new(&self.types, &self.files[file].ast.imports)
    }

    /// Convenience wrapper answering `type-of` for an expression occurring
    /// inside a function of this package. Nil-safe on every level: an
    /// unresolvable expression yields [`GoType::Invalid`].
    pub fn type_of(&self, file: usize, scope: Option<FnScope>, expr: &crate::gosrc::ast::Expr) -> GoType {
        self.typing_for(file).type_of(expr, scope)
    }
}

/// The file containing the given position, by linear range search.
pub fn enclosing_file(files: &[SourceFile], pos: FilePos) -> Option<&SourceFile> {
    files
        .get(pos.file)
        .filter(|f| f.ast.span.contains(pos.offset))
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.') && s.len() > 1)
        .unwrap_or(false)
}

/// Find the module path declared by the nearest `go.mod` at or above `dir`,
/// together with the directory containing it.
fn find_module(dir: &Path) -> Option<(String, PathBuf)> {
    let mut current = Some(dir);
    while let Some(d) = current {
        let candidate = d.join("go.mod");
        if candidate.is_file() {
            let contents = fs::read_to_string(&candidate).ok()?;
            for line in contents.lines() {
                let line = line.trim();
                if let Some(rest) = line.strip_prefix("module") {
                    let module = rest.trim().trim_matches('"').to_string();
                    if !module.is_empty() {
                        return Some((module, d.to_path_buf()));
                    }
                }
            }
            return None;
        }
        current = d.parent();
    }
    None
}

/// Derive the import path for a package directory.
fn import_path_for(dir: &Path) -> String {
    match find_module(dir) {
        Some((module, module_dir)) => match dir.strip_prefix(&module_dir) {
            Ok(rel) if rel.as_os_str().is_empty() => module,
            Ok(rel) => format!("{}/{}", module, rel.to_string_lossy().replace('\\', "/")),
            Err(_) => module,
        },
        None => dir.to_string_lossy().replace('\\', "/"),
    }
}

/// Load every package under `dir`, including test files. Each (directory,
/// package clause) pair becomes one [`Package`], so external `_test`
/// packages load separately from the package they exercise.
pub fn load_packages(dir: &Path) -> Result<Vec<Package>> {
    let mut grouped: BTreeMap<(PathBuf, String), Vec<SourceFile>> = BTreeMap::new();

    // The root itself is exempt from the hidden-name filter so projects in
    // dot-directories still load.
    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || (!is_hidden(e) && e.file_name() != "testdata"))
    {
        let entry = entry.context("reading directory entry")?;
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("go") {
            continue;
        }

        let source = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(err) => {
                warn!(file = ?path, %err, "skipping unreadable file");
                continue;
            }
        };
        let parser = match GoParser::parse(source.clone().into_bytes()) {
            Ok(p) => p,
            Err(err) => {
                warn!(file = ?path, %err, "skipping unparsable file");
                continue;
            }
        };
        let (ast, diagnostics) = lower_file(parser.root(), parser.code());
        let package_name = ast.package_name.name.clone();
        if package_name.is_empty() {
            debug!(file = ?path, "skipping file without a package clause");
            continue;
        }

        let parent = path.parent().unwrap_or(dir).to_path_buf();
        grouped
            .entry((parent, package_name))
            .or_default()
            .push(SourceFile {
                path: path.to_path_buf(),
                source,
                ast,
                diagnostics,
            });
    }

    let mut packages = Vec::new();
    for ((pkg_dir, name), mut files) in grouped {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        let asts: Vec<GoFile> = files.iter().map(|f| f.ast.clone()).collect();
        let types = build_package_types(&asts);
        let mut import_path = import_path_for(&pkg_dir);
        if name.ends_with("_test") {
            // External test packages share the directory but not the package.
            import_path.push_str("_test");
        }
        packages.push(Package {
            name,
            dir: pkg_dir,
            import_path,
            files,
            types,
        });
    }

    Ok(packages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_load_packages_groups_by_dir_and_name() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "go.mod", "module example.com/demo\n\ngo 1.22\n");
        write(temp.path(), "a/a.go", "package a\n\nfunc A() {}\n");
        write(
            temp.path(),
            "a/a_test.go",
            "package a\n\nimport \"testing\"\n\nfunc TestA(t *testing.T) {}\n",
        );
        write(temp.path(), "b/b.go", "package b\n\nfunc B() {}\n");

        let packages = load_packages(temp.path()).unwrap();
        assert_eq!(packages.len(), 2);
        let a = packages.iter().find(|p| p.name == "a").unwrap();
        assert_eq!(a.files.len(), 2);
        assert_eq!(a.import_path, "example.com/demo/a");
    }

    #[test]
    fn test_external_test_package_loads_separately() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "go.mod", "module example.com/demo\n");
        write(temp.path(), "x/x.go", "package x\n\nfunc X() {}\n");
        write(
            temp.path(),
            "x/x_ext_test.go",
            "package x_test\n\nimport \"testing\"\n\nfunc TestX(t *testing.T) {}\n",
        );

        let packages = load_packages(temp.path()).unwrap();
        assert_eq!(packages.len(), 2);
        assert!(packages.iter().any(|p| p.name == "x_test"));
    }

    #[test]
    fn test_file_with_errors_carries_diagnostics() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "go.mod", "module example.com/demo\n");
        write(temp.path(), "p/ok.go", "package p\n\nfunc Ok() {}\n");
        write(temp.path(), "p/bad.go", "package p\n\nfunc Broken( {\n");

        let packages = load_packages(temp.path()).unwrap();
        let pkg = &packages[0];
        let bad = pkg
            .files
            .iter()
            .find(|f| f.path.ends_with("bad.go"))
            .unwrap();
        assert!(!bad.diagnostics.is_empty());
        let ok = pkg.files.iter().find(|f| f.path.ends_with("ok.go")).unwrap();
        assert!(ok.diagnostics.is_empty());
    }

    #[test]
    fn test_line_helpers() {
        let file = SourceFile {
            path: PathBuf::from("x.go"),
            source: "package p\n\nfunc f() {\n}\n".to_string(),
            ast: GoFile {
                package_name: crate::gosrc::ast::Ident::new("p"),
                imports: Vec::new(),
                decls: Vec::new(),
                span: crate::gosrc::ast::Span::new(0, 0),
            },
            diagnostics: Vec::new(),
        };
        assert_eq!(file.line_of(0), 1);
        assert_eq!(file.line_of(10), 2);
        assert_eq!(file.line_count(), 4);
    }

    #[test]
    fn test_vendored_detection() {
        let file = SourceFile {
            path: PathBuf::from("proj/vendor/dep/dep.go"),
            source: String::new(),
            ast: GoFile {
                package_name: crate::gosrc::ast::Ident::new("dep"),
                imports: Vec::new(),
                decls: Vec::new(),
                span: crate::gosrc::ast::Span::new(0, 0),
            },
            diagnostics: Vec::new(),
        };
        assert!(file.is_vendored());
    }
}
