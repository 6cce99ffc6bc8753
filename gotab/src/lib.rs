//! gotab: table-driven test analysis and subtest refactoring for Go.
//!
//! The engine loads every package of a Go project (with syntax and type
//! information, test files included), identifies top-level unit tests,
//! classifies each as table-driven or not, and can rewrite the scenario
//! loop of a table-driven test so every row runs as a named `t.Run`
//! subtest. Rewrites are verified empirically: the test is executed through
//! the host `go` toolchain before and after the on-disk edit, and the
//! original sources are restored afterwards.
//!
//! # Example
//!
//! ```no_run
//! use gotab::analysis::{analyze, is_valid_test_case, DefinitionCache, TestCase};
//! use gotab::project::load_packages;
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let dir = Path::new("/path/to/project");
//! let mut cache = DefinitionCache::default();
//! for pkg in load_packages(dir)? {
//!     for (file_idx, file) in pkg.files.iter().enumerate() {
//!         for (decl_idx, decl) in file.ast.decls.iter().enumerate() {
//!             let Some(func) = decl.as_func() else { continue };
//!             let (valid, _) = is_valid_test_case(func);
//!             if !valid {
//!                 continue;
//!             }
//!             let tc = TestCase::new(&pkg, file_idx, decl_idx, "project", dir)?;
//!             let result = analyze(&tc, &pkg, &mut cache);
//!             println!("{}: table-driven = {}", tc.test_name, result.is_table_driven());
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod driver;
pub mod gosrc;
pub mod node;
pub mod output;
pub mod parser;
pub mod project;
pub mod types;

pub use analysis::{analyze, AnalysisResult, TestCase};
pub use driver::{parse, ParseContext, ParseTask};
pub use project::{load_packages, Package};
