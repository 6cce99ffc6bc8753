//! Command implementations: each subcommand is a [`gotab::ParseTask`] fed to
//! the task driver.

pub mod analyze;
pub mod statistics;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

pub use analyze::AnalyzeTask;
pub use statistics::StatisticsTask;

/// Validated global flags shared by every command.
#[derive(Clone, Debug)]
pub struct GlobalOptions {
    /// Absolute path to the project directory being analyzed. Reassigned
    /// per clone when splitting by directory.
    pub project_dir: PathBuf,
    /// Report output path; `None` selects the command's default file name.
    pub output_path: Option<PathBuf>,
    pub append_output: bool,
    pub split_by_dir: bool,
    pub threads: usize,
}

impl GlobalOptions {
    /// The name of the project currently being parsed.
    pub fn project_name(&self) -> String {
        self.project_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.project_dir.display().to_string())
    }
}

/// Strip the whitespace and quoting shells sometimes leave on path flags.
pub fn clean_path_flag(raw: &str) -> &str {
    raw.trim_matches(|c: char| c.is_whitespace() || c == '"')
}

/// Validate the project path: non-empty, resolvable to an absolute path,
/// and an existing directory.
pub fn validate_project_dir(raw: &str) -> Result<PathBuf> {
    let cleaned = clean_path_flag(raw);
    if cleaned.is_empty() {
        bail!("you must provide a path to a Go project (e.g., ./myproject)");
    }
    let absolute = std::fs::canonicalize(cleaned)
        .with_context(|| format!("error accessing project path {cleaned:?}"))?;
    if !absolute.is_dir() {
        bail!("provided project path {absolute:?} is not a directory");
    }
    Ok(absolute)
}

/// Resolve a non-empty output path flag to an absolute path.
pub fn validate_output_path(raw: &str) -> Result<Option<PathBuf>> {
    let cleaned = clean_path_flag(raw);
    if cleaned.is_empty() {
        return Ok(None);
    }
    let path = Path::new(cleaned);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("resolving absolute path for output file")?
            .join(path)
    };
    Ok(Some(absolute))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_path_flag() {
        assert_eq!(clean_path_flag("  \"./proj\" "), "./proj");
        assert_eq!(clean_path_flag("plain"), "plain");
    }

    #[test]
    fn test_validate_project_dir_rejects_empty() {
        assert!(validate_project_dir("   ").is_err());
    }

    #[test]
    fn test_validate_project_dir_rejects_missing() {
        assert!(validate_project_dir("/definitely/not/a/real/dir").is_err());
    }

    #[test]
    fn test_validate_output_path_absolutizes() {
        let resolved = validate_output_path("report.csv").unwrap().unwrap();
        assert!(resolved.is_absolute());
    }

    #[test]
    fn test_validate_output_path_empty_is_default() {
        assert!(validate_output_path("").unwrap().is_none());
    }
}
