//! Runtime resolution of the default output directory.
//!
//! Reports land next to the installed binary, unless the binary location is
//! transient (a `go run`-style temp dir, a debugger binary, or a build
//! cache), in which case the current working directory is used instead.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// Directory name for output files, relative to the program root.
const OUTPUT_DIR_NAME: &str = "output";

/// The default output directory: `<program root>/output`.
pub fn default_output_dir() -> Result<PathBuf> {
    Ok(program_root()
        .context("getting default output directory")?
        .join(OUTPUT_DIR_NAME))
}

/// Prepend the default output directory to relative paths; absolute paths
/// pass through unchanged.
pub fn prepend_default_output_dir(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(default_output_dir()?.join(path))
}

/// The directory the program's outputs should be rooted at.
fn program_root() -> Result<PathBuf> {
    let exe_path = env::current_exe().context("getting executable path")?;
    let exe_dir = exe_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let fallback = || -> Result<PathBuf> {
        let dir = env::current_dir().context("getting current working directory")?;
        debug!(path = ?dir, "falling back to current working directory as program root");
        Ok(dir)
    };

    let temp_dir = env::temp_dir();
    if exe_dir.starts_with(&temp_dir) {
        return fallback();
    }
    if exe_path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with("__debug_bin"))
        .unwrap_or(false)
    {
        return fallback();
    }

    match go_build_cache_dir() {
        Ok(cache_dir) if !cache_dir.as_os_str().is_empty() && exe_dir.starts_with(&cache_dir) => {
            return fallback();
        }
        Ok(_) => {}
        Err(err) => warn!(%err, "failed to get Go build cache directory"),
    }

    debug!(path = ?exe_dir, "using executable's directory as program root");
    Ok(exe_dir)
}

/// The Go build cache directory, from `go env GOCACHE`.
fn go_build_cache_dir() -> Result<PathBuf> {
    let output = Command::new("go")
        .args(["env", "GOCACHE"])
        .output()
        .context("running go env GOCACHE")?;
    let dir = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok(PathBuf::from(dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_path_passes_through() {
        let abs = if cfg!(windows) {
            PathBuf::from("C:\\reports\\out.csv")
        } else {
            PathBuf::from("/reports/out.csv")
        };
        assert_eq!(prepend_default_output_dir(&abs).unwrap(), abs);
    }

    #[test]
    fn test_relative_path_lands_under_output() {
        let resolved = prepend_default_output_dir(Path::new("report.csv")).unwrap();
        assert!(resolved.is_absolute());
        assert_eq!(
            resolved.parent().unwrap().file_name().unwrap(),
            OUTPUT_DIR_NAME
        );
    }
}
