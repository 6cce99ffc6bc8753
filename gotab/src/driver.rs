//! The task driver: runs a [`ParseTask`] over every Go source file of a
//! project, optionally sharding top-level subdirectories across a bounded
//! worker pool with cooperative cancellation.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{bail, Context, Result};
use crossbeam::channel::unbounded;
use tracing::{debug, info, warn};

use crate::analysis::expand::DefinitionCache;
use crate::project::{load_packages, Package};

/// Driver-level control-flow errors.
#[derive(thiserror::Error, Debug)]
pub enum DriverError {
    #[error("parsing cancelled")]
    Cancelled,
}

/// Per-directory state owned by the driver and threaded through file
/// visits; holds the run's definition-lookup cache.
#[derive(Debug, Default)]
pub struct ParseContext {
    pub definitions: DefinitionCache,
}

/// A task that can be performed on all the Go source files in a project.
/// Implementations accumulate results across a directory and report them
/// once the directory is fully visited.
pub trait ParseTask: Send {
    /// The lowercase name of the task.
    fn name(&self) -> &str;

    /// Called for every visitable Go source file of a directory's packages.
    fn visit(&mut self, pkg: &mut Package, file: usize, cx: &mut ParseContext);

    /// Create a new instance with the same input flags. Shared output sinks
    /// may alias by reference provided they are thread-safe.
    fn clone_task(&self) -> Box<dyn ParseTask>;

    /// Called before the first visit of a directory run.
    fn set_project_dir(&mut self, dir: &Path);

    /// Called once per directory, after all its files were visited.
    fn report_results(&mut self) -> Result<()>;

    /// Release shared resources. Called exactly once, after every clone has
    /// finished.
    fn close(&mut self);
}

/// Run a task over a project directory.
///
/// With `split_by_dir`, each direct subdirectory of `root_dir` is parsed as
/// an independent project on a worker pool bounded by `threads`; the first
/// worker error cancels the remaining work and is surfaced. Without it, the
/// whole directory parses as one unit. `close` runs exactly once either way.
pub fn parse(
    task: &mut dyn ParseTask,
    root_dir: &Path,
    split_by_dir: bool,
    threads: usize,
) -> Result<()> {
    if root_dir.as_os_str().is_empty() {
        bail!("empty root directory provided");
    }
    if !root_dir.is_absolute() {
        bail!("root directory {root_dir:?} is not an absolute path");
    }
    if !root_dir.is_dir() {
        bail!("root directory {root_dir:?} does not exist or is not a directory");
    }

    info!(
        task = task.name(),
        project = ?root_dir,
        "============ running task on project ============"
    );

    let run = if split_by_dir {
        parse_split(task, root_dir, threads.max(1))
    } else {
        let cancel = AtomicBool::new(false);
        parse_dir(task, root_dir, &cancel)
    };

    if run.is_ok() {
        info!(task = task.name(), project = ?root_dir, "finished running the parser");
    }

    // Resources are shared across clones, so they are released exactly once
    // here regardless of how the run went.
    debug!("closing task resources");
    task.close();

    run
}

fn parse_split(task: &mut dyn ParseTask, root_dir: &Path, threads: usize) -> Result<()> {
    info!("parsing each top-level directory separately");

    let mut subdirs: Vec<PathBuf> = std::fs::read_dir(root_dir)
        .with_context(|| format!("reading project directory {root_dir:?}"))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.path())
        .collect();
    subdirs.sort();

    if subdirs.is_empty() {
        warn!(project = ?root_dir, "no subdirectories found in project directory");
        return Ok(());
    }

    info!(threads, "using worker threads for parsing");

    let cancel = Arc::new(AtomicBool::new(false));
    let first_error: Arc<Mutex<Option<anyhow::Error>>> = Arc::new(Mutex::new(None));
    let (sender, receiver) = unbounded::<PathBuf>();
    for dir in subdirs {
        sender.send(dir).expect("channel open");
    }
    drop(sender);

    thread::scope(|scope| {
        for i in 0..threads {
            let receiver = receiver.clone();
            let cancel = Arc::clone(&cancel);
            let first_error = Arc::clone(&first_error);
            // Each worker runs whole directories on its own task clone.
            let worker_task = task.clone_task();

            thread::Builder::new()
                .name(format!("DirWorker-{i}"))
                .spawn_scoped(scope, move || {
                    while let Ok(dir) = receiver.recv() {
                        if cancel.load(Ordering::Relaxed) {
                            continue;
                        }
                        let mut dir_task = worker_task.clone_task();
                        if let Err(err) = parse_dir(&mut *dir_task, &dir, &cancel) {
                            if err.downcast_ref::<DriverError>().is_some() {
                                continue;
                            }
                            let err = err.context(format!("parsing subdirectory {dir:?}"));
                            let mut slot = first_error.lock().unwrap();
                            if slot.is_none() {
                                *slot = Some(err);
                            }
                            cancel.store(true, Ordering::Relaxed);
                        }
                    }
                })
                .expect("failed to spawn worker thread");
        }
    });

    let taken = first_error.lock().unwrap().take();
    match taken {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Parse one directory: load its packages, visit every file the task should
/// see, and report results.
fn parse_dir(task: &mut dyn ParseTask, dir: &Path, cancel: &AtomicBool) -> Result<()> {
    if cancel.load(Ordering::Relaxed) {
        return Err(DriverError::Cancelled.into());
    }

    task.set_project_dir(dir);
    info!(dir = ?dir, "~~~~~ parsing directory ~~~~~");

    let mut packages =
        load_packages(dir).with_context(|| format!("loading packages in directory {dir:?}"))?;
    if packages.is_empty() {
        warn!(dir = ?dir, "no packages found in directory");
    }

    let mut cx = ParseContext::default();

    for pkg in &mut packages {
        for file_idx in 0..pkg.files.len() {
            if cancel.load(Ordering::Relaxed) {
                return Err(DriverError::Cancelled.into());
            }

            let file = &pkg.files[file_idx];
            if file.is_vendored() {
                debug!(file = ?file.path, "skipping vendored file");
                continue;
            }
            if !file.diagnostics.is_empty() {
                info!(
                    file = ?file.path,
                    errors = file.diagnostics.len(),
                    "skipping file with errors"
                );
                continue;
            }

            task.visit(pkg, file_idx, &mut cx);
        }
    }

    info!(dir = ?dir, "finished parsing all source files in directory");
    if let Err(err) = task.report_results() {
        tracing::error!(%err, "error reporting task results");
    }
    Ok(())
}
