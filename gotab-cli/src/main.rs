//! gotab - analyze and refactor table-driven Go tests.
//!
//! ```bash
//! # Collect statistics about a project's tests
//! gotab statistics -p ./myproject
//!
//! # Analyze every test and refactor table-driven ones to subtests
//! gotab analyze -p ./myproject --refactor subtest
//! ```

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use gotab::analysis::{GoToolExecutor, RefactorStrategy};
use gotab::output::{default_output_dir, FileWriter};

use gotab_cli::commands::{
    self, validate_output_path, validate_project_dir, AnalyzeTask, GlobalOptions, StatisticsTask,
};

#[derive(Parser)]
#[command(name = "gotab")]
#[command(about = "Analyze and refactor table-driven Go tests", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    globals: GlobalArgs,
}

#[derive(Args)]
struct GlobalArgs {
    /// Path to the Go project directory to be parsed
    #[arg(short = 'p', long = "project", global = true)]
    project: Option<String>,

    /// Path to the report output file
    #[arg(short = 'o', long = "output", global = true)]
    output: Option<String>,

    /// Append to the output file instead of overwriting it
    #[arg(long = "append", global = true)]
    append: bool,

    /// Parse each top-level directory separately (ignoring top-level Go files)
    #[arg(long = "splitByDir", global = true)]
    split_by_dir: bool,

    /// Number of concurrent workers when splitting by directory
    #[arg(long = "threads", global = true, default_value_t = 4)]
    threads: i64,

    /// Minimum severity of log messages to display
    #[arg(short = 'l', long = "logLevel", global = true, value_enum, default_value = "info")]
    log_level: LogLevelArg,

    /// Print the total execution time of the task
    #[arg(long = "timer", global = true)]
    timer: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevelArg {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevelArg {
    fn to_filter(self) -> tracing_subscriber::filter::LevelFilter {
        use tracing_subscriber::filter::LevelFilter;
        match self {
            LogLevelArg::Debug => LevelFilter::DEBUG,
            LogLevelArg::Info => LevelFilter::INFO,
            LogLevelArg::Warn => LevelFilter::WARN,
            LogLevelArg::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RefactorArg {
    None,
    Subtest,
}

impl From<RefactorArg> for RefactorStrategy {
    fn from(arg: RefactorArg) -> Self {
        match arg {
            RefactorArg::None => RefactorStrategy::None,
            RefactorArg::Subtest => RefactorStrategy::Subtest,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Collect statistics about a Go project's tests
    Statistics,

    /// Analyze a Go project's tests
    Analyze {
        /// The type of refactoring to perform on the detected test cases
        #[arg(long = "refactor", value_enum, default_value = "none")]
        refactor: RefactorArg,

        /// Keep refactored files on disk instead of restoring the originals
        #[arg(long = "keep-refactored-files")]
        keep_refactored_files: bool,
    },
}

fn main() {
    // Help and version exit 0; any other argument problem exits 1.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            let code = match err.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            process::exit(code);
        }
    };

    let globals = match validate_globals(&cli.globals) {
        Ok(globals) => globals,
        Err(err) => {
            eprintln!("{err:#}");
            process::exit(1);
        }
    };

    init_logging(cli.globals.log_level);

    let start = Instant::now();
    let result = run(&cli.command, globals);
    if cli.globals.timer {
        println!("Total execution time: {:?}", start.elapsed());
    }

    if let Err(err) = result {
        error!("error parsing project: {err:#}");
        process::exit(1);
    }
}

fn validate_globals(args: &GlobalArgs) -> anyhow::Result<GlobalOptions> {
    let project_dir = validate_project_dir(args.project.as_deref().unwrap_or(""))?;

    let output_path = match &args.output {
        Some(raw) => validate_output_path(raw)?,
        None => None,
    };

    if args.threads < 1 {
        anyhow::bail!("invalid number of threads {}, must be at least 1", args.threads);
    }

    Ok(GlobalOptions {
        project_dir,
        output_path,
        append_output: args.append,
        split_by_dir: args.split_by_dir,
        threads: args.threads as usize,
    })
}

/// Send logs both to stderr (colorized) and to a plain-text log file under
/// the output directory. A missing log file is not fatal.
fn init_logging(level: LogLevelArg) {
    let filter = level.to_filter();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(true)
        .with_writer(std::io::stderr);

    let file_layer = match open_log_file() {
        Ok(file) => Some(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        ),
        Err(err) => {
            eprintln!("Could not open log file: {err:#}");
            None
        }
    };

    tracing_subscriber::registry()
        .with(stderr_layer.with_filter(filter))
        .with(file_layer.map(|l| l.with_filter(filter)))
        .init();
}

fn open_log_file() -> anyhow::Result<std::fs::File> {
    let dir = default_output_dir()?;
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("gotab.log");
    Ok(std::fs::File::create(path)?)
}

fn run(command: &Commands, globals: GlobalOptions) -> anyhow::Result<()> {
    match command {
        Commands::Statistics => {
            let output = open_writer(&globals, commands::statistics::DEFAULT_OUTPUT)?;
            let mut task = StatisticsTask::new(globals.clone(), output);
            gotab::parse(
                &mut task,
                &globals.project_dir,
                globals.split_by_dir,
                globals.threads,
            )
        }
        Commands::Analyze {
            refactor,
            keep_refactored_files,
        } => {
            let output = open_writer(&globals, commands::analyze::DEFAULT_OUTPUT)?;
            let mut task = AnalyzeTask::new(
                globals.clone(),
                (*refactor).into(),
                *keep_refactored_files,
                output,
                Arc::new(GoToolExecutor),
            );
            gotab::parse(
                &mut task,
                &globals.project_dir,
                globals.split_by_dir,
                globals.threads,
            )
        }
    }
}

fn open_writer(globals: &GlobalOptions, default_name: &str) -> anyhow::Result<Arc<FileWriter>> {
    let path = globals
        .output_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(default_name));
    let writer = FileWriter::new(&path, globals.append_output)
        .map_err(|err| err.context(format!("creating output writer for path {path:?}")))?;
    Ok(Arc::new(writer))
}
