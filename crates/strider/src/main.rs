use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;
use strider_core::{create_backend, LaunchRequest, TraceSession};
use strider_ui::ModulePicker;
use strider_utils::config::DEFAULT_POLL_INTERVAL;
use strider_utils::{
    info, init_logging, init_logging_for_picker, ConfigOverrides, ConfigStore, LogFormat, LogLevel, LoggingOptions,
};

/// An instruction-level tracer that steps a native process and logs every executed statement.
#[derive(Parser, Debug)]
#[command(name = "strider")]
#[command(version)]
#[command(about = "An instruction-level tracer that steps a native process and logs every executed statement", long_about = None)]
struct Cli
{
    /// Path to the executable to trace
    #[arg(short = 'e', long = "program", value_name = "PATH")]
    program: PathBuf,

    /// Argument to pass to the program (repeat for more)
    #[arg(short = 'a', long = "arg", value_name = "ARG", allow_hyphen_values = true)]
    args: Vec<String>,

    /// Also write the trace to this file
    #[arg(short = 'l', long = "logfile", value_name = "PATH")]
    logfile: Option<PathBuf>,

    /// Tracer configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "PATH", default_value = "config.yaml")]
    config: PathBuf,

    /// Log at debug level
    #[arg(long, default_value_t = false)]
    verbose: bool,

    /// Pick the modules to keep, save the rest as skip_modules and exit
    #[arg(long, default_value_t = false)]
    dump_modules_for_skip: bool,
}

fn main()
{
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32, Box<dyn std::error::Error>>
{
    let level = if cli.verbose { LogLevel::Debug } else { LogLevel::Info };
    let overrides = ConfigOverrides {
        dump_modules_for_skip: cli.dump_modules_for_skip,
    };
    let store = Arc::new(ConfigStore::open_with_overrides(&cli.config, overrides)?);

    // The picker owns the terminal, so its session logs to a file only.
    let _log_guard = if store.snapshot().dump_modules_for_skip {
        let (path, guard) = init_logging_for_picker(Some(level))?;
        eprintln!("Logging to {}", path.display());
        Some(guard)
    } else {
        let mut options = LoggingOptions::new(level, LogFormat::from_env());
        if let Some(path) = &cli.logfile {
            options = options.with_log_file(path);
        }
        init_logging(&options)?
    };

    let _watcher = store.spawn_watcher(DEFAULT_POLL_INTERVAL)?;

    let program = absolute_program(&cli.program)?;
    info!("Tracing {} with args {:?}", program.display(), cli.args);

    let request = LaunchRequest {
        program,
        args: cli.args,
        ..LaunchRequest::default()
    };

    let backend = create_backend()?;
    let outcome = TraceSession::new(backend, Arc::clone(&store), request)
        .with_selector(Box::new(ModulePicker::new()))
        .run()?;

    info!("Session finished: {} after {} steps", outcome.exit, outcome.steps);
    Ok(outcome.exit_code())
}

/// Resolve a relative program path against the working directory.
fn absolute_program(program: &Path) -> std::io::Result<PathBuf>
{
    if program.is_absolute() {
        Ok(program.to_path_buf())
    } else {
        std::env::current_dir()?.join(program).canonicalize()
    }
}
