//! # Logging Utilities
//!
//! Logging infrastructure for Strider using `tracing`.
//!
//! Every stop the tracer handles produces one `info` event, so the subscriber
//! set up here is effectively the trace output of a session. Two sinks are
//! supported:
//!
//! - the console (pretty or JSON)
//! - an optional log file (`-l` on the command line), written through a
//!   non-blocking appender without ANSI escapes
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Overrides the level filter (e.g., `RUST_LOG=strider_core=debug`)
//! - `STRIDER_LOG_FORMAT`: Output format (`json` or `pretty`) when the caller
//!   does not choose one explicitly
//!
//! ## Example
//!
//! ```rust,no_run
//! use strider_utils::{LogFormat, LogLevel, LoggingOptions, init_logging};
//!
//! let options = LoggingOptions::new(LogLevel::Debug, LogFormat::Pretty).with_log_file("trace.log");
//! let _guard = init_logging(&options).expect("Failed to initialize logging");
//! tracing::info!("Tracer started");
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use chrono::Utc;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat
{
    /// Pretty-printed, human-readable format (default)
    Pretty,
    /// JSON format, one object per trace line
    Json,
}

impl LogFormat
{
    /// Format selected by `STRIDER_LOG_FORMAT`, falling back to pretty output.
    #[must_use]
    pub fn from_env() -> Self
    {
        env::var("STRIDER_LOG_FORMAT")
            .ok()
            .and_then(|s| Self::from_str(&s).ok())
            .unwrap_or(LogFormat::Pretty)
    }
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(LogFormat::Pretty),
            "json" | "prod" | "production" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(s.to_string())),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level (default, one line per traced stop)
    Info,
    /// Debug level (module tables, breakpoint bookkeeping)
    Debug,
    /// Trace level (most verbose)
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(s.to_string())),
        }
    }
}

/// Settings for [`init_logging`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingOptions
{
    /// Default level when `RUST_LOG` is not set.
    pub level: LogLevel,
    /// Console and file output format.
    pub format: LogFormat,
    /// Optional file that receives a copy of every event.
    pub log_file: Option<PathBuf>,
}

impl LoggingOptions
{
    /// Options with no log file.
    #[must_use]
    pub fn new(level: LogLevel, format: LogFormat) -> Self
    {
        Self {
            level,
            format,
            log_file: None,
        }
    }

    /// Also write events to `path`.
    #[must_use]
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self
    {
        self.log_file = Some(path.into());
        self
    }
}

impl Default for LoggingOptions
{
    fn default() -> Self
    {
        Self::new(LogLevel::Info, LogFormat::from_env())
    }
}

/// Initialize console logging, plus file logging when requested.
///
/// The returned guard flushes the file writer when dropped; keep it alive for
/// the whole session. It is `None` when no log file was configured.
///
/// ## Errors
///
/// Returns an error if a global subscriber is already installed or the log
/// file directory cannot be created.
pub fn init_logging(options: &LoggingOptions) -> Result<Option<WorkerGuard>, LoggingError>
{
    let env_filter = build_filter(Some(options.level.into()));

    let (file_writer, guard) = match &options.log_file {
        Some(path) => {
            let (writer, guard) = file_appender(path)?;
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let result = match options.format {
        LogFormat::Pretty => {
            let console_layer = fmt::layer()
                .with_target(false)
                .with_thread_names(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(true)
                .with_writer(io::stdout)
                .with_filter(env_filter.clone());

            let file_layer = file_writer.map(|writer| {
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_names(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false) // No ANSI in files
                    .with_filter(env_filter)
            });

            Registry::default().with(console_layer).with(file_layer).try_init()
        }
        LogFormat::Json => {
            let console_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_thread_names(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_current_span(true)
                .with_writer(io::stdout)
                .with_filter(env_filter.clone());

            let file_layer = file_writer.map(|writer| {
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_names(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_current_span(true)
                    .with_filter(env_filter)
            });

            Registry::default().with(console_layer).with(file_layer).try_init()
        }
    };

    result.map_err(|e| LoggingError::InitializationFailed(e.to_string()))?;
    Ok(guard)
}

/// Initialize file-only logging while the terminal module picker owns the screen.
///
/// The log file lives at `~/.strider/YYYY-MM-DD-strider-picker.log`, or under
/// `/tmp` when no home directory is available.
///
/// ## Errors
///
/// Returns an error if logging is already initialized or file creation fails.
pub fn init_logging_for_picker(level: Option<LogLevel>) -> Result<(PathBuf, WorkerGuard), LoggingError>
{
    let today = Utc::now().format("%Y-%m-%d");
    let log_file = if let Ok(home) = env::var("HOME") {
        let strider_dir = PathBuf::from(home).join(".strider");
        std::fs::create_dir_all(&strider_dir)?;
        strider_dir.join(format!("{today}-strider-picker.log"))
    } else {
        PathBuf::from("/tmp").join(format!("{today}-strider-picker.log"))
    };

    let env_filter = build_filter(level.map(Into::into));
    let (writer, guard) = file_appender(&log_file)?;
    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_names(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_ansi(false)
        .with_filter(env_filter);

    Registry::default()
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::InitializationFailed(e.to_string()))?;
    Ok((log_file, guard))
}

/// Build the level filter.
///
/// `RUST_LOG` wins when set so module-specific filters such as
/// `strider_core::step=trace` keep working; otherwise the explicit level, or
/// INFO.
fn build_filter(explicit_level: Option<Level>) -> EnvFilter
{
    if let Ok(rust_log) = env::var("RUST_LOG") {
        if let Ok(filter) = EnvFilter::try_new(&rust_log) {
            return filter;
        }
    }
    EnvFilter::new(explicit_level.unwrap_or(Level::INFO).to_string())
}

fn file_appender(path: &Path) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), LoggingError>
{
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| LoggingError::InvalidLogFile(path.to_path_buf()))?;
    std::fs::create_dir_all(&directory)?;
    // The path is chosen by the user, so never roll it over.
    let appender = tracing_appender::rolling::never(directory, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Unknown log format: {0}. Use 'pretty' or 'json'")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Unknown log level: {0}. Use 'error', 'warn', 'info', 'debug', or 'trace'")]
    InvalidLevel(String),

    /// The log file path has no file name component
    #[error("Invalid log file path: {}", .0.display())]
    InvalidLogFile(PathBuf),

    /// Failed to initialize logging
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
