//! # Logging Utilities
//!
//! Logging setup for crashsym binaries, built on `tracing`.
//!
//! The engine itself only emits `tracing` events; nothing is printed unless a
//! binary installs a subscriber through this module. Console output goes to
//! stderr so that stack traces written to stdout stay machine-readable.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use crashsym_utils::init_logging;
//!
//! // Keep the guard alive for as long as logs should reach the file sink.
//! let _guard = init_logging().expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Filter directives (e.g., `RUST_LOG=debug`, `RUST_LOG=crashsym_core=trace`)
//! - `CRASHSYM_LOG_FORMAT`: Output format (`json` or `pretty`, default: `pretty`)
//! - `CRASHSYM_LOG_FILE`: Optional log file. A directory gets a dated
//!   `YYYY-MM-DD-crashsym.log` inside it.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use chrono::Utc;
use tracing::{Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::MakeWriter;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "CRASHSYM_LOG_FORMAT";
/// Environment variable naming an optional log file or directory.
pub const LOG_FILE_ENV: &str = "CRASHSYM_LOG_FILE";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Human-readable lines (default)
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
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
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel
{
    /// Lowercase name, as accepted by `EnvFilter`.
    pub fn as_str(self) -> &'static str
    {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
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

/// Everything needed to install the global subscriber.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig
{
    /// Explicit level. Overrides `RUST_LOG` when set.
    pub level: Option<LogLevel>,
    pub format: LogFormat,
    /// File sink in addition to stderr.
    pub file: Option<PathBuf>,
}

impl LoggingConfig
{
    /// Read `CRASHSYM_LOG_FORMAT` and `CRASHSYM_LOG_FILE`.
    ///
    /// An unrecognised format falls back to pretty output.
    pub fn from_env() -> Self
    {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self
    {
        let format = lookup(LOG_FORMAT_ENV)
            .and_then(|value| value.parse().ok())
            .unwrap_or_default();
        let file = lookup(LOG_FILE_ENV).filter(|value| !value.is_empty()).map(PathBuf::from);
        Self {
            level: None,
            format,
            file,
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self
    {
        self.level = Some(level);
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self
    {
        self.format = format;
        self
    }

    /// Install the global subscriber.
    ///
    /// ## Errors
    ///
    /// Returns an error if a global subscriber is already installed or the log
    /// file's directory cannot be created.
    pub fn init(&self) -> Result<LoggingGuard, LoggingError>
    {
        let console = build_layer(self.format, io::stderr, true, self.filter());

        let (file_layer, guard) = match &self.file {
            Some(path) => {
                let today = Utc::now().format("%Y-%m-%d").to_string();
                let (directory, file_name) = log_file_target(path, &today);
                std::fs::create_dir_all(&directory)?;
                let appender = tracing_appender::rolling::never(directory, file_name);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                (Some(build_layer(self.format, writer, false, self.filter())), Some(guard))
            }
            None => (None, None),
        };

        Registry::default()
            .with(console)
            .with(file_layer)
            .try_init()
            .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;

        Ok(LoggingGuard { _file: guard })
    }

    // Precedence: explicit level, then RUST_LOG, then info.
    fn filter(&self) -> EnvFilter
    {
        match self.level {
            Some(level) => EnvFilter::new(level.as_str()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(LogLevel::Info.as_str())),
        }
    }
}

/// Keeps the background file writer alive. Dropping it flushes and stops file logging.
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug)]
pub struct LoggingGuard
{
    _file: Option<WorkerGuard>,
}

/// Initialize logging from the environment
///
/// ## Example
///
/// ```rust,no_run
/// use crashsym_utils::init_logging;
///
/// let _guard = init_logging().expect("Failed to initialize logging");
/// tracing::info!("Application started");
/// ```
///
/// ## Errors
///
/// See [`LoggingConfig::init`].
pub fn init_logging() -> Result<LoggingGuard, LoggingError>
{
    LoggingConfig::from_env().init()
}

/// Initialize logging with an explicit level and format
///
/// `CRASHSYM_LOG_FILE` is still honoured.
///
/// ## Errors
///
/// See [`LoggingConfig::init`].
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<LoggingGuard, LoggingError>
{
    LoggingConfig::from_env().with_level(level).with_format(format).init()
}

fn build_layer<S, W>(format: LogFormat, writer: W, ansi: bool, filter: EnvFilter) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(ansi)
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
    }
}

/// Split a configured log path into the appender's directory and file name.
fn log_file_target(path: &Path, today: &str) -> (PathBuf, OsString)
{
    if path.is_dir() {
        return (path.to_path_buf(), OsString::from(format!("{today}-crashsym.log")));
    }
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .map_or_else(|| OsString::from(format!("{today}-crashsym.log")), ToOwned::to_owned);
    (directory, file_name)
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

    /// A global subscriber was already installed
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
