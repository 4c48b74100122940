//! Lodestar Logging
//!
//! Structured logging for Lodestar components. Unlike a process-wide logger,
//! every component receives a [`Logger`] value and writes through it, so two
//! clients in one process can log at different levels or to different sinks.
//!
//! # Usage
//!
//! ```rust
//! use lodestar_log::{debug, info, LogConfig, Logger};
//!
//! let logger = Logger::new(LogConfig::default());
//!
//! info!(logger, "registered {} instances", 2);
//! debug!(logger, target: "lodestar::heartbeat", "lease {} renewed", 42);
//! ```
//!
//! # Environment Variables
//!
//! [`LogConfig::from_env`] reads:
//!
//! - `LODESTAR_DEBUG=1` - Enable debug logging
//! - `LODESTAR_LOG_LEVEL=debug|info|warn|error` - Set log level
//! - `LODESTAR_LOG_FORMAT=pretty|json|compact` - Set output format
//! - `LODESTAR_LOG_COLOR=1|0` - Enable/disable colors

use std::env;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

// ============================================================================
// Log Levels
// ============================================================================

/// Log level for Lodestar logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    /// Trace level (most verbose)
    Trace = 0,
    /// Debug level
    Debug = 1,
    /// Info level
    Info = 2,
    /// Warning level
    Warn = 3,
    /// Error level (least verbose)
    Error = 4,
    /// Off (no logging)
    Off = 5,
}

impl Level {
    /// Get level from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    /// Get level name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Off => "OFF",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Level::Trace,
            1 => Level::Debug,
            2 => Level::Info,
            3 => Level::Warn,
            4 => Level::Error,
            _ => Level::Off,
        }
    }

    /// Get colored level name (if color feature enabled).
    #[cfg(feature = "color")]
    pub fn colored(&self) -> colored::ColoredString {
        use colored::Colorize;
        match self {
            Level::Trace => "TRACE".magenta(),
            Level::Debug => "DEBUG".blue(),
            Level::Info => "INFO".green(),
            Level::Warn => "WARN".yellow(),
            Level::Error => "ERROR".red().bold(),
            Level::Off => "OFF".white(),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<log::Level> for Level {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Trace => Level::Trace,
            log::Level::Debug => Level::Debug,
            log::Level::Info => Level::Info,
            log::Level::Warn => Level::Warn,
            log::Level::Error => Level::Error,
        }
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human readable format, colored when enabled
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format for structured logging
    Json,
}

impl Format {
    /// Get format from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Whether colors are enabled
    pub color: bool,
    /// Whether to include timestamps
    pub timestamps: bool,
    /// Whether to include the target (module path)
    pub module_path: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            format: Format::Json,
            color: false,
            timestamps: true,
            module_path: true,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables.
    ///
    /// Nothing global is touched; the result only takes effect once it is
    /// handed to a [`Logger`].
    pub fn from_env() -> Self {
        let debug = flag("LODESTAR_DEBUG").unwrap_or(false);

        let level = env::var("LODESTAR_LOG_LEVEL")
            .ok()
            .and_then(|s| Level::parse(&s))
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = env::var("LODESTAR_LOG_FORMAT")
            .ok()
            .and_then(|s| Format::parse(&s))
            .unwrap_or(Format::Json);

        let color = flag("LODESTAR_LOG_COLOR").unwrap_or_else(color_supported);
        let timestamps = flag("LODESTAR_LOG_TIMESTAMPS").unwrap_or(true);
        let module_path = flag("LODESTAR_LOG_MODULE").unwrap_or(true);

        Self {
            level,
            format,
            color,
            timestamps,
            module_path,
        }
    }

    /// Set the minimum level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set the output format.
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }
}

fn flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

fn color_supported() -> bool {
    env::var("NO_COLOR").is_err() && env::var("TERM").is_ok()
}

// ============================================================================
// Sinks
// ============================================================================

enum Sink {
    Stderr,
    Writer(Mutex<Box<dyn Write + Send>>),
    Discard,
}

impl Sink {
    fn write_line(&self, line: &str) {
        match self {
            Sink::Stderr => {
                let _ = writeln!(io::stderr().lock(), "{}", line);
            }
            Sink::Writer(writer) => {
                let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
                let _ = writeln!(writer, "{}", line);
                let _ = writer.flush();
            }
            Sink::Discard => {}
        }
    }
}

/// In-memory sink, mostly useful for asserting on log output in tests.
#[derive(Clone, Default)]
pub struct LogBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl LogBuffer {
    /// Everything written so far, as UTF-8 text.
    pub fn contents(&self) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Written lines.
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Logger
// ============================================================================

struct Inner {
    config: LogConfig,
    level: AtomicU8,
    sink: Sink,
}

/// A cloneable logger handle.
///
/// Clones share the sink and the level, so `set_level` on one clone is seen
/// by all of them.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<Inner>,
    target: Option<Arc<str>>,
}

impl Logger {
    /// Logger writing to stderr.
    pub fn new(config: LogConfig) -> Self {
        Self::from_sink(config, Sink::Stderr)
    }

    /// Logger writing to an arbitrary writer.
    pub fn with_writer<W>(config: LogConfig, writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        Self::from_sink(config, Sink::Writer(Mutex::new(Box::new(writer))))
    }

    /// Logger appending to a file, creating it if needed.
    pub fn to_file(config: LogConfig, path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::with_writer(config, file))
    }

    /// Logger that drops everything.
    pub fn disabled() -> Self {
        Self::from_sink(LogConfig::default().with_level(Level::Off), Sink::Discard)
    }

    /// Logger writing into a [`LogBuffer`].
    pub fn capture(config: LogConfig) -> (Self, LogBuffer) {
        let buffer = LogBuffer::default();
        (Self::with_writer(config, buffer.clone()), buffer)
    }

    fn from_sink(config: LogConfig, sink: Sink) -> Self {
        Self {
            inner: Arc::new(Inner {
                level: AtomicU8::new(config.level as u8),
                config,
                sink,
            }),
            target: None,
        }
    }

    /// Clone of this logger that tags every entry with `target`.
    pub fn with_target(&self, target: impl Into<String>) -> Self {
        Self {
            inner: self.inner.clone(),
            target: Some(Arc::from(target.into())),
        }
    }

    /// Configuration this logger was built with.
    pub fn config(&self) -> &LogConfig {
        &self.inner.config
    }

    /// Current minimum level.
    pub fn level(&self) -> Level {
        Level::from_u8(self.inner.level.load(Ordering::Relaxed))
    }

    /// Change the minimum level at runtime.
    pub fn set_level(&self, level: Level) {
        self.inner.level.store(level as u8, Ordering::SeqCst);
    }

    /// Check if a log level is enabled.
    #[inline]
    pub fn is_enabled(&self, level: Level) -> bool {
        level != Level::Off && level as u8 >= self.inner.level.load(Ordering::Relaxed)
    }

    /// Log a message with the given level.
    ///
    /// A target set through [`Logger::with_target`] takes precedence over
    /// `target`.
    pub fn log(&self, level: Level, target: &str, message: &str) {
        if !self.is_enabled(level) {
            return;
        }

        let target = self.target.as_deref().unwrap_or(target);
        let config = &self.inner.config;
        let line = match config.format {
            Format::Pretty => format_pretty(level, target, message, config),
            Format::Compact => format_compact(level, target, message, config),
            Format::Json => format_json(level, target, message),
        };
        self.inner.sink.write_line(&line);
    }

    /// Install this logger as the backend of the `log` facade.
    pub fn install(self) -> Result<(), log::SetLoggerError> {
        let max = match self.level() {
            Level::Trace => log::LevelFilter::Trace,
            Level::Debug => log::LevelFilter::Debug,
            Level::Info => log::LevelFilter::Info,
            Level::Warn => log::LevelFilter::Warn,
            Level::Error => log::LevelFilter::Error,
            Level::Off => log::LevelFilter::Off,
        };
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(max);
        Ok(())
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(LogConfig::default())
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("level", &self.level())
            .field("format", &self.inner.config.format)
            .field("target", &self.target)
            .finish()
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        self.is_enabled(metadata.level().into())
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.enabled(record.metadata()) {
            Logger::log(
                self,
                record.level().into(),
                record.target(),
                &record.args().to_string(),
            );
        }
    }

    fn flush(&self) {
        if let Sink::Writer(writer) = &self.inner.sink {
            let _ = writer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .flush();
        }
    }
}

// ============================================================================
// Formatting
// ============================================================================

fn format_pretty(level: Level, target: &str, message: &str, config: &LogConfig) -> String {
    let mut line = String::new();

    if config.timestamps {
        let now = chrono::Local::now();
        line.push_str(&format!("{} ", now.format("%Y-%m-%d %H:%M:%S%.3f")));
    }

    #[cfg(feature = "color")]
    if config.color {
        line.push_str(&format!("{:5} ", level.colored()));
    } else {
        line.push_str(&format!("{:5} ", level.as_str()));
    }

    #[cfg(not(feature = "color"))]
    line.push_str(&format!("{:5} ", level.as_str()));

    if config.module_path && !target.is_empty() {
        #[cfg(feature = "color")]
        if config.color {
            use colored::Colorize;
            line.push_str(&format!("{} ", target.dimmed()));
        } else {
            line.push_str(&format!("[{}] ", target));
        }

        #[cfg(not(feature = "color"))]
        line.push_str(&format!("[{}] ", target));
    }

    line.push_str(message);
    line
}

fn format_compact(level: Level, target: &str, message: &str, config: &LogConfig) -> String {
    let mut line = String::new();

    if config.timestamps {
        let now = chrono::Local::now();
        line.push_str(&format!("{} ", now.format("%H:%M:%S")));
    }

    line.push(level.as_str().chars().next().unwrap_or('?'));
    line.push(' ');

    if config.module_path && !target.is_empty() {
        line.push_str(&format!("{}: ", target));
    }

    line.push_str(message);
    line
}

#[cfg(feature = "json")]
fn format_json(level: Level, target: &str, message: &str) -> String {
    use serde::Serialize;

    #[derive(Serialize)]
    struct LogEntry<'a> {
        timestamp: String,
        level: &'a str,
        target: &'a str,
        message: &'a str,
    }

    let entry = LogEntry {
        timestamp: chrono::Utc::now().to_rfc3339(),
        level: level.as_str(),
        target,
        message,
    };

    serde_json::to_string(&entry).unwrap_or_else(|_| message.to_string())
}

#[cfg(not(feature = "json"))]
fn format_json(level: Level, target: &str, message: &str) -> String {
    let timestamp = chrono::Utc::now().to_rfc3339();
    format!(
        r#"{{"timestamp":"{}","level":"{}","target":"{}","message":"{}"}}"#,
        timestamp,
        level.as_str(),
        escape_json(target),
        escape_json(message)
    )
}

#[cfg(not(feature = "json"))]
fn escape_json(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c.is_control() => {
                result.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => result.push(c),
        }
    }
    result
}

// ============================================================================
// Macros
// ============================================================================

/// Log a trace message through a [`Logger`].
#[macro_export]
macro_rules! trace {
    ($logger:expr, target: $target:expr, $($arg:tt)+) => {{
        let logger: &$crate::Logger = &$logger;
        if logger.is_enabled($crate::Level::Trace) {
            logger.log($crate::Level::Trace, $target, &format!($($arg)+));
        }
    }};
    ($logger:expr, $($arg:tt)+) => {{
        let logger: &$crate::Logger = &$logger;
        if logger.is_enabled($crate::Level::Trace) {
            logger.log($crate::Level::Trace, module_path!(), &format!($($arg)+));
        }
    }};
}

/// Log a debug message through a [`Logger`].
///
/// # Example
///
/// ```rust
/// use lodestar_log::{debug, Logger};
///
/// let logger = Logger::disabled();
/// let lease = 7;
/// debug!(logger, "lease {} renewed", lease);
/// debug!(logger, target: "lodestar::heartbeat", "lease {} renewed", lease);
/// ```
#[macro_export]
macro_rules! debug {
    ($logger:expr, target: $target:expr, $($arg:tt)+) => {{
        let logger: &$crate::Logger = &$logger;
        if logger.is_enabled($crate::Level::Debug) {
            logger.log($crate::Level::Debug, $target, &format!($($arg)+));
        }
    }};
    ($logger:expr, $($arg:tt)+) => {{
        let logger: &$crate::Logger = &$logger;
        if logger.is_enabled($crate::Level::Debug) {
            logger.log($crate::Level::Debug, module_path!(), &format!($($arg)+));
        }
    }};
}

/// Log an info message through a [`Logger`].
#[macro_export]
macro_rules! info {
    ($logger:expr, target: $target:expr, $($arg:tt)+) => {{
        let logger: &$crate::Logger = &$logger;
        if logger.is_enabled($crate::Level::Info) {
            logger.log($crate::Level::Info, $target, &format!($($arg)+));
        }
    }};
    ($logger:expr, $($arg:tt)+) => {{
        let logger: &$crate::Logger = &$logger;
        if logger.is_enabled($crate::Level::Info) {
            logger.log($crate::Level::Info, module_path!(), &format!($($arg)+));
        }
    }};
}

/// Log a warning message through a [`Logger`].
#[macro_export]
macro_rules! warn {
    ($logger:expr, target: $target:expr, $($arg:tt)+) => {{
        let logger: &$crate::Logger = &$logger;
        if logger.is_enabled($crate::Level::Warn) {
            logger.log($crate::Level::Warn, $target, &format!($($arg)+));
        }
    }};
    ($logger:expr, $($arg:tt)+) => {{
        let logger: &$crate::Logger = &$logger;
        if logger.is_enabled($crate::Level::Warn) {
            logger.log($crate::Level::Warn, module_path!(), &format!($($arg)+));
        }
    }};
}

/// Log an error message through a [`Logger`].
#[macro_export]
macro_rules! error {
    ($logger:expr, target: $target:expr, $($arg:tt)+) => {{
        let logger: &$crate::Logger = &$logger;
        if logger.is_enabled($crate::Level::Error) {
            logger.log($crate::Level::Error, $target, &format!($($arg)+));
        }
    }};
    ($logger:expr, $($arg:tt)+) => {{
        let logger: &$crate::Logger = &$logger;
        if logger.is_enabled($crate::Level::Error) {
            logger.log($crate::Level::Error, module_path!(), &format!($($arg)+));
        }
    }};
}

// ============================================================================
// Tracing Integration
// ============================================================================

#[cfg(feature = "tracing")]
pub mod tracing_compat {
    //! Tracing compatibility layer.
    //!
    //! Builds a `tracing` subscriber from a [`LogConfig`] so applications
    //! that already use `tracing` get the same level and color settings.

    use super::*;

    /// Create a tracing subscriber from a log configuration.
    pub fn subscriber(config: &LogConfig) -> impl tracing::Subscriber + Send + Sync {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::{fmt, EnvFilter};

        let level = match config.level {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_ansi(config.color))
    }
}

// ============================================================================
// Tests
// ============================================================================
