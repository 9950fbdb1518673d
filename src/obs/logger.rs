use std::fmt::Arguments;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// Severity of a log message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "Debug",
            LogLevel::Info => "Info",
            LogLevel::Warn => "Warn",
            LogLevel::Error => "Error",
        }
    }
}

/// Logging and event tracing sink handed to a [`Condition`](crate::Condition) by the planner.
///
/// Messages are passed as `std::fmt::Arguments` so nothing is formatted when the level is
/// disabled.
pub trait LoggerAndTracer: Send + Sync {
    /// Logs a formatted message at the specified level.
    fn log(&self, level: LogLevel, context: &'static str, msg: Arguments);

    /// Emits a trace event. Events follow the format:
    ///
    /// `event: <action>, key1=value1, key2=value2`
    ///
    /// e.g. `event: normalize done, mode=Auto, branches=3, fallback=false, duration=12µs`
    fn event(&self, context: &'static str, event: Arguments);

    fn is_tracing_enabled(&self) -> bool;

    fn level_enabled(&self, level: LogLevel) -> bool;
}

#[macro_export]
macro_rules! debug {
    ($logger:expr, $($arg:tt)*) => {
        $logger.log($crate::obs::logger::LogLevel::Debug, module_path!(), format_args!($($arg)*));
    };
}

#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)*) => {
        $logger.log($crate::obs::logger::LogLevel::Info, module_path!(), format_args!($($arg)*));
    };
}

#[macro_export]
macro_rules! warn {
    ($logger:expr, $($arg:tt)*) => {
        $logger.log($crate::obs::logger::LogLevel::Warn, module_path!(), format_args!($($arg)*));
    };
}

#[macro_export]
macro_rules! event {
    ($logger:expr, $($arg:tt)*) => {
        $logger.event(module_path!(), format_args!($($arg)*));
    };
}

/// Renders a line as `[<tag>] [<micros since epoch>] [thread=<id>] [<context>] <message>`.
fn format_line(tag: &str, context: &str, msg: Arguments) -> String {
    let micros = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros())
        .unwrap_or_default();
    format!("[{}] [{}] [thread={:?}] [{}] {}", tag, micros, std::thread::current().id(), context, msg)
}

const TRACE_TAG: &str = "TRACE";

/// Prints the enabled messages to stdout.
pub struct StdoutLogger {
    pub min_level: LogLevel,
    pub tracing_enabled: bool,
}

impl StdoutLogger {
    pub fn new(min_level: LogLevel, tracing_enabled: bool) -> Arc<Self> {
        Arc::new(StdoutLogger { min_level, tracing_enabled })
    }
}

impl LoggerAndTracer for StdoutLogger {
    fn log(&self, level: LogLevel, context: &'static str, msg: Arguments) {
        if self.level_enabled(level) {
            println!("{}", format_line(level.as_str(), context, msg));
        }
    }

    fn event(&self, context: &'static str, event: Arguments) {
        if self.tracing_enabled {
            println!("{}", format_line(TRACE_TAG, context, event));
        }
    }

    fn is_tracing_enabled(&self) -> bool {
        self.tracing_enabled
    }

    fn level_enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }
}

/// Keeps every message and event in memory so that callers can inspect what a planning step
/// reported, e.g. whether a normalization fell back to the unoptimized tree.
#[derive(Default)]
pub struct CapturingLogger {
    lines: Mutex<Vec<(Option<LogLevel>, String)>>,
}

impl CapturingLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(CapturingLogger::default())
    }

    /// Messages logged at `level`, without their prefix.
    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.collect(Some(level))
    }

    /// Emitted trace events, without their prefix.
    pub fn events(&self) -> Vec<String> {
        self.collect(None)
    }

    fn collect(&self, wanted: Option<LogLevel>) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines
                .iter()
                .filter(|(level, _)| *level == wanted)
                .map(|(_, line)| line.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn push(&self, level: Option<LogLevel>, msg: Arguments) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((level, msg.to_string()));
        }
    }
}

impl LoggerAndTracer for CapturingLogger {
    fn log(&self, level: LogLevel, _context: &'static str, msg: Arguments) {
        self.push(Some(level), msg);
    }

    fn event(&self, _context: &'static str, event: Arguments) {
        self.push(None, event);
    }

    fn is_tracing_enabled(&self) -> bool {
        true
    }

    fn level_enabled(&self, _level: LogLevel) -> bool {
        true
    }
}

/// Forwards messages to the `tracing` ecosystem, for planners which install a subscriber.
/// Events are emitted at the `TRACE` level.
#[derive(Default)]
pub struct TracingLogger;

impl TracingLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(TracingLogger)
    }
}

impl LoggerAndTracer for TracingLogger {
    fn log(&self, level: LogLevel, context: &'static str, msg: Arguments) {
        match level {
            LogLevel::Debug => tracing::debug!(context, "{}", msg),
            LogLevel::Info => tracing::info!(context, "{}", msg),
            LogLevel::Warn => tracing::warn!(context, "{}", msg),
            LogLevel::Error => tracing::error!(context, "{}", msg),
        }
    }

    fn event(&self, context: &'static str, event: Arguments) {
        tracing::trace!(context, "{}", event);
    }

    fn is_tracing_enabled(&self) -> bool {
        tracing::enabled!(tracing::Level::TRACE)
    }

    fn level_enabled(&self, level: LogLevel) -> bool {
        match level {
            LogLevel::Debug => tracing::enabled!(tracing::Level::DEBUG),
            LogLevel::Info => tracing::enabled!(tracing::Level::INFO),
            LogLevel::Warn => tracing::enabled!(tracing::Level::WARN),
            LogLevel::Error => tracing::enabled!(tracing::Level::ERROR),
        }
    }
}

/// Discards everything. Used when the planner does not provide a logger.
#[derive(Default)]
pub struct NoOpLogger;

impl NoOpLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(NoOpLogger)
    }
}

impl LoggerAndTracer for NoOpLogger {
    fn log(&self, _level: LogLevel, _context: &'static str, _msg: Arguments) {}

    fn event(&self, _context: &'static str, _event: Arguments) {}

    fn is_tracing_enabled(&self) -> bool {
        false
    }

    fn level_enabled(&self, _level: LogLevel) -> bool {
        false
    }
}

#[cfg(test)]
pub fn test_instance() -> Arc<dyn LoggerAndTracer> {
    StdoutLogger::new(LogLevel::Debug, true)
}
