//! Session event log
//!
//! One append-only log stream per process session. Every lifecycle and I/O
//! event is written as `HH:MM:SS.fff<TAB>message` and flushed immediately.
//!
//! Logging is best-effort: [`SessionLogger::try_log`] reports failures as a
//! [`LogWriteError`], [`SessionLogger::log`] counts and discards them.

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Shared handle to the session logger
pub type Logger = Arc<SessionLogger>;

/// Default number of records kept in memory
const DEFAULT_MAX_RECENT: usize = 1000;

/// Log write failure
#[derive(Error, Debug)]
pub enum LogWriteError {
    /// The logger has no output stream (disabled or already closed)
    #[error("log stream is not open")]
    NoStream,

    /// The underlying write or flush failed
    #[error("log write failed: {0}")]
    Io(#[from] io::Error),
}

/// A single log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Time the record was created
    pub timestamp: DateTime<Local>,
    /// Message as given by the caller
    pub message: String,
}

impl LogRecord {
    /// Create a record stamped with the current local time
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            message: message.into(),
        }
    }

    /// Format as a log line (without the trailing newline)
    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}",
            self.timestamp.format("%H:%M:%S%.3f"),
            escape_message(&self.message)
        )
    }
}

/// Escape characters that would break the one-record-per-line format
fn escape_message(message: &str) -> String {
    let mut escaped = String::with_capacity(message.len());
    for c in message.chars() {
        match c {
            '\r' => escaped.push_str("\\r"),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(c),
        }
    }
    escaped
}

struct LoggerInner {
    sink: Option<Box<dyn Write + Send>>,
    recent: VecDeque<LogRecord>,
    max_recent: usize,
    records_written: u64,
    write_failures: u64,
}

/// Session logger
pub struct SessionLogger {
    inner: Mutex<LoggerInner>,
    path: Option<PathBuf>,
}

impl SessionLogger {
    fn from_sink(sink: Option<Box<dyn Write + Send>>, path: Option<PathBuf>) -> Self {
        Self {
            inner: Mutex::new(LoggerInner {
                sink,
                recent: VecDeque::new(),
                max_recent: DEFAULT_MAX_RECENT,
                records_written: 0,
                write_failures: 0,
            }),
            path,
        }
    }

    /// Create a new session log file in `dir`, named from the current time
    pub fn create(dir: &Path, prefix: &str) -> Result<Self, LogWriteError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(generate_log_filename(prefix));

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        tracing::info!("Session log: {}", path.display());
        Ok(Self::from_sink(Some(Box::new(BufWriter::new(file))), Some(path)))
    }

    /// Create a session log file, falling back to a disabled logger on failure
    pub fn create_or_disabled(dir: &Path, prefix: &str) -> Self {
        match Self::create(dir, prefix) {
            Ok(logger) => logger,
            Err(e) => {
                tracing::warn!("Session log disabled, could not create it in {}: {}", dir.display(), e);
                Self::disabled()
            }
        }
    }

    /// Log into an arbitrary writer
    pub fn with_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self::from_sink(Some(Box::new(writer)), None)
    }

    /// Logger without an output stream; records are only kept in memory
    pub fn disabled() -> Self {
        Self::from_sink(None, None)
    }

    /// Wrap in the shared handle type
    pub fn shared(self) -> Logger {
        Arc::new(self)
    }

    /// Path of the log file, if logging to a file
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Is an output stream open?
    pub fn is_open(&self) -> bool {
        self.inner.lock().sink.is_some()
    }

    /// Append a record and flush it
    pub fn try_log(&self, message: impl Into<String>) -> Result<(), LogWriteError> {
        let record = LogRecord::new(message);
        let line = record.to_line();

        let mut inner = self.inner.lock();
        inner.recent.push_back(record);
        while inner.recent.len() > inner.max_recent {
            inner.recent.pop_front();
        }

        let sink = inner.sink.as_mut().ok_or(LogWriteError::NoStream)?;
        let result = writeln!(sink, "{}", line).and_then(|()| sink.flush());
        match result {
            Ok(()) => {
                inner.records_written += 1;
                Ok(())
            }
            Err(e) => {
                inner.write_failures += 1;
                Err(e.into())
            }
        }
    }

    /// Append a record; failures are counted and otherwise ignored
    pub fn log(&self, message: impl Into<String>) {
        if let Err(LogWriteError::Io(e)) = self.try_log(message) {
            tracing::trace!("Session log write dropped: {}", e);
        }
    }

    /// Most recent records, oldest first
    pub fn recent(&self) -> Vec<LogRecord> {
        self.inner.lock().recent.iter().cloned().collect()
    }

    /// Set how many records are kept in memory
    pub fn set_max_recent(&self, max: usize) {
        let mut inner = self.inner.lock();
        inner.max_recent = max;
        while inner.recent.len() > max {
            inner.recent.pop_front();
        }
    }

    /// (records written, failed writes)
    pub fn stats(&self) -> (u64, u64) {
        let inner = self.inner.lock();
        (inner.records_written, inner.write_failures)
    }

    /// Flush and close the output stream
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if let Some(mut sink) = inner.sink.take() {
            let _ = sink.flush();
        }
    }
}

impl Drop for SessionLogger {
    fn drop(&mut self) {
        self.close();
    }
}

/// Generate the session log file name from the current time
pub fn generate_log_filename(prefix: &str) -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    format!("{}_{}.log", prefix, timestamp)
}
