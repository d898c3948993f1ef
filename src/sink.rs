//! Destinations for event records.
//!
//! A sink never fails towards its caller. Write errors are reported through the `log` facade
//! and the record is dropped for that sink.

use std::ffi::CString;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// The set of requirements for record destinations.
///
/// # Example implementation
///
/// ```no_run
/// use inotify_watch::LogSink;
/// use std::time::SystemTime;
///
/// /// Prints records to stderr
/// struct RecordPrinter;
///
/// impl LogSink for RecordPrinter {
///     fn emit(&mut self, _timestamp: SystemTime, message: &str) {
///         eprintln!("{message}");
///     }
/// }
/// ```
pub trait LogSink {
    /// Writes one record.
    fn emit(&mut self, timestamp: SystemTime, message: &str);
}

impl<L: LogSink + ?Sized> LogSink for Box<L> {
    fn emit(&mut self, timestamp: SystemTime, message: &str) {
        (**self).emit(timestamp, message)
    }
}

impl<L: LogSink + ?Sized> LogSink for &mut L {
    fn emit(&mut self, timestamp: SystemTime, message: &str) {
        (**self).emit(timestamp, message)
    }
}

/// `[<RFC 3339 timestamp>] <message>`
pub fn format_line(timestamp: SystemTime, message: &str) -> String {
    format!(
        "[{}] {message}",
        humantime::format_rfc3339_seconds(timestamp)
    )
}

/// Appends records to a file.
///
/// The file is opened for every record so an external rotation takes effect immediately.
#[derive(Clone, Debug)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    /// Creates a sink appending to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSink { path: path.into() }
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, line: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

impl LogSink for FileSink {
    fn emit(&mut self, timestamp: SystemTime, message: &str) {
        if let Err(err) = self.append(&format_line(timestamp, message)) {
            log::error!("Unable to write log file {}: {err}", self.path.display());
        }
    }
}

/// Echoes records to standard output.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn emit(&mut self, timestamp: SystemTime, message: &str) {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        if let Err(err) = writeln!(out, "{}", format_line(timestamp, message)) {
            log::error!("Unable to write to stdout: {err}");
        }
    }
}

/// Sends records to the system log at `LOG_INFO` with the daemon facility.
///
/// The system log stamps records itself, so the timestamp is not repeated.
#[derive(Debug)]
pub struct SyslogSink {
    // openlog keeps the pointer, the string must outlive the connection
    _ident: CString,
}

const FORMAT: &[u8] = b"%s\0";

impl SyslogSink {
    /// Opens the system log connection under `ident`.
    pub fn open(ident: &str) -> Self {
        let ident = CString::new(ident.replace('\0', "")).unwrap_or_default();
        unsafe { libc::openlog(ident.as_ptr(), libc::LOG_PID, libc::LOG_DAEMON) };
        SyslogSink { _ident: ident }
    }
}

impl LogSink for SyslogSink {
    fn emit(&mut self, _timestamp: SystemTime, message: &str) {
        match CString::new(message.replace('\0', "\\0")) {
            Ok(message) => unsafe {
                libc::syslog(
                    libc::LOG_INFO,
                    FORMAT.as_ptr() as *const libc::c_char,
                    message.as_ptr(),
                )
            },
            Err(err) => log::error!("Unable to write to syslog: {err}"),
        }
    }
}

impl Drop for SyslogSink {
    fn drop(&mut self) {
        unsafe { libc::closelog() };
    }
}

/// Sends every record to each of several sinks.
#[derive(Default)]
pub struct FanOut {
    sinks: Vec<Box<dyn LogSink + Send>>,
}

impl FanOut {
    /// Creates a fan-out with no sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sink.
    pub fn with(mut self, sink: impl LogSink + Send + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Number of sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether there is no sink.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl LogSink for FanOut {
    fn emit(&mut self, timestamp: SystemTime, message: &str) {
        for sink in &mut self.sinks {
            sink.emit(timestamp, message);
        }
    }
}

impl std::fmt::Debug for FanOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOut")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
