//! Error types

use crate::event::WatchId;
use std::error::Error as StdError;
use std::path::PathBuf;
use std::{fmt, io, result};

/// Type alias to use this library's [`Error`] type in a Result
pub type Result<T> = result::Result<T, Error>;

/// Error kinds
///
/// Only [`ErrorKind::SourceFatal`] stops the event loop. Every other kind is reported and the
/// event that caused it is still recorded with placeholder values.
#[derive(Debug)]
pub enum ErrorKind {
    /// The notification source rejected a path (permission denied, path vanished, watch limit).
    RegistrationFailed(io::Error),

    /// An event referenced a watch id that is not live in the registry.
    UnknownWatch(WatchId),

    /// Reading owner and permission metadata failed.
    StatFailed(io::Error),

    /// The fingerprint collaborator failed.
    FingerprintFailed(io::Error),

    /// The kernel event queue overflowed; some events were lost upstream.
    OverflowSignaled,

    /// Reading from the notification source failed. This is the only fatal kind.
    SourceFatal(io::Error),

    /// The watch list could not be read or parsed.
    Config(String),

    /// Generic I/O error in the host layer.
    Io(io::Error),
}

/// Error type used in this library.
#[derive(Debug)]
pub struct Error {
    /// Kind of the error.
    pub kind: ErrorKind,

    /// Relevant paths to the error, if any.
    pub paths: Vec<PathBuf>,
}

impl Error {
    /// Adds a path to the error.
    pub fn add_path(mut self, path: PathBuf) -> Self {
        self.paths.push(path);
        self
    }

    /// Creates a new Error with empty paths given its kind.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            paths: Vec::new(),
        }
    }

    /// Creates a new registration error for `path`.
    pub fn registration_failed(err: io::Error, path: PathBuf) -> Self {
        Self::new(ErrorKind::RegistrationFailed(err)).add_path(path)
    }

    /// Creates a new unknown-watch error.
    pub fn unknown_watch(id: WatchId) -> Self {
        Self::new(ErrorKind::UnknownWatch(id))
    }

    /// Creates a new stat error for `path`.
    pub fn stat_failed(err: io::Error, path: PathBuf) -> Self {
        Self::new(ErrorKind::StatFailed(err)).add_path(path)
    }

    /// Creates a new fingerprint error for `path`.
    pub fn fingerprint_failed(err: io::Error, path: PathBuf) -> Self {
        Self::new(ErrorKind::FingerprintFailed(err)).add_path(path)
    }

    /// Creates a new overflow error.
    pub fn overflow() -> Self {
        Self::new(ErrorKind::OverflowSignaled)
    }

    /// Creates a new fatal source error.
    pub fn source_fatal(err: io::Error) -> Self {
        Self::new(ErrorKind::SourceFatal(err))
    }

    /// Creates a new configuration error.
    pub fn config(msg: &str) -> Self {
        Self::new(ErrorKind::Config(msg.into()))
    }

    /// Creates a new i/o error.
    pub fn io(err: io::Error) -> Self {
        Self::new(ErrorKind::Io(err))
    }

    /// Whether the host should stop after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, ErrorKind::SourceFatal(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let error = match self.kind {
            ErrorKind::RegistrationFailed(ref err) => format!("Registration failed: {err}"),
            ErrorKind::UnknownWatch(id) => format!("Unknown watch id {id}."),
            ErrorKind::StatFailed(ref err) => format!("Stat failed: {err}"),
            ErrorKind::FingerprintFailed(ref err) => format!("Fingerprint failed: {err}"),
            ErrorKind::OverflowSignaled => {
                "Event queue overflowed, some events were dropped.".into()
            }
            ErrorKind::SourceFatal(ref err) => format!("Notification source failed: {err}"),
            ErrorKind::Config(ref msg) => format!("Invalid configuration: {msg}"),
            ErrorKind::Io(ref err) => err.to_string(),
        };

        if self.paths.is_empty() {
            write!(f, "{error}")
        } else {
            write!(f, "{error} about {:?}", self.paths)
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self.kind {
            ErrorKind::RegistrationFailed(ref cause)
            | ErrorKind::StatFailed(ref cause)
            | ErrorKind::FingerprintFailed(ref cause)
            | ErrorKind::SourceFatal(ref cause)
            | ErrorKind::Io(ref cause) => Some(cause),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_paths() {
        let err = Error::registration_failed(
            io::Error::from(io::ErrorKind::PermissionDenied),
            PathBuf::from("/root/secret"),
        );
        let msg = err.to_string();
        assert!(msg.starts_with("Registration failed"), "{msg}");
        assert!(msg.ends_with(r#"about ["/root/secret"]"#), "{msg}");
    }

    #[test]
    fn only_source_errors_are_fatal() {
        assert!(Error::source_fatal(io::Error::from(io::ErrorKind::BrokenPipe)).is_fatal());
        assert!(!Error::overflow().is_fatal());
        assert!(!Error::unknown_watch(WatchId::new(3)).is_fatal());
        assert!(!Error::io(io::Error::from(io::ErrorKind::Other)).is_fatal());
    }

    #[test]
    fn io_cause_is_exposed_as_source() {
        let err = Error::stat_failed(
            io::Error::from(io::ErrorKind::NotFound),
            PathBuf::from("/gone"),
        );
        assert!(err.source().is_some());
        assert!(Error::overflow().source().is_none());
    }
}
