//! One log line per event.

use crate::enrich::{Enrichment, Ownership};
use crate::event::{ClassifiedEvent, WatchId};
use crate::kind::{ChangeKind, ChangeKinds};
use crate::sink::LogSink;
use std::fmt;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::SystemTime;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Path written for events whose watch id is not live.
pub const UNKNOWN_PATH: &str = "<unknown>";

/// Path written for queue overflow notices, which belong to no watch.
pub const OVERFLOW_PATH: &str = "<overflow>";

/// Everything written about one event.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Record {
    /// Full path of the subject, `None` when it could not be resolved.
    pub path: Option<PathBuf>,
    /// Watch the event belongs to.
    pub id: WatchId,
    /// Correlation token.
    pub cookie: Option<NonZeroU32>,
    /// Every kind present.
    pub kinds: ChangeKinds,
    /// Owner and permission bits, for events that imply a metadata read.
    pub ownership: Option<Ownership>,
    /// Content fingerprint, for events that imply one.
    pub fingerprint: Option<String>,
}

impl Record {
    /// Assembles the record for `event`.
    pub fn new(event: &ClassifiedEvent, enrichment: Enrichment) -> Self {
        Record {
            path: event.path.clone(),
            id: event.id,
            cookie: event.cookie,
            kinds: event.kinds,
            ownership: enrichment.ownership,
            fingerprint: enrichment.fingerprint,
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.path {
            Some(ref path) => write!(f, "{}", path.display())?,
            None if self.kinds.has(ChangeKind::QueueOverflow) => f.write_str(OVERFLOW_PATH)?,
            None => f.write_str(UNKNOWN_PATH)?,
        }
        write!(f, "; wd = {}; ", self.id)?;
        if let Some(cookie) = self.cookie {
            write!(f, "cookie = {cookie}; ")?;
        }
        write!(f, "{}", self.kinds)?;
        if let Some(ref ownership) = self.ownership {
            write!(
                f,
                "; owner = {}:{}; mode = {}",
                ownership.user,
                ownership.group,
                ownership.mode_string()
            )?;
        }
        if let Some(ref fingerprint) = self.fingerprint {
            write!(f, "; fingerprint = {fingerprint}")?;
        }
        Ok(())
    }
}

/// Formats records and hands them to a [`LogSink`].
#[derive(Debug)]
pub struct RecordEmitter<L> {
    sink: L,
}

impl<L: LogSink> RecordEmitter<L> {
    /// Creates an emitter writing to `sink`.
    pub fn new(sink: L) -> Self {
        RecordEmitter { sink }
    }

    /// Emits `record`, stamped with the current time.
    pub fn emit(&mut self, record: &Record) {
        self.emit_at(SystemTime::now(), record)
    }

    /// Emits `record` stamped with `timestamp`.
    pub fn emit_at(&mut self, timestamp: SystemTime, record: &Record) {
        self.sink.emit(timestamp, &record.to_string());
    }

    /// Emits a free-form line, such as the startup banner.
    pub fn note(&mut self, message: &str) {
        self.sink.emit(SystemTime::now(), message);
    }

    /// Returns the sink.
    pub fn sink(&self) -> &L {
        &self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::MemorySink;
    use pretty_assertions::assert_eq;
    use std::time::{Duration, UNIX_EPOCH};

    fn record(path: Option<&str>, kinds: ChangeKinds) -> Record {
        Record {
            path: path.map(PathBuf::from),
            id: WatchId::new(3),
            cookie: None,
            kinds,
            ownership: None,
            fingerprint: None,
        }
    }

    #[test]
    fn plain_record() {
        let record = record(Some("/tmp/w/file"), ChangeKinds::ACCESS);
        assert_eq!(record.to_string(), "/tmp/w/file; wd = 3; IN_ACCESS");
    }

    #[test]
    fn full_record() {
        let record = Record {
            cookie: NonZeroU32::new(17),
            ownership: Some(Ownership {
                user: "alice".into(),
                group: "staff".into(),
                mode: Some(0o100644),
            }),
            fingerprint: Some("64:Ab".into()),
            ..record(
                Some("/tmp/w/sub"),
                ChangeKinds::ISDIR | ChangeKinds::CREATE,
            )
        };
        assert_eq!(
            record.to_string(),
            "/tmp/w/sub; wd = 3; cookie = 17; IN_CREATE|IN_ISDIR; owner = alice:staff; mode = 0644; fingerprint = 64:Ab"
        );
    }

    #[test]
    fn unresolved_paths_use_placeholders() {
        assert_eq!(
            record(None, ChangeKinds::OPEN).to_string(),
            "<unknown>; wd = 3; IN_OPEN"
        );
        let overflow = Record {
            id: WatchId::OVERFLOW,
            ..record(None, ChangeKinds::Q_OVERFLOW)
        };
        assert_eq!(overflow.to_string(), "<overflow>; wd = -1; IN_Q_OVERFLOW");
    }

    #[test]
    fn placeholder_ownership_is_written() {
        let record = Record {
            ownership: Some(Ownership::placeholder()),
            ..record(Some("/tmp/gone"), ChangeKinds::ATTRIB)
        };
        assert_eq!(
            record.to_string(),
            "/tmp/gone; wd = 3; IN_ATTRIB; owner = ?:?; mode = ----"
        );
    }

    #[test]
    fn emitter_passes_timestamp_and_line_to_sink() {
        let mut emitter = RecordEmitter::new(MemorySink::default());
        let at = UNIX_EPOCH + Duration::from_secs(1_700_000_000);

        emitter.emit_at(at, &record(Some("/srv"), ChangeKinds::DELETE_SELF));
        emitter.note("hello");

        let lines = &emitter.sink().lines;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], (at, "/srv; wd = 3; IN_DELETE_SELF".to_string()));
        assert_eq!(lines[1].1, "hello");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn record_serializes() {
        let value = serde_json::to_value(record(Some("/srv"), ChangeKinds::MODIFY)).expect("json");
        assert_eq!(value["path"], "/srv");
        assert_eq!(value["id"], 3);
    }
}
