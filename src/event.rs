//! Raw events as delivered by a notification source, and the classifier that turns them into
//! [`ClassifiedEvent`]s.

use crate::kind::{ChangeKind, ChangeKinds, Implications};
use crate::registry::WatchRegistry;
use crate::{Error, Result};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier the notification source assigned to a watch.
///
/// Only meaningful while the watch is live: the source may hand the same value out again after
/// the watch is retired.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct WatchId(i32);

impl WatchId {
    /// The id the kernel attaches to queue overflow events, which belong to no watch.
    pub const OVERFLOW: WatchId = WatchId(-1);

    /// Wraps a raw identifier.
    pub const fn new(raw: i32) -> Self {
        WatchId(raw)
    }

    /// Raw identifier value.
    pub const fn raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Undecoded notification record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawEvent {
    /// Watch the event belongs to.
    pub id: WatchId,
    /// Every change kind bit the source reported.
    pub mask: ChangeKinds,
    /// Correlation token linking the two halves of a rename; zero when absent.
    pub cookie: u32,
    /// Name of the entry inside a watched directory, if the event concerns one.
    pub name: Option<OsString>,
}

impl RawEvent {
    /// Creates an event without name or cookie.
    pub fn new(id: WatchId, mask: ChangeKinds) -> Self {
        RawEvent {
            id,
            mask,
            cookie: 0,
            name: None,
        }
    }

    /// Sets the child name.
    pub fn with_name(mut self, name: impl Into<OsString>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the correlation token.
    pub fn with_cookie(mut self, cookie: u32) -> Self {
        self.cookie = cookie;
        self
    }
}

/// Event with its full kind set, resolved path and derived flags.
///
/// Transient: built per event and dropped once the record is emitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifiedEvent {
    /// Watch the event belongs to.
    pub id: WatchId,
    /// Every kind present in the raw event.
    pub kinds: ChangeKinds,
    /// Correlation token, if the source set one.
    pub cookie: Option<NonZeroU32>,
    /// Child name, for events about an entry inside a watched directory.
    pub name: Option<OsString>,
    /// Full path of the subject, `None` when the watch id was not live.
    pub path: Option<PathBuf>,
    /// Follow-up work implied by `kinds`.
    pub implications: Implications,
}

impl ClassifiedEvent {
    /// Full path of the subject.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::UnknownWatch`](crate::ErrorKind::UnknownWatch) when the watch id
    /// was not live at classification time.
    pub fn resolved_path(&self) -> Result<&Path> {
        self.path
            .as_deref()
            .ok_or_else(|| Error::unknown_watch(self.id))
    }

    /// Whether this is the source's queue overflow notice.
    pub fn is_overflow(&self) -> bool {
        self.kinds.has(ChangeKind::QueueOverflow)
    }

    /// Whether every flag in `implications` is set.
    pub fn implies(&self, implications: Implications) -> bool {
        self.implications.contains(implications)
    }

    /// Whether `kind` is present.
    pub fn has(&self, kind: ChangeKind) -> bool {
        self.kinds.has(kind)
    }
}

/// Classifies `raw` against the live watches in `registry`.
///
/// The kind set is taken whole from the mask, never collapsed to one label. An event whose id
/// is not live (for instance one that was already in flight when its watch was retired) still
/// classifies, with `path` left empty.
pub fn classify(raw: &RawEvent, registry: &WatchRegistry) -> ClassifiedEvent {
    let name = raw
        .name
        .as_deref()
        .filter(|name| !name.is_empty())
        .map(OsStr::to_os_string);

    let path = registry.resolve_path(raw.id).map(|root| match name {
        Some(ref name) => root.join(name),
        None => root.to_path_buf(),
    });

    ClassifiedEvent {
        id: raw.id,
        kinds: raw.mask,
        cookie: NonZeroU32::new(raw.cookie),
        name,
        path,
        implications: raw.mask.implications(),
    }
}
