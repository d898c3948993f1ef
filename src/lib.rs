//! Filesystem change watch daemon core, built on Linux inotify
//!
//! Watches a configured set of paths, writes one record per change event to a log, follows
//! directories as they appear and retires watches whose target is gone. Records carry the full
//! set of change kinds of an event, the owner and mode of the subject for events that touch
//! metadata, and a content fingerprint for events that modify data.
//!
//! # Installation
//!
//! ```toml
//! [dependencies]
//! inotify-watch = "0.2.0"
//! ```
//!
//! ## Features
//!
//! - `serde` for serialization of change kinds, watch ids and records
//!
//! # Pipeline
//!
//! Each raw event read from a [`NotificationSource`] goes through:
//!
//! 1. [`classify`], which resolves the watch id to a path and derives [`Implications`]
//! 2. [`WatchManager::apply`], which adds watches for new directories and retires dead ones
//! 3. [`Enricher::enrich`], which reads ownership and fingerprints as implied
//! 4. [`RecordEmitter::emit`], which formats the [`Record`] and hands it to a [`LogSink`]
//!
//! [`Dispatcher`] chains these steps and [`EventLoop`] feeds it from inotify.
//!
//! # Known Problems
//!
//! ### Entries created before their directory is watched
//!
//! A new directory only gets a watch after its creation event was read. Files created inside it
//! in the meantime produce no record. See the [`manager`] module.
//!
//! ### Queue overflow
//!
//! When the kernel queue overflows, events are lost. A `<overflow>` record is written and the
//! watch set is left as is.
//!
//! # Examples
//!
//! ```no_run
//! # #[cfg(target_os = "linux")]
//! # fn main() -> inotify_watch::Result<()> {
//! use inotify_watch::{Config, Dispatcher, EventLoop, InotifySource, StdoutSink};
//! use std::path::Path;
//!
//! let config = Config::default().with_recursive(true);
//! let dispatcher = Dispatcher::new(&config, None, StdoutSink);
//! let mut event_loop = EventLoop::new(InotifySource::init()?, dispatcher)?;
//! event_loop.watch(Path::new("/etc"))?;
//!
//! // call `shutdown` on a handle from another thread to stop
//! let _handle = event_loop.handle();
//! event_loop.run()
//! # }
//! # #[cfg(not(target_os = "linux"))]
//! # fn main() {}
//! ```

#![deny(missing_docs)]

pub use config::{Config, WatchList};
pub use dispatch::Dispatcher;
pub use enrich::{BlockFingerprinter, Enricher, Enrichment, Fingerprint, Ownership};
pub use error::{Error, ErrorKind, Result};
pub use event::{classify, ClassifiedEvent, RawEvent, WatchId};
pub use kind::{ChangeKind, ChangeKinds, Implications};
pub use manager::{WatchChange, WatchManager};
pub use record::{Record, RecordEmitter};
pub use registry::WatchRegistry;
pub use sink::{FanOut, FileSink, LogSink, StdoutSink, SyslogSink};
pub use source::NotificationSource;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use crate::event_loop::{EventLoop, LoopHandle};
#[cfg(any(target_os = "linux", target_os = "android"))]
pub use crate::source::InotifySource;

pub mod config;
pub mod dispatch;
pub mod enrich;
mod error;
pub mod event;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod event_loop;
pub mod kind;
pub mod manager;
pub mod record;
pub mod registry;
pub mod sink;
pub mod source;
