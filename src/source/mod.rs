//! Notification sources: the kernel primitive that delivers raw change events.

use crate::event::{RawEvent, WatchId};
use crate::kind::ChangeKinds;
use std::io;
use std::path::Path;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod inotify;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use self::inotify::InotifySource;

/// The narrow interface the core needs from a change-notification transport.
pub trait NotificationSource {
    /// Registers `path` for the change kinds in `kinds` and returns the id the source assigned.
    ///
    /// Registering an object that is already watched may return the live id again.
    fn register(&mut self, path: &Path, kinds: ChangeKinds) -> io::Result<WatchId>;

    /// Asks the source to stop watching `id`.
    ///
    /// The source answers with an `IGNORED` event for the id once the watch is gone.
    fn unregister(&mut self, id: WatchId) -> io::Result<()>;

    /// Returns the events currently available, in delivery order.
    ///
    /// An empty batch means nothing is pending. Any error is unrecoverable for the source.
    fn read_batch(&mut self) -> io::Result<Vec<RawEvent>>;
}

impl<S: NotificationSource + ?Sized> NotificationSource for &mut S {
    fn register(&mut self, path: &Path, kinds: ChangeKinds) -> io::Result<WatchId> {
        (**self).register(path, kinds)
    }

    fn unregister(&mut self, id: WatchId) -> io::Result<()> {
        (**self).unregister(id)
    }

    fn read_batch(&mut self) -> io::Result<Vec<RawEvent>> {
        (**self).read_batch()
    }
}
