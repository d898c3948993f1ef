//! Notification source for the inotify Linux API
//!
//! The inotify API provides a mechanism for monitoring filesystem events. Inotify can be used to
//! monitor individual files, or to monitor directories. When a directory is monitored, inotify
//! will return events for the directory itself, and for files inside the directory.
//!
//! Watches are not recursive: a directory created inside a watched directory needs a watch of
//! its own, and anything placed in it before that watch is installed goes unobserved.

use super::NotificationSource;
use crate::event::{RawEvent, WatchId};
use crate::kind::ChangeKinds;
use inotify as inotify_sys;
use inotify_sys::{Inotify, WatchDescriptor, WatchMask};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;

// Room for ten events carrying the longest possible name.
const BUFFER_SIZE: usize = 10 * (16 + 255 + 1);

/// [`NotificationSource`] backed by a non-blocking inotify instance.
#[derive(Debug)]
pub struct InotifySource {
    inotify: Inotify,
    descriptors: HashMap<WatchId, WatchDescriptor>,
    buffer: Vec<u8>,
}

impl InotifySource {
    /// Opens a new inotify instance.
    pub fn init() -> io::Result<Self> {
        Ok(InotifySource {
            inotify: Inotify::init()?,
            descriptors: HashMap::new(),
            buffer: vec![0; BUFFER_SIZE],
        })
    }
}

impl NotificationSource for InotifySource {
    fn register(&mut self, path: &Path, kinds: ChangeKinds) -> io::Result<WatchId> {
        let mask = WatchMask::from_bits_truncate(kinds.bits());
        let wd = self.inotify.watches().add(path, mask)?;
        let id = WatchId::new(wd.get_watch_descriptor_id());
        self.descriptors.insert(id, wd);
        Ok(id)
    }

    fn unregister(&mut self, id: WatchId) -> io::Result<()> {
        match self.descriptors.remove(&id) {
            Some(wd) => {
                log::trace!("removing inotify watch {id}");
                self.inotify.watches().remove(wd)
            }
            None => Ok(()),
        }
    }

    fn read_batch(&mut self) -> io::Result<Vec<RawEvent>> {
        let batch: Vec<RawEvent> = match self.inotify.read_events(&mut self.buffer) {
            Ok(events) => events
                .map(|event| RawEvent {
                    id: WatchId::new(event.wd.get_watch_descriptor_id()),
                    mask: ChangeKinds::from_mask(event.mask.bits()),
                    cookie: event.cookie,
                    name: event.name.map(OsStr::to_os_string),
                })
                .collect(),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        for event in &batch {
            if event.mask.contains(ChangeKinds::IGNORED) {
                self.descriptors.remove(&event.id);
            }
        }

        Ok(batch)
    }
}

impl AsRawFd for InotifySource {
    fn as_raw_fd(&self) -> RawFd {
        self.inotify.as_raw_fd()
    }
}
