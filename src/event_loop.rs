//! Single-threaded loop waiting on the inotify descriptor and on control messages.

use crate::dispatch::Dispatcher;
use crate::event::WatchId;
use crate::registry::{normalize, WatchRegistry};
use crate::sink::LogSink;
use crate::source::{InotifySource, NotificationSource};
use crate::{Error, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const INOTIFY: mio::Token = mio::Token(0);
const MESSAGE: mio::Token = mio::Token(1);

// The EventLoop sets up a mio::Poll and waits for:
//
// -  messages from a LoopHandle telling it what to do
//
// -  the inotify descriptor becoming readable.

/// Owns the notification source and the watch registry, and feeds every event batch through a
/// [`Dispatcher`].
#[derive(Debug)]
pub struct EventLoop<L> {
    running: bool,
    poll: mio::Poll,
    waker: Arc<mio::Waker>,
    tx: Sender<EventLoopMsg>,
    rx: Receiver<EventLoopMsg>,
    source: InotifySource,
    registry: WatchRegistry,
    dispatcher: Dispatcher<L>,
}

#[derive(Debug)]
enum EventLoopMsg {
    AddWatch(PathBuf, Sender<Result<Vec<WatchId>>>),
    RemoveWatch(PathBuf, Sender<Result<()>>),
    Shutdown,
}

/// Controls a running [`EventLoop`] from other threads.
#[derive(Clone, Debug)]
pub struct LoopHandle {
    channel: Sender<EventLoopMsg>,
    waker: Arc<mio::Waker>,
}

impl<L: LogSink> EventLoop<L> {
    /// Creates a loop reading from `source`.
    pub fn new(source: InotifySource, dispatcher: Dispatcher<L>) -> Result<Self> {
        let (tx, rx) = unbounded::<EventLoopMsg>();
        let poll = mio::Poll::new()?;

        let waker = Arc::new(mio::Waker::new(poll.registry(), MESSAGE)?);

        let inotify_fd = source.as_raw_fd();
        let mut evented_inotify = mio::unix::SourceFd(&inotify_fd);
        poll.registry()
            .register(&mut evented_inotify, INOTIFY, mio::Interest::READABLE)?;

        Ok(EventLoop {
            running: true,
            poll,
            waker,
            tx,
            rx,
            source,
            registry: WatchRegistry::new(),
            dispatcher,
        })
    }

    /// Returns a handle for controlling the loop once it runs.
    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            channel: self.tx.clone(),
            waker: self.waker.clone(),
        }
    }

    /// Registers `path` before the loop starts.
    pub fn watch(&mut self, path: &Path) -> Result<Vec<WatchId>> {
        self.dispatcher
            .register(&mut self.registry, &mut self.source, path)
    }

    /// Live watches.
    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    /// Writes a free-form line to the log.
    pub fn note(&mut self, message: &str) {
        self.dispatcher.note(message)
    }

    /// Runs until [`LoopHandle::shutdown`] is called or the source fails.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::SourceFatal`](crate::ErrorKind::SourceFatal) when polling or reading the
    /// source fails.
    pub fn run(mut self) -> Result<()> {
        let mut events = mio::Events::with_capacity(16);
        while self.running {
            match self.poll.poll(&mut events, None) {
                // interrupted by a signal, retry
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::source_fatal(e)),
                Ok(()) => {}
            }

            for event in &events {
                match event.token() {
                    MESSAGE => self.handle_messages(),
                    INOTIFY => self.handle_inotify()?,
                    _ => unreachable!(),
                }
            }
        }
        log::debug!("event loop stopped");
        Ok(())
    }

    fn handle_messages(&mut self) {
        while let Ok(msg) = self.rx.try_recv() {
            match msg {
                EventLoopMsg::AddWatch(path, tx) => {
                    let _ = tx.send(self.watch(&path));
                }
                EventLoopMsg::RemoveWatch(path, tx) => {
                    let _ = tx.send(self.remove_watch(&path));
                }
                EventLoopMsg::Shutdown => {
                    self.running = false;
                    break;
                }
            }
        }
    }

    fn handle_inotify(&mut self) -> Result<()> {
        self.dispatcher
            .drain(&mut self.registry, &mut self.source)
            .map(drop)
    }

    // Entries are retired before unregistering so the path can be watched again right away.
    // The IGNORED notices that follow are recorded against unknown ids.
    fn remove_watch(&mut self, path: &Path) -> Result<()> {
        let retired = self.registry.retire_tree(path);
        if retired.is_empty() {
            return Err(
                Error::io(io::Error::from(io::ErrorKind::NotFound)).add_path(normalize(path))
            );
        }

        let mut result = Ok(());
        for (id, watched) in retired {
            if let Err(e) = self.source.unregister(id) {
                log::debug!("unable to remove watch {id} on {}: {e}", watched.display());
                if result.is_ok() {
                    result = Err(Error::io(e).add_path(watched));
                }
            }
        }
        result
    }
}

impl LoopHandle {
    /// Asks the loop to stop after the messages already queued.
    pub fn shutdown(&self) -> Result<()> {
        self.send(EventLoopMsg::Shutdown)
    }

    /// Registers `path` on the running loop.
    pub fn add_watch(&self, path: &Path) -> Result<Vec<WatchId>> {
        let (tx, rx) = unbounded();
        self.send(EventLoopMsg::AddWatch(path.to_path_buf(), tx))?;
        rx.recv().map_err(|_| disconnected())?
    }

    /// Stops watching `path` and every watch below it.
    pub fn remove_watch(&self, path: &Path) -> Result<()> {
        let (tx, rx) = unbounded();
        self.send(EventLoopMsg::RemoveWatch(path.to_path_buf(), tx))?;
        rx.recv().map_err(|_| disconnected())?
    }

    fn send(&self, msg: EventLoopMsg) -> Result<()> {
        self.channel.send(msg).map_err(|_| disconnected())?;
        self.waker.wake()?;
        Ok(())
    }
}

fn disconnected() -> Error {
    Error::io(io::Error::new(
        io::ErrorKind::BrokenPipe,
        "event loop is no longer running",
    ))
}
