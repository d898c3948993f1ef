//! Registry of live watches.

use crate::event::WatchId;
use crate::kind::ChangeKinds;
use crate::source::NotificationSource;
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Live watches, keyed by id with a secondary index by path.
///
/// Invariants: no two entries share an id, and no two entries share a normalized path.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    paths: HashMap<WatchId, PathBuf>,
    watches: HashMap<PathBuf, WatchId>,
    // dropped here and unregistered, the source's IGNORED notice is still due
    retiring: HashSet<WatchId>,
}

/// Drops trailing slashes, repeated separators and `.` components.
///
/// `..` is kept as is: resolving it would need the filesystem and may cross symlinks.
pub fn normalize(path: &Path) -> PathBuf {
    path.components().collect()
}

impl WatchRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `path` with `source` and records the new watch.
    ///
    /// If `path` is already watched, returns the existing id without calling the source.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::RegistrationFailed`](crate::ErrorKind::RegistrationFailed) when the source
    /// rejects the path. Nothing is recorded in that case.
    pub fn add<S>(&mut self, source: &mut S, path: &Path, kinds: ChangeKinds) -> Result<WatchId>
    where
        S: NotificationSource + ?Sized,
    {
        let path = normalize(path);
        if let Some(&id) = self.watches.get(&path) {
            return Ok(id);
        }

        log::trace!("adding watch: {}", path.display());
        let id = source
            .register(&path, kinds)
            .map_err(|err| Error::registration_failed(err, path.clone()))?;

        if let Some(existing) = self.paths.get(&id) {
            // the kernel hands back the live id when the same inode is reached by another path
            log::debug!(
                "{} resolves to watch {id}, already held by {}",
                path.display(),
                existing.display()
            );
            return Ok(id);
        }

        log::debug!("watch {id} added for {}", path.display());
        self.retiring.remove(&id);
        self.watches.insert(path.clone(), id);
        self.paths.insert(id, path);
        Ok(id)
    }

    /// Forgets the watch `id`, returning the path it covered.
    ///
    /// Unknown ids are ignored: the source reports removals asynchronously and may do so after
    /// the registry already dropped the entry.
    pub fn remove(&mut self, id: WatchId) -> Option<PathBuf> {
        self.retiring.remove(&id);
        let path = self.paths.remove(&id)?;
        self.watches.remove(&path);
        log::debug!("watch {id} removed for {}", path.display());
        Some(path)
    }

    /// Forgets every watch at or below `root` ahead of unregistering them with the source.
    ///
    /// The ids stay marked as retiring until their removal notice arrives through
    /// [`WatchRegistry::remove`], so late events for them can be told apart from stray ones.
    /// A later `add` of the same path registers a fresh watch.
    pub fn retire_tree(&mut self, root: &Path) -> Vec<(WatchId, PathBuf)> {
        let root = normalize(root);
        let ids: Vec<WatchId> = self
            .paths
            .iter()
            .filter(|(_, path)| path.starts_with(&root))
            .map(|(&id, _)| id)
            .collect();

        let mut removed: Vec<_> = ids
            .into_iter()
            .filter_map(|id| self.remove(id).map(|path| (id, path)))
            .collect();
        removed.sort();
        self.retiring.extend(removed.iter().map(|&(id, _)| id));
        removed
    }

    /// Whether `id` was retired by [`WatchRegistry::retire_tree`] and its removal notice is
    /// still due.
    pub fn is_retiring(&self, id: WatchId) -> bool {
        self.retiring.contains(&id)
    }

    /// Path watched by `id`.
    pub fn resolve_path(&self, id: WatchId) -> Option<&Path> {
        self.paths.get(&id).map(PathBuf::as_path)
    }

    /// Id of the watch on `path`, if any.
    pub fn find_by_path(&self, path: &Path) -> Option<WatchId> {
        self.watches.get(&normalize(path)).copied()
    }

    /// Number of live watches.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether no watch is live.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Live watches in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (WatchId, &Path)> {
        self.paths.iter().map(|(&id, path)| (id, path.as_path()))
    }
}
