//! Keeps the watch set in step with the directory structure under watch.
//!
//! # Known gap
//!
//! A watch for a new directory can only be installed after its creation event has been read.
//! Entries placed in the directory before that point produce no event. With
//! [`Config::with_recursive`] the subdirectories present when the watch lands are picked up by a
//! one-shot walk; files are not replayed.

use crate::config::Config;
use crate::event::{ClassifiedEvent, WatchId};
use crate::kind::{ChangeKind, ChangeKinds, Implications};
use crate::registry::WatchRegistry;
use crate::source::NotificationSource;
use crate::Result;
use std::fs::metadata;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Watch set change made in response to an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchChange {
    /// Watches were added for a directory that appeared, in walk order.
    Added(Vec<WatchId>),
    /// Watches were retired, with the paths they covered.
    Retired(Vec<(WatchId, PathBuf)>),
}

/// Adds watches for directories that appear and retires watches whose target is gone.
#[derive(Clone, Debug)]
pub struct WatchManager {
    kinds: ChangeKinds,
    recursive: bool,
}

impl WatchManager {
    /// Creates a manager registering watches with the kinds and recursion from `config`.
    pub fn new(config: &Config) -> Self {
        WatchManager {
            kinds: config.watch_kinds(),
            recursive: config.recursive(),
        }
    }

    /// Registers `path`, and its existing subdirectories when recursive.
    ///
    /// # Errors
    ///
    /// Fails only when `path` itself cannot be registered. Subdirectories that cannot be
    /// registered are reported and skipped.
    pub fn register<S>(
        &self,
        registry: &mut WatchRegistry,
        source: &mut S,
        path: &Path,
    ) -> Result<Vec<WatchId>>
    where
        S: NotificationSource + ?Sized,
    {
        let mut ids = vec![registry.add(source, path, self.kinds)?];
        if !self.recursive || !is_dir(path) {
            return Ok(ids);
        }

        for entry in WalkDir::new(path)
            .min_depth(1)
            .into_iter()
            .filter_map(filter_dir)
        {
            match registry.add(source, entry.path(), self.kinds) {
                Ok(id) => ids.push(id),
                Err(err) => log::warn!("{err}"),
            }
        }
        Ok(ids)
    }

    /// Applies the watch set change implied by `event`, if any.
    ///
    /// Must run after `event` was classified: retiring a watch makes later events for its id
    /// unresolvable.
    pub fn apply<S>(
        &self,
        registry: &mut WatchRegistry,
        source: &mut S,
        event: &ClassifiedEvent,
    ) -> Result<Option<WatchChange>>
    where
        S: NotificationSource + ?Sized,
    {
        if event.implies(Implications::REMOVAL) {
            // the source already dropped the watch, only the registry needs updating
            return Ok(registry
                .remove(event.id)
                .map(|path| WatchChange::Retired(vec![(event.id, path)])));
        }

        if !event.implies(Implications::DIRECTORY_CHECK) || event.name.is_none() {
            return Ok(None);
        }
        let path = match event.path {
            Some(ref path) => path,
            None => return Ok(None),
        };

        if event.has(ChangeKind::Create) || event.has(ChangeKind::MovedTo) {
            if registry.find_by_path(path).is_some() {
                return Ok(None);
            }
            // the directory may be gone again by the time its event is read
            if !is_dir(path) {
                log::debug!("{} vanished before it could be watched", path.display());
                return Ok(None);
            }
            return self
                .register(registry, source, path)
                .map(|ids| Some(WatchChange::Added(ids)));
        }

        if event.has(ChangeKind::MovedFrom) {
            let retired = registry.retire_tree(path);
            if retired.is_empty() {
                return Ok(None);
            }
            for (id, path) in &retired {
                if let Err(err) = source.unregister(*id) {
                    log::debug!("unable to unregister {}: {err}", path.display());
                }
            }
            return Ok(Some(WatchChange::Retired(retired)));
        }

        Ok(None)
    }
}

fn is_dir(path: &Path) -> bool {
    metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}

/// return `DirEntry` when it is a directory
fn filter_dir(e: walkdir::Result<walkdir::DirEntry>) -> Option<walkdir::DirEntry> {
    if let Ok(e) = e {
        if let Ok(metadata) = e.metadata() {
            if metadata.is_dir() {
                return Some(e);
            }
        }
    }
    None
}
