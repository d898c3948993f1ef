//! Configuration types

use crate::kind::ChangeKinds;
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Daemon configuration
///
/// ```rust
/// # use inotify_watch::Config;
/// let config = Config::default()
///     .with_recursive(true)
///     .with_max_fingerprint_bytes(1 << 20);
/// ```
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct Config {
    /// See [Config::with_recursive]
    recursive: bool,

    /// See [Config::with_fingerprints]
    fingerprints: bool,

    /// See [Config::with_max_fingerprint_bytes]
    max_fingerprint_bytes: u64,

    /// See [Config::with_watch_kinds]
    watch_kinds: ChangeKinds,
}

impl Config {
    /// Walk existing subdirectories when registering a directory, both at startup and when a
    /// new directory shows up under a watch.
    ///
    /// The walk happens once, at registration time. Off by default.
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Returns current setting
    pub fn recursive(&self) -> bool {
        self.recursive
    }

    /// Compute a content fingerprint for modified files. On by default.
    pub fn with_fingerprints(mut self, fingerprints: bool) -> Self {
        self.fingerprints = fingerprints;
        self
    }

    /// Returns current setting
    pub fn fingerprints(&self) -> bool {
        self.fingerprints
    }

    /// Upper bound on the bytes read from one file to fingerprint it. Larger files are
    /// fingerprinted on their prefix.
    ///
    /// The default is 16 MiB.
    pub fn with_max_fingerprint_bytes(mut self, max: u64) -> Self {
        self.max_fingerprint_bytes = max;
        self
    }

    /// Returns current setting
    pub fn max_fingerprint_bytes(&self) -> u64 {
        self.max_fingerprint_bytes
    }

    /// Change kinds requested for every watch. Defaults to [`ChangeKinds::ALL_EVENTS`].
    ///
    /// `CREATE` is needed for new directories to be picked up.
    pub fn with_watch_kinds(mut self, kinds: ChangeKinds) -> Self {
        self.watch_kinds = kinds;
        self
    }

    /// Returns current setting
    pub fn watch_kinds(&self) -> ChangeKinds {
        self.watch_kinds
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recursive: false,
            fingerprints: true,
            max_fingerprint_bytes: 16 * 1024 * 1024,
            watch_kinds: ChangeKinds::ALL_EVENTS,
        }
    }
}

/// Paths to watch at startup, one absolute path per line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WatchList {
    paths: Vec<PathBuf>,
}

impl WatchList {
    /// Parses a watch list.
    ///
    /// Blank lines and lines starting with `#` are skipped. Relative paths are reported and
    /// skipped.
    pub fn parse(contents: &str) -> Self {
        let paths = contents
            .lines()
            .enumerate()
            .filter_map(|(index, line)| {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    return None;
                }
                let path = Path::new(line);
                if path.is_relative() {
                    log::warn!("watch list line {}: {line} is not absolute", index + 1);
                    return None;
                }
                Some(path.to_path_buf())
            })
            .collect();
        WatchList { paths }
    }

    /// Reads and parses the watch list at `path`.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::Config`](crate::ErrorKind::Config) if the file cannot be read.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|err| {
            Error::config(&format!("unable to read watch list: {err}")).add_path(path.into())
        })?;
        Ok(Self::parse(&contents))
    }

    /// Paths in file order.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Whether the list holds no path.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl IntoIterator for WatchList {
    type Item = PathBuf;
    type IntoIter = std::vec::IntoIter<PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.into_iter()
    }
}
