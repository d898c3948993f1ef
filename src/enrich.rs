//! Ownership, permission and content fingerprint lookups for changed files.

use crate::event::ClassifiedEvent;
use crate::kind::Implications;
use crate::{Error, Result};
use std::collections::HashMap;
use std::ffi::CStr;
use std::fs::{self, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::Path;
use xxhash_rust::xxh3::xxh3_64;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Fingerprint value recorded when the collaborator fails.
pub const FINGERPRINT_ERROR: &str = "ERROR";

/// Content-similarity fingerprint collaborator.
///
/// Implemented for closures, so tests and embedders can plug in their own hashing.
pub trait Fingerprint: Send {
    /// Computes the fingerprint of the file at `path`.
    fn fingerprint(&mut self, path: &Path) -> io::Result<String>;
}

impl<F> Fingerprint for F
where
    F: FnMut(&Path) -> io::Result<String> + Send,
{
    fn fingerprint(&mut self, path: &Path) -> io::Result<String> {
        (self)(path)
    }
}

/// Piecewise fingerprint: similar contents give signatures that differ in few characters.
///
/// The file is cut into blocks sized so the signature stays within 64 characters, and each
/// block contributes one character derived from its xxh3 hash. The result reads
/// `<block size>:<signature>`.
#[derive(Clone, Copy, Debug)]
pub struct BlockFingerprinter {
    max_bytes: u64,
}

const MIN_BLOCK_SIZE: usize = 64;
const SIGNATURE_LEN: usize = 64;
const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

impl BlockFingerprinter {
    /// Creates a fingerprinter reading at most `max_bytes` of each file.
    pub fn new(max_bytes: u64) -> Self {
        BlockFingerprinter { max_bytes }
    }

    /// Signature of `data`.
    pub fn signature(data: &[u8]) -> String {
        let mut block_size = MIN_BLOCK_SIZE;
        while block_size * SIGNATURE_LEN < data.len() {
            block_size *= 2;
        }

        let signature: String = data
            .chunks(block_size)
            .map(|block| ALPHABET[(xxh3_64(block) & 0x3f) as usize] as char)
            .collect();
        format!("{block_size}:{signature}")
    }
}

// Only regular files are read. The open never blocks, so a FIFO or device in a watched
// directory cannot stall the loop.
impl Fingerprint for BlockFingerprinter {
    fn fingerprint(&mut self, path: &Path) -> io::Result<String> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)?;
        if !file.metadata()?.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            ));
        }

        let mut data = Vec::new();
        file.take(self.max_bytes).read_to_end(&mut data)?;
        Ok(Self::signature(&data))
    }
}

/// Owner, group and permission bits of a file.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Ownership {
    /// Owner user name, or the numeric uid when it has no name.
    pub user: String,
    /// Owner group name, or the numeric gid when it has no name.
    pub group: String,
    /// Permission bits, `None` when the file could not be read.
    pub mode: Option<u32>,
}

impl Ownership {
    /// Value recorded when the file could not be read.
    pub fn placeholder() -> Self {
        Ownership {
            user: "?".into(),
            group: "?".into(),
            mode: None,
        }
    }

    /// Permission bits in octal, `----` when unknown.
    pub fn mode_string(&self) -> String {
        match self.mode {
            Some(mode) => format!("{:04o}", mode & 0o7777),
            None => "----".into(),
        }
    }
}

/// Values gathered for one event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Enrichment {
    /// Set when the event implies a metadata read.
    pub ownership: Option<Ownership>,
    /// Set when the event implies a fingerprint and fingerprints are enabled.
    pub fingerprint: Option<String>,
}

/// Gathers ownership and fingerprints for the events that imply them.
///
/// Failures never abort an event: they are logged and replaced by placeholder values.
pub struct Enricher {
    fingerprinter: Option<Box<dyn Fingerprint>>,
    users: HashMap<u32, String>,
    groups: HashMap<u32, String>,
}

impl Enricher {
    /// Creates an enricher. Without a fingerprinter no fingerprint is recorded.
    pub fn new(fingerprinter: Option<Box<dyn Fingerprint>>) -> Self {
        Enricher {
            fingerprinter,
            users: HashMap::new(),
            groups: HashMap::new(),
        }
    }

    /// Reads the owner and permission bits of `path`.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::StatFailed`](crate::ErrorKind::StatFailed) when `path` cannot be stat'ed,
    /// typically because it was removed before the event was read.
    pub fn ownership(&mut self, path: &Path) -> Result<Ownership> {
        let metadata =
            fs::metadata(path).map_err(|err| Error::stat_failed(err, path.to_path_buf()))?;
        let uid = metadata.uid();
        let gid = metadata.gid();

        let user = self
            .users
            .entry(uid)
            .or_insert_with(|| user_name(uid).unwrap_or_else(|| uid.to_string()))
            .clone();
        let group = self
            .groups
            .entry(gid)
            .or_insert_with(|| group_name(gid).unwrap_or_else(|| gid.to_string()))
            .clone();

        Ok(Ownership {
            user,
            group,
            mode: Some(metadata.mode()),
        })
    }

    /// Fingerprints `path`, or returns `None` when fingerprints are disabled.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::FingerprintFailed`](crate::ErrorKind::FingerprintFailed) when the
    /// collaborator fails.
    pub fn fingerprint(&mut self, path: &Path) -> Result<Option<String>> {
        match self.fingerprinter {
            Some(ref mut fingerprinter) => fingerprinter
                .fingerprint(path)
                .map(Some)
                .map_err(|err| Error::fingerprint_failed(err, path.to_path_buf())),
            None => Ok(None),
        }
    }

    /// Gathers what `event` implies, substituting placeholders for anything that fails.
    pub fn enrich(&mut self, event: &ClassifiedEvent) -> Enrichment {
        let mut enrichment = Enrichment::default();
        let path = event.path.as_deref();

        if event.implies(Implications::METADATA_READ) {
            let ownership = match path {
                Some(path) => self.ownership(path).unwrap_or_else(|err| {
                    log::debug!("{err}");
                    Ownership::placeholder()
                }),
                None => Ownership::placeholder(),
            };
            enrichment.ownership = Some(ownership);
        }

        if event.implies(Implications::FINGERPRINT) && self.fingerprinter.is_some() {
            let fingerprint = match path {
                Some(path) => self.fingerprint(path).unwrap_or_else(|err| {
                    log::warn!("{err}");
                    Some(FINGERPRINT_ERROR.into())
                }),
                None => Some(FINGERPRINT_ERROR.into()),
            };
            enrichment.fingerprint = fingerprint;
        }

        enrichment
    }
}

impl std::fmt::Debug for Enricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enricher")
            .field("fingerprints", &self.fingerprinter.is_some())
            .field("users", &self.users)
            .field("groups", &self.groups)
            .finish()
    }
}

// getpwuid_r and getgrgid_r report ERANGE until the scratch buffer is large enough
const MAX_NAME_BUFFER: usize = 1 << 20;

fn user_name(uid: u32) -> Option<String> {
    let mut buffer = vec![0 as libc::c_char; 1024];
    loop {
        let mut passwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        let rc = unsafe {
            libc::getpwuid_r(
                uid,
                &mut passwd,
                buffer.as_mut_ptr(),
                buffer.len(),
                &mut result,
            )
        };
        if rc == libc::ERANGE && buffer.len() < MAX_NAME_BUFFER {
            buffer.resize(buffer.len() * 2, 0);
            continue;
        }
        if rc != 0 || result.is_null() {
            return None;
        }
        let name = unsafe { CStr::from_ptr(passwd.pw_name) };
        return Some(name.to_string_lossy().into_owned());
    }
}

fn group_name(gid: u32) -> Option<String> {
    let mut buffer = vec![0 as libc::c_char; 1024];
    loop {
        let mut group: libc::group = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::group = std::ptr::null_mut();
        let rc = unsafe {
            libc::getgrgid_r(
                gid,
                &mut group,
                buffer.as_mut_ptr(),
                buffer.len(),
                &mut result,
            )
        };
        if rc == libc::ERANGE && buffer.len() < MAX_NAME_BUFFER {
            buffer.resize(buffer.len() * 2, 0);
            continue;
        }
        if rc != 0 || result.is_null() {
            return None;
        }
        let name = unsafe { CStr::from_ptr(group.gr_name) };
        return Some(name.to_string_lossy().into_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{classify, RawEvent};
    use crate::kind::ChangeKinds;
    use crate::registry::WatchRegistry;
    use crate::test::{failing_fingerprint, FakeSource};
    use crate::ErrorKind;
    use pretty_assertions::assert_eq;
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::fs::PermissionsExt;

    fn watched(path: &Path) -> (WatchRegistry, crate::WatchId) {
        let mut registry = WatchRegistry::new();
        let id = registry
            .add(&mut FakeSource::new(), path, ChangeKinds::ALL_EVENTS)
            .expect("add");
        (registry, id)
    }

    #[test]
    fn signature_is_stable_and_bounded() {
        let data = vec![7u8; 10_000];
        let a = BlockFingerprinter::signature(&data);
        let b = BlockFingerprinter::signature(&data);
        assert_eq!(a, b);

        let (block, signature) = a.split_once(':').expect("separator");
        assert_eq!(block, "256");
        assert_eq!(signature.len(), 40);
    }

    #[test]
    fn small_edit_changes_few_signature_characters() {
        let original: Vec<u8> = (0..8192u32).map(|i| (i % 251) as u8).collect();
        let mut edited = original.clone();
        edited[4000] ^= 0xff;

        let a = BlockFingerprinter::signature(&original);
        let b = BlockFingerprinter::signature(&edited);
        let differing = a.chars().zip(b.chars()).filter(|(x, y)| x != y).count();
        assert!(differing <= 1, "{a} vs {b}");
    }

    #[test]
    fn empty_file_has_empty_signature() {
        assert_eq!(BlockFingerprinter::signature(&[]), "64:");
    }

    #[test]
    fn fingerprinter_reads_only_up_to_bound() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("big");
        let mut contents = vec![1u8; 4096];
        contents.extend(vec![2u8; 4096]);
        fs::write(&file, &contents).expect("write");

        let bounded = BlockFingerprinter::new(4096)
            .fingerprint(&file)
            .expect("fingerprint");
        assert_eq!(bounded, BlockFingerprinter::signature(&contents[..4096]));
    }

    #[test]
    fn fifo_is_not_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fifo = dir.path().join("pipe");
        let c_path = CString::new(fifo.as_os_str().as_bytes()).expect("c path");
        assert_eq!(unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) }, 0);

        let err = BlockFingerprinter::new(4096)
            .fingerprint(&fifo)
            .expect_err("fifo");
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let (registry, id) = watched(dir.path());
        let event = classify(
            &RawEvent::new(id, ChangeKinds::CLOSE_WRITE).with_name("pipe"),
            &registry,
        );
        let mut enricher = Enricher::new(Some(Box::new(BlockFingerprinter::new(4096))));
        assert_eq!(
            enricher.enrich(&event).fingerprint.as_deref(),
            Some(FINGERPRINT_ERROR)
        );
    }

    #[test]
    fn ownership_reads_mode() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("entry");
        fs::write(&file, "").expect("write");
        fs::set_permissions(&file, fs::Permissions::from_mode(0o640)).expect("chmod");

        let ownership = Enricher::new(None).ownership(&file).expect("ownership");
        assert_eq!(ownership.mode_string(), "0640");
        assert!(!ownership.user.is_empty());
        assert!(!ownership.group.is_empty());
    }

    #[test]
    fn ownership_of_missing_path_fails_with_stat_error() {
        let err = Enricher::new(None)
            .ownership(Path::new("/some/non/existant/path"))
            .expect_err("missing");
        assert!(matches!(err.kind, ErrorKind::StatFailed(_)));
    }

    #[test]
    fn vanished_file_gets_placeholder_ownership() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (registry, id) = watched(dir.path());
        let event = classify(
            &RawEvent::new(id, ChangeKinds::CREATE).with_name("gone"),
            &registry,
        );

        let enrichment = Enricher::new(None).enrich(&event);
        assert_eq!(enrichment.ownership, Some(Ownership::placeholder()));
        assert_eq!(enrichment.fingerprint, None);
    }

    #[test]
    fn failing_fingerprint_is_recorded_as_error_marker() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (registry, id) = watched(dir.path());
        let event = classify(
            &RawEvent::new(id, ChangeKinds::CLOSE_WRITE).with_name("file"),
            &registry,
        );

        let enrichment = Enricher::new(Some(Box::new(failing_fingerprint))).enrich(&event);
        assert_eq!(enrichment.fingerprint.as_deref(), Some(FINGERPRINT_ERROR));
        assert_eq!(enrichment.ownership, None);
    }

    #[test]
    fn disabled_fingerprints_leave_field_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (registry, id) = watched(dir.path());
        let event = classify(
            &RawEvent::new(id, ChangeKinds::MODIFY).with_name("file"),
            &registry,
        );

        assert_eq!(Enricher::new(None).enrich(&event), Enrichment::default());
    }

    #[test]
    fn closure_fingerprint_is_used() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (registry, id) = watched(dir.path());
        let event = classify(&RawEvent::new(id, ChangeKinds::MODIFY), &registry);

        let mut enricher = Enricher::new(Some(Box::new(|path: &Path| -> io::Result<String> {
            Ok(format!("fp:{}", path.display()))
        })));
        assert_eq!(
            enricher.enrich(&event).fingerprint,
            Some(format!("fp:{}", dir.path().display()))
        );
    }
}
