#![cfg(any(target_os = "linux", target_os = "android"))]

use inotify_watch::{
    ChangeKinds, Config, Dispatcher, InotifySource, LogSink, NotificationSource, Record,
    WatchRegistry,
};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::SystemTime;

#[derive(Default)]
struct Lines(Vec<String>);

impl LogSink for Lines {
    fn emit(&mut self, _timestamp: SystemTime, message: &str) {
        self.0.push(message.to_string());
    }
}

struct Harness {
    source: InotifySource,
    registry: WatchRegistry,
    dispatcher: Dispatcher<Lines>,
}

impl Harness {
    fn new(config: Config, root: &Path) -> Self {
        let mut harness = Harness {
            source: InotifySource::init().unwrap(),
            registry: WatchRegistry::new(),
            dispatcher: Dispatcher::new(&config, None, Lines::default()),
        };
        harness
            .dispatcher
            .register(&mut harness.registry, &mut harness.source, root)
            .unwrap();
        harness
    }

    // inotify queues events synchronously with the syscall that causes them
    fn drain(&mut self) -> Vec<Record> {
        let mut records = Vec::new();
        loop {
            let batch = self.source.read_batch().unwrap();
            if batch.is_empty() {
                return records;
            }
            records.extend(
                self.dispatcher
                    .handle_batch(&mut self.registry, &mut self.source, &batch),
            );
        }
    }

    fn lines(&self) -> &[String] {
        &self.dispatcher.emitter().sink().0
    }
}

#[test]
fn create_directory_then_file_inside() {
    let tmpdir = tempfile::tempdir().unwrap();
    let mut harness = Harness::new(Config::default(), tmpdir.path());

    let sub = tmpdir.path().join("sub");
    fs::create_dir(&sub).unwrap();
    harness.drain();
    assert!(harness.registry.find_by_path(&sub).is_some());

    fs::write(sub.join("file"), "hello").unwrap();
    let records = harness.drain();

    let close = records
        .iter()
        .find(|r| r.kinds.contains(ChangeKinds::CLOSE_WRITE))
        .expect("close write record");
    assert_eq!(close.path.as_deref(), Some(sub.join("file").as_path()));
    assert!(close.fingerprint.is_some());
    assert!(close.ownership.is_none());

    let create = records
        .iter()
        .find(|r| r.kinds.contains(ChangeKinds::CREATE))
        .expect("create record");
    assert!(create.ownership.is_some());
}

#[test]
fn renamed_directory_moves_its_watch() {
    let tmpdir = tempfile::tempdir().unwrap();
    let mut harness = Harness::new(Config::default(), tmpdir.path());

    let before = tmpdir.path().join("before");
    let after = tmpdir.path().join("after");
    fs::create_dir(&before).unwrap();
    harness.drain();
    assert!(harness.registry.find_by_path(&before).is_some());

    fs::rename(&before, &after).unwrap();
    let records = harness.drain();

    assert!(harness.registry.find_by_path(&before).is_none());
    assert!(harness.registry.find_by_path(&after).is_some());

    let from = records
        .iter()
        .find(|r| r.kinds.contains(ChangeKinds::MOVED_FROM))
        .expect("moved from record");
    let to = records
        .iter()
        .find(|r| r.kinds.contains(ChangeKinds::MOVED_TO))
        .expect("moved to record");
    assert!(from.cookie.is_some());
    assert_eq!(from.cookie, to.cookie);
    assert!(harness
        .lines()
        .iter()
        .any(|line| line.contains(&format!("cookie = {}; ", from.cookie.unwrap()))));
}

#[test]
fn removed_directory_retires_its_watch() {
    let tmpdir = tempfile::tempdir().unwrap();
    let sub = tmpdir.path().join("sub");
    fs::create_dir(&sub).unwrap();
    let mut harness = Harness::new(Config::default().with_recursive(true), tmpdir.path());
    assert_eq!(harness.registry.len(), 2);

    fs::remove_dir(&sub).unwrap();
    harness.drain();

    assert_eq!(harness.registry.len(), 1);
    assert!(harness.registry.find_by_path(&sub).is_none());

    let sub = sub.display().to_string();
    assert!(harness
        .lines()
        .iter()
        .any(|line| line.starts_with(&sub) && line.contains("IN_DELETE_SELF")));
    assert!(harness
        .lines()
        .iter()
        .any(|line| line.starts_with(&sub) && line.contains("IN_IGNORED")));
}

#[test]
fn permission_change_records_new_mode() {
    let tmpdir = tempfile::tempdir().unwrap();
    let file = tmpdir.path().join("secret");
    fs::write(&file, "").unwrap();
    let mut harness = Harness::new(Config::default(), tmpdir.path());

    fs::set_permissions(&file, fs::Permissions::from_mode(0o600)).unwrap();
    harness.drain();

    let expected = format!("{}; wd = ", file.display());
    let line = harness
        .lines()
        .iter()
        .find(|line| line.starts_with(&expected) && line.contains("IN_ATTRIB"))
        .expect("attrib record");
    assert!(line.ends_with("; mode = 0600"), "{line}");
}

#[test]
fn unreadable_watch_list_entry_is_noted_and_skipped() {
    let tmpdir = tempfile::tempdir().unwrap();
    let mut harness = Harness::new(Config::default(), tmpdir.path());

    let missing = tmpdir.path().join("missing");
    let err = harness
        .dispatcher
        .register(&mut harness.registry, &mut harness.source, &missing)
        .unwrap_err();

    assert!(!err.is_fatal());
    assert_eq!(harness.registry.len(), 1);
    assert!(harness.lines()[0].starts_with(&format!("unable to watch {}", missing.display())));
}
