//! Per-event pipeline: classify, update the watch set, enrich, emit.

use crate::config::Config;
use crate::enrich::{BlockFingerprinter, Enricher, Fingerprint};
use crate::event::{classify, RawEvent, WatchId};
use crate::manager::{WatchChange, WatchManager};
use crate::record::{Record, RecordEmitter};
use crate::registry::WatchRegistry;
use crate::sink::LogSink;
use crate::source::NotificationSource;
use crate::{Error, Result};
use std::path::Path;

/// Turns raw events into emitted records, keeping the watch set current on the way.
///
/// Every event yields exactly one record, including events for ids that are no longer live and
/// queue overflow notices.
#[derive(Debug)]
pub struct Dispatcher<L> {
    manager: WatchManager,
    enricher: Enricher,
    emitter: RecordEmitter<L>,
}

impl<L: LogSink> Dispatcher<L> {
    /// Creates a dispatcher writing to `sink`.
    ///
    /// When `config` enables fingerprints and no `fingerprinter` is given, a
    /// [`BlockFingerprinter`] bounded by [`Config::max_fingerprint_bytes`] is used.
    pub fn new(config: &Config, fingerprinter: Option<Box<dyn Fingerprint>>, sink: L) -> Self {
        let fingerprinter = if config.fingerprints() {
            fingerprinter.or_else(|| {
                Some(Box::new(BlockFingerprinter::new(config.max_fingerprint_bytes()))
                    as Box<dyn Fingerprint>)
            })
        } else {
            None
        };

        Dispatcher {
            manager: WatchManager::new(config),
            enricher: Enricher::new(fingerprinter),
            emitter: RecordEmitter::new(sink),
        }
    }

    /// Registers `path` and, when recursive, its subdirectories.
    ///
    /// A failure is also written to the log as a note, so operators see which entries of the
    /// watch list are not covered.
    pub fn register<S>(
        &mut self,
        registry: &mut WatchRegistry,
        source: &mut S,
        path: &Path,
    ) -> Result<Vec<WatchId>>
    where
        S: NotificationSource + ?Sized,
    {
        self.manager
            .register(registry, source, path)
            .map_err(|err| {
                self.emitter
                    .note(&format!("unable to watch {}: {err}", path.display()));
                err
            })
    }

    /// Handles one raw event and returns the record that was emitted for it.
    pub fn handle_event<S>(
        &mut self,
        registry: &mut WatchRegistry,
        source: &mut S,
        raw: &RawEvent,
    ) -> Record
    where
        S: NotificationSource + ?Sized,
    {
        let event = classify(raw, registry);

        if event.is_overflow() {
            log::warn!("{}", Error::overflow());
        } else if let Err(err) = event.resolved_path() {
            if registry.is_retiring(event.id) {
                log::debug!("{err} (watch retired)");
            } else {
                log::warn!("{err}");
            }
        }

        match self.manager.apply(registry, source, &event) {
            Ok(Some(WatchChange::Added(ids))) => log::trace!("watches added: {ids:?}"),
            Ok(Some(WatchChange::Retired(retired))) => log::trace!("watches retired: {retired:?}"),
            Ok(None) => (),
            Err(err) => log::warn!("{err}"),
        }

        let record = Record::new(&event, self.enricher.enrich(&event));
        self.emitter.emit(&record);
        record
    }

    /// Handles `batch` in delivery order.
    pub fn handle_batch<S>(
        &mut self,
        registry: &mut WatchRegistry,
        source: &mut S,
        batch: &[RawEvent],
    ) -> Vec<Record>
    where
        S: NotificationSource + ?Sized,
    {
        batch
            .iter()
            .map(|raw| self.handle_event(registry, source, raw))
            .collect()
    }

    /// Reads and handles batches from `source` until it has nothing pending.
    ///
    /// Returns the number of events handled.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::SourceFatal`](crate::ErrorKind::SourceFatal) when a read fails. Batches read
    /// before the failure are fully handled.
    pub fn drain<S>(&mut self, registry: &mut WatchRegistry, source: &mut S) -> Result<usize>
    where
        S: NotificationSource + ?Sized,
    {
        let mut handled = 0;
        loop {
            let batch = source.read_batch().map_err(Error::source_fatal)?;
            if batch.is_empty() {
                return Ok(handled);
            }
            log::trace!("read {} events", batch.len());
            handled += self.handle_batch(registry, source, &batch).len();
        }
    }

    /// Writes a free-form line to the log.
    pub fn note(&mut self, message: &str) {
        self.emitter.note(message)
    }

    /// Returns the emitter.
    pub fn emitter(&self) -> &RecordEmitter<L> {
        &self.emitter
    }
}
