//! # Metadata Coordinator
//!
//! Fans a batch of paths out to concurrent per-file tasks and gathers one
//! outcome per distinct path.
//!
//! ## Per-file pipeline
//!
//! ```text
//! path ──> readable? ──no──> NotFound
//!            │
//!            └─> route ──unsupported──> UnsupportedType
//!                  │
//!                  └─> cache / in-flight lookup (one critical section)
//!                        ├─ hit ───────────> cached outcome
//!                        ├─ in flight ─────> wait for the leader's outcome
//!                        └─ miss ──> blocking pool ──> normalize ──> cache
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use core_metadata::{ExtractorSet, MetadataCoordinator};
//! use core_runtime::config::ExtractorConfig;
//!
//! let config = ExtractorConfig::default();
//! let coordinator = MetadataCoordinator::new(config.clone(), ExtractorSet::builtin(&config))?;
//!
//! let results = coordinator.extract_all(["report.pdf", "photo.jpg"]).await?;
//! for (path, outcome) in results.sorted() {
//!     println!("{}: {}", path.display(), outcome.is_success());
//! }
//! ```
//!
//! A failure in one file never affects the others. Timed-out and cancelled
//! extractions are reported for their path but never cached.

use core_async::fs::is_readable_file;
use core_async::runtime::{inside_runtime, worker_runtime};
use core_async::sync::{watch, CancellationToken, Semaphore};
use core_async::task::{describe_join_error, spawn, spawn_blocking};
use core_async::time::{timeout, Duration, Instant};
use core_runtime::config::ExtractorConfig;
use core_runtime::events::{progress_percent, CoreEvent, EventBus, ExtractionEvent};
use core_runtime::logging::strip_path;
use core_runtime::time::{Clock, SystemClock};
use futures::future::{self, Either};
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::pin;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cache::ExtractionCache;
use crate::error::{ExtractionError, MetadataError, Result};
use crate::extractor::ExtractorSet;
use crate::normalize::normalize;
use crate::router::{self, ExtractorKind, Route};
use crate::value::{AggregateResult, ExtractionOutcome};

type OutcomeSender = watch::Sender<Option<ExtractionOutcome>>;
type OutcomeReceiver = watch::Receiver<Option<ExtractionOutcome>>;

/// Cache plus the table of paths currently being extracted. Guarded by one
/// mutex so the lookup and the in-flight registration are atomic.
struct SharedState {
    cache: ExtractionCache,
    in_flight: HashMap<PathBuf, OutcomeSender>,
}

impl SharedState {
    fn new(cache: ExtractionCache) -> Self {
        Self {
            cache,
            in_flight: HashMap::new(),
        }
    }
}

enum Lookup {
    Hit(ExtractionOutcome),
    Wait(OutcomeReceiver),
    Lead(FlightTicket),
}

/// Held by the task extracting a path. Completing it publishes the outcome
/// to the cache and to any waiters; dropping it unpublished just clears the
/// in-flight marker so waiters retry on their own.
struct FlightTicket {
    state: Arc<Mutex<SharedState>>,
    path: PathBuf,
    published: bool,
}

impl FlightTicket {
    fn publish(mut self, outcome: &ExtractionOutcome) {
        let sender = {
            let mut state = self.state.lock();
            state.cache.put(self.path.clone(), outcome.clone());
            state.in_flight.remove(&self.path)
        };
        self.published = true;
        if let Some(sender) = sender {
            // No receivers is fine.
            let _ = sender.send(Some(outcome.clone()));
        }
    }
}

impl Drop for FlightTicket {
    fn drop(&mut self) {
        if !self.published {
            self.state.lock().in_flight.remove(&self.path);
        }
    }
}

/// Everything a per-file task needs, cheap to clone into spawned tasks.
#[derive(Clone)]
struct Worker {
    extractors: ExtractorSet,
    state: Arc<Mutex<SharedState>>,
    limiter: Arc<Semaphore>,
    extraction_timeout: Option<Duration>,
    cancel: Arc<Mutex<CancellationToken>>,
}

impl Worker {
    /// Resolves one path to its outcome. The flag is `true` when the outcome
    /// came from the cache or from another task's extraction.
    ///
    /// Missing files, unsupported types and cache hits are answered even
    /// after cancellation; only waiting on or running an extraction is
    /// abandoned.
    #[instrument(skip(self, path), fields(file = %strip_path(&path.to_string_lossy())))]
    async fn process(&self, path: &Path) -> (ExtractionOutcome, bool) {
        if !is_readable_file(path).await {
            return (ExtractionError::not_found().into(), false);
        }

        let kind = match router::route(path) {
            Route::Extractor(kind) => kind,
            Route::Unsupported(ext) => {
                return (ExtractionError::unsupported(ext.as_deref()).into(), false);
            }
        };

        let cancel = self.cancel.lock().clone();
        loop {
            match self.lookup(path) {
                Lookup::Hit(outcome) => {
                    debug!("cache hit");
                    return (outcome, true);
                }
                Lookup::Wait(receiver) => {
                    debug!("waiting for in-flight extraction");
                    match until_cancelled(&cancel, wait_for_leader(receiver)).await {
                        Some(Some(outcome)) => return (outcome, true),
                        // The leader gave up without an outcome; try again.
                        Some(None) => {}
                        None => return cancelled(),
                    }
                }
                Lookup::Lead(ticket) => {
                    // Dropping the lead future drops the ticket unpublished.
                    return match until_cancelled(&cancel, self.lead(kind, path, ticket)).await {
                        Some(outcome) => (outcome, false),
                        None => cancelled(),
                    };
                }
            }
        }
    }

    fn lookup(&self, path: &Path) -> Lookup {
        let mut state = self.state.lock();
        if let Some(outcome) = state.cache.get(path) {
            return Lookup::Hit(outcome);
        }
        if let Some(sender) = state.in_flight.get(path) {
            return Lookup::Wait(sender.subscribe());
        }
        let (sender, _) = watch::channel(None);
        state.in_flight.insert(path.to_path_buf(), sender);
        Lookup::Lead(FlightTicket {
            state: Arc::clone(&self.state),
            path: path.to_path_buf(),
            published: false,
        })
    }

    /// Runs the extractor on the blocking pool. With a timeout configured,
    /// the wait for a pool permit counts against it too, so files queued
    /// behind a stuck parser give up on time instead of waiting it out.
    async fn lead(&self, kind: ExtractorKind, path: &Path, ticket: FlightTicket) -> ExtractionOutcome {
        let limiter = Arc::clone(&self.limiter);
        let extractors = self.extractors.clone();
        let owned_path = path.to_path_buf();
        let job = async move {
            let permit = limiter.acquire_owned().await.ok()?;
            let handle = spawn_blocking(move || {
                let _permit = permit;
                extractors.run(kind, &owned_path)
            });
            Some(handle.await)
        };

        let finished = match self.extraction_timeout {
            Some(limit) => match timeout(limit, job).await {
                Ok(finished) => finished,
                Err(_) => {
                    warn!(timeout = ?limit, "extraction timed out");
                    return ExtractionError::parse(format!("extraction timed out after {:?}", limit))
                        .into();
                }
            },
            None => job.await,
        };
        let Some(joined) = finished else {
            return ExtractionError::parse("extraction pool is closed").into();
        };

        let outcome = match joined {
            Ok(Ok(raw)) => ExtractionOutcome::Success(normalize(raw)),
            Ok(Err(err)) => {
                debug!(kind = %err.kind, error = %err.message, "extraction failed");
                ExtractionOutcome::Failure(err)
            }
            Err(join_err) => {
                let message = describe_join_error(join_err);
                warn!(error = %message, "extractor task failed");
                ExtractionError::parse(message).into()
            }
        };

        ticket.publish(&outcome);
        outcome
    }
}

async fn wait_for_leader(mut receiver: OutcomeReceiver) -> Option<ExtractionOutcome> {
    loop {
        let current = receiver.borrow_and_update().clone();
        if let Some(outcome) = current {
            return Some(outcome);
        }
        if receiver.changed().await.is_err() {
            return receiver.borrow().clone();
        }
    }
}

fn cancelled() -> (ExtractionOutcome, bool) {
    debug!("extraction cancelled");
    (ExtractionError::parse("extraction cancelled").into(), false)
}

async fn until_cancelled<F: Future>(cancel: &CancellationToken, work: F) -> Option<F::Output> {
    if cancel.is_cancelled() {
        return None;
    }
    let work = pin!(work);
    let cancelled = pin!(cancel.cancelled());
    match future::select(work, cancelled).await {
        Either::Left((output, _)) => Some(output),
        Either::Right(_) => None,
    }
}

/// Concurrent metadata extraction with a shared result cache.
///
/// One coordinator per session. The cache lives and dies with it.
pub struct MetadataCoordinator {
    config: ExtractorConfig,
    worker: Worker,
    events: EventBus,
}

impl MetadataCoordinator {
    /// Validates `config` and builds a coordinator using the system clock.
    pub fn new(config: ExtractorConfig, extractors: ExtractorSet) -> Result<Self> {
        config.validate()?;

        let cache = ExtractionCache::new(
            config.cache_capacity,
            config.cache_ttl,
            Arc::new(SystemClock),
        );
        let worker = Worker {
            extractors,
            state: Arc::new(Mutex::new(SharedState::new(cache))),
            limiter: Arc::new(Semaphore::new(config.max_concurrent_extractions)),
            extraction_timeout: config.extraction_timeout,
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
        };

        Ok(Self {
            events: EventBus::new(config.event_buffer),
            worker,
            config,
        })
    }

    /// Replaces the clock used for cache expiry. Drops anything cached so far.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        let cache = ExtractionCache::new(self.config.cache_capacity, self.config.cache_ttl, clock);
        self.worker.state = Arc::new(Mutex::new(SharedState::new(cache)));
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Cancelling `token` stops every unfinished extraction of every running
    /// batch. A cancelled token stays cancelled: later batches still answer
    /// from the cache and still report missing or unsupported files, but
    /// report anything needing extraction as cancelled until
    /// [`resume`](Self::resume) installs a fresh token.
    pub fn with_cancellation(self, token: CancellationToken) -> Self {
        *self.worker.cancel.lock() = token;
        self
    }

    /// Replaces a cancelled token with `token` so extraction can run again.
    /// Files already in progress keep the token they started with.
    pub fn resume(&self, token: CancellationToken) {
        *self.worker.cancel.lock() = token;
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Extracts metadata for every distinct path in `paths`.
    ///
    /// Returns one entry per distinct path. Duplicates share one extraction.
    #[instrument(skip_all, name = "extract_all")]
    pub async fn extract_all<I, P>(&self, paths: I) -> Result<AggregateResult>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut seen = HashSet::new();
        let unique: Vec<PathBuf> = paths
            .into_iter()
            .map(Into::<PathBuf>::into)
            .filter(|path| seen.insert(path.clone()))
            .collect();

        let batch_id = Uuid::new_v4();
        let total = unique.len();
        let started = Instant::now();
        info!(%batch_id, total, "starting extraction batch");
        self.emit(ExtractionEvent::BatchStarted { batch_id, total });

        let mut pending: FuturesUnordered<_> = unique
            .into_iter()
            .map(|path| {
                let worker = self.worker.clone();
                let task_path = path.clone();
                let handle = spawn(async move { worker.process(&task_path).await });
                async move { (path, handle.await) }
            })
            .collect();

        let mut aggregate = AggregateResult::with_capacity(total);
        let mut completed = 0;
        while let Some((path, joined)) = pending.next().await {
            let (outcome, from_cache) = match joined {
                Ok(resolved) => resolved,
                Err(err) => {
                    let message = describe_join_error(err);
                    warn!(file = %path.display(), error = %message, "file task failed");
                    (ExtractionError::parse(message).into(), false)
                }
            };

            completed += 1;
            self.emit(ExtractionEvent::FileCompleted {
                batch_id,
                path: path.clone(),
                succeeded: outcome.is_success(),
                from_cache,
                completed,
                total,
                percent: progress_percent(completed, total),
            });
            aggregate.insert(path, outcome);
        }

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let (succeeded, failed) = (aggregate.succeeded(), aggregate.failed());
        info!(%batch_id, succeeded, failed, duration_ms, "extraction batch completed");
        self.emit(ExtractionEvent::BatchCompleted {
            batch_id,
            succeeded,
            failed,
            duration_ms,
        });

        Ok(aggregate)
    }

    /// Blocking variant of [`extract_all`](Self::extract_all) for callers
    /// outside an async runtime. Builds its own worker runtime.
    pub fn extract_all_blocking<I, P>(&self, paths: I) -> Result<AggregateResult>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        if inside_runtime() {
            return Err(MetadataError::Task(
                "extract_all_blocking cannot run inside an async runtime; use extract_all".to_string(),
            ));
        }
        let runtime = worker_runtime(None).map_err(MetadataError::WorkerPool)?;
        runtime.block_on(self.extract_all(paths))
    }

    /// Extracts a single path in the calling task. No events are emitted.
    pub async fn extract_one(&self, path: impl AsRef<Path>) -> ExtractionOutcome {
        self.worker.process(path.as_ref()).await.0
    }

    /// Live plus not-yet-purged cache entries.
    pub fn cache_len(&self) -> usize {
        self.worker.state.lock().cache.len()
    }

    pub fn clear_cache(&self) {
        self.worker.state.lock().cache.clear();
    }

    fn emit(&self, event: ExtractionEvent) {
        if self.events.emit(CoreEvent::Extraction(event)).is_err() {
            debug!("no event subscribers");
        }
    }
}

impl std::fmt::Debug for MetadataCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCoordinator")
            .field("config", &self.config)
            .field("extractors", &self.worker.extractors)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::MockMetadataExtractor;
    use crate::value::RawMetadata;
    use core_runtime::time::ManualClock;
    use std::io::Write;

    fn stub_file(suffix: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(b"stub").unwrap();
        file
    }

    fn coordinator_with_document(mock: MockMetadataExtractor) -> MetadataCoordinator {
        let extractors = ExtractorSet::new().with_document(Arc::new(mock));
        MetadataCoordinator::new(ExtractorConfig::default(), extractors).unwrap()
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ExtractorConfig {
            cache_capacity: 0,
            ..ExtractorConfig::default()
        };
        assert!(matches!(
            MetadataCoordinator::new(config, ExtractorSet::new()),
            Err(MetadataError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_ticket_drop_clears_marker_without_caching() {
        let coordinator = coordinator_with_document(MockMetadataExtractor::new());
        let path = Path::new("/tmp/never-written.docx");

        let Lookup::Lead(ticket) = coordinator.worker.lookup(path) else {
            panic!("first lookup should lead");
        };
        assert!(matches!(coordinator.worker.lookup(path), Lookup::Wait(_)));
        drop(ticket);

        assert!(coordinator.worker.state.lock().in_flight.is_empty());
        assert_eq!(coordinator.cache_len(), 0);
    }

    #[tokio::test]
    async fn test_waiter_receives_published_outcome() {
        let coordinator = coordinator_with_document(MockMetadataExtractor::new());
        let path = Path::new("/tmp/shared.docx");

        let Lookup::Lead(ticket) = coordinator.worker.lookup(path) else {
            panic!("first lookup should lead");
        };
        let Lookup::Wait(receiver) = coordinator.worker.lookup(path) else {
            panic!("second lookup should wait");
        };

        let outcome: ExtractionOutcome = ExtractionError::parse("corrupt").into();
        ticket.publish(&outcome);

        assert_eq!(wait_for_leader(receiver).await, Some(outcome));
        assert_eq!(coordinator.cache_len(), 1);
    }

    #[tokio::test]
    async fn test_abandoned_leader_wakes_waiter_empty() {
        let coordinator = coordinator_with_document(MockMetadataExtractor::new());
        let path = Path::new("/tmp/abandoned.docx");

        let Lookup::Lead(ticket) = coordinator.worker.lookup(path) else {
            panic!("first lookup should lead");
        };
        let Lookup::Wait(receiver) = coordinator.worker.lookup(path) else {
            panic!("second lookup should wait");
        };
        drop(ticket);

        assert_eq!(wait_for_leader(receiver).await, None);
    }

    #[tokio::test]
    async fn test_extract_one_uses_cache() {
        let mut mock = MockMetadataExtractor::new();
        mock.expect_extract()
            .times(1)
            .returning(|_| Ok(RawMetadata::new().with("Author", "Ada").with("Title", "")));
        let coordinator = coordinator_with_document(mock);
        let file = stub_file(".docx");

        let first = coordinator.extract_one(file.path()).await;
        let second = coordinator.extract_one(file.path()).await;
        assert_eq!(first, second);

        let result = first.as_result().unwrap();
        assert!(!result.get("Title").unwrap().is_available());
    }

    #[tokio::test]
    async fn test_clock_drives_expiry() {
        let clock = Arc::new(ManualClock::default());
        let mut mock = MockMetadataExtractor::new();
        mock.expect_extract()
            .times(2)
            .returning(|_| Ok(RawMetadata::new().with("Author", "Ada")));
        let coordinator = coordinator_with_document(mock).with_clock(clock.clone());
        let file = stub_file(".pdf");

        coordinator.extract_one(file.path()).await;
        clock.advance(std::time::Duration::from_secs(61));
        coordinator.extract_one(file.path()).await;
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_new_extractions() {
        let token = CancellationToken::new();
        token.cancel();
        let coordinator = coordinator_with_document(MockMetadataExtractor::new())
            .with_cancellation(token);
        let file = stub_file(".docx");

        let outcome = coordinator.extract_one(file.path()).await;
        assert_eq!(outcome.as_error().unwrap().message, "extraction cancelled");
        assert_eq!(coordinator.cache_len(), 0);
    }

    #[test]
    fn test_blocking_entry_point_outside_runtime() {
        let mut mock = MockMetadataExtractor::new();
        mock.expect_extract()
            .returning(|_| Ok(RawMetadata::new().with("Pages", 3)));
        let coordinator = coordinator_with_document(mock);
        let file = stub_file(".xlsx");

        let results = coordinator
            .extract_all_blocking([file.path().to_path_buf()])
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results.succeeded(), 1);
    }

    #[tokio::test]
    async fn test_blocking_entry_point_inside_runtime_errors() {
        let coordinator = coordinator_with_document(MockMetadataExtractor::new());
        assert!(matches!(
            coordinator.extract_all_blocking(Vec::<PathBuf>::new()),
            Err(MetadataError::Task(_))
        ));
    }
}
