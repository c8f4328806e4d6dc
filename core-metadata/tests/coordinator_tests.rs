//! Integration tests for the metadata coordinator
//!
//! Extractors are replaced by counting stubs so cache behaviour, failure
//! isolation and parallelism can be observed from the outside.

use core_async::sync::CancellationToken;
use core_metadata::{
    ExtractionErrorKind, ExtractorError, ExtractorSet, FieldValue, MediaInfo, MediaTrack,
    MetadataCoordinator, MetadataExtractor, RawMetadata, VideoProbe,
};
use core_runtime::config::ExtractorConfig;
use core_runtime::events::{CoreEvent, EventBus, ExtractionEvent};
use core_runtime::time::ManualClock;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

// ============================================================================
// Stubs
// ============================================================================

#[derive(Clone, Copy)]
enum Behaviour {
    Succeed,
    Fail,
    Panic,
}

struct CountingExtractor {
    calls: Arc<AtomicUsize>,
    delay: Duration,
    behaviour: Behaviour,
}

impl CountingExtractor {
    fn new(calls: Arc<AtomicUsize>) -> Self {
        Self {
            calls,
            delay: Duration::ZERO,
            behaviour: Behaviour::Succeed,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn with_behaviour(mut self, behaviour: Behaviour) -> Self {
        self.behaviour = behaviour;
        self
    }
}

impl MetadataExtractor for CountingExtractor {
    fn name(&self) -> &'static str {
        "counting-stub"
    }

    fn extract(&self, path: &Path) -> Result<RawMetadata, ExtractorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        match self.behaviour {
            Behaviour::Succeed => Ok(RawMetadata::new()
                .with(
                    "Name",
                    path.file_name()
                        .map(|name| name.to_string_lossy().into_owned()),
                )
                .with("Author", "")
                .with("Pages", 12)),
            Behaviour::Fail => Err(ExtractorError::parse("file is corrupt")),
            Behaviour::Panic => panic!("parser blew up"),
        }
    }
}

struct StubProbe {
    parses: Arc<AtomicUsize>,
    derive_fails: bool,
}

impl VideoProbe for StubProbe {
    fn name(&self) -> &'static str {
        "stub-probe"
    }

    fn parse_container(&self, _path: &Path) -> Result<MediaInfo, ExtractorError> {
        self.parses.fetch_add(1, Ordering::SeqCst);
        Ok(MediaInfo {
            general: Some(MediaTrack {
                format: Some("MPEG-4".into()),
                duration_secs: Some(90.0),
                ..Default::default()
            }),
            stream_count: 1,
            ..Default::default()
        })
    }

    fn derive_metadata(&self, info: &MediaInfo) -> Result<RawMetadata, ExtractorError> {
        if self.derive_fails {
            return Err(ExtractorError::derive("no usable video track"));
        }
        core_metadata::media::derive_fields(info)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn fixture(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, b"stub contents").expect("write fixture");
    path
}

fn document_coordinator(
    config: ExtractorConfig,
    extractor: CountingExtractor,
) -> MetadataCoordinator {
    let extractors = ExtractorSet::new().with_document(Arc::new(extractor));
    MetadataCoordinator::new(config, extractors).expect("valid config")
}

fn calls() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

// ============================================================================
// Batch shape
// ============================================================================

#[tokio::test]
async fn test_one_entry_per_distinct_path() {
    let dir = TempDir::new().unwrap();
    let a = fixture(&dir, "a.docx");
    let b = fixture(&dir, "b.pdf");
    let counter = calls();
    let coordinator =
        document_coordinator(ExtractorConfig::default(), CountingExtractor::new(counter.clone()));

    let results = coordinator
        .extract_all(vec![a.clone(), b.clone(), a.clone()])
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.contains(&a));
    assert!(results.contains(&b));
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_empty_batch() {
    let coordinator =
        document_coordinator(ExtractorConfig::default(), CountingExtractor::new(calls()));
    let results = coordinator.extract_all(Vec::<PathBuf>::new()).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_results_are_normalized() {
    let dir = TempDir::new().unwrap();
    let path = fixture(&dir, "report.xlsx");
    let coordinator =
        document_coordinator(ExtractorConfig::default(), CountingExtractor::new(calls()));

    let results = coordinator.extract_all([path.clone()]).await.unwrap();
    let result = results.get(&path).unwrap().as_result().unwrap();

    assert_eq!(result.get("Author"), Some(&FieldValue::NotAvailable));
    assert_eq!(result.get("Pages"), Some(&FieldValue::Integer(12)));
    assert_eq!(
        result.get("Name"),
        Some(&FieldValue::Text("report.xlsx".to_string()))
    );
}

// ============================================================================
// Cache
// ============================================================================

#[tokio::test]
async fn test_second_call_within_ttl_is_served_from_cache() {
    let dir = TempDir::new().unwrap();
    let path = fixture(&dir, "memo.docx");
    let counter = calls();
    let clock = Arc::new(ManualClock::default());
    let coordinator =
        document_coordinator(ExtractorConfig::default(), CountingExtractor::new(counter.clone()))
            .with_clock(clock.clone());

    let first = coordinator.extract_all([path.clone()]).await.unwrap();
    clock.advance(Duration::from_secs(59));
    let second = coordinator.extract_all([path.clone()]).await.unwrap();

    assert_eq!(first.get(&path), second.get(&path));
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    clock.advance(Duration::from_secs(2));
    coordinator.extract_all([path.clone()]).await.unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_capacity_evicts_oldest_insertion() {
    let dir = TempDir::new().unwrap();
    let a = fixture(&dir, "a.pdf");
    let b = fixture(&dir, "b.pdf");
    let c = fixture(&dir, "c.pdf");
    let counter = calls();
    let config = ExtractorConfig::builder().cache_capacity(2).build().unwrap();
    let coordinator = document_coordinator(config, CountingExtractor::new(counter.clone()));

    for path in [&a, &b, &c] {
        coordinator.extract_all([path.clone()]).await.unwrap();
    }
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(coordinator.cache_len(), 2);

    // `a` was evicted when `c` arrived.
    coordinator.extract_all([a.clone()]).await.unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 4);

    // `c` is still cached.
    coordinator.extract_all([c.clone()]).await.unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_failures_are_cached() {
    let dir = TempDir::new().unwrap();
    let path = fixture(&dir, "broken.docx");
    let counter = calls();
    let coordinator = document_coordinator(
        ExtractorConfig::default(),
        CountingExtractor::new(counter.clone()).with_behaviour(Behaviour::Fail),
    );

    for _ in 0..3 {
        let results = coordinator.extract_all([path.clone()]).await.unwrap();
        let error = results.get(&path).unwrap().as_error().unwrap();
        assert_eq!(error.kind, ExtractionErrorKind::Parse);
        assert_eq!(error.message, "file is corrupt");
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_clear_cache_forces_fresh_extraction() {
    let dir = TempDir::new().unwrap();
    let path = fixture(&dir, "slides.pptx");
    let counter = calls();
    let coordinator =
        document_coordinator(ExtractorConfig::default(), CountingExtractor::new(counter.clone()));

    coordinator.extract_all([path.clone()]).await.unwrap();
    coordinator.clear_cache();
    assert_eq!(coordinator.cache_len(), 0);
    coordinator.extract_all([path.clone()]).await.unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Failure isolation
// ============================================================================

#[tokio::test]
async fn test_failure_isolation() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.docx");
    let unsupported = fixture(&dir, "notes.txt");
    let valid = fixture(&dir, "valid.docx");
    let coordinator =
        document_coordinator(ExtractorConfig::default(), CountingExtractor::new(calls()));

    let results = coordinator
        .extract_all(vec![missing.clone(), unsupported.clone(), valid.clone()])
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    let missing_err = results.get(&missing).unwrap().as_error().unwrap();
    assert_eq!(missing_err.kind, ExtractionErrorKind::NotFound);
    assert_eq!(missing_err.message, "file not found");

    let unsupported_err = results.get(&unsupported).unwrap().as_error().unwrap();
    assert_eq!(unsupported_err.kind, ExtractionErrorKind::UnsupportedType);
    assert_eq!(unsupported_err.message, "unsupported file type: .txt");

    assert!(results.get(&valid).unwrap().is_success());
    assert_eq!(results.succeeded(), 1);
    assert_eq!(results.failed(), 2);
}

#[tokio::test]
async fn test_directory_counts_as_not_found() {
    let dir = TempDir::new().unwrap();
    let folder = dir.path().join("folder.pdf");
    fs::create_dir(&folder).unwrap();
    let coordinator =
        document_coordinator(ExtractorConfig::default(), CountingExtractor::new(calls()));

    let outcome = coordinator.extract_one(&folder).await;
    assert_eq!(outcome.as_error().unwrap().kind, ExtractionErrorKind::NotFound);
}

#[tokio::test]
async fn test_panicking_extractor_only_affects_its_file() {
    let dir = TempDir::new().unwrap();
    let bad = fixture(&dir, "bad.docx");
    let good = fixture(&dir, "good.jpg");
    let extractors = ExtractorSet::new()
        .with_document(Arc::new(
            CountingExtractor::new(calls()).with_behaviour(Behaviour::Panic),
        ))
        .with_image(Arc::new(CountingExtractor::new(calls())));
    let coordinator = MetadataCoordinator::new(ExtractorConfig::default(), extractors).unwrap();

    let results = coordinator
        .extract_all(vec![bad.clone(), good.clone()])
        .await
        .unwrap();

    let error = results.get(&bad).unwrap().as_error().unwrap();
    assert_eq!(error.kind, ExtractionErrorKind::Parse);
    assert!(error.message.contains("parser blew up"));
    assert!(results.get(&good).unwrap().is_success());
}

#[tokio::test]
async fn test_disabled_family_reports_unsupported() {
    let dir = TempDir::new().unwrap();
    let clip = fixture(&dir, "clip.MKV");
    let coordinator =
        document_coordinator(ExtractorConfig::default(), CountingExtractor::new(calls()));

    let outcome = coordinator.extract_one(&clip).await;
    let error = outcome.as_error().unwrap();
    assert_eq!(error.kind, ExtractionErrorKind::UnsupportedType);
    assert!(error.message.contains("video support not enabled"));
}

// ============================================================================
// Video two-step protocol
// ============================================================================

#[tokio::test]
async fn test_video_derive_failure_is_one_cached_error() {
    let dir = TempDir::new().unwrap();
    let clip = fixture(&dir, "clip.mp4");
    let parses = calls();
    let extractors = ExtractorSet::new().with_video(Arc::new(StubProbe {
        parses: parses.clone(),
        derive_fails: true,
    }));
    let coordinator = MetadataCoordinator::new(ExtractorConfig::default(), extractors).unwrap();

    for _ in 0..2 {
        let results = coordinator.extract_all([clip.clone()]).await.unwrap();
        let error = results.get(&clip).unwrap().as_error().unwrap();
        assert_eq!(error.kind, ExtractionErrorKind::Derive);
        assert_eq!(error.message, "no usable video track");
    }
    assert_eq!(parses.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_video_success_combines_both_steps() {
    let dir = TempDir::new().unwrap();
    let clip = fixture(&dir, "clip.mov");
    let extractors = ExtractorSet::new().with_video(Arc::new(StubProbe {
        parses: calls(),
        derive_fails: false,
    }));
    let coordinator = MetadataCoordinator::new(ExtractorConfig::default(), extractors).unwrap();

    let outcome = coordinator.extract_one(&clip).await;
    let result = outcome.as_result().unwrap();
    assert_eq!(
        result.get("Duration"),
        Some(&FieldValue::Text("1 min 30 sec".to_string()))
    );
    assert_eq!(result.get("Location"), Some(&FieldValue::NotAvailable));
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fifty_paths_run_in_parallel() {
    let dir = TempDir::new().unwrap();
    let paths: Vec<PathBuf> = (0..50)
        .map(|i| fixture(&dir, &format!("doc-{i}.pdf")))
        .collect();
    let counter = calls();
    let coordinator = document_coordinator(
        ExtractorConfig::default(),
        CountingExtractor::new(counter.clone()).with_delay(Duration::from_millis(100)),
    );

    let started = Instant::now();
    let results = coordinator.extract_all(paths).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(results.len(), 50);
    assert_eq!(results.succeeded(), 50);
    assert_eq!(counter.load(Ordering::SeqCst), 50);
    assert!(
        elapsed < Duration::from_millis(1500),
        "50 x 100ms extractions took {:?}",
        elapsed
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrency_limit_is_respected() {
    let dir = TempDir::new().unwrap();
    let paths: Vec<PathBuf> = (0..4)
        .map(|i| fixture(&dir, &format!("limited-{i}.docx")))
        .collect();
    let config = ExtractorConfig::builder()
        .max_concurrent_extractions(1)
        .build()
        .unwrap();
    let coordinator = document_coordinator(
        config,
        CountingExtractor::new(calls()).with_delay(Duration::from_millis(50)),
    );

    let started = Instant::now();
    coordinator.extract_all(paths).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_batches_share_one_extraction() {
    let dir = TempDir::new().unwrap();
    let path = fixture(&dir, "shared.docx");
    let counter = calls();
    let coordinator = Arc::new(document_coordinator(
        ExtractorConfig::default(),
        CountingExtractor::new(counter.clone()).with_delay(Duration::from_millis(100)),
    ));

    let first = {
        let coordinator = Arc::clone(&coordinator);
        let path = path.clone();
        tokio::spawn(async move { coordinator.extract_one(&path).await })
    };
    let second = {
        let coordinator = Arc::clone(&coordinator);
        let path = path.clone();
        tokio::spawn(async move { coordinator.extract_one(&path).await })
    };

    let (first, second) = (first.await.unwrap(), second.await.unwrap());
    assert_eq!(first, second);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Timeout and cancellation
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timed_out_extraction_is_not_cached() {
    let dir = TempDir::new().unwrap();
    let slow = fixture(&dir, "slow.pdf");
    let config = ExtractorConfig::builder()
        .extraction_timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let coordinator = document_coordinator(
        config,
        CountingExtractor::new(calls()).with_delay(Duration::from_millis(400)),
    );

    let outcome = coordinator.extract_one(&slow).await;
    let error = outcome.as_error().unwrap();
    assert_eq!(error.kind, ExtractionErrorKind::Parse);
    assert!(error.message.starts_with("extraction timed out after"));
    assert_eq!(coordinator.cache_len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancellation_stops_unfinished_files() {
    let dir = TempDir::new().unwrap();
    let slow = fixture(&dir, "slow.docx");
    let token = CancellationToken::new();
    let coordinator = document_coordinator(
        ExtractorConfig::default(),
        CountingExtractor::new(calls()).with_delay(Duration::from_millis(400)),
    )
    .with_cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let results = coordinator.extract_all([slow.clone()]).await.unwrap();
    canceller.await.unwrap();

    let error = results.get(&slow).unwrap().as_error().unwrap();
    assert_eq!(error.message, "extraction cancelled");
    assert_eq!(coordinator.cache_len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_queued_file_times_out_behind_stuck_parser() {
    let dir = TempDir::new().unwrap();
    let stuck = fixture(&dir, "stuck.pdf");
    let queued = fixture(&dir, "queued.pdf");
    let config = ExtractorConfig::builder()
        .max_concurrent_extractions(1)
        .extraction_timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    let coordinator = document_coordinator(
        config,
        CountingExtractor::new(calls()).with_delay(Duration::from_secs(1)),
    );

    let first = coordinator.extract_one(&stuck).await;
    assert!(first.as_error().unwrap().message.starts_with("extraction timed out"));

    // The stuck parser still holds the only permit.
    let started = Instant::now();
    let second = coordinator.extract_one(&queued).await;
    let waited = started.elapsed();

    assert!(waited < Duration::from_millis(800), "waited {:?}", waited);
    let error = second.as_error().unwrap();
    assert_eq!(error.kind, ExtractionErrorKind::Parse);
    assert!(error.message.starts_with("extraction timed out"));
    assert_eq!(coordinator.cache_len(), 0);
}

#[tokio::test]
async fn test_cancelled_coordinator_still_answers_cache_and_missing_files() {
    let dir = TempDir::new().unwrap();
    let cached = fixture(&dir, "cached.pdf");
    let fresh = fixture(&dir, "fresh.pdf");
    let missing = dir.path().join("missing.docx");
    let unsupported = fixture(&dir, "notes.txt");
    let counter = calls();
    let token = CancellationToken::new();
    let coordinator = document_coordinator(
        ExtractorConfig::default(),
        CountingExtractor::new(counter.clone()),
    )
    .with_cancellation(token.clone());

    assert!(coordinator.extract_one(&cached).await.is_success());
    token.cancel();

    let results = coordinator
        .extract_all([cached.clone(), missing.clone(), unsupported.clone(), fresh.clone()])
        .await
        .unwrap();

    assert!(results.get(&cached).unwrap().is_success());
    assert_eq!(
        results.get(&missing).unwrap().as_error().unwrap().kind,
        ExtractionErrorKind::NotFound
    );
    assert_eq!(
        results.get(&unsupported).unwrap().as_error().unwrap().kind,
        ExtractionErrorKind::UnsupportedType
    );
    assert_eq!(
        results.get(&fresh).unwrap().as_error().unwrap().message,
        "extraction cancelled"
    );
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    coordinator.resume(CancellationToken::new());
    assert!(coordinator.extract_one(&fresh).await.is_success());
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn test_batch_emits_progress_events() {
    let dir = TempDir::new().unwrap();
    let paths = vec![
        fixture(&dir, "one.docx"),
        fixture(&dir, "two.docx"),
        dir.path().join("three.docx"),
    ];
    let bus = EventBus::new(32);
    let mut receiver = bus.subscribe();
    let coordinator =
        document_coordinator(ExtractorConfig::default(), CountingExtractor::new(calls()))
            .with_event_bus(bus);

    coordinator.extract_all(paths).await.unwrap();

    let mut events = Vec::new();
    while let Ok(CoreEvent::Extraction(event)) = receiver.try_recv() {
        events.push(event);
    }

    assert_eq!(events.len(), 5);
    let batch_id = events[0].batch_id();
    assert!(matches!(
        events[0],
        ExtractionEvent::BatchStarted { total: 3, .. }
    ));
    assert!(events.iter().all(|event| event.batch_id() == batch_id));

    let completions: Vec<_> = events[1..4]
        .iter()
        .filter_map(|event| match event {
            ExtractionEvent::FileCompleted {
                completed,
                percent,
                ..
            } => Some((*completed, *percent)),
            _ => None,
        })
        .collect();
    assert_eq!(completions, vec![(1, 33), (2, 66), (3, 100)]);

    assert!(matches!(
        events[4],
        ExtractionEvent::BatchCompleted {
            succeeded: 2,
            failed: 1,
            ..
        }
    ));
}

#[test]
fn test_blocking_batch_from_sync_code() {
    let dir = TempDir::new().unwrap();
    let path = fixture(&dir, "sync.pdf");
    let coordinator =
        document_coordinator(ExtractorConfig::default(), CountingExtractor::new(calls()));

    let results = coordinator.extract_all_blocking([path.clone()]).unwrap();
    assert!(results.get(&path).unwrap().is_success());
}
