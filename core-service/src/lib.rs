//! Session façade over the metadata coordinator, plus report export.
//!
//! A host (the `filemeta` binary, or a GUI) creates one [`MetadataService`]
//! per session. The service owns the coordinator, and with it the result
//! cache, and remembers which files were already inspected so repeated
//! "inspect" actions only process new files.

pub mod error;
pub mod report;

pub use error::{CoreError, Result};
pub use report::{unique_path, MetadataReport, ReportRow};

use core_metadata::{AggregateResult, ExtractorSet, MetadataCoordinator};
use core_runtime::config::ExtractorConfig;
use core_runtime::events::EventBus;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::info;

/// Primary façade exposed to host applications.
pub struct MetadataService {
    coordinator: MetadataCoordinator,
    inspected: Mutex<HashSet<PathBuf>>,
}

impl MetadataService {
    /// Builds a service with the extractors compiled into this build.
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        let extractors = ExtractorSet::builtin(&config);
        Self::with_extractors(config, extractors)
    }

    pub fn with_extractors(config: ExtractorConfig, extractors: ExtractorSet) -> Result<Self> {
        let coordinator = MetadataCoordinator::new(config, extractors)?;
        Ok(Self::from_coordinator(coordinator))
    }

    pub fn from_coordinator(coordinator: MetadataCoordinator) -> Self {
        Self {
            coordinator,
            inspected: Mutex::new(HashSet::new()),
        }
    }

    pub fn coordinator(&self) -> &MetadataCoordinator {
        &self.coordinator
    }

    /// Progress events for every batch this service runs.
    pub fn events(&self) -> &EventBus {
        self.coordinator.events()
    }

    /// Inspects every path, whether or not it was seen before.
    pub async fn inspect(&self, paths: Vec<PathBuf>) -> Result<AggregateResult> {
        let results = self.coordinator.extract_all(paths).await?;
        self.inspected
            .lock()
            .extend(results.iter().map(|(path, _)| path.clone()));
        Ok(results)
    }

    /// Inspects only the paths not inspected earlier in this session.
    ///
    /// Returns an empty aggregate when there is nothing new.
    pub async fn inspect_new(&self, paths: Vec<PathBuf>) -> Result<AggregateResult> {
        let fresh: Vec<PathBuf> = {
            let inspected = self.inspected.lock();
            paths
                .into_iter()
                .filter(|path| !inspected.contains(path))
                .collect()
        };
        if fresh.is_empty() {
            info!("No new files to inspect");
            return Ok(AggregateResult::new());
        }
        self.inspect(fresh).await
    }

    /// Blocking [`inspect`](Self::inspect) for callers outside a runtime.
    pub fn inspect_blocking(&self, paths: Vec<PathBuf>) -> Result<AggregateResult> {
        let results = self.coordinator.extract_all_blocking(paths)?;
        self.inspected
            .lock()
            .extend(results.iter().map(|(path, _)| path.clone()));
        Ok(results)
    }

    pub fn inspected_count(&self) -> usize {
        self.inspected.lock().len()
    }

    /// Forgets inspected files and cached results.
    pub fn clear(&self) {
        self.inspected.lock().clear();
        self.coordinator.clear_cache();
    }
}

impl std::fmt::Debug for MetadataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataService")
            .field("coordinator", &self.coordinator)
            .field("inspected", &self.inspected_count())
            .finish()
    }
}
