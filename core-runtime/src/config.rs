//! # Extraction Configuration
//!
//! Settings consumed by the metadata coordinator: cache lifetime and size,
//! the concurrency limit for blocking extractor work, an optional per-file
//! timeout and the external probe used for video containers.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::ExtractorConfig;
//! use std::time::Duration;
//!
//! let config = ExtractorConfig::builder()
//!     .cache_ttl(Duration::from_secs(120))
//!     .cache_capacity(500)
//!     .max_concurrent_extractions(8)
//!     .build()?;
//!
//! assert_eq!(config.cache_capacity, 500);
//! # Ok::<(), core_runtime::Error>(())
//! ```
//!
//! Every setting has a default, so `ExtractorConfig::default()` is always
//! valid. The builder validates on [`ExtractorConfigBuilder::build`] and
//! rejects values that would make the cache or the worker pool unusable.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default time-to-live for cached extraction results.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Default number of entries kept in the result cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Upper bound on the cache capacity.
pub const MAX_CACHE_CAPACITY: usize = 100_000;

/// Default ceiling on extractor calls running at the same time.
pub const DEFAULT_MAX_CONCURRENT_EXTRACTIONS: usize = 64;

/// Default capacity of the progress event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Default executable used to probe video containers.
pub const DEFAULT_FFPROBE_PATH: &str = "ffprobe";

/// Runtime configuration for metadata extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// How long a cached result stays valid after insertion.
    #[serde(with = "duration_secs")]
    pub cache_ttl: Duration,

    /// Maximum number of cached results. The oldest insertion is evicted
    /// first once full.
    pub cache_capacity: usize,

    /// Maximum number of extractor calls in flight.
    pub max_concurrent_extractions: usize,

    /// Per-file extraction deadline. `None` waits indefinitely.
    #[serde(default, with = "opt_duration_secs")]
    pub extraction_timeout: Option<Duration>,

    /// Program invoked to read video container metadata.
    pub ffprobe_path: String,

    /// Capacity of the progress event broadcast channel.
    pub event_buffer: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            max_concurrent_extractions: DEFAULT_MAX_CONCURRENT_EXTRACTIONS,
            extraction_timeout: None,
            ffprobe_path: DEFAULT_FFPROBE_PATH.to_string(),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl ExtractorConfig {
    /// Creates a new builder seeded with the defaults.
    pub fn builder() -> ExtractorConfigBuilder {
        ExtractorConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - TTL is non-zero
    /// - Cache capacity is within `1..=MAX_CACHE_CAPACITY`
    /// - At least one extraction may run
    /// - A probe executable is named
    /// - The event buffer is non-zero
    pub fn validate(&self) -> Result<()> {
        if self.cache_ttl.is_zero() {
            return Err(invalid("cache_ttl", "must be greater than 0"));
        }

        if self.cache_capacity == 0 {
            return Err(invalid("cache_capacity", "must be greater than 0"));
        }

        if self.cache_capacity > MAX_CACHE_CAPACITY {
            return Err(invalid(
                "cache_capacity",
                format!("exceeds maximum of {MAX_CACHE_CAPACITY}"),
            ));
        }

        if self.max_concurrent_extractions == 0 {
            return Err(invalid(
                "max_concurrent_extractions",
                "must allow at least one extraction",
            ));
        }

        if let Some(timeout) = self.extraction_timeout {
            if timeout.is_zero() {
                return Err(invalid("extraction_timeout", "must be greater than 0"));
            }
        }

        if self.ffprobe_path.trim().is_empty() {
            return Err(invalid("ffprobe_path", "cannot be empty"));
        }

        if self.event_buffer == 0 {
            return Err(invalid("event_buffer", "must be greater than 0"));
        }

        Ok(())
    }
}

fn invalid(setting: &str, message: impl Into<String>) -> Error {
    Error::InvalidSetting {
        setting: setting.to_string(),
        message: message.into(),
    }
}

/// Builder for [`ExtractorConfig`].
///
/// Unset values fall back to the defaults. [`build`](Self::build) runs
/// [`ExtractorConfig::validate`] before returning.
#[derive(Debug, Default)]
pub struct ExtractorConfigBuilder {
    cache_ttl: Option<Duration>,
    cache_capacity: Option<usize>,
    max_concurrent_extractions: Option<usize>,
    extraction_timeout: Option<Duration>,
    ffprobe_path: Option<String>,
    event_buffer: Option<usize>,
}

impl ExtractorConfigBuilder {
    /// Sets the cache time-to-live.
    ///
    /// Default: 60 seconds
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Sets the maximum number of cached results.
    ///
    /// Default: 100
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    /// Sets how many extractor calls may run at once.
    ///
    /// Default: 64
    pub fn max_concurrent_extractions(mut self, limit: usize) -> Self {
        self.max_concurrent_extractions = Some(limit);
        self
    }

    /// Sets a per-file extraction deadline.
    pub fn extraction_timeout(mut self, timeout: Duration) -> Self {
        self.extraction_timeout = Some(timeout);
        self
    }

    /// Sets the probe executable used for video files.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::ExtractorConfig;
    ///
    /// let config = ExtractorConfig::builder()
    ///     .ffprobe_path("/usr/local/bin/ffprobe")
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.ffprobe_path, "/usr/local/bin/ffprobe");
    /// ```
    pub fn ffprobe_path<S: Into<String>>(mut self, path: S) -> Self {
        self.ffprobe_path = Some(path.into());
        self
    }

    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = Some(capacity);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSetting`] naming the first rejected setting.
    pub fn build(self) -> Result<ExtractorConfig> {
        let defaults = ExtractorConfig::default();

        let config = ExtractorConfig {
            cache_ttl: self.cache_ttl.unwrap_or(defaults.cache_ttl),
            cache_capacity: self.cache_capacity.unwrap_or(defaults.cache_capacity),
            max_concurrent_extractions: self
                .max_concurrent_extractions
                .unwrap_or(defaults.max_concurrent_extractions),
            extraction_timeout: self.extraction_timeout,
            ffprobe_path: self.ffprobe_path.unwrap_or(defaults.ffprobe_path),
            event_buffer: self.event_buffer.unwrap_or(defaults.event_buffer),
        };

        config.validate()?;

        Ok(config)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod opt_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}
