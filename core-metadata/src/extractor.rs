//! Extractor contracts and the dispatch table the coordinator uses.
//!
//! Extractors are synchronous: they read the file themselves and may take a
//! while, so the coordinator always calls them from the blocking pool.
//!
//! Document and image extraction is a single step. Video extraction is two
//! steps, [`VideoProbe::parse_container`] then [`VideoProbe::derive_metadata`],
//! treated as one unit for caching.

use core_runtime::config::ExtractorConfig;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::{ExtractionError, ExtractionErrorKind, ExtractorError};
use crate::media::{self, MediaInfo};
use crate::router::ExtractorKind;
use crate::value::RawMetadata;

/// Single-step extractor for one file family.
#[cfg_attr(test, mockall::automock)]
pub trait MetadataExtractor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn extract(&self, path: &Path) -> Result<RawMetadata, ExtractorError>;
}

/// Two-step video extractor.
#[cfg_attr(test, mockall::automock)]
pub trait VideoProbe: Send + Sync {
    fn name(&self) -> &'static str;

    fn parse_container(&self, path: &Path) -> Result<MediaInfo, ExtractorError>;

    /// Defaults to the standard track-to-field mapping.
    fn derive_metadata(&self, info: &MediaInfo) -> Result<RawMetadata, ExtractorError> {
        media::derive_fields(info)
    }
}

/// Which extractor handles each [`ExtractorKind`].
///
/// A family left empty reports its files as unsupported.
#[derive(Clone, Default)]
pub struct ExtractorSet {
    document: Option<Arc<dyn MetadataExtractor>>,
    image: Option<Arc<dyn MetadataExtractor>>,
    video: Option<Arc<dyn VideoProbe>>,
}

impl ExtractorSet {
    /// An empty set. Every file routes to "unsupported".
    pub fn new() -> Self {
        Self::default()
    }

    /// The extractors compiled into this build.
    #[allow(unused_mut, unused_variables)]
    pub fn builtin(config: &ExtractorConfig) -> Self {
        let mut set = Self::new();

        #[cfg(feature = "document")]
        {
            set = set.with_document(Arc::new(crate::extractors::document::DocumentExtractor));
        }

        #[cfg(feature = "image")]
        {
            set = set.with_image(Arc::new(crate::extractors::image::ExifExtractor));
        }

        #[cfg(feature = "video")]
        {
            let mut probe = crate::extractors::video::FfprobeVideo::new(config.ffprobe_path.clone());
            if let Some(limit) = config.extraction_timeout {
                probe = probe.with_time_limit(limit);
            }
            set = set.with_video(Arc::new(probe));
        }

        set
    }

    pub fn with_document(mut self, extractor: Arc<dyn MetadataExtractor>) -> Self {
        self.document = Some(extractor);
        self
    }

    pub fn with_image(mut self, extractor: Arc<dyn MetadataExtractor>) -> Self {
        self.image = Some(extractor);
        self
    }

    pub fn with_video(mut self, probe: Arc<dyn VideoProbe>) -> Self {
        self.video = Some(probe);
        self
    }

    pub fn supports(&self, kind: ExtractorKind) -> bool {
        match kind {
            ExtractorKind::Document => self.document.is_some(),
            ExtractorKind::Image => self.image.is_some(),
            ExtractorKind::Video => self.video.is_some(),
        }
    }

    /// Runs the extractor for `kind` against `path`.
    ///
    /// Blocking. For video both steps run here in order, and a failure in
    /// either step is the only thing reported.
    pub fn run(&self, kind: ExtractorKind, path: &Path) -> Result<RawMetadata, ExtractionError> {
        match kind {
            ExtractorKind::Document => run_single(self.document.as_deref(), kind, path),
            ExtractorKind::Image => run_single(self.image.as_deref(), kind, path),
            ExtractorKind::Video => {
                let probe = self.video.as_deref().ok_or_else(|| missing(kind, path))?;
                let info = probe.parse_container(path).map_err(|err| match err {
                    // A parse step can only fail as a parse.
                    ExtractorError::Derive(message) => ExtractionError::parse(message),
                    other => other.into(),
                })?;
                probe.derive_metadata(&info).map_err(|err| match err {
                    ExtractorError::Parse(message) => ExtractionError::derive(message),
                    other => other.into(),
                })
            }
        }
    }
}

fn run_single(
    extractor: Option<&dyn MetadataExtractor>,
    kind: ExtractorKind,
    path: &Path,
) -> Result<RawMetadata, ExtractionError> {
    let extractor = extractor.ok_or_else(|| missing(kind, path))?;
    extractor.extract(path).map_err(ExtractionError::from)
}

fn missing(kind: ExtractorKind, path: &Path) -> ExtractionError {
    let ext = crate::router::extension_of(path).unwrap_or_default();
    ExtractionError::new(
        ExtractionErrorKind::UnsupportedType,
        format!("unsupported file type: .{} ({} support not enabled)", ext, kind),
    )
}

impl fmt::Debug for ExtractorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractorSet")
            .field("document", &self.document.as_ref().map(|e| e.name()))
            .field("image", &self.image.as_ref().map(|e| e.name()))
            .field("video", &self.video.as_ref().map(|e| e.name()))
            .finish()
    }
}
