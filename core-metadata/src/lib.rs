//! # Metadata Extraction Module
//!
//! Extracts metadata from documents, images and videos in parallel and
//! returns one uniform result per file.
//!
//! ## Overview
//!
//! This module handles:
//! - Routing a path to its extractor family by extension
//! - Running extractors concurrently on the blocking pool
//! - Time and size bounded caching of per-file outcomes, including failures
//! - Normalizing raw values so every field is a value or `Not Available`
//! - Field formatting shared by the built-in extractors
//!
//! The built-in extractors are feature-gated: `document` (docx, xlsx, pptx,
//! pdf), `image` (EXIF) and `video` (ffprobe).

pub mod cache;
pub mod coordinator;
pub mod error;
pub mod extractor;
pub mod extractors;
pub mod formatter;
pub mod media;
pub mod normalize;
pub mod router;
pub mod value;

pub use cache::ExtractionCache;
pub use coordinator::MetadataCoordinator;
pub use error::{
    ExtractionError, ExtractionErrorKind, ExtractorError, MetadataError, Result,
};
pub use extractor::{ExtractorSet, MetadataExtractor, VideoProbe};
pub use media::{MediaInfo, MediaTrack};
pub use router::{route, ExtractorKind, Route};
pub use value::{
    AggregateResult, ExtractionOutcome, ExtractionResult, Field, FieldValue, RawMetadata,
    RawValue, NOT_AVAILABLE,
};
