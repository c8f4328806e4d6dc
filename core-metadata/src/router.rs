//! Extension-based routing to an extractor family.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Extractor family selected for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtractorKind {
    Document,
    Image,
    Video,
}

impl fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractorKind::Document => f.write_str("document"),
            ExtractorKind::Image => f.write_str("image"),
            ExtractorKind::Video => f.write_str("video"),
        }
    }
}

/// Concrete document format, used by the document extractor to pick a parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Word,
    Pdf,
    Excel,
    PowerPoint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Extractor(ExtractorKind),
    /// Lowercased extension without the dot, `None` when the path has none.
    Unsupported(Option<String>),
}

const ROUTES: &[(&str, ExtractorKind)] = &[
    ("docx", ExtractorKind::Document),
    ("pdf", ExtractorKind::Document),
    ("xlsx", ExtractorKind::Document),
    ("pptx", ExtractorKind::Document),
    ("mp4", ExtractorKind::Video),
    ("avi", ExtractorKind::Video),
    ("mov", ExtractorKind::Video),
    ("mkv", ExtractorKind::Video),
    ("mpeg", ExtractorKind::Video),
    ("jpg", ExtractorKind::Image),
    ("jpeg", ExtractorKind::Image),
    ("png", ExtractorKind::Image),
];

/// Lowercased extension of `path`, if any.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

pub fn route(path: &Path) -> Route {
    let Some(ext) = extension_of(path) else {
        return Route::Unsupported(None);
    };

    ROUTES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, kind)| Route::Extractor(*kind))
        .unwrap_or(Route::Unsupported(Some(ext)))
}

pub fn document_format(path: &Path) -> Option<DocumentFormat> {
    match extension_of(path)?.as_str() {
        "docx" => Some(DocumentFormat::Word),
        "pdf" => Some(DocumentFormat::Pdf),
        "xlsx" => Some(DocumentFormat::Excel),
        "pptx" => Some(DocumentFormat::PowerPoint),
        _ => None,
    }
}

/// Every extension the router accepts, in table order.
pub fn supported_extensions() -> impl Iterator<Item = &'static str> {
    ROUTES.iter().map(|(ext, _)| *ext)
}
