//! Built-in extractors, one module per file family.

#[cfg(feature = "document")]
pub mod document;
#[cfg(feature = "image")]
pub mod image;
#[cfg(feature = "video")]
pub mod video;
