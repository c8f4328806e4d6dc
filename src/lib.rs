//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (e.g., `core-service`, `core-metadata`).
//! Host applications can depend on `filemeta-workspace` and enable only the
//! file-format families they need without wiring each crate individually.

#[cfg(feature = "service")]
pub use core_service as service;

#[cfg(any(feature = "documents", feature = "images", feature = "videos"))]
pub use core_metadata as metadata;
