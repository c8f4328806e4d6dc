//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the file metadata core:
//! - Logging and tracing infrastructure
//! - Extraction configuration with fail-fast validation
//! - Event bus for batch progress
//! - Injectable monotonic clock
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the metadata coordinator
//! and the service façade depend on. It establishes the logging conventions,
//! the configuration surface, and the progress events emitted while a batch
//! of files is being inspected.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod time;

pub use error::{Error, Result};
