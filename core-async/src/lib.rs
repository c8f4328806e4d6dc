//! Async abstraction layer for the file metadata core.
//!
//! Every `core-*` crate reaches the executor through this crate instead of
//! naming Tokio directly. That keeps the choice of runtime, the blocking pool
//! used for parser work, and the timer implementation in one place.
//!
//! # Modules
//!
//! - `task`: Task spawning, including the blocking pool used by extractors
//! - `time`: Sleep, timeouts and monotonic instants
//! - `sync`: Semaphores, channels and cancellation tokens
//! - `runtime`: Building worker runtimes for blocking callers
//! - `fs`: Filesystem probes performed before dispatching work
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(10)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

pub mod fs;
pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

// Re-export commonly used types at crate root for convenience
pub use task::{spawn, spawn_blocking};
pub use time::{sleep, Duration, Instant};
