//! Task spawning and execution abstractions.
//!
//! Two kinds of work run on the executor:
//! - `spawn`: cooperative async tasks (one per requested file)
//! - `spawn_blocking`: synchronous parser calls that read files and may hold
//!   the thread for a long time
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//!
//! async fn example() {
//!     let handle = task::spawn_blocking(|| {
//!         // CPU-bound parsing
//!         2 + 2
//!     });
//!     assert_eq!(handle.await.unwrap(), 4);
//! }
//! ```

pub use tokio::task::{yield_now, JoinError, JoinHandle, JoinSet};

/// Spawns a new asynchronous task on the current runtime.
///
/// The task may run on any worker thread, so both the future and its output
/// must be `Send`.
///
/// # Examples
///
/// ```rust
/// use core_async::task::spawn;
///
/// # async fn example() {
/// let handle = spawn(async { 42 });
/// assert_eq!(handle.await.unwrap(), 42);
/// # }
/// ```
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}

/// Runs a blocking closure on the dedicated blocking thread pool.
///
/// Use this for anything that performs synchronous file I/O or long CPU
/// work so the async workers stay responsive.
pub fn spawn_blocking<F, R>(f: F) -> JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
}

/// Renders the payload of a failed task for diagnostics.
///
/// Panics carrying a `&str` or `String` payload are reported verbatim;
/// anything else (including cancellation) falls back to the error's display.
pub fn describe_join_error(err: JoinError) -> String {
    if err.is_panic() {
        let payload = err.into_panic();
        if let Some(message) = payload.downcast_ref::<&str>() {
            return format!("task panicked: {}", message);
        }
        if let Some(message) = payload.downcast_ref::<String>() {
            return format!("task panicked: {}", message);
        }
        return "task panicked".to_string();
    }

    err.to_string()
}

/// Result type for task operations.
pub type Result<T> = std::result::Result<T, JoinError>;
