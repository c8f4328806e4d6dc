//! Runtime utilities that abstract over the underlying async executor.
//!
//! Callers that are not already inside an async context (a CLI `main`, a GUI
//! button handler) build a worker runtime here and block on it.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Builds a multi-threaded runtime for running a batch of work.
///
/// `worker_threads` of `None` lets the executor pick one worker per core.
/// Blocking-pool threads are created on demand on top of the workers.
pub fn worker_runtime(worker_threads: Option<usize>) -> std::io::Result<Runtime> {
    let mut builder = Builder::new_multi_thread();
    builder.enable_all().thread_name("filemeta-worker");
    if let Some(threads) = worker_threads {
        builder.worker_threads(threads.max(1));
    }
    builder.build()
}

/// Runs the provided future to completion on a lightweight current-thread
/// runtime, reporting runtime construction failures to the caller.
pub fn try_block_on<F>(future: F) -> std::io::Result<F::Output>
where
    F: std::future::Future,
{
    let runtime = Builder::new_current_thread().enable_all().build()?;
    Ok(runtime.block_on(future))
}

/// Returns `true` when called from within a Tokio runtime.
///
/// Blocking on a nested runtime panics, so synchronous entry points check
/// this first.
pub fn inside_runtime() -> bool {
    Handle::try_current().is_ok()
}
