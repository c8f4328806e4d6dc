//! Synchronization primitives.
//!
//! Async-aware primitives come from `tokio::sync`; cancellation tokens come
//! from `tokio-util`. Short critical sections that never cross an await point
//! should use `parking_lot` directly instead of an async mutex.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::Semaphore;
//! use std::sync::Arc;
//!
//! async fn example() {
//!     let limiter = Arc::new(Semaphore::new(4));
//!     let _permit = limiter.acquire_owned().await.unwrap();
//! }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, AcquireError, Mutex, MutexGuard, Notify,
    OwnedSemaphorePermit, RwLock, Semaphore, SemaphorePermit,
};

pub use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFuture};
