//! Time-related abstractions.
//!
//! `Instant` is monotonic and is what elapsed-time measurements use. The
//! injectable clock behind cache expiry lives in `core_runtime::time`.
//!
//! # Examples
//!
//! ```rust
//! use core_async::time::{timeout, Duration};
//!
//! async fn example() {
//!     let result = timeout(Duration::from_millis(50), async { 7 }).await;
//!     assert_eq!(result.unwrap(), 7);
//! }
//! ```

pub use tokio::time::{error::Elapsed, interval, sleep, sleep_until, timeout, Interval, Sleep, Timeout};

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
