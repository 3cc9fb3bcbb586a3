//! Thread-safe, single-assignment futures for asynchronous operations.
//!
//! A [`Future`] is a handle to the eventual result of an operation that some
//! other thread is driving, typically a completion routine reporting the
//! outcome of overlapped I/O. The party that starts the operation and the
//! party that needs its result hold clones of the same handle: the driver
//! resolves it exactly once with [`Future::complete`] or [`Future::fail`],
//! while consumers block on [`Future::wait`], query it with [`Future::poll`],
//! chain a callback with [`Future::then`], or `.await` it from async code.
//!
//! # Examples
//!
//! ```
//! use std::thread;
//! use std::time::Duration;
//! use task_future::Future;
//!
//! let fut = Future::<u64, String>::new();
//!
//! let completer = fut.clone();
//! thread::spawn(move || {
//!     thread::sleep(Duration::from_millis(10));
//!     completer.complete(1024).unwrap();
//! });
//!
//! assert_eq!(fut.wait(), Ok(1024));
//! ```

use thiserror::Error;

mod future;

pub use crate::future::{Future, State};

/// Errors surfaced by [`Future`] operations.
///
/// [`Failed`](Error::Failed) carries the error the operation itself resolved
/// with and is an ordinary outcome; the other variants report misuse of the
/// handle or an elapsed wait deadline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error<E> {
    /// `complete` or `fail` was called on a future that already holds a
    /// result. The stored result is left untouched.
    #[error("the result of the operation has already been set")]
    AlreadyCompleted,
    /// The wait deadline elapsed while the operation was still in flight.
    /// The future stays pending, so the wait may be retried.
    #[error("the operation did not complete within the wait deadline")]
    Timeout,
    /// A continuation was registered while another one was still waiting to
    /// run.
    #[error("a continuation is already registered for this future")]
    ContinuationSet,
    /// The operation resolved with an error.
    #[error("the operation failed: {0}")]
    Failed(E),
}
