//! The [`Future`] cell: one mutex-guarded result slot, a condition variable
//! to wake blocked waiters, and a continuation slot drained on resolution.

use std::fmt;
use std::mem;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use log::trace;

use crate::Error;

/// Lifecycle of the operation behind a [`Future`].
///
/// A future starts out [`Pending`](State::Pending) and moves exactly once
/// into one of the two terminal states. There are no transitions out of a
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// The operation is still in flight and no result is available.
    Pending,
    /// The operation finished and its value is stored.
    Completed,
    /// The operation finished with an error.
    Failed,
}

impl State {
    /// Returns `true` once the future has been completed or failed.
    pub fn is_terminal(self) -> bool {
        !matches!(self, State::Pending)
    }
}

type Continuation<T, E> = Box<dyn FnOnce(Result<T, E>) + Send>;

struct Core<T, E> {
    result: Option<Result<T, E>>,
    continuation: Option<Continuation<T, E>>,
    wakers: Vec<Waker>,
}

struct Inner<T, E> {
    core: Mutex<Core<T, E>>,
    done: Condvar,
}

/// Handle to the eventual result of an asynchronous operation.
///
/// A `Future` is resolved exactly once, either with a value through
/// [`complete`](Future::complete) or with an error through
/// [`fail`](Future::fail). All clones share the same underlying cell, so the
/// thread driving the operation and the threads consuming its result can
/// hold on to the future independently; the cell is freed when the last
/// clone is dropped.
///
/// Consumers have three ways to observe the result: block with
/// [`wait`](Future::wait) or [`wait_timeout`](Future::wait_timeout), query
/// without blocking with [`poll`](Future::poll), or chain a callback with
/// [`then`](Future::then). A future can also be `.await`ed.
///
/// # Examples
///
/// ```
/// use futures::executor::block_on;
/// use std::thread;
/// use task_future::Future;
///
/// let fut = Future::<String, String>::new();
///
/// let completer = fut.clone();
/// thread::spawn(move || {
///     completer.complete("transfer finished".into()).unwrap();
/// });
///
/// assert_eq!(block_on(fut), Ok("transfer finished".to_string()));
/// ```
pub struct Future<T, E> {
    inner: Arc<Inner<T, E>>,
}

impl<T, E> Clone for Future<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> Default for Future<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for Future<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future").field("state", &self.state()).finish()
    }
}

impl<T, E> Future<T, E> {
    /// Creates a pending future with no result and no continuation.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                core: Mutex::new(Core {
                    result: None,
                    continuation: None,
                    wakers: Vec::new(),
                }),
                done: Condvar::new(),
            }),
        }
    }

    /// Creates a pending future with a continuation already attached.
    ///
    /// Equivalent to [`new`](Future::new) followed by [`then`](Future::then).
    pub fn with_continuation<F>(continuation: F) -> Self
    where
        F: FnOnce(Result<T, E>) + Send + 'static,
    {
        let fut = Self::new();
        fut.inner.core.lock().unwrap().continuation = Some(Box::new(continuation));
        fut
    }

    /// Reports which point of its lifecycle the future has reached.
    pub fn state(&self) -> State {
        match &self.inner.core.lock().unwrap().result {
            None => State::Pending,
            Some(Ok(_)) => State::Completed,
            Some(Err(_)) => State::Failed,
        }
    }

    /// Returns `true` while the operation has not resolved yet.
    pub fn is_pending(&self) -> bool {
        self.inner.core.lock().unwrap().result.is_none()
    }
}

impl<T: Clone, E: Clone> Future<T, E> {
    /// Resolves the future with the value produced by the operation.
    ///
    /// Every thread blocked in [`wait`](Future::wait) and every task
    /// `.await`ing the future wakes up, and a registered continuation runs
    /// on the calling thread before this method returns. Resolving a future
    /// that already holds a result returns
    /// [`Error::AlreadyCompleted`] and leaves the stored result untouched.
    ///
    /// # Examples
    ///
    /// ```
    /// use task_future::{Error, Future};
    ///
    /// let fut = Future::<u32, String>::new();
    /// fut.complete(7).unwrap();
    ///
    /// assert_eq!(fut.wait(), Ok(7));
    /// assert_eq!(fut.complete(8), Err(Error::AlreadyCompleted));
    /// ```
    pub fn complete(&self, value: T) -> Result<(), Error<E>> {
        self.resolve(Ok(value))
    }

    /// Resolves the future with the error the operation failed with.
    ///
    /// Waiters see the error as [`Error::Failed`]; otherwise this behaves
    /// like [`complete`](Future::complete).
    pub fn fail(&self, error: E) -> Result<(), Error<E>> {
        self.resolve(Err(error))
    }

    /// Blocks the calling thread until the result is available.
    ///
    /// Returns a copy of the stored value once the future completes, or
    /// [`Error::Failed`] if it failed. Waiting on an already resolved future
    /// returns immediately, arbitrarily many times.
    pub fn wait(&self) -> Result<T, Error<E>> {
        let mut core = self.inner.core.lock().unwrap();
        loop {
            match &core.result {
                Some(Ok(value)) => return Ok(value.clone()),
                Some(Err(error)) => return Err(Error::Failed(error.clone())),
                None => core = self.inner.done.wait(core).unwrap(),
            }
        }
    }

    /// Blocks like [`wait`](Future::wait), giving up after `timeout`.
    ///
    /// An elapsed deadline abandons only the wait: the future stays pending
    /// and the operation may still resolve it later, so the call can be
    /// retried. A zero timeout turns this into a blocking-free probe.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T, Error<E>> {
        let deadline = Instant::now() + timeout;
        let mut core = self.inner.core.lock().unwrap();
        loop {
            match &core.result {
                Some(Ok(value)) => return Ok(value.clone()),
                Some(Err(error)) => return Err(Error::Failed(error.clone())),
                None => {}
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                trace!("wait deadline elapsed with the operation still in flight");
                return Err(Error::Timeout);
            }
            let (guard, _) = self.inner.done.wait_timeout(core, remaining).unwrap();
            core = guard;
        }
    }

    /// Returns a copy of the stored result, or `None` while the operation is
    /// still in flight. Never blocks.
    pub fn poll(&self) -> Option<Result<T, E>> {
        self.inner.core.lock().unwrap().result.clone()
    }

    /// Registers a continuation to be invoked with the result.
    ///
    /// If the future is still pending the continuation is stored and later
    /// invoked by whichever thread resolves the future. If the result is
    /// already available it runs immediately on the calling thread. Either
    /// way it runs exactly once, without the internal lock held, so it may
    /// freely touch the future itself.
    ///
    /// Only one continuation may be waiting at a time; registering a second
    /// one before the first has run returns [`Error::ContinuationSet`].
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::mpsc;
    /// use task_future::Future;
    ///
    /// let (tx, rx) = mpsc::channel();
    /// let fut = Future::<u32, String>::new();
    /// fut.then(move |result| tx.send(result).unwrap()).unwrap();
    ///
    /// fut.complete(7).unwrap();
    /// assert_eq!(rx.recv().unwrap(), Ok(7));
    /// ```
    pub fn then<F>(&self, continuation: F) -> Result<(), Error<E>>
    where
        F: FnOnce(Result<T, E>) + Send + 'static,
    {
        let mut core = self.inner.core.lock().unwrap();
        if let Some(result) = &core.result {
            let ready = result.clone();
            drop(core);
            continuation(ready);
            return Ok(());
        }
        if core.continuation.is_some() {
            return Err(Error::ContinuationSet);
        }
        core.continuation = Some(Box::new(continuation));
        Ok(())
    }

    fn resolve(&self, result: Result<T, E>) -> Result<(), Error<E>> {
        let mut core = self.inner.core.lock().unwrap();
        if core.result.is_some() {
            return Err(Error::AlreadyCompleted);
        }
        trace!(
            "future resolved as {}",
            if result.is_ok() { "completed" } else { "failed" }
        );
        let continuation = core.continuation.take().map(|cb| (cb, result.clone()));
        core.result = Some(result);
        let wakers = mem::take(&mut core.wakers);
        self.inner.done.notify_all();
        drop(core);

        // Waiters and the continuation run without the lock held; the
        // continuation may itself wait on or poll this future.
        for waker in wakers {
            waker.wake();
        }
        if let Some((continuation, result)) = continuation {
            continuation(result);
        }
        Ok(())
    }
}

impl<T: Clone, E: Clone> std::future::Future for Future<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut core = self.inner.core.lock().unwrap();
        match &core.result {
            Some(result) => Poll::Ready(result.clone()),
            None => {
                // Every awaiting clone registers its own waker; resolution
                // wakes them all.
                core.wakers.push(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::Duration;

    use futures::executor::block_on;

    use super::{Future, State};
    use crate::Error;

    #[test]
    fn test_new_future_is_pending() {
        let fut = Future::<u32, String>::new();
        assert_eq!(fut.state(), State::Pending);
        assert!(fut.is_pending());
        assert_eq!(fut.poll(), None);
    }

    #[test]
    fn test_complete_stores_the_value() {
        let fut = Future::<u32, String>::new();
        fut.complete(7).unwrap();
        assert_eq!(fut.state(), State::Completed);
        assert_eq!(fut.poll(), Some(Ok(7)));
        assert_eq!(fut.wait(), Ok(7));
        assert_eq!(fut.wait(), Ok(7));
    }

    #[test]
    fn test_second_resolution_is_rejected() {
        let fut = Future::<u32, String>::new();
        fut.complete(1).unwrap();
        assert_eq!(fut.complete(2), Err(Error::AlreadyCompleted));
        assert_eq!(fut.fail("late".into()), Err(Error::AlreadyCompleted));
        assert_eq!(fut.wait(), Ok(1));
    }

    #[test]
    fn test_fail_surfaces_as_error() {
        let fut = Future::<u32, String>::new();
        fut.fail("disk error".into()).unwrap();
        assert_eq!(fut.state(), State::Failed);
        assert!(fut.state().is_terminal());
        assert_eq!(fut.wait(), Err(Error::Failed("disk error".into())));
        assert_eq!(fut.fail("again".into()), Err(Error::AlreadyCompleted));
    }

    #[test]
    fn test_zero_timeout_reports_timeout_and_stays_pending() {
        let fut = Future::<u32, String>::new();
        assert_eq!(fut.wait_timeout(Duration::ZERO), Err(Error::Timeout));
        assert!(fut.is_pending());
        fut.complete(9).unwrap();
        assert_eq!(fut.wait_timeout(Duration::ZERO), Ok(9));
    }

    #[test]
    fn test_continuation_registered_before_completion() {
        let (tx, rx) = mpsc::channel();
        let fut = Future::<u32, String>::new();
        fut.then(move |result| tx.send(result).unwrap()).unwrap();
        assert!(fut.is_pending());
        fut.complete(5).unwrap();
        assert_eq!(rx.recv().unwrap(), Ok(5));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_continuation_registered_after_completion() {
        let (tx, rx) = mpsc::channel();
        let fut = Future::<u32, String>::new();
        fut.complete(5).unwrap();
        fut.then(move |result| tx.send(result).unwrap()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Ok(5));
    }

    #[test]
    fn test_second_continuation_is_rejected_while_pending() {
        let fut = Future::<u32, String>::new();
        fut.then(|_| {}).unwrap();
        assert_eq!(fut.then(|_| {}), Err(Error::ContinuationSet));
    }

    #[test]
    fn test_continuation_runs_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let fut = Future::<u32, String>::new();
        fut.then(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        fut.complete(1).unwrap();
        assert_eq!(fut.complete(2), Err(Error::AlreadyCompleted));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_continuation_may_wait_on_the_resolved_future() {
        let (tx, rx) = mpsc::channel();
        let fut = Future::<u32, String>::new();
        let handle = fut.clone();
        fut.then(move |_| tx.send(handle.wait()).unwrap()).unwrap();
        fut.complete(3).unwrap();
        assert_eq!(rx.recv().unwrap(), Ok(3));
    }

    #[test]
    fn test_with_continuation_fires_on_failure() {
        let (tx, rx) = mpsc::channel();
        let fut: Future<u32, String> =
            Future::with_continuation(move |result| tx.send(result).unwrap());
        fut.fail("boom".into()).unwrap();
        assert_eq!(rx.recv().unwrap(), Err("boom".to_string()));
    }

    #[test]
    fn test_await_resolved_from_another_thread() {
        let fut = Future::<String, String>::new();
        let completer = fut.clone();
        let waiter = thread::spawn(move || block_on(fut));
        thread::sleep(Duration::from_millis(10));
        completer.complete("done".into()).unwrap();
        assert_eq!(waiter.join().unwrap(), Ok("done".to_string()));
    }

    #[test]
    fn test_await_when_already_resolved() {
        let fut = Future::<String, String>::new();
        fut.complete("ready".into()).unwrap();
        assert_eq!(block_on(fut.clone()), Ok("ready".to_string()));
        assert_eq!(block_on(fut), Ok("ready".to_string()));
    }
}
