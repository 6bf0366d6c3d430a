//! Deferred database operations
//!
//! Every operation on a [`Collection`](crate::Collection) hands back work
//! that has not started yet. Nothing touches the network until the value is
//! polled, which lets callers build a batch of operations up front and drive
//! them together:
//!
//! ```ignore
//! let users = db.col("users")?;
//! let (a, b) = tokio::try_join!(
//!     users.count(doc! { "name": "A" }, None)?,
//!     users.count(doc! { "name": "B" }, None)?,
//! )?;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::{self, BoxFuture};

use crate::Result;

/// A database call that has not executed yet
///
/// Resolves exactly once to `Ok(value)` or `Err(error)`. Polling it again
/// after it resolved is a logic error.
#[must_use = "deferred operations do nothing unless awaited"]
pub struct Deferred<T> {
    inner: BoxFuture<'static, Result<T>>,
}

impl<T: 'static> Deferred<T> {
    /// Wrap a future as a deferred operation
    pub fn new<F>(fut: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self { inner: Box::pin(fut) }
    }

    /// A deferred value that is already known
    pub fn ready(result: Result<T>) -> Self
    where
        T: Send,
    {
        Self::new(future::ready(result))
    }

    /// Transform the resolved value
    pub fn map<U, F>(self, f: F) -> Deferred<U>
    where
        U: 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        Deferred::new(async move { self.await.map(f) })
    }

    /// Drive a batch of deferred operations concurrently
    ///
    /// Resolves to the values in input order, or to the first error.
    pub fn all<I>(ops: I) -> Deferred<Vec<T>>
    where
        I: IntoIterator<Item = Deferred<T>>,
        T: Send,
    {
        let ops: Vec<Deferred<T>> = ops.into_iter().collect();
        Deferred::new(future::try_join_all(ops))
    }
}

impl<T> Future for Deferred<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl<T> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred").finish_non_exhaustive()
    }
}
