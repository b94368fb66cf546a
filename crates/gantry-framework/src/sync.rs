//! Sync/async function wrapper.
//!
//! Handlers, dependency providers and permission constructors may be written
//! either as plain functions or as async functions. [`Callable`] stores either
//! kind behind one type and lets the pipeline await both uniformly.

use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

type SyncFn<A, R> = Arc<dyn Fn(A) -> R + Send + Sync>;
type AsyncFn<A, R> = Arc<dyn Fn(A) -> BoxFuture<'static, R> + Send + Sync>;

/// A function taking `A` and producing `R`, synchronously or asynchronously.
pub enum Callable<A, R> {
    Sync(SyncFn<A, R>),
    Async(AsyncFn<A, R>),
}

impl<A, R> Clone for Callable<A, R> {
    fn clone(&self) -> Self {
        match self {
            Self::Sync(f) => Self::Sync(Arc::clone(f)),
            Self::Async(f) => Self::Async(Arc::clone(f)),
        }
    }
}

impl<A, R> Callable<A, R>
where
    A: Send + 'static,
    R: Send + 'static,
{
    pub fn from_sync<F>(f: F) -> Self
    where
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        Self::Async(Arc::new(move |args| f(args).boxed()))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }

    /// Calls the function, awaiting it if it is asynchronous.
    pub async fn call(&self, args: A) -> R {
        match self {
            Self::Sync(f) => f(args),
            Self::Async(f) => f(args).await,
        }
    }

    /// Returns an asynchronous version of this callable.
    ///
    /// Synchronous functions run inline when the returned future is polled.
    pub fn into_async(self) -> Self {
        match self {
            Self::Sync(f) => Self::Async(Arc::new(move |args| {
                let f = Arc::clone(&f);
                async move { f(args) }.boxed()
            })),
            async_fn => async_fn,
        }
    }

    /// Returns a synchronous version of this callable.
    ///
    /// Asynchronous functions are driven to completion on the calling thread,
    /// so the result must not be called from inside an async runtime worker.
    pub fn into_sync(self) -> Self {
        match self {
            Self::Async(f) => {
                Self::Sync(Arc::new(move |args| futures::executor::block_on(f(args))))
            }
            sync_fn => sync_fn,
        }
    }
}

impl<A, R> fmt::Debug for Callable<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if matches!(self, Self::Async(_)) {
            "async"
        } else {
            "sync"
        };
        f.debug_tuple("Callable").field(&kind).finish()
    }
}

/// Returns `true` if both callables wrap the same function object.
pub(crate) fn same_callable<A, R>(a: &Callable<A, R>, b: &Callable<A, R>) -> bool {
    match (a, b) {
        (Callable::Sync(a), Callable::Sync(b)) => Arc::ptr_eq(a, b),
        (Callable::Async(a), Callable::Async(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn process(value: u32) -> u32 {
        value * 2
    }

    fn another_process(value: u32) -> u32 {
        value + 1
    }

    #[tokio::test]
    async fn test_async_callable_stays_async() {
        let callable = Callable::from_async(process).into_async();
        assert!(callable.is_async());
        assert_eq!(callable.call(4).await, 8);
    }

    #[tokio::test]
    async fn test_sync_callable_transforms_to_async() {
        let callable = Callable::from_sync(another_process);
        assert!(!callable.is_async());

        let callable = callable.into_async();
        assert!(callable.is_async());
        assert_eq!(callable.call(4).await, 5);
    }

    #[test]
    fn test_into_sync_blocks_on_async_function() {
        let callable = Callable::from_async(process).into_sync();
        assert!(!callable.is_async());
        assert_eq!(tokio_test::block_on(callable.call(21)), 42);
    }

    #[test]
    fn test_identity_survives_clone() {
        let callable = Callable::from_sync(another_process);
        let clone = callable.clone();
        assert!(same_callable(&callable, &clone));
        assert!(!same_callable(&callable, &Callable::from_sync(another_process)));
    }
}
