//! Projections turn the cached value and per-call arguments into what a read returns.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};

/// Projects the cached value plus the caller's arguments into a result.
///
/// A failed projection only fails the read that requested it.
pub trait Projection<V>: Send + Sync + 'static {
    /// The arguments passed to [`RefreshCache::get`](crate::RefreshCache::get).
    type Args: Send + 'static;
    /// The result of a read.
    type Output;

    /// Applies the projection to the current value.
    fn project(&self, value: Arc<V>, args: Self::Args) -> BoxFuture<'static, anyhow::Result<Self::Output>>;
}

/// The default projection, which returns the cached value itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct Identity;

impl<V> Projection<V> for Identity
where
    V: Send + Sync + 'static,
{
    type Args = ();
    type Output = Arc<V>;

    fn project(&self, value: Arc<V>, _args: ()) -> BoxFuture<'static, anyhow::Result<Arc<V>>> {
        future::ok(value).boxed()
    }
}

/// A projection backed by an async closure.
pub struct AsyncGetter<F, A> {
    f: F,
    _args: PhantomData<fn(A)>,
}

impl<F, A> AsyncGetter<F, A> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f,
            _args: PhantomData,
        }
    }
}

impl<V, A, R, F, Fut> Projection<V> for AsyncGetter<F, A>
where
    V: Send + Sync + 'static,
    A: Send + 'static,
    F: Fn(Arc<V>, A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    type Args = A;
    type Output = R;

    fn project(&self, value: Arc<V>, args: A) -> BoxFuture<'static, anyhow::Result<R>> {
        (self.f)(value, args).boxed()
    }
}

/// A projection backed by a synchronous closure borrowing the cached value.
pub struct SyncGetter<F, A> {
    f: F,
    _args: PhantomData<fn(A)>,
}

impl<F, A> SyncGetter<F, A> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f,
            _args: PhantomData,
        }
    }
}

impl<V, A, R, F> Projection<V> for SyncGetter<F, A>
where
    V: Send + Sync + 'static,
    A: Send + 'static,
    R: Send + 'static,
    F: Fn(&V, A) -> anyhow::Result<R> + Send + Sync + 'static,
{
    type Args = A;
    type Output = R;

    fn project(&self, value: Arc<V>, args: A) -> BoxFuture<'static, anyhow::Result<R>> {
        future::ready((self.f)(&value, args)).boxed()
    }
}
