// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Values that only become known once a provider has answered.
//!
//! A [`Deferred`] is a cloneable handle on a shared future. Every consumer
//! awaits the same underlying computation, so a combinator closure runs at
//! most once per resolved input set regardless of how many resources read
//! the result. Nothing runs until something awaits the handle.

use crate::error::{ProvisionError, Result};
use futures::future::{self, BoxFuture, FutureExt, Shared, TryFutureExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Errors are shared between every consumer of a failed value
pub type SharedError = Arc<ProvisionError>;

type Inner<T> = Shared<BoxFuture<'static, std::result::Result<T, SharedError>>>;

pub struct Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Inner<T>,
}

impl<T> Clone for Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.inner.peek() {
            None => "pending",
            Some(Ok(_)) => "resolved",
            Some(Err(_)) => "failed",
        };
        f.debug_struct("Deferred").field("state", &state).finish()
    }
}

impl<T> Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Wrap a future producing the value
    pub fn new<F>(fut: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self::from_shared_result(fut.map_err(Arc::new))
    }

    fn from_shared_result<F>(fut: F) -> Self
    where
        F: Future<Output = std::result::Result<T, SharedError>> + Send + 'static,
    {
        Self {
            inner: fut.boxed().shared(),
        }
    }

    /// Wait for the value
    pub fn resolve(&self) -> impl Future<Output = std::result::Result<T, SharedError>> + Send {
        self.inner.clone()
    }

    /// Run a pure function over the value once it resolves.
    pub fn apply<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        let upstream = self.inner.clone();
        Deferred::from_shared_result(async move {
            let value = upstream.await?;
            f(value).map_err(Arc::new)
        })
    }

    /// Resolve both values; fails with whichever error surfaces first.
    pub fn zip<U>(&self, other: &Deferred<U>) -> Deferred<(T, U)>
    where
        U: Clone + Send + Sync + 'static,
    {
        Deferred::from_shared_result(future::try_join(self.inner.clone(), other.inner.clone()))
    }
}
