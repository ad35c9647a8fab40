//! Deferred results for intercepted asynchronous entry points.
//!
//! A hooked function such as `fetch` returns a [`Promise`] immediately; the
//! work runs when the promise is first polled, through [`Promise::settle`]
//! or [`Value::resolve`]. Every clone shares one future, so any number of
//! awaiters (concurrent or not) observe the same outcome and the work runs
//! once. Everything is single-threaded, so the wrapped future need not be
//! `Send`.

use std::fmt;
use std::future::Future;

use futures::future::{self, FutureExt, LocalBoxFuture, Shared};

use crate::error::{Error, Result};
use crate::value::Value;

/// Shared handle to an eventual value. Cloning shares identity.
#[derive(Clone)]
pub struct Promise(Shared<LocalBoxFuture<'static, Result<Value>>>);

impl Promise {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value>> + 'static,
    {
        Self(future.boxed_local().shared())
    }

    pub fn resolve(value: Value) -> Self {
        Self::new(future::ready(Ok(value)))
    }

    pub fn reject(error: Error) -> Self {
        Self::new(future::ready(Err(error)))
    }

    /// Whether some awaiter has already driven the work to completion.
    pub fn is_settled(&self) -> bool {
        self.0.peek().is_some()
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        a.0.ptr_eq(&b.0)
    }

    /// Drive the promise to completion. Dropping an awaiter part way leaves
    /// the work in place for the next one.
    pub async fn settle(&self) -> Result<Value> {
        self.0.clone().await
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_settled() { "Promise <settled>" } else { "Promise <pending>" })
    }
}

impl Value {
    /// Await a value the way `await v` would: promises settle, anything else
    /// resolves to itself.
    pub async fn resolve(self) -> Result<Value> {
        match self {
            Value::Promise(promise) => promise.settle().await,
            other => Ok(other),
        }
    }
}
