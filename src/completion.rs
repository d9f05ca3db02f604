//! Completion primitives bridging handler callbacks to callers.
//!
//! Pending results are represented by [`crate::listener::SyncListener`]; the
//! types here model completions that are already resolved and the callback
//! shape handlers use to deliver them.

use std::time::Duration;

use crate::error::{KeelError, Result};

/// A resolved success-or-failure outcome delivered to completion callbacks.
pub type AsyncResult<V> = Result<V>;

/// A one-shot callback accepting a single value.
///
/// Used both for plain event handlers and, as `AsyncHandler<AsyncResult<V>>`,
/// for completion delivery.
pub type AsyncHandler<T> = Box<dyn FnOnce(T) + Send + 'static>;

/// A completion that is already resolved at construction time.
///
/// There is no pending state at this layer: a `SettledFuture` holds either a
/// value or a failure from the moment it exists. Callbacks registered on it
/// fire synchronously on the registering thread, before the registration call
/// returns.
#[derive(Debug)]
pub struct SettledFuture<V> {
    outcome: AsyncResult<V>,
}

impl<V> SettledFuture<V> {
    /// A future already resolved with `value`.
    pub fn succeeded(value: V) -> Self {
        Self { outcome: Ok(value) }
    }

    /// A future already resolved with `error`.
    pub fn failed(error: KeelError) -> Self {
        Self { outcome: Err(error) }
    }

    /// Returns the value or rethrows the captured failure.
    pub fn get(self) -> Result<V> {
        self.outcome
    }

    /// Timeout-bounded variant of [`SettledFuture::get`]. The future is
    /// already resolved, so the timeout is never consulted.
    pub fn get_within(self, _timeout: Duration) -> Result<V> {
        self.outcome
    }

    /// Invokes `handler` with the value if this future succeeded.
    pub fn on_success(self, handler: impl FnOnce(&V)) -> Self {
        if let Ok(value) = &self.outcome {
            handler(value);
        }
        self
    }

    /// Invokes `handler` with the failure if this future failed.
    pub fn on_failure(self, handler: impl FnOnce(&KeelError)) -> Self {
        if let Err(error) = &self.outcome {
            handler(error);
        }
        self
    }

    /// Invokes `handler` with the resolved outcome, success or failure.
    pub fn on_complete(self, handler: impl FnOnce(&AsyncResult<V>)) -> Self {
        handler(&self.outcome);
        self
    }
}
