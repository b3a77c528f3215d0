//! Downstream consumer of terminal results.

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;

use super::result::ExecutionResult;
use super::AppResult;

/// Invoked exactly once per routed execution with its terminal result.
///
/// Errors and panics are caught and logged by the supervisor; they never
/// interrupt result processing.
#[async_trait]
pub trait ResultCallback: Send + Sync + 'static {
    /// Consume one terminal result.
    async fn on_result(&self, result: ExecutionResult) -> AppResult<()>;
}

/// Callback that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallback;

#[async_trait]
impl ResultCallback for NoopCallback {
    async fn on_result(&self, result: ExecutionResult) -> AppResult<()> {
        tracing::debug!(
            execution_id = %result.execution_id,
            status = ?result.status,
            "result dropped: no callback configured"
        );
        Ok(())
    }
}

/// Adapter turning an async closure into a [`ResultCallback`].
pub struct FnCallback<F, Fut> {
    f: F,
    _future: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnCallback<F, Fut>
where
    F: Fn(ExecutionResult) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<()>> + Send + 'static,
{
    /// Wrap `f`.
    pub const fn new(f: F) -> Self {
        Self {
            f,
            _future: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> ResultCallback for FnCallback<F, Fut>
where
    F: Fn(ExecutionResult) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<()>> + Send + 'static,
{
    async fn on_result(&self, result: ExecutionResult) -> AppResult<()> {
        (self.f)(result).await
    }
}

/// Shorthand for [`FnCallback::new`].
pub const fn callback_fn<F, Fut>(f: F) -> FnCallback<F, Fut>
where
    F: Fn(ExecutionResult) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<()>> + Send + 'static,
{
    FnCallback::new(f)
}
