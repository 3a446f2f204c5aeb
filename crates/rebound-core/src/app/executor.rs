//! BoundedExecutor - 時間制限付きのバックグラウンド実行
//!
//! 処理は tokio ランタイム上に spawn し、呼び出し側は期限までしか待ちません。
//! `abort_on_timeout()` を選ばない限りタイムアウトしても worker は止まらず、
//! 切り離された worker は動き続け、その結果は捨てられます。

use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, warn};

use crate::domain::errors::ExecError;
use crate::domain::retry::duration_to_millis;

/// 期限に間に合わなかった worker の扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnTimeout {
    /// Leave it running; its result is dropped.
    #[default]
    Detach,
    /// Abort it at its next `.await` (async workers only).
    Abort,
}

/// Why callback-style work did not reach its success callback.
#[derive(Debug, thiserror::Error)]
pub enum WorkFailure<E> {
    #[error("work failed: {0}")]
    Failed(E),

    #[error(transparent)]
    Worker(#[from] ExecError),
}

/// Spawns workers and waits for them with a deadline.
///
/// [`BoundedExecutor::on`] で handle を渡さなければ、現在のランタイムで動きます。
#[derive(Debug, Clone, Default)]
pub struct BoundedExecutor {
    handle: Option<Handle>,
    on_timeout: OnTimeout,
}

impl BoundedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn workers on `handle` instead of the current runtime.
    pub fn on(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
            on_timeout: OnTimeout::Detach,
        }
    }

    /// 期限に間に合わなかった async worker を abort する
    ///
    /// blocking worker は abort できないので常に切り離されます。
    pub fn abort_on_timeout(mut self) -> Self {
        self.on_timeout = OnTimeout::Abort;
        self
    }

    pub fn timeout_behaviour(&self) -> OnTimeout {
        self.on_timeout
    }

    /// Run `work` on a worker; `Ok(None)` if it misses `deadline`.
    pub async fn run_bounded<F, T>(&self, deadline: Duration, work: F) -> Result<Option<T>, ExecError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let worker = self.spawn(work);
        self.wait(deadline, worker, self.on_timeout).await
    }

    /// Run a blocking closure on the blocking pool; `Ok(None)` if it misses
    /// `deadline`. The closure keeps running after a timeout.
    pub async fn run_blocking_bounded<F, T>(
        &self,
        deadline: Duration,
        work: F,
    ) -> Result<Option<T>, ExecError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let worker = match &self.handle {
            Some(handle) => handle.spawn_blocking(work),
            None => tokio::task::spawn_blocking(work),
        };
        self.wait(deadline, worker, OnTimeout::Detach).await
    }

    /// Run `work` in the background and pass its value to `on_success`.
    /// Failures and panics are logged at `error`.
    pub fn execute<W, T, E, S, SFut>(&self, work: W, on_success: S) -> JoinHandle<()>
    where
        W: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
        S: FnOnce(T) -> SFut + Send + 'static,
        SFut: Future<Output = ()> + Send + 'static,
    {
        self.execute_or_else(work, on_success, |failure: WorkFailure<E>| async move {
            error!(error = %failure, "background work failed");
        })
    }

    /// Like [`BoundedExecutor::execute`], but failures go to `on_failure`.
    pub fn execute_or_else<W, T, E, S, SFut, X, XFut>(
        &self,
        work: W,
        on_success: S,
        on_failure: X,
    ) -> JoinHandle<()>
    where
        W: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
        S: FnOnce(T) -> SFut + Send + 'static,
        SFut: Future<Output = ()> + Send + 'static,
        X: FnOnce(WorkFailure<E>) -> XFut + Send + 'static,
        XFut: Future<Output = ()> + Send + 'static,
    {
        // the worker runs as its own task so a panic stays inside its JoinHandle
        let worker = self.spawn(work);
        self.spawn(async move {
            match worker.await {
                Ok(Ok(value)) => on_success(value).await,
                Ok(Err(err)) => on_failure(WorkFailure::Failed(err)).await,
                Err(join) => on_failure(WorkFailure::Worker(exec_error(join))).await,
            }
        })
    }

    fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        match &self.handle {
            Some(handle) => handle.spawn(fut),
            None => tokio::spawn(fut),
        }
    }

    async fn wait<T>(
        &self,
        deadline: Duration,
        mut worker: JoinHandle<T>,
        on_timeout: OnTimeout,
    ) -> Result<Option<T>, ExecError> {
        match tokio::time::timeout(deadline, &mut worker).await {
            Ok(joined) => joined.map(Some).map_err(exec_error),
            Err(_elapsed) => {
                let deadline_ms = duration_to_millis(deadline);
                match on_timeout {
                    OnTimeout::Detach => {
                        debug!(deadline_ms, "worker detached after timeout");
                    }
                    OnTimeout::Abort => {
                        worker.abort();
                        debug!(deadline_ms, "worker aborted after timeout");
                    }
                }
                Ok(None)
            }
        }
    }
}

fn exec_error(err: JoinError) -> ExecError {
    if err.is_panic() {
        let message = panic_message(err.into_panic());
        warn!(panic = %message, "worker panicked");
        ExecError::WorkerPanicked(message)
    } else {
        ExecError::WorkerCancelled
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "non-string panic payload".to_string()
}
