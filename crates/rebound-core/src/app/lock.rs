//! LockCoordinator - ロック取得のリトライと確実な解放
//!
//! # フロー
//! 1. 試行 = `try_acquire()`、だめなら `try_acquire_for(per_attempt_timeout)`
//! 2. 失敗した試行を数え、`max_attempts` に達したら `RetryExhausted` で終了
//! 3. それ以外は tokio のタイマーで backoff 分待って 1 に戻る
//! 4. 取得できたら操作を実行し、解放してから結果を返す
//!
//! 解放は drop ガードが持つので、操作が panic しても、`run_exclusive` の future が
//! drop されても、ちょうど 1 回解放されます。

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info_span, warn, Instrument};

use crate::domain::attempt::LockAttemptState;
use crate::domain::errors::{ExclusiveError, LockError};
use crate::domain::ids::RunId;
use crate::domain::retry::{duration_to_millis, Backoff, RetryPolicy};
use crate::observability::{self, Disposed};
use crate::ports::ExclusiveLock;

/// Runs operations under an [`ExclusiveLock`] with bounded acquisition.
///
/// 持つのは設定だけです。試行状態（[`LockAttemptState`]）は呼び出しごとに別なので、
/// 1 つのコーディネーターをタスク間で共有（clone）できます。
///
/// # Example
/// ```ignore
/// let coordinator = LockCoordinator::new(policy);
/// let n = coordinator
///     .run_exclusive(&lock, || async { Ok::<_, MyError>(counter.bump()) })
///     .await?;
/// ```
#[derive(Clone)]
pub struct LockCoordinator {
    policy: RetryPolicy,
    backoff: Arc<dyn Backoff>,
    interrupt: Option<watch::Receiver<bool>>,
}

impl LockCoordinator {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            backoff: Arc::new(policy),
            interrupt: None,
        }
    }

    /// Replace the fixed `inter_attempt_delay` spacing.
    pub fn with_backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    /// channel が `true` になったら待機を打ち切る
    ///
    /// sender が drop された場合は中断しません。
    pub fn with_interrupt(mut self, interrupt: watch::Receiver<bool>) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Acquire with the retry policy, run `operation`, release.
    ///
    /// # Errors
    /// - `RetryExhausted`: every attempt failed; nothing was released
    /// - `InterruptedDuringAcquire`: the interrupt fired while waiting
    /// - `Acquire`: the primitive itself failed
    /// - `Operation` / `Release` / `OperationAndRelease`: after acquisition
    pub async fn run_exclusive<L, F, Fut, T, E>(
        &self,
        lock: &L,
        operation: F,
    ) -> Result<T, ExclusiveError<E>>
    where
        L: ExclusiveLock + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let run_id = RunId::generate();
        let span = info_span!("run_exclusive", %run_id, policy = %self.policy);

        async move {
            let held = self.acquire_with_retry::<L, E>(lock).await?;
            finish(held, operation().await)
        }
        .instrument(span)
        .await
    }

    /// Wait (cancellably) until the lock is granted, run `operation`,
    /// release. The retry policy does not apply.
    pub async fn run_exclusive_blocking<L, F, Fut, T, E>(
        &self,
        lock: &L,
        operation: F,
    ) -> Result<T, ExclusiveError<E>>
    where
        L: ExclusiveLock + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let run_id = RunId::generate();
        let span = info_span!("run_exclusive_blocking", %run_id);

        async move {
            let acquired = self
                .interruptible(lock.acquire())
                .await
                .and_then(|granted| granted);
            if let Err(err) = acquired {
                return Err(acquisition_failed(err));
            }
            debug!("lock acquired");
            let held = HeldLock::new(lock);
            finish(held, operation().await)
        }
        .instrument(span)
        .await
    }

    async fn acquire_with_retry<'l, L, E>(
        &self,
        lock: &'l L,
    ) -> Result<HeldLock<'l, L>, ExclusiveError<E>>
    where
        L: ExclusiveLock + ?Sized,
    {
        let mut state = LockAttemptState::new();

        loop {
            match self.attempt(lock).await {
                Ok(true) => {
                    state.mark_acquired();
                    debug!(attempts = state.attempts_made(), "lock acquired");
                    return Ok(HeldLock::new(lock));
                }
                Ok(false) => state.record_failed_attempt(),
                Err(err) => return Err(acquisition_failed(err)),
            }

            debug!(
                attempt = state.attempt_count,
                max_attempts = self.policy.max_attempts(),
                "lock busy"
            );

            if state.is_exhausted(&self.policy) {
                warn!(
                    attempts = state.attempt_count,
                    elapsed_ms = duration_to_millis(state.elapsed()),
                    "lock retry exhausted"
                );
                return Err(ExclusiveError::RetryExhausted {
                    attempts: state.attempt_count,
                });
            }

            let delay = self.backoff.delay(state.attempt_count);
            if let Err(err) = self.interruptible(tokio::time::sleep(delay)).await {
                return Err(acquisition_failed(err));
            }
        }
    }

    /// 1 回の試行: まず即時、次に時間制限付き
    async fn attempt<L>(&self, lock: &L) -> Result<bool, LockError>
    where
        L: ExclusiveLock + ?Sized,
    {
        if lock.try_acquire()? {
            return Ok(true);
        }
        self.interruptible(lock.try_acquire_for(self.policy.per_attempt_timeout()))
            .await?
    }

    /// `fut` と中断シグナル（あれば）を競争させる
    async fn interruptible<F: Future>(&self, fut: F) -> Result<F::Output, LockError> {
        let Some(interrupt) = &self.interrupt else {
            return Ok(fut.await);
        };
        let mut interrupt = interrupt.clone();

        tokio::select! {
            biased;
            _ = interrupted(&mut interrupt) => Err(LockError::Interrupted),
            out = fut => Ok(out),
        }
    }
}

impl Default for LockCoordinator {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl fmt::Debug for LockCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockCoordinator")
            .field("policy", &self.policy)
            .field("interruptible", &self.interrupt.is_some())
            .finish_non_exhaustive()
    }
}

/// フラグが `true` になったら完了する。sender が無ければ完了しない
async fn interrupted(interrupt: &mut watch::Receiver<bool>) {
    let closed = interrupt.wait_for(|set| *set).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

fn acquisition_failed<E>(err: LockError) -> ExclusiveError<E> {
    if err == LockError::Interrupted {
        warn!("interrupted while waiting for the lock");
    } else {
        warn!(error = %err, "lock acquisition failed");
    }
    ExclusiveError::from(err)
}

/// lock を解放し、操作と解放の結果を 1 つにまとめる
fn finish<L, T, E>(held: HeldLock<'_, L>, outcome: Result<T, E>) -> Result<T, ExclusiveError<E>>
where
    L: ExclusiveLock + ?Sized,
{
    let released = held.release();
    match (outcome, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(release)) => {
            observability::disposal_failure(Disposed::LockRelease, &release);
            Err(ExclusiveError::Release(release))
        }
        (Err(operation), Ok(())) => {
            debug!("operation failed; lock released");
            Err(ExclusiveError::Operation(operation))
        }
        (Err(operation), Err(release)) => {
            observability::disposal_failure(Disposed::LockRelease, &release);
            Err(ExclusiveError::OperationAndRelease { operation, release })
        }
    }
}

/// Grant held by the current invocation. Released exactly once: explicitly
/// through [`HeldLock::release`], or on drop (panic, cancellation).
struct HeldLock<'l, L: ExclusiveLock + ?Sized> {
    lock: &'l L,
    released: bool,
}

impl<'l, L: ExclusiveLock + ?Sized> HeldLock<'l, L> {
    fn new(lock: &'l L) -> Self {
        Self {
            lock,
            released: false,
        }
    }

    fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        self.lock.release()
    }
}

impl<L: ExclusiveLock + ?Sized> Drop for HeldLock<'_, L> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        warn!("lock released on unwind or cancellation");
        if let Err(err) = self.lock.release() {
            observability::disposal_failure(Disposed::LockRelease, &err);
        }
    }
}
