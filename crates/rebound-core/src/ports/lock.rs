//! ExclusiveLock port - 排他制御プリミティブ
//!
//! コーディネーター自身は排他制御を実装しません。
//! ホストがこの trait 越しに渡したプリミティブを操作するだけです。

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::errors::LockError;

/// A mutual-exclusion primitive.
///
/// # Contract
/// - `try_acquire` never waits.
/// - `try_acquire_for` waits at most `timeout`.
/// - `acquire` waits until the lock is granted or the wait is interrupted
///   (`LockError::Interrupted`).
/// - The futures returned by `try_acquire_for` and `acquire` are cancel-safe:
///   dropping one before it completes leaves the lock un-held. The
///   coordinator races them against its interrupt signal.
/// - `release` is only called by the holder, exactly once per grant.
///
/// lock はプロセス全体で共有されます。コーディネーターは自分が唯一の利用者だとは仮定しません。
#[async_trait]
pub trait ExclusiveLock: Send + Sync {
    /// Non-blocking attempt.
    fn try_acquire(&self) -> Result<bool, LockError>;

    /// Time-bounded attempt.
    async fn try_acquire_for(&self, timeout: Duration) -> Result<bool, LockError>;

    /// Wait as long as it takes.
    async fn acquire(&self) -> Result<(), LockError>;

    fn release(&self) -> Result<(), LockError>;
}
