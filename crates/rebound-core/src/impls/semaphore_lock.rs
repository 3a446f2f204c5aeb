//! SemaphoreLock - tokio Semaphore を使った排他ロック
//!
//! permit 1 つのセマフォです。取得時に permit を `forget()` し、`release` で戻すので、
//! 許可がガードの寿命に縛られず、解放のタイミングはコーディネーターが決めます。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Semaphore, TryAcquireError};

use crate::domain::errors::LockError;
use crate::ports::ExclusiveLock;

/// In-process mutual exclusion over a one-permit [`Semaphore`].
///
/// 待機者は FIFO で処理されます（tokio のセマフォは公平）。
/// `acquire` と `try_acquire_for` は cancel-safe です。
#[derive(Debug)]
pub struct SemaphoreLock {
    permits: Semaphore,
    held: AtomicBool,
    grants: AtomicU64,
    releases: AtomicU64,
}

impl SemaphoreLock {
    pub fn new() -> Self {
        Self {
            permits: Semaphore::new(1),
            held: AtomicBool::new(false),
            grants: AtomicU64::new(0),
            releases: AtomicU64::new(0),
        }
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Fail all pending and future acquisitions with `LockError::Closed`.
    pub fn close(&self) {
        self.permits.close();
    }

    /// lock を許可した回数
    pub fn grants(&self) -> u64 {
        self.grants.load(Ordering::Relaxed)
    }

    /// 成功した release の回数
    pub fn releases(&self) -> u64 {
        self.releases.load(Ordering::Relaxed)
    }

    fn granted(&self) {
        self.held.store(true, Ordering::Release);
        self.grants.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for SemaphoreLock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExclusiveLock for SemaphoreLock {
    fn try_acquire(&self) -> Result<bool, LockError> {
        match self.permits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.granted();
                Ok(true)
            }
            Err(TryAcquireError::NoPermits) => Ok(false),
            Err(TryAcquireError::Closed) => Err(LockError::Closed),
        }
    }

    async fn try_acquire_for(&self, timeout: Duration) -> Result<bool, LockError> {
        match tokio::time::timeout(timeout, self.permits.acquire()).await {
            Ok(Ok(permit)) => {
                permit.forget();
                self.granted();
                Ok(true)
            }
            Ok(Err(_closed)) => Err(LockError::Closed),
            Err(_elapsed) => Ok(false),
        }
    }

    async fn acquire(&self) -> Result<(), LockError> {
        let permit = self.permits.acquire().await.map_err(|_| LockError::Closed)?;
        permit.forget();
        self.granted();
        Ok(())
    }

    fn release(&self) -> Result<(), LockError> {
        // swap first: a second release must not hand out a second permit
        if !self.held.swap(false, Ordering::AcqRel) {
            return Err(LockError::NotHeld);
        }
        self.permits.add_permits(1);
        self.releases.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
