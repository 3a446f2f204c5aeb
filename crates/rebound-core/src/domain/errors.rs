//! Errors - エラー型と分類
//!
//! プリミティブのエラー（`LockError`, `BrokerError`）は ports から来ます。
//! コーディネーターのエラー（`ExclusiveError`, `RedeliveryError`）はそれらと
//! 呼び出し側のエラー型 `E` を包み、2 つの失敗を 1 つに潰すことはしません。

use thiserror::Error;

use super::ids::DeliveryTag;

/// ErrorKind はコーディネーターの失敗の運用分類
///
/// 枯渇（静かに引き下がる）と、操作の失敗やリソースが不明な状態で残った
/// ケース（アラート）を、呼び出し側が区別できるようにします。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 方針の範囲内で lock を取れなかった
    RetryExhausted,
    /// 待機が中断された（後始末は不要）
    InterruptedDuringAcquire,
    /// The protected operation or the fallback failed.
    OperationFailure,
    /// release / ack / reject の失敗（リソースが不整合かもしれない）
    DisposalFailure,
    /// Re-publishing to the delay destination failed.
    RedeliveryPublishFailure,
    /// The lock primitive failed for another reason.
    Backend,
}

/// Failures reported by an [`ExclusiveLock`](crate::ports::ExclusiveLock).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("interrupted while waiting for the lock")]
    Interrupted,

    #[error("release called on a lock that is not held")]
    NotHeld,

    #[error("lock is closed")]
    Closed,

    #[error("lock backend error: {0}")]
    Backend(String),
}

/// Failures reported by a broker channel or publisher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// The tag is unknown or already settled (AMQP PRECONDITION_FAILED).
    #[error("unknown delivery tag {0}")]
    UnknownDeliveryTag(DeliveryTag),

    #[error("publish to '{destination}' failed: {reason}")]
    PublishFailed { destination: String, reason: String },

    #[error("ack failed for delivery tag {tag}: {reason}")]
    AckFailed { tag: DeliveryTag, reason: String },

    #[error("no publisher configured for re-publishing")]
    NoPublisher,

    #[error("channel closed")]
    ChannelClosed,
}

/// Failure of [`BoundedExecutor`](crate::app::BoundedExecutor) workers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("worker was cancelled")]
    WorkerCancelled,
}

/// Failure of a lock-coordinated run.
#[derive(Debug, Error)]
pub enum ExclusiveError<E> {
    #[error("lock not acquired after {attempts} attempts")]
    RetryExhausted { attempts: u32 },

    #[error("interrupted while waiting for the lock")]
    InterruptedDuringAcquire,

    #[error("lock acquisition failed: {0}")]
    Acquire(LockError),

    /// The operation failed; the lock was released first.
    #[error("protected operation failed: {0}")]
    Operation(E),

    /// The operation succeeded but the lock could not be released.
    #[error("lock release failed: {0}")]
    Release(LockError),

    #[error("protected operation failed ({operation}) and lock release failed ({release})")]
    OperationAndRelease { operation: E, release: LockError },
}

impl<E> ExclusiveError<E> {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExclusiveError::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            ExclusiveError::InterruptedDuringAcquire => ErrorKind::InterruptedDuringAcquire,
            ExclusiveError::Acquire(_) => ErrorKind::Backend,
            ExclusiveError::Operation(_) => ErrorKind::OperationFailure,
            ExclusiveError::Release(_) | ExclusiveError::OperationAndRelease { .. } => {
                ErrorKind::DisposalFailure
            }
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, ExclusiveError::RetryExhausted { .. })
    }

    /// The operation's own error, if it failed.
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            ExclusiveError::Operation(e) | ExclusiveError::OperationAndRelease { operation: e, .. } => {
                Some(e)
            }
            _ => None,
        }
    }

    pub fn into_operation_error(self) -> Option<E> {
        match self {
            ExclusiveError::Operation(e) | ExclusiveError::OperationAndRelease { operation: e, .. } => {
                Some(e)
            }
            _ => None,
        }
    }
}

impl<E> From<LockError> for ExclusiveError<E> {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Interrupted => ExclusiveError::InterruptedDuringAcquire,
            other => ExclusiveError::Acquire(other),
        }
    }
}

/// RedeliveryError は配送の解決処理の失敗
#[derive(Debug, Error)]
pub enum RedeliveryError<E> {
    /// Re-publish failed; the ack (if enabled) succeeded.
    #[error("re-publish failed: {0}")]
    Publish(BrokerError),

    /// The exhaustion fallback failed; the ack (if enabled) succeeded.
    #[error("exhaustion fallback failed: {0}")]
    Fallback(E),

    /// The ack or reject failed.
    #[error("disposal failed: {0}")]
    Disposal(BrokerError),

    #[error("re-publish failed ({publish}) and disposal failed ({disposal})")]
    PublishAndDisposal {
        publish: BrokerError,
        disposal: BrokerError,
    },

    #[error("exhaustion fallback failed ({fallback}) and disposal failed ({disposal})")]
    FallbackAndDisposal { fallback: E, disposal: BrokerError },
}

impl<E> RedeliveryError<E> {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RedeliveryError::Publish(_) => ErrorKind::RedeliveryPublishFailure,
            RedeliveryError::Fallback(_) => ErrorKind::OperationFailure,
            RedeliveryError::Disposal(_)
            | RedeliveryError::PublishAndDisposal { .. }
            | RedeliveryError::FallbackAndDisposal { .. } => ErrorKind::DisposalFailure,
        }
    }

    /// The disposal error, if the ack/reject itself failed.
    pub fn disposal_error(&self) -> Option<&BrokerError> {
        match self {
            RedeliveryError::Disposal(d)
            | RedeliveryError::PublishAndDisposal { disposal: d, .. }
            | RedeliveryError::FallbackAndDisposal { disposal: d, .. } => Some(d),
            _ => None,
        }
    }
}
