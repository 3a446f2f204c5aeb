//! Retry policy - リトライ方針
//!
//! 試行回数・1 回あたりの待ち時間・試行間隔の 3 つだけを持つ値オブジェクトです。
//!
//! ## 不変条件
//! - `max_attempts >= 1`（0 回の試行は設定ミスとして構築時に拒否する）
//! - 構築後は読み取り専用（途中で方針が変わることはない）

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of attempts (including the first).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default bound for one time-limited acquisition attempt.
pub const DEFAULT_PER_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(500);

/// Default pause between two attempts.
pub const DEFAULT_INTER_ATTEMPT_DELAY: Duration = Duration::from_millis(200);

/// PolicyError は方針の検証エラー
///
/// lock 側の `RetryPolicy` と redelivery 側の設定で共通に使います。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("max_attempts must be at least 1 (got {0})")]
    InvalidMaxAttempts(u32),
}

/// Bounded retry policy.
///
/// 一度だけ検証して作り、あとは読むだけの不変値です。
/// デフォルトは 3 回・1 回 500ms・間隔 200ms。
///
/// Serialized shape (every field optional):
/// ```json
/// { "max_attempts": 3, "per_attempt_timeout_ms": 500, "inter_attempt_delay_ms": 200 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RetryPolicySpec", into = "RetryPolicySpec")]
pub struct RetryPolicy {
    max_attempts: u32,
    per_attempt_timeout: Duration,
    inter_attempt_delay: Duration,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        per_attempt_timeout: Duration,
        inter_attempt_delay: Duration,
    ) -> Result<Self, PolicyError> {
        Ok(Self {
            max_attempts: validate_max_attempts(max_attempts)?,
            per_attempt_timeout,
            inter_attempt_delay,
        })
    }

    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// Total attempts, including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn per_attempt_timeout(&self) -> Duration {
        self.per_attempt_timeout
    }

    pub fn inter_attempt_delay(&self) -> Duration {
        self.inter_attempt_delay
    }

    /// Have `attempts` failed attempts used up the budget?
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            per_attempt_timeout: DEFAULT_PER_ATTEMPT_TIMEOUT,
            inter_attempt_delay: DEFAULT_INTER_ATTEMPT_DELAY,
        }
    }
}

/// Wire/config form of [`RetryPolicy`]. Durations are milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct RetryPolicySpec {
    max_attempts: u32,
    per_attempt_timeout_ms: u64,
    inter_attempt_delay_ms: u64,
}

impl Default for RetryPolicySpec {
    fn default() -> Self {
        RetryPolicy::default().into()
    }
}

impl TryFrom<RetryPolicySpec> for RetryPolicy {
    type Error = PolicyError;

    fn try_from(spec: RetryPolicySpec) -> Result<Self, Self::Error> {
        RetryPolicy::new(
            spec.max_attempts,
            Duration::from_millis(spec.per_attempt_timeout_ms),
            Duration::from_millis(spec.inter_attempt_delay_ms),
        )
    }
}

impl From<RetryPolicy> for RetryPolicySpec {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts,
            per_attempt_timeout_ms: duration_to_millis(policy.per_attempt_timeout),
            inter_attempt_delay_ms: duration_to_millis(policy.inter_attempt_delay),
        }
    }
}

/// `max_attempts >= 1` の検証
pub(crate) fn validate_max_attempts(max_attempts: u32) -> Result<u32, PolicyError> {
    if max_attempts == 0 {
        return Err(PolicyError::InvalidMaxAttempts(max_attempts));
    }
    Ok(max_attempts)
}

/// Duration をミリ秒に変換（u64 に収まらない分は飽和させる）
pub(crate) fn duration_to_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Builder with fail-fast validation in `build()`.
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_attempts: u32,
    per_attempt_timeout: Duration,
    inter_attempt_delay: Duration,
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            per_attempt_timeout: DEFAULT_PER_ATTEMPT_TIMEOUT,
            inter_attempt_delay: DEFAULT_INTER_ATTEMPT_DELAY,
        }
    }
}

impl RetryPolicyBuilder {
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn per_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.per_attempt_timeout = timeout;
        self
    }

    pub fn inter_attempt_delay(mut self, delay: Duration) -> Self {
        self.inter_attempt_delay = delay;
        self
    }

    pub fn build(self) -> Result<RetryPolicy, PolicyError> {
        RetryPolicy::new(
            self.max_attempts,
            self.per_attempt_timeout,
            self.inter_attempt_delay,
        )
    }
}

/// Backoff は試行間隔の差し替えポイント
///
/// `failed_attempts` はそれまでに失敗した試行の数です
/// （2 回目の前は 1、3 回目の前は 2）。
///
/// クレートが提供するのは固定間隔だけで、それ以外はクロージャで渡します。
pub trait Backoff: Send + Sync {
    fn delay(&self, failed_attempts: u32) -> Duration;
}

/// A policy spaces attempts by its `inter_attempt_delay`.
impl Backoff for RetryPolicy {
    fn delay(&self, _failed_attempts: u32) -> Duration {
        self.inter_attempt_delay
    }
}

/// Constant delay, independent of any policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedInterval(pub Duration);

impl Backoff for FixedInterval {
    fn delay(&self, _failed_attempts: u32) -> Duration {
        self.0
    }
}

impl<F> Backoff for F
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    fn delay(&self, failed_attempts: u32) -> Duration {
        self(failed_attempts)
    }
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} attempts, {:?} per attempt, {:?} apart",
            self.max_attempts, self.per_attempt_timeout, self.inter_attempt_delay
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_lock_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.per_attempt_timeout(), Duration::from_millis(500));
        assert_eq!(policy.inter_attempt_delay(), Duration::from_millis(200));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let err = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO).unwrap_err();
        assert_eq!(err, PolicyError::InvalidMaxAttempts(0));

        let err = RetryPolicy::builder().max_attempts(0).build().unwrap_err();
        assert_eq!(err, PolicyError::InvalidMaxAttempts(0));
    }

    #[test]
    fn fixed_interval_ignores_attempt_number() {
        let policy = RetryPolicy::builder()
            .inter_attempt_delay(Duration::from_millis(75))
            .build()
            .unwrap();
        assert_eq!(policy.delay(1), Duration::from_millis(75));
        assert_eq!(policy.delay(7), Duration::from_millis(75));
        assert_eq!(
            FixedInterval(Duration::from_secs(1)).delay(3),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn closures_are_backoffs() {
        let linear = |n: u32| Duration::from_millis(10 * u64::from(n));
        assert_eq!(Backoff::delay(&linear, 3), Duration::from_millis(30));
    }

    #[test]
    fn exhaustion_counts_failed_attempts() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
    }

    #[test]
    fn policy_without_fields_gets_defaults() {
        let policy: RetryPolicy = serde_json::from_str("{}").expect("deserialize");
        assert_eq!(policy, RetryPolicy::default());
    }

    #[test]
    fn policy_reads_millisecond_fields() {
        let json = r#"{ "max_attempts": 5, "per_attempt_timeout_ms": 50, "inter_attempt_delay_ms": 10 }"#;
        let policy: RetryPolicy = serde_json::from_str(json).expect("deserialize");
        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.per_attempt_timeout(), Duration::from_millis(50));
        assert_eq!(policy.inter_attempt_delay(), Duration::from_millis(10));

        let v = serde_json::to_value(policy).unwrap();
        assert_eq!(v["per_attempt_timeout_ms"], 50);
    }

    #[test]
    fn millis_saturate_instead_of_truncating() {
        assert_eq!(duration_to_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(duration_to_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn invalid_policy_fails_to_deserialize() {
        let err = serde_json::from_str::<RetryPolicy>(r#"{ "max_attempts": 0 }"#).unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }
}
