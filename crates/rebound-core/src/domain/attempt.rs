//! Attempt - 1 回の取得処理の試行記録

use std::time::{Duration, Instant};

use super::retry::RetryPolicy;

/// LockAttemptState は 1 回の lock 取得の試行状態
///
/// 作った呼び出しが所有し、その呼び出しが返ると破棄されます。
/// 共有はしません（並行する 2 つの呼び出しはそれぞれ別の状態を持つ）。
#[derive(Debug, Clone)]
pub struct LockAttemptState {
    /// これまでに失敗した試行の数
    pub attempt_count: u32,

    /// プリミティブが排他アクセスを許可したら true
    pub acquired: bool,

    started_at: Instant,
}

impl LockAttemptState {
    pub fn new() -> Self {
        Self {
            attempt_count: 0,
            acquired: false,
            started_at: Instant::now(),
        }
    }

    /// One bounded attempt came back empty-handed.
    pub fn record_failed_attempt(&mut self) {
        self.attempt_count += 1;
    }

    pub fn mark_acquired(&mut self) {
        self.acquired = true;
    }

    /// Attempts made, counting the successful one if any.
    pub fn attempts_made(&self) -> u32 {
        self.attempt_count + u32::from(self.acquired)
    }

    pub fn is_exhausted(&self, policy: &RetryPolicy) -> bool {
        !self.acquired && policy.is_exhausted(self.attempt_count)
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl Default for LockAttemptState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_has_no_attempts() {
        let state = LockAttemptState::new();
        assert_eq!(state.attempt_count, 0);
        assert!(!state.acquired);
        assert_eq!(state.attempts_made(), 0);
    }

    #[test]
    fn exhaustion_follows_policy() {
        let policy = RetryPolicy::builder().max_attempts(2).build().unwrap();
        let mut state = LockAttemptState::new();

        state.record_failed_attempt();
        assert!(!state.is_exhausted(&policy));

        state.record_failed_attempt();
        assert!(state.is_exhausted(&policy));
    }

    #[test]
    fn successful_attempt_counts_as_made() {
        let mut state = LockAttemptState::new();
        state.record_failed_attempt();
        state.mark_acquired();
        assert_eq!(state.attempts_made(), 2);
        assert!(!state.is_exhausted(&RetryPolicy::default()));
    }
}
