//! Decision - 失敗した配送をどうするかの判断
//!
//! Decider は純粋関数です。配送のメタデータを受け取って次のアクションを返すだけで、
//! ブローカーには触りません。判断の実行（reject・再 publish・fallback・ack）は
//! コーディネーターの仕事です。

use serde::{Deserialize, Serialize};

use super::delivery::DeliveryRecord;
use super::retry::DEFAULT_MAX_ATTEMPTS;

/// 失敗した配送に対する次のアクション
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    /// requeue 付きで reject する（ブローカーが同じメッセージを再配送する）
    Requeue,

    /// Re-publish the message to a delay/dead-letter destination.
    Republish {
        destination: String,
        routing_key: String,
    },

    /// 諦めて fallback を実行する
    Exhausted { attempts: u64 },
}

impl Decision {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Decision::Exhausted { .. })
    }
}

pub trait Decider: Send + Sync {
    fn decide(&self, record: &DeliveryRecord) -> Decision;
}

/// ブローカーの redelivered フラグだけを見て、最大 1 回だけリトライする
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleRequeue;

impl Decider for SimpleRequeue {
    fn decide(&self, record: &DeliveryRecord) -> Decision {
        if record.was_redelivered {
            Decision::Exhausted { attempts: 1 }
        } else {
            Decision::Requeue
        }
    }
}

/// ブローカーが数えた回数が `max_attempts` 未満の間、遅延キュー経由でリトライする
///
/// - attempts < max_attempts: re-publish to `destination`
/// - attempts >= max_attempts: exhausted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountedRequeue {
    destination: String,
    routing_key: Option<String>,
    max_attempts: u32,
}

impl CountedRequeue {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            routing_key: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Routing key for the re-publish. Defaults to the received one.
    pub fn routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = Some(routing_key.into());
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

impl Decider for CountedRequeue {
    fn decide(&self, record: &DeliveryRecord) -> Decision {
        if record.attempt_count < u64::from(self.max_attempts) {
            let routing_key = self
                .routing_key
                .clone()
                .unwrap_or_else(|| record.received_routing_key.clone());
            Decision::Republish {
                destination: self.destination.clone(),
                routing_key,
            }
        } else {
            Decision::Exhausted {
                attempts: record.attempt_count,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::DeliveryTag;
    use rstest::rstest;

    fn record(attempt_count: u64, was_redelivered: bool) -> DeliveryRecord {
        DeliveryRecord {
            delivery_tag: DeliveryTag::new(1),
            attempt_count,
            was_redelivered,
            received_routing_key: "jobs.created".to_string(),
        }
    }

    #[test]
    fn simple_requeue_uses_redelivered_flag_only() {
        assert_eq!(SimpleRequeue.decide(&record(0, false)), Decision::Requeue);
        assert!(SimpleRequeue.decide(&record(0, true)).is_exhausted());
        // the broker count is ignored on this path
        assert_eq!(SimpleRequeue.decide(&record(9, false)), Decision::Requeue);
    }

    #[rstest]
    #[case(0, 3, false)]
    #[case(2, 3, false)]
    #[case(3, 3, true)]
    #[case(5, 3, true)]
    #[case(0, 1, false)]
    #[case(1, 1, true)]
    fn counted_requeue_compares_count_with_limit(
        #[case] attempts: u64,
        #[case] max_attempts: u32,
        #[case] exhausted: bool,
    ) {
        let decider = CountedRequeue::new("jobs.delay").max_attempts(max_attempts);
        assert_eq!(decider.decide(&record(attempts, false)).is_exhausted(), exhausted);
    }

    #[test]
    fn counted_requeue_defaults_to_received_routing_key() {
        let decision = CountedRequeue::new("jobs.delay").decide(&record(0, false));
        assert_eq!(
            decision,
            Decision::Republish {
                destination: "jobs.delay".to_string(),
                routing_key: "jobs.created".to_string(),
            }
        );
    }

    #[test]
    fn counted_requeue_uses_explicit_routing_key() {
        let decision = CountedRequeue::new("jobs.delay")
            .routing_key("jobs.retry")
            .decide(&record(1, true));
        assert!(matches!(
            decision,
            Decision::Republish { routing_key, .. } if routing_key == "jobs.retry"
        ));
    }

    #[test]
    fn exhausted_carries_broker_count() {
        let decision = CountedRequeue::new("jobs.delay").decide(&record(4, false));
        assert_eq!(decision, Decision::Exhausted { attempts: 4 });
    }

    #[test]
    fn decision_serializes_as_tagged_action() {
        let v = serde_json::to_value(Decision::Requeue).unwrap();
        assert_eq!(v["action"], "requeue");
    }
}
