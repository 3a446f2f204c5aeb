//! InMemoryBroker - 開発用のブローカー
//!
//! 再配送の経路を端から端まで動かすのに必要なだけのブローカーです:
//! - 新しいタグを振って [`Delivery`] を渡す
//! - 各タグの settle は最大 1 回（2 回目の ack/reject はエラー）
//! - `reject(requeue = true)` は redelivered フラグ付きで同じメッセージを再度渡す
//! - publish は宛先ごとに記録し、[`InMemoryBroker::expire`] が遅延キューの
//!   TTL 切れと dead-letter によるコンシューマーへの戻りを再現する
//! - publish/ack の失敗を注入できる

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::delivery::{DeathReason, Delivery};
use crate::domain::errors::BrokerError;
use crate::domain::ids::DeliveryTag;
use crate::ports::{DeliveryChannel, MessagePublisher};

/// A message recorded by `publish`.
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub destination: String,
    pub routing_key: String,
    pub message: Delivery,
}

/// Ack/reject calls as the broker saw them, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Ack { tag: DeliveryTag, multiple: bool },
    Reject { tag: DeliveryTag, requeue: bool },
}

impl Settlement {
    pub fn tag(&self) -> DeliveryTag {
        match self {
            Settlement::Ack { tag, .. } | Settlement::Reject { tag, .. } => *tag,
        }
    }
}

#[derive(Debug, Default)]
struct BrokerState {
    next_tag: u64,

    /// Ready for the consumer.
    ready: VecDeque<Delivery>,

    /// Handed out, not settled yet. 二重 settle はここに無いことで検出する
    unacked: HashMap<DeliveryTag, Delivery>,

    settlements: Vec<Settlement>,

    published: Vec<Published>,
}

impl BrokerState {
    fn allocate_tag(&mut self) -> DeliveryTag {
        self.next_tag += 1;
        DeliveryTag::new(self.next_tag)
    }

    fn take_unacked(&mut self, tag: DeliveryTag) -> Result<Delivery, BrokerError> {
        let delivery = self
            .unacked
            .remove(&tag)
            .ok_or(BrokerError::UnknownDeliveryTag(tag))?;
        Ok(delivery)
    }
}

/// テスト・デモ用のインメモリブローカー
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
    fail_publish: AtomicBool,
    fail_ack: AtomicBool,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a fresh message for the consumer. Returns the tag it will be
    /// delivered under.
    pub async fn enqueue(
        &self,
        exchange: &str,
        routing_key: &str,
        body: impl Into<Vec<u8>>,
    ) -> DeliveryTag {
        let mut state = self.state.lock().await;
        let tag = state.allocate_tag();
        state
            .ready
            .push_back(Delivery::new(tag, exchange, routing_key, body));
        tag
    }

    /// 次の ready メッセージを渡す（unacked になる）
    pub async fn next_delivery(&self) -> Option<Delivery> {
        let mut state = self.state.lock().await;
        let delivery = state.ready.pop_front()?;
        state.unacked.insert(delivery.tag(), delivery.clone());
        Some(delivery)
    }

    /// Play the delay queue's expiry: every message published to
    /// `destination` dies in `delay_queue` (x-death count +1) and is routed
    /// back to the consumer under its publish routing key. Returns how many
    /// messages came back.
    pub async fn expire(&self, destination: &str, delay_queue: &str) -> usize {
        let mut state = self.state.lock().await;
        let (expired, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.published)
            .into_iter()
            .partition(|p| p.destination == destination);
        state.published = kept;

        let count = expired.len();
        for published in expired {
            let tag = state.allocate_tag();
            let mut message = published.message.redeliver_as(tag, false);
            message.headers_mut().record_death(
                DeathReason::Expired,
                delay_queue,
                &published.destination,
                &published.routing_key,
            );
            let exchange = message.exchange().to_string();
            message.reroute(&exchange, &published.routing_key);
            state.ready.push_back(message);
        }
        count
    }

    /// 以降の `publish` をすべて失敗させる（false で元に戻す）
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// 以降の `ack` をすべて失敗させる（false で元に戻す）
    pub fn fail_acks(&self, fail: bool) {
        self.fail_ack.store(fail, Ordering::SeqCst);
    }

    pub async fn published(&self) -> Vec<Published> {
        self.state.lock().await.published.clone()
    }

    pub async fn settlements(&self) -> Vec<Settlement> {
        self.state.lock().await.settlements.clone()
    }

    /// Settlements issued for one tag (exactly-once checks).
    pub async fn settlements_for(&self, tag: DeliveryTag) -> Vec<Settlement> {
        self.state
            .lock()
            .await
            .settlements
            .iter()
            .filter(|s| s.tag() == tag)
            .copied()
            .collect()
    }

    pub async fn ready_len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    pub async fn unacked_len(&self) -> usize {
        self.state.lock().await.unacked.len()
    }
}

#[async_trait]
impl DeliveryChannel for InMemoryBroker {
    async fn ack(&self, tag: DeliveryTag, multiple: bool) -> Result<(), BrokerError> {
        if self.fail_ack.load(Ordering::SeqCst) {
            return Err(BrokerError::AckFailed {
                tag,
                reason: "injected ack failure".to_string(),
            });
        }

        let mut state = self.state.lock().await;
        state.take_unacked(tag)?;
        if multiple {
            let older: Vec<DeliveryTag> = state.unacked.keys().filter(|t| **t < tag).copied().collect();
            for t in older {
                state.take_unacked(t)?;
            }
        }
        state.settlements.push(Settlement::Ack { tag, multiple });
        Ok(())
    }

    async fn reject(&self, tag: DeliveryTag, requeue: bool) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        let delivery = state.take_unacked(tag)?;
        state.settlements.push(Settlement::Reject { tag, requeue });

        if requeue {
            let next_tag = state.allocate_tag();
            state.ready.push_back(delivery.redeliver_as(next_tag, true));
        }
        Ok(())
    }
}

#[async_trait]
impl MessagePublisher<Delivery> for InMemoryBroker {
    async fn publish(
        &self,
        destination: &str,
        routing_key: &str,
        message: &Delivery,
    ) -> Result<(), BrokerError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(BrokerError::PublishFailed {
                destination: destination.to_string(),
                reason: "injected publish failure".to_string(),
            });
        }

        let mut state = self.state.lock().await;
        state.published.push(Published {
            destination: destination.to_string(),
            routing_key: routing_key.to_string(),
            message: message.clone(),
        });
        Ok(())
    }
}
