//! Broker ports - メッセージブローカーとの境界
//!
//! 境界は 3 つ: メタデータはメッセージ自体から読み、ack/reject は受信した
//! channel 経由、publish は別の producer 経由で行います。

use async_trait::async_trait;

use crate::domain::errors::BrokerError;
use crate::domain::ids::DeliveryTag;

/// Metadata the coordinator reads off a delivered message.
pub trait DeliveryMetadata: Send + Sync {
    fn delivery_tag(&self) -> DeliveryTag;

    /// Broker flag: handed out before without an ack.
    fn redelivered(&self) -> bool;

    /// Attempt count from the broker's retry-history header (0 if absent).
    fn retry_history_count(&self) -> u64;

    fn received_routing_key(&self) -> &str;
}

/// Settles deliveries on the channel they arrived on.
///
/// 周りにロックは追加しません。スレッド安全性はクライアント自身の契約に従います。
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn ack(&self, tag: DeliveryTag, multiple: bool) -> Result<(), BrokerError>;

    async fn reject(&self, tag: DeliveryTag, requeue: bool) -> Result<(), BrokerError>;
}

/// Publishes a message to a destination (exchange) with a routing key.
#[async_trait]
pub trait MessagePublisher<M: Sync + ?Sized>: Send + Sync {
    async fn publish(&self, destination: &str, routing_key: &str, message: &M) -> Result<(), BrokerError>;
}
