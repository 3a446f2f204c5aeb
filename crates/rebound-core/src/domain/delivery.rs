//! Delivery - 配送されたメッセージと、判断に使う読み取り専用ビュー
//!
//! ## x-death ヘッダー
//! ブローカーは dead-letter されるたびに (queue, reason) ごとのエントリの
//! `count` を増やします。このクレートが試行回数として読むのは先頭エントリの
//! `count` だけで、自分では数えません。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ids::DeliveryTag;
use crate::ports::DeliveryMetadata;

/// ブローカーが dead-letter した理由（`x-death[].reason`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathReason {
    Rejected,
    Expired,
    Maxlen,
    DeliveryLimit,
}

/// One entry of the broker's retry history.
///
/// The broker keeps one entry per (queue, reason) pair and bumps `count`
/// each time the message dies there again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathRecord {
    pub count: u64,
    pub reason: DeathReason,
    pub queue: String,
    pub exchange: String,
    #[serde(rename = "routing-keys", default)]
    pub routing_keys: Vec<String>,
}

/// メッセージヘッダー
///
/// 解釈するのはリトライ履歴だけで、それ以外はそのまま運びます。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageHeaders {
    #[serde(rename = "x-death", default, skip_serializing_if = "Vec::is_empty")]
    pub x_death: Vec<DeathRecord>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl MessageHeaders {
    /// Attempt count as recorded by the broker: the first history entry's
    /// `count`, or 0 when the message never died.
    pub fn death_count(&self) -> u64 {
        self.x_death.first().map(|d| d.count).unwrap_or(0)
    }

    /// Record one more death in `queue`. Bumps the matching entry and moves
    /// it to the front, like the broker does.
    pub fn record_death(&mut self, reason: DeathReason, queue: &str, exchange: &str, routing_key: &str) {
        let existing = self
            .x_death
            .iter()
            .position(|d| d.queue == queue && d.reason == reason);

        let entry = match existing {
            Some(idx) => {
                let mut entry = self.x_death.remove(idx);
                entry.count += 1;
                entry
            }
            None => DeathRecord {
                count: 1,
                reason,
                queue: queue.to_string(),
                exchange: exchange.to_string(),
                routing_keys: vec![routing_key.to_string()],
            },
        };
        self.x_death.insert(0, entry);
    }
}

/// コンシューマーに渡されたメッセージ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    tag: DeliveryTag,
    redelivered: bool,
    exchange: String,
    routing_key: String,
    #[serde(default)]
    headers: MessageHeaders,
    body: Vec<u8>,
}

impl Delivery {
    pub fn new(
        tag: DeliveryTag,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            tag,
            redelivered: false,
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            headers: MessageHeaders::default(),
            body: body.into(),
        }
    }

    pub fn with_redelivered(mut self, redelivered: bool) -> Self {
        self.redelivered = redelivered;
        self
    }

    pub fn with_headers(mut self, headers: MessageHeaders) -> Self {
        self.headers = headers;
        self
    }

    /// Convenience for tests and demos: pretend the broker already counted
    /// `count` deaths in `queue`.
    pub fn with_death_count(mut self, queue: &str, count: u64) -> Self {
        self.headers.x_death.retain(|d| d.queue != queue);
        if count > 0 {
            self.headers.x_death.insert(
                0,
                DeathRecord {
                    count,
                    reason: DeathReason::Expired,
                    queue: queue.to_string(),
                    exchange: self.exchange.clone(),
                    routing_keys: vec![self.routing_key.clone()],
                },
            );
        }
        self
    }

    pub fn tag(&self) -> DeliveryTag {
        self.tag
    }

    pub fn is_redelivered(&self) -> bool {
        self.redelivered
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    pub fn headers(&self) -> &MessageHeaders {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut MessageHeaders {
        &mut self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Same message, handed out again under a new tag.
    pub(crate) fn redeliver_as(&self, tag: DeliveryTag, redelivered: bool) -> Self {
        let mut next = self.clone();
        next.tag = tag;
        next.redelivered = redelivered;
        next
    }

    /// Same payload and headers, re-routed (used when a dead-lettered
    /// message comes back from a delay destination).
    pub(crate) fn reroute(&mut self, exchange: &str, routing_key: &str) {
        self.exchange = exchange.to_string();
        self.routing_key = routing_key.to_string();
    }
}

impl DeliveryMetadata for Delivery {
    fn delivery_tag(&self) -> DeliveryTag {
        self.tag
    }

    fn redelivered(&self) -> bool {
        self.redelivered
    }

    fn retry_history_count(&self) -> u64 {
        self.headers.death_count()
    }

    fn received_routing_key(&self) -> &str {
        &self.routing_key
    }
}

/// Decider が見る読み取り専用ビュー
///
/// 呼び出しのたびにメタデータから作り、保存はしません。
/// `attempt_count` の正はこのクレートではなくブローカーです。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub delivery_tag: DeliveryTag,
    pub attempt_count: u64,
    pub was_redelivered: bool,
    pub received_routing_key: String,
}

impl DeliveryRecord {
    pub fn of<M: DeliveryMetadata + ?Sized>(message: &M) -> Self {
        Self {
            delivery_tag: message.delivery_tag(),
            attempt_count: message.retry_history_count(),
            was_redelivered: message.redelivered(),
            received_routing_key: message.received_routing_key().to_string(),
        }
    }
}
