//! RedeliveryCoordinator - 失敗したメッセージの再配送判断
//!
//! Two strategies over the same core:
//! - **simple**: requeue once on the broker's redelivered flag, then give up
//! - **counted**: re-publish to a delay destination while the broker's
//!   retry-history count is below the limit, then give up
//!
//! 諦めるときは呼び出し側の `on_exhausted` を実行します。requeue 以外の経路では、
//! 再 publish や fallback が失敗しても `ack` が有効なら配送を ack します。
//!
//! ## ack の決まり方
//! - `simple_retry` / `simple_retry_or_else`: 引数の `ack` をそのまま使う
//! - `simple_retry_default`: [`RedeliveryConfig::ack`] を使う
//! - `retry` / `retry_or_else`: ルートの指定、なければ [`RedeliveryConfig::ack`]

use std::convert::Infallible;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn, Instrument};

use crate::domain::decision::{CountedRequeue, Decider, Decision, SimpleRequeue};
use crate::domain::delivery::DeliveryRecord;
use crate::domain::errors::{BrokerError, RedeliveryError};
use crate::domain::ids::{DeliveryTag, ResolutionId};
use crate::domain::outcome::{Disposal, Resolution};
use crate::domain::retry::{validate_max_attempts, PolicyError, DEFAULT_MAX_ATTEMPTS};
use crate::observability::{self, Disposed};
use crate::ports::{DeliveryChannel, DeliveryMetadata, MessagePublisher};

/// Defaults for redelivery calls that don't say otherwise.
///
/// 呼び出し側が指定しなかった上限と ack の既定値です。
/// `RetryPolicy` と同じく `max_attempts >= 1` を構築時（deserialize 時も）に検証します。
///
/// ```json
/// { "max_attempts": 3, "ack": true }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RedeliveryConfigSpec", into = "RedeliveryConfigSpec")]
pub struct RedeliveryConfig {
    max_attempts: u32,
    ack: bool,
}

impl RedeliveryConfig {
    pub fn new(max_attempts: u32, ack: bool) -> Result<Self, PolicyError> {
        Ok(Self {
            max_attempts: validate_max_attempts(max_attempts)?,
            ack,
        })
    }

    /// Counted-retry limit for routes without their own.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// 最終的な配送を ack するかどうか
    pub fn ack(&self) -> bool {
        self.ack
    }
}

impl Default for RedeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            ack: true,
        }
    }
}

/// Wire/config form of [`RedeliveryConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct RedeliveryConfigSpec {
    max_attempts: u32,
    ack: bool,
}

impl Default for RedeliveryConfigSpec {
    fn default() -> Self {
        RedeliveryConfig::default().into()
    }
}

impl TryFrom<RedeliveryConfigSpec> for RedeliveryConfig {
    type Error = PolicyError;

    fn try_from(spec: RedeliveryConfigSpec) -> Result<Self, Self::Error> {
        RedeliveryConfig::new(spec.max_attempts, spec.ack)
    }
}

impl From<RedeliveryConfig> for RedeliveryConfigSpec {
    fn from(config: RedeliveryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            ack: config.ack,
        }
    }
}

/// Where a counted retry re-publishes to.
///
/// 指定しなかった項目は [`RedeliveryConfig`] の値になります。
///
/// ```ignore
/// let route = RetryRoute::to("orders.retry")
///     .routing_key("orders.created")
///     .max_attempts(5)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryRoute {
    destination: String,
    routing_key: Option<String>,
    max_attempts: Option<u32>,
    ack: Option<bool>,
}

impl RetryRoute {
    pub fn to(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            routing_key: None,
            max_attempts: None,
            ack: None,
        }
    }

    /// Defaults to the routing key the delivery arrived with.
    pub fn routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = Some(routing_key.into());
        self
    }

    /// 0 は `PolicyError::InvalidMaxAttempts` で拒否する
    pub fn max_attempts(mut self, max_attempts: u32) -> Result<Self, PolicyError> {
        self.max_attempts = Some(validate_max_attempts(max_attempts)?);
        Ok(self)
    }

    /// Leave the delivery unacknowledged; the caller disposes of it.
    pub fn without_ack(mut self) -> Self {
        self.ack = Some(false);
        self
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }
}

/// Decides and carries out what happens to a delivery whose processing
/// failed.
///
/// 呼び出し間で状態を持ちません。試行回数はブローカーのヘッダーだけが数えます。
#[derive(Debug, Clone, Default)]
pub struct RedeliveryCoordinator {
    config: RedeliveryConfig,
}

impl RedeliveryCoordinator {
    pub fn new(config: RedeliveryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RedeliveryConfig {
        &self.config
    }

    /// The view deciders work on, derived from `message`.
    pub fn record<M: DeliveryMetadata + ?Sized>(&self, message: &M) -> DeliveryRecord {
        DeliveryRecord::of(message)
    }

    /// Requeue once; the second time around acknowledge (when `ack`).
    pub async fn simple_retry<C, M>(
        &self,
        channel: &C,
        message: &M,
        ack: bool,
    ) -> Result<Resolution, RedeliveryError<Infallible>>
    where
        C: DeliveryChannel + ?Sized,
        M: DeliveryMetadata + ?Sized,
    {
        self.simple_retry_or_else(channel, message, ack, no_fallback)
            .await
    }

    /// [`simple_retry`](Self::simple_retry) with `ack` taken from the config.
    pub async fn simple_retry_default<C, M>(
        &self,
        channel: &C,
        message: &M,
    ) -> Result<Resolution, RedeliveryError<Infallible>>
    where
        C: DeliveryChannel + ?Sized,
        M: DeliveryMetadata + ?Sized,
    {
        self.simple_retry_or_else(channel, message, self.config.ack, no_fallback)
            .await
    }

    /// Requeue once; the second time around run `on_exhausted`, then
    /// acknowledge (when `ack`).
    pub async fn simple_retry_or_else<C, M, F, Fut, E>(
        &self,
        channel: &C,
        message: &M,
        ack: bool,
        on_exhausted: F,
    ) -> Result<Resolution, RedeliveryError<E>>
    where
        C: DeliveryChannel + ?Sized,
        M: DeliveryMetadata + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        self.resolve_delivery(channel, None, message, &SimpleRequeue, ack, on_exhausted)
            .await
    }

    /// Re-publish along `route` while attempts remain, then acknowledge.
    pub async fn retry<P, C, M>(
        &self,
        publisher: &P,
        channel: &C,
        message: &M,
        route: &RetryRoute,
    ) -> Result<Resolution, RedeliveryError<Infallible>>
    where
        P: MessagePublisher<M>,
        C: DeliveryChannel + ?Sized,
        M: DeliveryMetadata + ?Sized,
    {
        self.retry_or_else(publisher, channel, message, route, no_fallback)
            .await
    }

    /// Re-publish along `route` while attempts remain, otherwise run
    /// `on_exhausted`; acknowledge either way (unless the route opts out).
    pub async fn retry_or_else<P, C, M, F, Fut, E>(
        &self,
        publisher: &P,
        channel: &C,
        message: &M,
        route: &RetryRoute,
        on_exhausted: F,
    ) -> Result<Resolution, RedeliveryError<E>>
    where
        P: MessagePublisher<M>,
        C: DeliveryChannel + ?Sized,
        M: DeliveryMetadata + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let mut decider = CountedRequeue::new(route.destination.as_str())
            .max_attempts(route.max_attempts.unwrap_or(self.config.max_attempts));
        if let Some(routing_key) = &route.routing_key {
            decider = decider.routing_key(routing_key.as_str());
        }
        let ack = route.ack.unwrap_or(self.config.ack);
        let publisher: &dyn MessagePublisher<M> = publisher;

        self.resolve_delivery(channel, Some(publisher), message, &decider, ack, on_exhausted)
            .await
    }

    /// Shared core: decide, act, dispose.
    ///
    /// requeue・再 publish・`on_exhausted` のうちちょうど 1 つを行い、
    /// そのあと ack/reject を高々 1 回行います。`Requeue` は `ack` に関係なく reject します。
    pub async fn resolve_delivery<C, M, F, Fut, E>(
        &self,
        channel: &C,
        publisher: Option<&dyn MessagePublisher<M>>,
        message: &M,
        decider: &dyn Decider,
        ack: bool,
        on_exhausted: F,
    ) -> Result<Resolution, RedeliveryError<E>>
    where
        C: DeliveryChannel + ?Sized,
        M: DeliveryMetadata + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let resolution_id = ResolutionId::generate();
        let record = DeliveryRecord::of(message);
        let tag = record.delivery_tag;
        let span = info_span!("resolve_delivery", %resolution_id, delivery_tag = %tag);

        async move {
            let decision = decider.decide(&record);
            debug!(
                retry_count = record.attempt_count,
                redelivered = record.was_redelivered,
                ?decision,
                "retry times"
            );

            match decision.clone() {
                Decision::Requeue => match channel.reject(tag, true).await {
                    Ok(()) => Ok(Resolution::new(decision, Disposal::Rejected { requeue: true })),
                    Err(err) => {
                        observability::disposal_failure(Disposed::Reject, &err);
                        Err(RedeliveryError::Disposal(err))
                    }
                },

                Decision::Republish {
                    destination,
                    routing_key,
                } => {
                    let published = match publisher {
                        Some(publisher) => publisher.publish(&destination, &routing_key, message).await,
                        None => Err(BrokerError::NoPublisher),
                    };
                    if let Err(err) = &published {
                        warn!(%destination, %routing_key, error = %err, "re-publish failed");
                    }

                    let disposed = settle(channel, tag, ack).await;
                    match (published, disposed) {
                        (Ok(()), Ok(disposal)) => Ok(Resolution::new(decision, disposal)),
                        (Err(publish), Ok(_)) => Err(RedeliveryError::Publish(publish)),
                        (Ok(()), Err(disposal)) => Err(RedeliveryError::Disposal(disposal)),
                        (Err(publish), Err(disposal)) => {
                            Err(RedeliveryError::PublishAndDisposal { publish, disposal })
                        }
                    }
                }

                Decision::Exhausted { attempts } => {
                    warn!(attempts, "redelivery exhausted; running fallback");
                    let fallback = on_exhausted().await;
                    if fallback.is_err() {
                        warn!("exhaustion fallback failed");
                    }

                    let disposed = settle(channel, tag, ack).await;
                    match (fallback, disposed) {
                        (Ok(()), Ok(disposal)) => Ok(Resolution::new(decision, disposal)),
                        (Err(fallback), Ok(_)) => Err(RedeliveryError::Fallback(fallback)),
                        (Ok(()), Err(disposal)) => Err(RedeliveryError::Disposal(disposal)),
                        (Err(fallback), Err(disposal)) => {
                            Err(RedeliveryError::FallbackAndDisposal { fallback, disposal })
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}

async fn no_fallback() -> Result<(), Infallible> {
    Ok(())
}

/// `ack` のときだけ ack する。それ以外は呼び出し側に任せる（Deferred）
async fn settle<C>(channel: &C, tag: DeliveryTag, ack: bool) -> Result<Disposal, BrokerError>
where
    C: DeliveryChannel + ?Sized,
{
    if !ack {
        return Ok(Disposal::Deferred);
    }
    match channel.ack(tag, false).await {
        Ok(()) => Ok(Disposal::Acknowledged),
        Err(err) => {
            observability::disposal_failure(Disposed::Ack, &err);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::delivery::Delivery;
    use crate::domain::errors::ErrorKind;
    use crate::impls::{InMemoryBroker, Settlement};
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn delivered(broker: &InMemoryBroker) -> Delivery {
        broker.enqueue("orders", "orders.created", b"{\"id\":1}".to_vec()).await;
        broker.next_delivery().await.unwrap()
    }

    fn route() -> RetryRoute {
        RetryRoute::to("orders.retry").routing_key("orders.delayed")
    }

    #[tokio::test]
    async fn simple_retry_requeues_first_failure() {
        let broker = InMemoryBroker::new();
        let message = delivered(&broker).await;
        let fallbacks = AtomicU32::new(0);

        let resolution = RedeliveryCoordinator::default()
            .simple_retry_or_else(&broker, &message, true, || async {
                fallbacks.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            })
            .await
            .unwrap();

        assert_eq!(resolution.decision, Decision::Requeue);
        assert_eq!(resolution.disposal, Disposal::Rejected { requeue: true });
        assert_eq!(fallbacks.load(Ordering::SeqCst), 0);
        assert_eq!(
            broker.settlements().await,
            vec![Settlement::Reject { tag: message.tag(), requeue: true }]
        );
    }

    #[tokio::test]
    async fn simple_retry_gives_up_when_redelivered() {
        let broker = InMemoryBroker::new();
        let first = delivered(&broker).await;
        let coordinator = RedeliveryCoordinator::default();
        coordinator.simple_retry(&broker, &first, true).await.unwrap();

        let second = broker.next_delivery().await.unwrap();
        assert!(second.is_redelivered());

        let fallbacks = AtomicU32::new(0);
        let resolution = coordinator
            .simple_retry_or_else(&broker, &second, true, || async {
                fallbacks.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            })
            .await
            .unwrap();

        assert!(resolution.decision.is_exhausted());
        assert_eq!(resolution.disposal, Disposal::Acknowledged);
        assert_eq!(fallbacks.load(Ordering::SeqCst), 1);
        assert_eq!(
            broker.settlements_for(second.tag()).await,
            vec![Settlement::Ack { tag: second.tag(), multiple: false }]
        );
    }

    #[tokio::test]
    async fn simple_retry_requeue_ignores_ack_flag() {
        let broker = InMemoryBroker::new();
        let message = delivered(&broker).await;

        let resolution = RedeliveryCoordinator::default()
            .simple_retry(&broker, &message, false)
            .await
            .unwrap();

        assert_eq!(resolution.disposal, Disposal::Rejected { requeue: true });
        assert_eq!(broker.ready_len().await, 1);
    }

    #[tokio::test]
    async fn simple_retry_without_ack_defers_exhausted_delivery() {
        let broker = InMemoryBroker::new();
        let message = delivered(&broker).await.with_redelivered(true);

        let resolution = RedeliveryCoordinator::default()
            .simple_retry(&broker, &message, false)
            .await
            .unwrap();

        assert_eq!(resolution.disposal, Disposal::Deferred);
        assert!(broker.settlements().await.is_empty());
        assert_eq!(broker.unacked_len().await, 1);
    }

    #[tokio::test]
    async fn retry_republishes_below_limit() {
        let broker = InMemoryBroker::new();
        let message = delivered(&broker).await.with_death_count("orders.delay", 2);
        let fallbacks = AtomicU32::new(0);

        let resolution = RedeliveryCoordinator::default()
            .retry_or_else(&broker, &broker, &message, &route().max_attempts(3).unwrap(), || async {
                fallbacks.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            })
            .await
            .unwrap();

        assert_eq!(
            resolution.decision,
            Decision::Republish {
                destination: "orders.retry".to_string(),
                routing_key: "orders.delayed".to_string(),
            }
        );
        assert_eq!(resolution.disposal, Disposal::Acknowledged);
        assert_eq!(fallbacks.load(Ordering::SeqCst), 0);

        let published = broker.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].destination, "orders.retry");
        assert_eq!(published[0].routing_key, "orders.delayed");
        assert_eq!(published[0].message.body(), message.body());
        assert_eq!(broker.settlements_for(message.tag()).await.len(), 1);
    }

    #[tokio::test]
    async fn retry_runs_fallback_at_limit() {
        let broker = InMemoryBroker::new();
        let message = delivered(&broker).await.with_death_count("orders.delay", 3);
        let fallbacks = AtomicU32::new(0);

        let resolution = RedeliveryCoordinator::default()
            .retry_or_else(&broker, &broker, &message, &route(), || async {
                fallbacks.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            })
            .await
            .unwrap();

        assert_eq!(resolution.decision, Decision::Exhausted { attempts: 3 });
        assert_eq!(resolution.disposal, Disposal::Acknowledged);
        assert_eq!(fallbacks.load(Ordering::SeqCst), 1);
        assert!(broker.published().await.is_empty());
        assert_eq!(broker.settlements_for(message.tag()).await.len(), 1);
    }

    #[tokio::test]
    async fn retry_defaults_to_received_routing_key() {
        let broker = InMemoryBroker::new();
        let message = delivered(&broker).await;

        RedeliveryCoordinator::default()
            .retry(&broker, &broker, &message, &RetryRoute::to("orders.retry"))
            .await
            .unwrap();

        assert_eq!(broker.published().await[0].routing_key, "orders.created");
    }

    #[tokio::test]
    async fn config_supplies_limit_and_ack() {
        let broker = InMemoryBroker::new();
        let message = delivered(&broker).await.with_death_count("orders.delay", 1);
        let coordinator = RedeliveryCoordinator::new(RedeliveryConfig::new(1, false).unwrap());

        let resolution = coordinator
            .retry(&broker, &broker, &message, &RetryRoute::to("orders.retry"))
            .await
            .unwrap();

        assert_eq!(resolution.decision, Decision::Exhausted { attempts: 1 });
        assert_eq!(resolution.disposal, Disposal::Deferred);
        assert_eq!(broker.unacked_len().await, 1);
    }

    #[tokio::test]
    async fn without_ack_leaves_disposal_to_caller() {
        let broker = InMemoryBroker::new();
        let message = delivered(&broker).await;

        let resolution = RedeliveryCoordinator::default()
            .retry(&broker, &broker, &message, &route().without_ack())
            .await
            .unwrap();

        assert_eq!(resolution.disposal, Disposal::Deferred);
        assert!(broker.settlements().await.is_empty());
        assert_eq!(broker.published().await.len(), 1);
    }

    #[tokio::test]
    async fn publish_failure_still_acks() {
        let broker = InMemoryBroker::new();
        let message = delivered(&broker).await;
        broker.fail_publishes(true);

        let err = RedeliveryCoordinator::default()
            .retry(&broker, &broker, &message, &route())
            .await
            .unwrap_err();

        assert!(matches!(err, RedeliveryError::Publish(BrokerError::PublishFailed { .. })));
        assert_eq!(err.kind(), ErrorKind::RedeliveryPublishFailure);
        assert_eq!(
            broker.settlements_for(message.tag()).await,
            vec![Settlement::Ack { tag: message.tag(), multiple: false }]
        );
    }

    #[tokio::test]
    async fn publish_and_ack_failures_are_combined() {
        let broker = InMemoryBroker::new();
        let message = delivered(&broker).await;
        broker.fail_publishes(true);
        broker.fail_acks(true);

        let err = RedeliveryCoordinator::default()
            .retry(&broker, &broker, &message, &route())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RedeliveryError::PublishAndDisposal {
                publish: BrokerError::PublishFailed { .. },
                disposal: BrokerError::AckFailed { .. },
            }
        ));
        assert_eq!(err.kind(), ErrorKind::DisposalFailure);
    }

    #[tokio::test]
    async fn fallback_failure_still_acks() {
        let broker = InMemoryBroker::new();
        let message = delivered(&broker).await.with_death_count("orders.delay", 3);

        let err = RedeliveryCoordinator::default()
            .retry_or_else(&broker, &broker, &message, &route(), || async {
                Err("fallback store unavailable".to_string())
            })
            .await
            .unwrap_err();

        assert!(matches!(&err, RedeliveryError::Fallback(msg) if msg == "fallback store unavailable"));
        assert_eq!(err.kind(), ErrorKind::OperationFailure);
        assert_eq!(broker.settlements_for(message.tag()).await.len(), 1);
    }

    #[tokio::test]
    async fn fallback_and_ack_failures_are_combined() {
        let broker = InMemoryBroker::new();
        let message = delivered(&broker).await.with_redelivered(true);
        broker.fail_acks(true);

        let err = RedeliveryCoordinator::default()
            .simple_retry_or_else(&broker, &message, true, || async { Err("nope".to_string()) })
            .await
            .unwrap_err();

        assert!(matches!(err, RedeliveryError::FallbackAndDisposal { .. }));
        assert!(err.disposal_error().is_some());
    }

    #[tokio::test]
    async fn settled_delivery_is_never_disposed_twice() {
        let broker = InMemoryBroker::new();
        let message = delivered(&broker).await;
        let coordinator = RedeliveryCoordinator::default();

        coordinator.simple_retry(&broker, &message, true).await.unwrap();
        let err = coordinator
            .simple_retry(&broker, &message, true)
            .await
            .unwrap_err();

        assert!(matches!(err, RedeliveryError::Disposal(BrokerError::UnknownDeliveryTag(_))));
        assert_eq!(broker.settlements_for(message.tag()).await.len(), 1);
    }

    #[tokio::test]
    async fn missing_publisher_is_an_error() {
        let broker = InMemoryBroker::new();
        let message = delivered(&broker).await;

        let err = RedeliveryCoordinator::default()
            .resolve_delivery(
                &broker,
                None,
                &message,
                &CountedRequeue::new("orders.retry"),
                true,
                no_fallback,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RedeliveryError::Publish(BrokerError::NoPublisher)));
        assert_eq!(broker.settlements_for(message.tag()).await.len(), 1);
    }

    #[tokio::test]
    async fn record_reflects_headers() {
        let broker = InMemoryBroker::new();
        let message = delivered(&broker).await.with_death_count("orders.delay", 2);

        let record = RedeliveryCoordinator::default().record(&message);
        assert_eq!(record.attempt_count, 2);
        assert_eq!(record.received_routing_key, "orders.created");
        assert!(!record.was_redelivered);
    }

    #[tokio::test]
    async fn dead_letter_round_trip_reaches_fallback() {
        let broker = InMemoryBroker::new();
        broker.enqueue("orders", "orders.created", b"{\"id\":9}".to_vec()).await;

        let coordinator = RedeliveryCoordinator::default();
        let route = RetryRoute::to("orders.retry");
        let fallbacks = AtomicU32::new(0);
        let mut republished = 0;

        while let Some(message) = broker.next_delivery().await {
            // handler always fails
            let resolution = coordinator
                .retry_or_else(&broker, &broker, &message, &route, || async {
                    fallbacks.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(())
                })
                .await
                .unwrap();

            if let Decision::Republish { .. } = resolution.decision {
                republished += 1;
                broker.expire("orders.retry", "orders.delay").await;
            }
        }

        assert_eq!(republished, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(fallbacks.load(Ordering::SeqCst), 1);
        assert_eq!(broker.unacked_len().await, 0);
        assert_eq!(broker.settlements().await.len(), 4);
    }

    #[test]
    fn config_defaults_apply_to_missing_fields() {
        let config: RedeliveryConfig = serde_json::from_str(r#"{ "ack": false }"#).unwrap();
        assert_eq!(config.max_attempts(), DEFAULT_MAX_ATTEMPTS);
        assert!(!config.ack());
    }

    #[test]
    fn zero_attempt_config_is_rejected() {
        assert_eq!(
            RedeliveryConfig::new(0, true).unwrap_err(),
            PolicyError::InvalidMaxAttempts(0)
        );

        let err = serde_json::from_str::<RedeliveryConfig>(r#"{ "max_attempts": 0 }"#).unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn zero_attempt_route_is_rejected() {
        assert_eq!(route().max_attempts(0).unwrap_err(), PolicyError::InvalidMaxAttempts(0));
        assert!(route().max_attempts(1).is_ok());
    }

    #[tokio::test]
    async fn simple_retry_default_takes_ack_from_config() {
        let broker = InMemoryBroker::new();
        let message = delivered(&broker).await.with_redelivered(true);
        let coordinator = RedeliveryCoordinator::new(RedeliveryConfig::new(3, false).unwrap());

        let resolution = coordinator.simple_retry_default(&broker, &message).await.unwrap();

        assert!(resolution.decision.is_exhausted());
        assert_eq!(resolution.disposal, Disposal::Deferred);
        assert!(broker.settlements().await.is_empty());
        assert_eq!(broker.unacked_len().await, 1);
    }

    #[tokio::test]
    async fn simple_retry_default_acks_with_default_config() {
        let broker = InMemoryBroker::new();
        let message = delivered(&broker).await.with_redelivered(true);

        let resolution = RedeliveryCoordinator::default()
            .simple_retry_default(&broker, &message)
            .await
            .unwrap();

        assert_eq!(resolution.disposal, Disposal::Acknowledged);
        assert_eq!(broker.unacked_len().await, 0);
    }
}
