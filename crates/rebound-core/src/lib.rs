//! rebound-core
//!
//! Bounded retry around two kinds of contended work:
//! - running an operation under a shared lock ([`app::LockCoordinator`])
//! - deciding what happens to a message whose processing failed
//!   ([`app::RedeliveryCoordinator`])
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（retry policy, attempt state, delivery, decision, outcome, errors）
//! - **ports**: 抽象化レイヤー（ExclusiveLock, DeliveryChannel, MessagePublisher）
//! - **app**: コーディネーター（LockCoordinator, RedeliveryCoordinator, BoundedExecutor）
//! - **impls**: 実装（SemaphoreLock, InMemoryBroker）
//! - **config**: JSON 設定
//! - **observability**: 共通のログイベント

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;

pub use crate::app::{BoundedExecutor, LockCoordinator, RedeliveryConfig, RedeliveryCoordinator, RetryRoute};
pub use crate::config::{ConfigError, CoordinatorConfig};
pub use crate::domain::{ErrorKind, ExclusiveError, RedeliveryError, RetryPolicy};
