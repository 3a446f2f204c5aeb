//! App - アプリケーション層
//!
//! Coordinators that drive the ports.
//!
//! # 主要コンポーネント
//! - **LockCoordinator**: bounded lock acquisition, guaranteed release
//! - **RedeliveryCoordinator**: requeue / re-publish / give up, then ack
//! - **BoundedExecutor**: deadline-bounded background work

pub mod executor;
pub mod lock;
pub mod redelivery;

pub use self::executor::{BoundedExecutor, OnTimeout, WorkFailure};
pub use self::lock::LockCoordinator;
pub use self::redelivery::{RedeliveryConfig, RedeliveryCoordinator, RetryRoute};
