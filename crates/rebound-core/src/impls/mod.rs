//! Impls - 実装（開発用・テスト用）
//!
//! ports のプロセス内実装で、テストとデモのバイナリが使います。
//! 本番のホストは自前の lock（DB の advisory lock や分散ロックサービスなど）と
//! ブローカークライアントを差し込みます。

pub mod inmem_broker;
pub mod semaphore_lock;

pub use self::inmem_broker::{InMemoryBroker, Published, Settlement};
pub use self::semaphore_lock::SemaphoreLock;
