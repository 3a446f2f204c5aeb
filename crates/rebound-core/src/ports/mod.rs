//! Ports - 抽象化レイヤー
//!
//! このクレートが操作するが所有はしない協調相手（排他制御プリミティブと
//! メッセージブローカー）へのインターフェースです。
//! 参照用のインメモリ実装は [`crate::impls`] にあります。

pub mod broker;
pub mod lock;

pub use self::broker::{DeliveryChannel, DeliveryMetadata, MessagePublisher};
pub use self::lock::ExclusiveLock;
