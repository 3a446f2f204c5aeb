//! Domain identifiers (strongly-typed IDs).
//!
//! ここには 2 種類の識別子があります:
//! - `Id<T>`: コーディネーター呼び出し 1 回ごとの ULID ベースの相関 ID。
//!   その呼び出しのすべてのログイベントに span フィールドとして出る
//! - `DeliveryTag`: ブローカーが配送ごとに振るハンドル。中身は不透明で、
//!   ack/reject でブローカーに返すだけ
//!
//! ## Phantom Type パターン
//! `Id<T>` で実装を共有しつつ、マーカー `T` によって `ResolutionId` が必要な場所に
//! `RunId` を渡せないようにしています。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックスを提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型（ULID ベース）
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// 現在時刻で新しい ID を作る
    pub fn generate() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Marker for one `run_exclusive` / `run_exclusive_blocking` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Run {}

impl IdMarker for Run {
    fn prefix() -> &'static str {
        "run-"
    }
}

/// Marker for one delivery resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resolve {}

impl IdMarker for Resolve {
    fn prefix() -> &'static str {
        "resolution-"
    }
}

/// Identifier of one lock coordinator invocation.
pub type RunId = Id<Run>;

/// Identifier of one redelivery coordinator invocation.
pub type ResolutionId = Id<Resolve>;

/// Broker-assigned delivery handle (AMQP delivery tags are per-channel u64s).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryTag(u64);

impl DeliveryTag {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for DeliveryTag {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
