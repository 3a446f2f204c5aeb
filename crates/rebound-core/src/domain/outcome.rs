//! Outcome - 再配送の解決で実際に何をしたか
//!
//! 成功時に呼び出し側へ返し、ログやテストの検証に使います。
//! エラーは独自の分類を持ちます（[`crate::domain::errors::ErrorKind`] を参照）。

use serde::{Deserialize, Serialize};

use super::decision::Decision;

/// 配送に対して最後に行ったアクション
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Disposal {
    /// `ack(tag, multiple = false)` was issued.
    Acknowledged,

    /// `reject(tag, requeue)` was issued.
    Rejected { requeue: bool },

    /// 何も発行していない（ack フラグなし、後始末は呼び出し側）
    Deferred,
}

impl Disposal {
    /// Did this call settle the delivery with the broker?
    pub fn is_settled(self) -> bool {
        !matches!(self, Disposal::Deferred)
    }
}

/// Decision taken plus the disposal performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub decision: Decision,
    pub disposal: Disposal,
}

impl Resolution {
    pub fn new(decision: Decision, disposal: Disposal) -> Self {
        Self { decision, disposal }
    }
}
