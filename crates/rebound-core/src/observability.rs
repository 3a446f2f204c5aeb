//! Observability - ログ出力の共通部分
//!
//! コーディネーターは `tracing` でログを出し、subscriber の設定はホストの仕事です。
//! モジュール間で共有するイベントの形だけをここに置き、後始末の失敗は常に
//! `event = "disposal_failure"` で検索できるようにしています。

use std::fmt::Display;

/// Field value carried by every disposal-failure event.
pub const DISPOSAL_FAILURE: &str = "disposal_failure";

/// What could not be disposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposed {
    LockRelease,
    Ack,
    Reject,
}

impl Disposed {
    pub fn as_str(self) -> &'static str {
        match self {
            Disposed::LockRelease => "lock_release",
            Disposed::Ack => "ack",
            Disposed::Reject => "reject",
        }
    }
}

/// Emit the distinct error event for a failed release/ack/reject.
///
/// エラーは呼び出し側にも返します。ここでは呼び出し側が捨てた場合でも
/// 不整合がログに残るようにするだけです。
pub fn disposal_failure(resource: Disposed, error: &dyn Display) {
    tracing::error!(
        event = DISPOSAL_FAILURE,
        resource = resource.as_str(),
        error = %error,
        "disposal failed; resource may be left inconsistent"
    );
}
