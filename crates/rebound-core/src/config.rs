//! Config - コーディネーター設定（JSON）
//!
//! すべての項目は省略可能で、省略した項目はライブラリの既定値になります。
//! `max_attempts` は lock・redelivery のどちらも 1 以上でなければ読み込みエラーです。
//!
//! ```json
//! {
//!   "lock": { "max_attempts": 3, "per_attempt_timeout_ms": 500, "inter_attempt_delay_ms": 200 },
//!   "redelivery": { "max_attempts": 3, "ack": true }
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::{LockCoordinator, RedeliveryConfig, RedeliveryCoordinator};
use crate::domain::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Settings for both coordinators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Lock acquisition policy.
    pub lock: RetryPolicy,

    /// Redelivery defaults.
    pub redelivery: RedeliveryConfig,
}

impl CoordinatorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn lock_coordinator(&self) -> LockCoordinator {
        LockCoordinator::new(self.lock)
    }

    pub fn redelivery_coordinator(&self) -> RedeliveryCoordinator {
        RedeliveryCoordinator::new(self.redelivery)
    }
}
