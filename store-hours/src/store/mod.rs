//! Settings Store Module
//!
//! 营业状态设置文档的持久化抽象（单例文档：get / update / subscribe）。
//!
//! - [`MemorySettingsStore`] - 进程内文档，带推送通知
//! - [`SqliteSettingsStore`] - SQLite 单例行

pub mod memory;
pub mod sqlite;

pub use memory::MemorySettingsStore;
pub use sqlite::SqliteSettingsStore;

use async_trait::async_trait;
use shared::error::AppError;
use shared::models::{AvailabilitySettings, AvailabilitySettingsUpdate};
use thiserror::Error;
use tokio::sync::broadcast;

/// 推送通道容量
pub const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;

/// Store error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Database(format!("Failed to apply migrations: {err}"))
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AppError::not_found(what),
            other => AppError::database(other.to_string()),
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// 下一个 `updated_at`：当前毫秒，但至少比上一次大 1
pub fn next_revision(previous: Option<i64>) -> i64 {
    let now = shared::util::now_millis();
    match previous {
        Some(prev) if prev >= now => prev + 1,
        _ => now,
    }
}

/// 设置文档存储
///
/// 所有写入都是部分更新，未设置的字段保持原值。
/// 每次写入后 `updated_at` 严格递增，读者据此丢弃过期快照。
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// 读取文档，不存在返回 `None`
    async fn get(&self) -> StoreResult<Option<AvailabilitySettings>>;

    /// 部分更新，返回写入后的文档；文档不存在返回 `StoreError::NotFound`
    async fn update(&self, update: AvailabilitySettingsUpdate) -> StoreResult<AvailabilitySettings>;

    /// 订阅文档变更推送，不支持推送的实现返回 `None`
    fn subscribe(&self) -> Option<broadcast::Receiver<AvailabilitySettings>>;
}
