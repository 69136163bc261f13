//! SQLite Settings Store (Singleton)
//!
//! 单例行 `store_availability.id = 1`。时间表以 JSON 文本存储。
//! SQLite 不会推送其它进程的修改，订阅者只能收到经本实例写入的快照；
//! 外部修改由解析器的定时刷新 (`refresh_from_store`) 兜底。

use std::str::FromStr;

use async_trait::async_trait;
use shared::models::{AvailabilitySettings, AvailabilitySettingsUpdate, WeeklySchedule};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use tokio::sync::broadcast;

use super::{SNAPSHOT_CHANNEL_CAPACITY, SettingsStore, StoreError, StoreResult};

const SINGLETON_ID: i64 = 1;

#[derive(Debug, sqlx::FromRow)]
struct AvailabilityRow {
    is_open: bool,
    is_manual_override: bool,
    schedule: String,
    updated_at: i64,
}

impl TryFrom<AvailabilityRow> for AvailabilitySettings {
    type Error = StoreError;

    fn try_from(row: AvailabilityRow) -> Result<Self, Self::Error> {
        let schedule: WeeklySchedule = serde_json::from_str(&row.schedule)?;
        Ok(AvailabilitySettings {
            is_open: row.is_open,
            is_manual_override: row.is_manual_override,
            schedule,
            updated_at: Some(row.updated_at),
        })
    }
}

/// SQLite 设置存储，持有连接池
#[derive(Debug, Clone)]
pub struct SqliteSettingsStore {
    pool: SqlitePool,
    tx: broadcast::Sender<AvailabilitySettings>,
}

impl SqliteSettingsStore {
    /// 打开（必要时创建）数据库文件并执行迁移
    pub async fn open(db_path: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))
            .map_err(|e| StoreError::Database(format!("Invalid database path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        tracing::info!(path = %db_path, "Settings database connection established (SQLite WAL)");
        Self::with_pool(pool).await
    }

    /// 内存数据库（测试用）
    ///
    /// 每个连接都是独立的内存库，所以连接池固定为 1。
    pub async fn open_in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> StoreResult<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::debug!("Settings database migrations applied");

        let (tx, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        Ok(Self { pool, tx })
    }

    /// 读取文档，不存在时用 `default` 创建
    pub async fn get_or_create(&self, default: &AvailabilitySettings) -> StoreResult<AvailabilitySettings> {
        if let Some(settings) = self.get().await? {
            return Ok(settings);
        }

        let now = shared::util::now_millis();
        let schedule = serde_json::to_string(&default.schedule)?;
        sqlx::query(
            "INSERT OR IGNORE INTO store_availability (id, is_open, is_manual_override, schedule, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        )
        .bind(SINGLETON_ID)
        .bind(default.is_open)
        .bind(default.is_manual_override)
        .bind(schedule)
        .bind(now)
        .execute(&self.pool)
        .await?;
        tracing::info!("Created store availability settings record");

        self.get()
            .await?
            .ok_or_else(|| StoreError::Database("Failed to create store availability settings".into()))
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn get(&self) -> StoreResult<Option<AvailabilitySettings>> {
        let row = sqlx::query_as::<_, AvailabilityRow>(
            "SELECT is_open, is_manual_override, schedule, updated_at FROM store_availability WHERE id = ?",
        )
        .bind(SINGLETON_ID)
        .fetch_optional(&self.pool)
        .await?;
        row.map(AvailabilitySettings::try_from).transpose()
    }

    async fn update(&self, update: AvailabilitySettingsUpdate) -> StoreResult<AvailabilitySettings> {
        let now = shared::util::now_millis();
        let schedule = update
            .schedule
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        // RETURNING 读回的就是这次写入后的行，不会混入其它写者之后的修改
        let row = sqlx::query_as::<_, AvailabilityRow>(
            "UPDATE store_availability SET is_open = COALESCE(?1, is_open), is_manual_override = COALESCE(?2, is_manual_override), schedule = COALESCE(?3, schedule), updated_at = MAX(?4, updated_at + 1) WHERE id = ?5 RETURNING is_open, is_manual_override, schedule, updated_at",
        )
        .bind(update.is_open)
        .bind(update.is_manual_override)
        .bind(schedule)
        .bind(now)
        .bind(SINGLETON_ID)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound("store availability settings".into()))?;

        let snapshot = AvailabilitySettings::try_from(row)?;
        let _ = self.tx.send(snapshot.clone());
        Ok(snapshot)
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<AvailabilitySettings>> {
        Some(self.tx.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::ScheduleLocale;

    fn sample() -> AvailabilitySettings {
        AvailabilitySettings::new(
            WeeklySchedule::all_closed(ScheduleLocale::Es).with("lunes", "11:00 - 23:00"),
        )
    }

    #[tokio::test]
    async fn test_get_before_create() {
        let store = SqliteSettingsStore::open_in_memory().await.unwrap();
        assert!(store.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let store = SqliteSettingsStore::open_in_memory().await.unwrap();
        let created = store.get_or_create(&sample()).await.unwrap();
        assert_eq!(created.schedule.get("lunes"), Some("11:00 - 23:00"));
        assert!(!created.is_open);

        let mut other = sample();
        other.is_open = true;
        let again = store.get_or_create(&other).await.unwrap();
        assert!(!again.is_open, "existing record must not be overwritten");
    }

    #[tokio::test]
    async fn test_partial_update_keeps_other_fields() {
        let store = SqliteSettingsStore::open_in_memory().await.unwrap();
        store.get_or_create(&sample()).await.unwrap();

        store
            .update(AvailabilitySettingsUpdate::status(true, true))
            .await
            .unwrap();
        let settings = store.get().await.unwrap().unwrap();
        assert!(settings.is_open);
        assert!(settings.is_manual_override);
        assert_eq!(settings.schedule, sample().schedule);

        let schedule = WeeklySchedule::new().with("martes", "Cerrado");
        store
            .update(AvailabilitySettingsUpdate::schedule(schedule.clone()))
            .await
            .unwrap();
        let settings = store.get().await.unwrap().unwrap();
        assert!(settings.is_open);
        assert_eq!(settings.schedule, schedule);
    }

    #[tokio::test]
    async fn test_update_without_record() {
        let store = SqliteSettingsStore::open_in_memory().await.unwrap();
        let err = store
            .update(AvailabilitySettingsUpdate::status(false, false))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_pushes_snapshot() {
        let store = SqliteSettingsStore::open_in_memory().await.unwrap();
        store.get_or_create(&sample()).await.unwrap();
        let mut rx = store.subscribe().unwrap();

        let written = store
            .update(AvailabilitySettingsUpdate::status(true, false))
            .await
            .unwrap();
        let pushed = rx.recv().await.unwrap();
        assert!(pushed.is_open);
        assert!(!pushed.is_manual_override);
        assert_eq!(pushed, written);
    }

    #[tokio::test]
    async fn test_update_returns_written_row() {
        let store = SqliteSettingsStore::open_in_memory().await.unwrap();
        let created = store.get_or_create(&sample()).await.unwrap();

        let first = store
            .update(AvailabilitySettingsUpdate::status(true, true))
            .await
            .unwrap();
        assert!(first.is_open);
        assert!(first.is_manual_override);
        assert_eq!(first.schedule, sample().schedule);
        assert!(first.updated_at > created.updated_at);

        let second = store
            .update(AvailabilitySettingsUpdate::status(true, false))
            .await
            .unwrap();
        assert!(second.updated_at > first.updated_at);
        assert_eq!(store.get().await.unwrap().unwrap(), second);
    }

    #[tokio::test]
    async fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.db");
        let path = path.to_str().unwrap();

        {
            let store = SqliteSettingsStore::open(path).await.unwrap();
            store.get_or_create(&sample()).await.unwrap();
            store
                .update(AvailabilitySettingsUpdate::status(true, false))
                .await
                .unwrap();
        }

        let reopened = SqliteSettingsStore::open(path).await.unwrap();
        let settings = reopened.get().await.unwrap().unwrap();
        assert!(settings.is_open);
    }
}
