//! 进程内设置文档
//!
//! 实时文档数据库的最小替身：每次变更都把完整快照推送给订阅者，
//! 包括通过 [`MemorySettingsStore::replace`] 进行的"外部"修改。

use async_trait::async_trait;
use parking_lot::RwLock;
use shared::models::{AvailabilitySettings, AvailabilitySettingsUpdate};
use tokio::sync::broadcast;

use super::{SNAPSHOT_CHANNEL_CAPACITY, SettingsStore, StoreError, StoreResult, next_revision};

#[derive(Debug)]
pub struct MemorySettingsStore {
    doc: RwLock<Option<AvailabilitySettings>>,
    tx: broadcast::Sender<AvailabilitySettings>,
}

impl MemorySettingsStore {
    /// 空存储（文档不存在）
    pub fn empty() -> Self {
        let (tx, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        Self {
            doc: RwLock::new(None),
            tx,
        }
    }

    pub fn new(initial: AvailabilitySettings) -> Self {
        let store = Self::empty();
        *store.doc.write() = Some(initial);
        store
    }

    /// 整体替换文档并推送（模拟其它客户端的修改）
    pub fn replace(&self, mut settings: AvailabilitySettings) {
        {
            let mut doc = self.doc.write();
            settings.updated_at = Some(next_revision(doc.as_ref().and_then(|d| d.updated_at)));
            *doc = Some(settings.clone());
        }
        self.publish(settings);
    }

    /// 当前文档（不经过 async 接口，便于断言）
    pub fn snapshot(&self) -> Option<AvailabilitySettings> {
        self.doc.read().clone()
    }

    fn publish(&self, snapshot: AvailabilitySettings) {
        // 没有订阅者时 send 返回 Err，忽略
        let _ = self.tx.send(snapshot);
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get(&self) -> StoreResult<Option<AvailabilitySettings>> {
        Ok(self.doc.read().clone())
    }

    async fn update(&self, update: AvailabilitySettingsUpdate) -> StoreResult<AvailabilitySettings> {
        let snapshot = {
            let mut doc = self.doc.write();
            let settings = doc
                .as_mut()
                .ok_or_else(|| StoreError::NotFound("store availability settings".into()))?;
            settings.apply(&update);
            settings.updated_at = Some(next_revision(settings.updated_at));
            settings.clone()
        };
        self.publish(snapshot.clone());
        Ok(snapshot)
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<AvailabilitySettings>> {
        Some(self.tx.subscribe())
    }
}
