//! 集成测试共享工具

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use shared::models::{
    AvailabilitySettings, AvailabilitySettingsUpdate, ScheduleLocale, WeeklySchedule,
};
use store_hours::store::{MemorySettingsStore, SettingsStore, StoreError, StoreResult};
use store_hours::utils::FixedClock;
use store_hours::{ResolverConfig, StoreAvailabilityResolver};
use tokio::sync::{Notify, broadcast, oneshot};

/// 2026-01-05 是周一
pub fn local(day: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 1, day)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

pub fn monday(h: u32, m: u32) -> NaiveDateTime {
    local(5, h, m)
}

pub fn friday(h: u32, m: u32) -> NaiveDateTime {
    local(9, h, m)
}

/// 周一 11:00-23:00，周五跨夜 20:00-02:00，其余休息
pub fn sample_settings() -> AvailabilitySettings {
    AvailabilitySettings::new(
        WeeklySchedule::all_closed(ScheduleLocale::Es)
            .with("lunes", "11:00 - 23:00")
            .with("viernes", "20:00 - 02:00"),
    )
}

/// 带计数、故障注入和写入暂停的存储
pub struct TestStore {
    pub inner: MemorySettingsStore,
    updates: AtomicUsize,
    fail_updates: AtomicBool,
    hold: parking_lot::Mutex<Option<oneshot::Receiver<()>>>,
    /// 有写入进入暂停时通知
    pub entered: Notify,
}

impl TestStore {
    pub fn new(settings: AvailabilitySettings) -> Self {
        Self {
            inner: MemorySettingsStore::new(settings),
            updates: AtomicUsize::new(0),
            fail_updates: AtomicBool::new(false),
            hold: parking_lot::Mutex::new(None),
            entered: Notify::new(),
        }
    }

    /// 成功写入次数
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_updates.store(failing, Ordering::SeqCst);
    }

    /// 让下一次写入停住，直到返回的 sender 被触发
    pub fn hold_next_update(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.hold.lock() = Some(rx);
        tx
    }

    pub fn snapshot(&self) -> AvailabilitySettings {
        self.inner.snapshot().expect("document exists")
    }
}

#[async_trait]
impl SettingsStore for TestStore {
    async fn get(&self) -> StoreResult<Option<AvailabilitySettings>> {
        self.inner.get().await
    }

    async fn update(&self, update: AvailabilitySettingsUpdate) -> StoreResult<AvailabilitySettings> {
        let hold = self.hold.lock().take();
        if let Some(rx) = hold {
            self.entered.notify_one();
            let _ = rx.await;
        }
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected failure".into()));
        }
        let written = self.inner.update(update).await?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(written)
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<AvailabilitySettings>> {
        self.inner.subscribe()
    }
}

pub struct Harness {
    pub store: Arc<TestStore>,
    pub clock: Arc<FixedClock>,
    pub resolver: Arc<StoreAvailabilityResolver>,
    pub config: ResolverConfig,
}

impl Harness {
    pub fn set_local(&self, local: NaiveDateTime) {
        self.clock.set_local(local, self.config.timezone);
    }
}

pub fn harness_with(settings: AvailabilitySettings, at: NaiveDateTime, config: ResolverConfig) -> Harness {
    store_hours::init_logger();
    let store = Arc::new(TestStore::new(settings));
    let clock = Arc::new(FixedClock::at_local(at, config.timezone));
    let resolver = Arc::new(StoreAvailabilityResolver::with_clock(
        store.clone(),
        clock.clone(),
        config.clone(),
    ));
    Harness {
        store,
        clock,
        resolver,
        config,
    }
}

pub fn harness(at: NaiveDateTime) -> Harness {
    harness_with(sample_settings(), at, ResolverConfig::default())
}

/// 短周期配置，用于循环测试
pub fn fast_config() -> ResolverConfig {
    ResolverConfig {
        reconcile_interval: Duration::from_millis(20),
        ..ResolverConfig::default()
    }
}
