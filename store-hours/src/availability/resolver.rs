//! 营业状态解析器
//!
//! # 架构
//!
//! ```text
//!   reconcile loop (60s) ──┐
//!   refresh loop ──────────┤                ┌──────────────────────┐
//!   subscription ──────────┼──▶ gate ──────▶│ mirror (RwLock)      │──▶ get_current_state()
//!   set_manual_state() ────┘  (tokio Mutex  │ AvailabilitySettings │
//!                              owns tracker)└──────────────────────┘
//!                                   │
//!                                   ▼
//!                            SettingsStore (get / update / subscribe)
//! ```
//!
//! - 镜像 (`mirror`) 只在持有 gate 时修改，读取是同步的，锁从不跨越 await
//! - 所有会写入的操作（校正、手动切换、外部快照、改时间表）经 gate 串行执行
//! - 写入失败：校正只记日志、下个周期重试；手动切换回滚并把错误返回给调用方

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use parking_lot::{Mutex, RwLock};
use shared::error::{AppError, AppResult, ErrorCode};
use shared::models::{
    AvailabilitySettings, AvailabilitySettingsUpdate, AvailabilityState, ScheduleLocale,
    WeeklySchedule,
};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::events::{AvailabilityEvent, EVENT_CHANNEL_CAPACITY};
use super::override_tracker::{DEFAULT_OVERRIDE_TTL_SECS, OverrideStatus, OverrideTracker};
use super::schedule::evaluate_schedule;
use crate::store::SettingsStore;
use crate::utils::time::{Clock, SystemClock, to_local};

/// 解析器配置
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// 自动校正周期
    pub reconcile_interval: Duration,
    /// 手动覆盖有效期
    pub override_ttl: chrono::Duration,
    /// 店铺时区
    pub timezone: Tz,
    /// 时间表星期键语言
    pub locale: ScheduleLocale,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(60),
            override_ttl: chrono::Duration::seconds(DEFAULT_OVERRIDE_TTL_SECS),
            timezone: chrono_tz::Europe::Madrid,
            locale: ScheduleLocale::Es,
        }
    }
}

/// 一次校正的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// 手动覆盖有效，跳过
    OverrideActive,
    /// 设置文档不存在
    NotLoaded,
    /// 状态与时间表一致，未写入
    Unchanged,
    /// 已写入新状态
    Updated { is_open: bool },
    /// 读写失败，下个周期重试
    Failed,
}

struct ReconcileLoop {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// 营业状态解析器
///
/// 以 `Arc<StoreAvailabilityResolver>` 在各个任务间共享。
pub struct StoreAvailabilityResolver {
    store: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    config: ResolverConfig,
    /// 设置文档镜像，`None` 表示尚未加载
    mirror: RwLock<Option<AvailabilitySettings>>,
    /// 写操作串行化，同时持有覆盖跟踪器
    gate: tokio::sync::Mutex<OverrideTracker>,
    events: broadcast::Sender<AvailabilityEvent>,
    reconcile_loop: Mutex<Option<ReconcileLoop>>,
}

impl StoreAvailabilityResolver {
    pub fn new(store: Arc<dyn SettingsStore>, config: ResolverConfig) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), config)
    }

    pub fn with_clock(
        store: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
        config: ResolverConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            clock,
            gate: tokio::sync::Mutex::new(OverrideTracker::new(config.override_ttl)),
            config,
            mirror: RwLock::new(None),
            events,
            reconcile_loop: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// 当前状态（同步读取镜像，包含尚未落盘的乐观更新）
    ///
    /// 镜像未加载时返回全 false。
    pub fn get_current_state(&self) -> AvailabilityState {
        self.mirror
            .read()
            .as_ref()
            .map(AvailabilitySettings::state)
            .unwrap_or_default()
    }

    /// 镜像中的完整设置
    pub fn settings(&self) -> Option<AvailabilitySettings> {
        self.mirror.read().clone()
    }

    /// 按时间表此刻是否应营业（忽略手动覆盖），镜像未加载返回 None
    pub fn schedule_verdict(&self) -> Option<bool> {
        let schedule = self.mirror.read().as_ref().map(|s| s.schedule.clone())?;
        Some(evaluate_schedule(&schedule, self.local_now(), self.config.locale))
    }

    /// 手动覆盖的设置时间，Idle 返回 None
    pub async fn override_set_at(&self) -> Option<DateTime<Utc>> {
        self.gate.lock().await.set_at()
    }

    /// 订阅状态事件
    pub fn subscribe_events(&self) -> broadcast::Receiver<AvailabilityEvent> {
        self.events.subscribe()
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// 执行一次自动校正
    ///
    /// 不返回错误：所有失败都在内部记录日志，由下个周期重试。
    pub async fn reconcile_once(&self) -> TickOutcome {
        let mut tracker = self.gate.lock().await;

        let loaded = self.mirror.read().is_some();
        if !loaded {
            match self.store.get().await {
                Ok(Some(settings)) => {
                    self.apply_snapshot_locked(&mut tracker, settings);
                }
                Ok(None) => {
                    tracing::warn!("Store availability settings not found, skipping reconciliation");
                    return TickOutcome::NotLoaded;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to load store availability settings");
                    return TickOutcome::Failed;
                }
            }
        }

        let now = self.clock.now();
        let expired = match tracker.poll(now) {
            OverrideStatus::Active => {
                tracing::debug!(
                    remaining_secs = tracker.remaining(now).map(|d| d.num_seconds()),
                    "Manual override active, skipping reconciliation"
                );
                return TickOutcome::OverrideActive;
            }
            OverrideStatus::Expired => {
                tracing::info!("Manual override expired, resuming schedule control");
                true
            }
            OverrideStatus::Idle => false,
        };

        let Some(settings) = self.settings() else {
            return TickOutcome::NotLoaded;
        };
        let should_be_open = evaluate_schedule(
            &settings.schedule,
            to_local(now, self.config.timezone),
            self.config.locale,
        );

        if should_be_open == settings.is_open && !expired {
            return TickOutcome::Unchanged;
        }

        let update = AvailabilitySettingsUpdate::status(should_be_open, false);
        let written = match self.store.update(update).await {
            Ok(written) => written,
            Err(e) => {
                // 保留内存中的判断（包括过期的覆盖），下个周期重试
                tracing::error!(error = %e, should_be_open, "Failed to persist automatic store status");
                return TickOutcome::Failed;
            }
        };
        *self.mirror.write() = Some(written);

        if expired {
            tracker.clear();
            self.emit(AvailabilityEvent::OverrideExpired {
                is_open: should_be_open,
            });
        }
        if should_be_open != settings.is_open {
            tracing::info!(is_open = should_be_open, "Store status changed by schedule");
            self.emit(AvailabilityEvent::StatusChanged {
                is_open: should_be_open,
            });
        }

        TickOutcome::Updated {
            is_open: should_be_open,
        }
    }

    /// 启动自动校正循环（立即执行第一次，之后按周期执行）
    ///
    /// 已有循环时先取消旧循环，不会出现两个定时器。
    pub fn start_reconciliation(self: &Arc<Self>) {
        let mut slot = self.reconcile_loop.lock();
        if let Some(previous) = slot.take() {
            previous.token.cancel();
            tracing::debug!("Cancelled previous reconciliation loop");
        }

        let token = CancellationToken::new();
        let resolver = Arc::clone(self);
        let loop_token = token.clone();
        let handle = tokio::spawn(async move {
            resolver.run_reconcile_loop(loop_token).await;
        });
        *slot = Some(ReconcileLoop { token, handle });
    }

    /// 停止自动校正循环，返回之前是否在运行
    pub fn stop_reconciliation(&self) -> bool {
        match self.reconcile_loop.lock().take() {
            Some(running) => {
                running.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_reconciling(&self) -> bool {
        self.reconcile_loop
            .lock()
            .as_ref()
            .is_some_and(|running| !running.token.is_cancelled() && !running.handle.is_finished())
    }

    async fn run_reconcile_loop(&self, token: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.reconcile_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            interval_secs = self.config.reconcile_interval.as_secs(),
            "Reconciliation loop started"
        );

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    let outcome = self.reconcile_once().await;
                    tracing::debug!(?outcome, "Reconciliation tick");
                }
            }
        }

        tracing::info!("Reconciliation loop stopped");
    }

    // ========================================================================
    // Manual toggle
    // ========================================================================

    /// 管理员手动设置营业状态
    ///
    /// 先乐观更新镜像并启动覆盖计时，再写入存储；写入失败则全部回滚。
    pub async fn set_manual_state(&self, desired_open: bool) -> AppResult<()> {
        let mut tracker = self.gate.lock().await;

        let loaded = self.mirror.read().is_some();
        if !loaded {
            match self.store.get().await {
                Ok(Some(settings)) => {
                    self.apply_snapshot_locked(&mut tracker, settings);
                }
                Ok(None) => return Err(AppError::new(ErrorCode::SettingsNotFound)),
                Err(e) => {
                    return Err(AppError::new(ErrorCode::ManualOverrideFailed)
                        .with_detail("desired_open", desired_open)
                        .with_detail("reason", e.to_string()));
                }
            }
        }

        let previous_tracker = *tracker;
        let previous_mirror = {
            let mut mirror = self.mirror.write();
            let previous = mirror.clone();
            if let Some(settings) = mirror.as_mut() {
                settings.is_open = desired_open;
                settings.is_manual_override = true;
            }
            previous
        };
        tracker.activate(self.clock.now());

        let update = AvailabilitySettingsUpdate::status(desired_open, true);
        let written = match self.store.update(update).await {
            Ok(written) => written,
            Err(e) => {
                *tracker = previous_tracker;
                *self.mirror.write() = previous_mirror;
                tracing::error!(error = %e, desired_open, "Failed to persist manual store status, rolled back");
                return Err(AppError::new(ErrorCode::ManualOverrideFailed)
                    .with_detail("desired_open", desired_open)
                    .with_detail("reason", e.to_string()));
            }
        };
        // 记下本次写入的版本，之前写入的回声推送会被丢弃
        *self.mirror.write() = Some(written);

        tracing::info!(is_open = desired_open, "Store status set manually");
        self.emit(AvailabilityEvent::ManualOverrideSet {
            is_open: desired_open,
        });
        Ok(())
    }

    /// 修改每周时间表
    pub async fn update_schedule(&self, schedule: WeeklySchedule) -> AppResult<()> {
        let mut tracker = self.gate.lock().await;

        let missing = schedule.missing_days(self.config.locale);
        if !missing.is_empty() {
            tracing::warn!(?missing, "Weekly schedule is missing days, they will be treated as closed");
        }

        let written = self
            .store
            .update(AvailabilitySettingsUpdate::schedule(schedule))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to persist weekly schedule");
                AppError::new(ErrorCode::ScheduleUpdateFailed).with_detail("reason", e.to_string())
            })?;

        self.apply_snapshot_locked(&mut tracker, written);
        self.emit(AvailabilityEvent::ScheduleUpdated);
        Ok(())
    }

    // ========================================================================
    // External changes
    // ========================================================================

    /// 应用存储推送（或刷新读取）的文档
    ///
    /// 返回 false 表示快照比镜像旧，已丢弃。
    pub async fn apply_snapshot(&self, settings: AvailabilitySettings) -> bool {
        let mut tracker = self.gate.lock().await;
        self.apply_snapshot_locked(&mut tracker, settings)
    }

    /// 从存储重新读取文档并应用
    pub async fn refresh_from_store(&self) -> AppResult<AvailabilityState> {
        let mut tracker = self.gate.lock().await;
        match self.store.get().await? {
            Some(settings) => {
                self.apply_snapshot_locked(&mut tracker, settings);
                Ok(self.get_current_state())
            }
            None => Err(AppError::new(ErrorCode::SettingsNotFound)),
        }
    }

    /// 消费存储推送直到 shutdown
    ///
    /// 不支持推送的存储直接等待 shutdown。
    pub async fn run_subscription(&self, shutdown: CancellationToken) {
        let Some(mut rx) = self.store.subscribe() else {
            tracing::info!("Settings store has no push support, relying on periodic refresh");
            shutdown.cancelled().await;
            return;
        };

        tracing::info!("Settings subscription started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                msg = rx.recv() => match msg {
                    Ok(settings) => {
                        self.apply_snapshot(settings).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Settings subscription lagged, refreshing from store");
                        if let Err(e) = self.refresh_from_store().await {
                            tracing::warn!(error = %e, "Refresh after lag failed");
                        }
                    }
                    Err(RecvError::Closed) => {
                        tracing::warn!("Settings subscription closed");
                        shutdown.cancelled().await;
                        break;
                    }
                },
            }
        }
        tracing::info!("Settings subscription stopped");
    }

    /// 定时从存储刷新镜像，直到 shutdown
    pub async fn run_refresh_loop(&self, period: Duration, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.refresh_from_store().await {
                        tracing::warn!(error = %e, "Settings refresh failed");
                    }
                }
            }
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// 调用方必须持有 gate
    ///
    /// `updated_at` 早于镜像的快照是过期推送（例如先前写入的回声），直接丢弃。
    /// 返回是否已应用。
    fn apply_snapshot_locked(&self, tracker: &mut OverrideTracker, settings: AvailabilitySettings) -> bool {
        let current = self.mirror.read().as_ref().and_then(|m| m.updated_at);
        if let (Some(current), Some(incoming)) = (current, settings.updated_at)
            && incoming < current
        {
            tracing::debug!(current, incoming, "Ignoring stale settings snapshot");
            return false;
        }

        if !settings.is_manual_override {
            if tracker.is_active() {
                tracker.clear();
                tracing::info!("Manual override cleared externally");
                self.emit(AvailabilityEvent::OverrideCleared);
            }
        } else if !tracker.is_active() {
            // 其它实例设置的覆盖，或进程重启前的覆盖：从观察到的时刻开始计时
            tracker.activate(self.clock.now());
            tracing::info!("Adopted persisted manual override");
        }

        *self.mirror.write() = Some(settings);
        true
    }

    fn local_now(&self) -> chrono::NaiveDateTime {
        to_local(self.clock.now(), self.config.timezone)
    }

    fn emit(&self, event: AvailabilityEvent) {
        // 没有订阅者时 send 返回 Err，忽略
        let _ = self.events.send(event);
    }
}
