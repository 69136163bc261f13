//! 手动覆盖跟踪器
//!
//! 管理员手动切换营业状态后，在有效期内暂停自动校正。
//!
//! ```text
//!            activate(now)
//!   Idle ───────────────────▶ Active{set_at}
//!    ▲                          │  poll: now - set_at <= ttl → Active
//!    │   poll: > ttl → Expired   │
//!    └──────────────────────────┘
//!        clear()  (外部观察到 is_manual_override == false)
//! ```
//!
//! 进程内状态，不持久化；持久化的只有设置文档里的 `is_manual_override` 标志。

use chrono::{DateTime, Duration, Utc};

/// 默认有效期：2 小时
pub const DEFAULT_OVERRIDE_TTL_SECS: i64 = 2 * 60 * 60;

/// 一次轮询的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideStatus {
    /// 没有手动覆盖
    Idle,
    /// 手动覆盖仍在有效期内
    Active,
    /// 已超过有效期（跟踪器仍保持 Active，由调用方在持久化成功后 clear）
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverrideTracker {
    set_at: Option<DateTime<Utc>>,
    ttl: Duration,
}

impl OverrideTracker {
    pub fn new(ttl: Duration) -> Self {
        Self { set_at: None, ttl }
    }

    /// Idle → Active，记录设置时间
    pub fn activate(&mut self, now: DateTime<Utc>) {
        self.set_at = Some(now);
    }

    /// → Idle
    pub fn clear(&mut self) {
        self.set_at = None;
    }

    pub fn is_active(&self) -> bool {
        self.set_at.is_some()
    }

    pub fn set_at(&self) -> Option<DateTime<Utc>> {
        self.set_at
    }

    /// 按当前时间判断状态，不修改跟踪器
    ///
    /// 经过时间 `<= ttl` 仍有效，严格大于才过期。
    pub fn poll(&self, now: DateTime<Utc>) -> OverrideStatus {
        match self.set_at {
            None => OverrideStatus::Idle,
            Some(set_at) if now - set_at > self.ttl => OverrideStatus::Expired,
            Some(_) => OverrideStatus::Active,
        }
    }

    /// 剩余有效时间，Idle 或已过期返回 None
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        let set_at = self.set_at?;
        let remaining = self.ttl - (now - set_at);
        (remaining >= Duration::zero()).then_some(remaining)
    }
}

impl Default for OverrideTracker {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_OVERRIDE_TTL_SECS))
    }
}
