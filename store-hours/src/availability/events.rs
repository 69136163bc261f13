//! 营业状态事件
//!
//! 解析器每次改变状态都会广播一个事件，UI 层据此刷新显示或弹出通知。

use serde::{Deserialize, Serialize};

/// 事件通道容量
pub const EVENT_CHANNEL_CAPACITY: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AvailabilityEvent {
    /// 按时间表自动切换
    StatusChanged { is_open: bool },
    /// 管理员手动设置
    ManualOverrideSet { is_open: bool },
    /// 手动覆盖超时，恢复自动控制
    OverrideExpired { is_open: bool },
    /// 文档里的手动标志被外部清除
    OverrideCleared,
    /// 每周时间表被修改
    ScheduleUpdated,
}

impl AvailabilityEvent {
    /// 通知文案
    pub fn summary(&self) -> &'static str {
        match self {
            AvailabilityEvent::StatusChanged { is_open: true } => "Store opened automatically",
            AvailabilityEvent::StatusChanged { is_open: false } => "Store closed automatically",
            AvailabilityEvent::ManualOverrideSet { is_open: true } => "Store opened manually",
            AvailabilityEvent::ManualOverrideSet { is_open: false } => "Store closed manually",
            AvailabilityEvent::OverrideExpired { .. } => {
                "Manual override expired, schedule control resumed"
            }
            AvailabilityEvent::OverrideCleared => "Manual override cleared",
            AvailabilityEvent::ScheduleUpdated => "Weekly schedule updated",
        }
    }
}
