//! Store Availability Module
//!
//! 按每周时间表自动开关店，管理员手动切换后在有效期内暂停自动控制。
//!
//! - [`schedule`] - 时间表解析与判断（纯函数）
//! - [`override_tracker`] - 手动覆盖有效期
//! - [`resolver`] - 镜像、校正循环、手动切换
//! - [`events`] - 状态变化事件

pub mod events;
pub mod override_tracker;
pub mod resolver;
pub mod schedule;

pub use events::AvailabilityEvent;
pub use override_tracker::{OverrideStatus, OverrideTracker};
pub use resolver::{ResolverConfig, StoreAvailabilityResolver, TickOutcome};
pub use schedule::{DayEntry, TimeRange, classify_day, evaluate_schedule, parse_time_range};
