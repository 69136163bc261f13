//! Store Hours - 店铺营业状态守护进程
//!
//! # 架构概述
//!
//! 店铺的营业状态保存在一个单例设置文档里（`is_open`、`is_manual_override`、
//! 每周时间表）。本模块负责：
//!
//! - **时间表判断** (`availability::schedule`): 按店铺时区的墙上时间判断是否营业
//! - **手动覆盖** (`availability::override_tracker`): 管理员切换后暂停自动控制 2 小时
//! - **解析器** (`availability::resolver`): 内存镜像 + 定时校正 + 外部变更同步
//! - **存储** (`store`): 内存文档 / SQLite 单例行
//!
//! # 模块结构
//!
//! ```text
//! store-hours/src/
//! ├── availability/  # 时间表、覆盖跟踪、解析器、事件
//! ├── core/          # 配置、后台任务
//! ├── store/         # 设置文档存储
//! └── utils/         # 日志、时钟
//! ```

pub mod availability;
pub mod core;
pub mod store;
pub mod utils;

// Re-export 公共类型
pub use availability::{
    AvailabilityEvent, ResolverConfig, StoreAvailabilityResolver, TickOutcome, evaluate_schedule,
};
pub use core::{BackgroundTasks, Config, TaskKind};
pub use shared::error::{AppError, AppResult, ErrorCode};
pub use store::{MemorySettingsStore, SettingsStore, SqliteSettingsStore, StoreError};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

/// 设置运行环境：加载 `.env`，初始化日志
pub fn setup_environment() {
    dotenv::dotenv().ok();

    let log_level = std::env::var("LOG_LEVEL").ok();
    let log_dir = std::env::var("LOG_DIR").ok().filter(|d| !d.is_empty());
    init_logger_with_file(log_level.as_deref(), log_dir.as_deref());
}
