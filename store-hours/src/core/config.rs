use std::time::Duration;

use chrono_tz::Tz;
use shared::error::{AppError, AppResult};
use shared::models::ScheduleLocale;

use crate::availability::ResolverConfig;

/// 服务配置 - 营业状态守护进程的所有配置项
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖（支持 `.env` 文件）：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | DATABASE_PATH | store-hours.db | SQLite 数据库文件 |
/// | TIMEZONE | Europe/Madrid | 店铺所在时区 |
/// | SCHEDULE_LOCALE | es | 时间表星期键语言 (es/en) |
/// | RECONCILE_INTERVAL_SECS | 60 | 自动校正周期(秒) |
/// | REFRESH_INTERVAL_SECS | 30 | 从存储刷新周期(秒) |
/// | OVERRIDE_TTL_SECS | 7200 | 手动覆盖有效期(秒) |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_DIR | (无) | 日志目录，设置后按天滚动写文件 |
/// | ENVIRONMENT | development | 运行环境 |
///
/// # 示例
///
/// ```ignore
/// TIMEZONE=Atlantic/Canary RECONCILE_INTERVAL_SECS=30 cargo run -p store-hours
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite 数据库文件路径
    pub database_path: String,
    /// 店铺时区，时间表按该时区的墙上时间判断
    pub timezone: Tz,
    /// 时间表星期键语言
    pub schedule_locale: ScheduleLocale,
    /// 自动校正周期 (秒)
    pub reconcile_interval_secs: u64,
    /// 从存储刷新镜像的周期 (秒)
    pub refresh_interval_secs: u64,
    /// 手动覆盖有效期 (秒)
    pub override_ttl_secs: i64,
    /// 默认日志级别 (RUST_LOG 优先)
    pub log_level: String,
    /// 日志目录
    pub log_dir: Option<String>,
    /// 运行环境: development | staging | production
    pub environment: String,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置或无法解析，使用默认值
    pub fn from_env() -> Self {
        Self {
            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "store-hours.db".into()),
            timezone: std::env::var("TIMEZONE")
                .ok()
                .and_then(|tz| parse_timezone(&tz))
                .unwrap_or(chrono_tz::Europe::Madrid),
            schedule_locale: std::env::var("SCHEDULE_LOCALE")
                .ok()
                .and_then(|l| l.parse().ok())
                .unwrap_or_default(),
            reconcile_interval_secs: std::env::var("RECONCILE_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            refresh_interval_secs: std::env::var("REFRESH_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            override_ttl_secs: std::env::var("OVERRIDE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2 * 60 * 60),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_dir: std::env::var("LOG_DIR").ok().filter(|d| !d.is_empty()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
        }
    }

    /// 校验配置
    ///
    /// 周期为 0 会让 `tokio::time::interval` panic，这里提前拒绝。
    pub fn validate(&self) -> AppResult<()> {
        if self.reconcile_interval_secs == 0 {
            return Err(AppError::config("RECONCILE_INTERVAL_SECS must be > 0")
                .with_detail("field", "reconcile_interval_secs"));
        }
        if self.refresh_interval_secs == 0 {
            return Err(AppError::config("REFRESH_INTERVAL_SECS must be > 0")
                .with_detail("field", "refresh_interval_secs"));
        }
        if self.override_ttl_secs < 0 {
            return Err(AppError::config("OVERRIDE_TTL_SECS must not be negative")
                .with_detail("field", "override_ttl_secs"));
        }
        Ok(())
    }

    /// 解析器相关配置
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            reconcile_interval: Duration::from_secs(self.reconcile_interval_secs),
            override_ttl: chrono::Duration::seconds(self.override_ttl_secs),
            timezone: self.timezone,
            locale: self.schedule_locale,
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_timezone(name: &str) -> Option<Tz> {
    match name.parse::<Tz>() {
        Ok(tz) => Some(tz),
        Err(e) => {
            tracing::warn!("Invalid TIMEZONE '{}': {}, falling back to Europe/Madrid", name, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config {
            database_path: ":memory:".into(),
            timezone: chrono_tz::Europe::Madrid,
            schedule_locale: ScheduleLocale::Es,
            reconcile_interval_secs: 60,
            refresh_interval_secs: 30,
            override_ttl_secs: 7200,
            log_level: "info".into(),
            log_dir: None,
            environment: "development".into(),
        }
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = base();
        config.reconcile_interval_secs = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.code, shared::ErrorCode::ConfigError);

        let mut config = base();
        config.refresh_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolver_config_projection() {
        let resolver = base().resolver_config();
        assert_eq!(resolver.reconcile_interval, Duration::from_secs(60));
        assert_eq!(resolver.override_ttl, chrono::Duration::hours(2));
        assert_eq!(resolver.locale, ScheduleLocale::Es);
    }

    #[test]
    fn test_parse_timezone() {
        assert_eq!(parse_timezone("Atlantic/Canary"), Some(chrono_tz::Atlantic::Canary));
        assert_eq!(parse_timezone("Mars/Olympus"), None);
    }
}
