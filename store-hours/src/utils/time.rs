//! 时间工具函数：时钟抽象与业务时区转换
//!
//! 时间表按店铺时区的墙上时间判断；覆盖有效期按 UTC 时间差计算。
//! 使用墙上时钟而非单调时钟，系统时间被调整时判断结果随之变化。

use chrono::{DateTime, NaiveDateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;

/// 时钟抽象，便于测试注入
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 系统墙上时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 手动拨动的时钟
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// 以业务时区的本地时间构造
    pub fn at_local(local: NaiveDateTime, tz: Tz) -> Self {
        Self::new(local_to_utc(local, tz))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn set_local(&self, local: NaiveDateTime, tz: Tz) {
        self.set(local_to_utc(local, tz));
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// UTC → 业务时区墙上时间
pub fn to_local(now: DateTime<Utc>, tz: Tz) -> NaiveDateTime {
    now.with_timezone(&tz).naive_local()
}

/// 业务时区墙上时间 → UTC
///
/// DST gap fallback: 如果本地时间不存在 (夏令时跳跃)，fallback 到 UTC。
pub fn local_to_utc(local: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    local
        .and_local_timezone(tz)
        .latest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| local.and_utc())
}

/// 当天零点起经过的分钟数
pub fn minutes_since_midnight(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_minutes_since_midnight() {
        assert_eq!(minutes_since_midnight(NaiveTime::MIN), 0);
        assert_eq!(
            minutes_since_midnight(NaiveTime::from_hms_opt(22, 0, 59).unwrap()),
            22 * 60
        );
        assert_eq!(
            minutes_since_midnight(NaiveTime::from_hms_opt(23, 59, 0).unwrap()),
            1439
        );
    }

    #[test]
    fn test_local_round_trip_madrid() {
        let tz = chrono_tz::Europe::Madrid;
        let wall = local(2026, 1, 5, 22, 0);
        let utc = local_to_utc(wall, tz);
        // CET = UTC+1 in January
        assert_eq!(utc.naive_utc(), local(2026, 1, 5, 21, 0));
        assert_eq!(to_local(utc, tz), wall);
    }

    #[test]
    fn test_local_to_utc_dst_gap_falls_back() {
        // 2026-03-29 02:30 does not exist in Madrid
        let tz = chrono_tz::Europe::Madrid;
        let wall = local(2026, 3, 29, 2, 30);
        assert_eq!(local_to_utc(wall, tz), wall.and_utc());
    }

    #[test]
    fn test_fixed_clock_advance() {
        let tz = chrono_tz::UTC;
        let clock = FixedClock::at_local(local(2026, 1, 5, 10, 0), tz);
        clock.advance(chrono::Duration::minutes(90));
        assert_eq!(to_local(clock.now(), tz), local(2026, 1, 5, 11, 30));
        clock.set_local(local(2026, 1, 6, 0, 0), tz);
        assert_eq!(to_local(clock.now(), tz), local(2026, 1, 6, 0, 0));
    }
}
