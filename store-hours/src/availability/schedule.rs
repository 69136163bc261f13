//! 营业时间表判断
//!
//! 纯函数：给定每周时间表和当前墙上时间，判断此刻是否应营业（不考虑手动覆盖）。
//!
//! # 规则
//!
//! 1. 取当天星期对应的条目，缺失 → 休息
//! 2. 空字符串，或包含 "cerrado"/"closed"（不区分大小写）→ 休息
//! 3. 按 `H:MM - H:MM` 解析，解析失败 → **营业**（fail-open）
//! 4. 关门时间 < 开门时间 → 跨夜：`now >= open || now <= close`
//! 5. 否则：`open <= now <= close`
//!
//! 关门 "00:00" 按 0 分钟处理，跨夜窗口里只有恰好 00:00 满足 `now <= close`。

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDateTime, Weekday};
use regex::Regex;
use shared::models::{ScheduleLocale, WeeklySchedule};

use crate::utils::time::minutes_since_midnight;

/// 全天休息的关键字
const CLOSED_MARKERS: [&str; 2] = ["cerrado", "closed"];

/// 营业时间段（零点起的分钟数）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub open: u32,
    pub close: u32,
}

impl TimeRange {
    /// 关门早于开门，窗口跨过午夜
    pub fn is_overnight(&self) -> bool {
        self.close < self.open
    }

    pub fn contains(&self, minute: u32) -> bool {
        if self.is_overnight() {
            minute >= self.open || minute <= self.close
        } else {
            self.open <= minute && minute <= self.close
        }
    }
}

/// 当天条目的分类结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayEntry {
    /// 时间表里没有这一天
    Missing,
    /// 全天休息
    Closed,
    /// 可解析的时间段
    Range(TimeRange),
    /// 无法解析的文本
    Unparsable(String),
}

/// 对某个星期的条目分类
pub fn classify_day(schedule: &WeeklySchedule, weekday: Weekday, locale: ScheduleLocale) -> DayEntry {
    let Some(entry) = schedule.get(locale.day_key(weekday)) else {
        return DayEntry::Missing;
    };
    if is_closed_marker(entry) {
        return DayEntry::Closed;
    }
    match parse_time_range(entry) {
        Some(range) => DayEntry::Range(range),
        None => DayEntry::Unparsable(entry.to_string()),
    }
}

/// 判断此刻是否应营业
///
/// 每次调用都重新计算，不缓存。
pub fn evaluate_schedule(schedule: &WeeklySchedule, now: NaiveDateTime, locale: ScheduleLocale) -> bool {
    let weekday = now.weekday();
    let day = locale.day_key(weekday);

    match classify_day(schedule, weekday, locale) {
        DayEntry::Missing => {
            tracing::warn!(day = %day, "No schedule entry for today, treating as closed");
            false
        }
        DayEntry::Closed => false,
        DayEntry::Unparsable(entry) => {
            tracing::warn!(
                day = %day,
                entry = %entry,
                "Unparsable schedule entry, defaulting to open"
            );
            true
        }
        DayEntry::Range(range) => range.contains(minutes_since_midnight(now.time())),
    }
}

/// 空字符串或包含休息关键字
pub fn is_closed_marker(entry: &str) -> bool {
    if entry.is_empty() {
        return true;
    }
    let lower = entry.to_lowercase();
    CLOSED_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// `H:MM - H:MM`，小时 1–2 位、分钟 2 位，`-` 两侧任意空白（含 NBSP 等 Unicode 空白）
static TIME_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]{1,2}):([0-9]{2})\s*-\s*([0-9]{1,2}):([0-9]{2})")
        .expect("time range pattern is valid")
});

/// 在文本中查找第一个 `H:MM - H:MM`
///
/// 匹配位置不限于开头，数值不做范围校验（"25:00" 得到 1500 分钟）。
pub fn parse_time_range(entry: &str) -> Option<TimeRange> {
    let caps = TIME_RANGE.captures(entry)?;
    let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

    Some(TimeRange {
        open: number(1)? * 60 + number(2)?,
        close: number(3)? * 60 + number(4)?,
    })
}
