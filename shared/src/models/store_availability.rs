//! Store Availability Model
//!
//! 营业状态设置（单例文档）：开关标志、手动覆盖标志、每周营业时间表。

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

/// 星期键的命名语言
///
/// 时间表以星期名称为键，键名跟随店铺的语言设置。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleLocale {
    /// domingo, lunes, martes, miércoles, jueves, viernes, sábado
    #[default]
    Es,
    /// sunday … saturday
    En,
}

const DAYS_ES: [&str; 7] = [
    "domingo",
    "lunes",
    "martes",
    "miércoles",
    "jueves",
    "viernes",
    "sábado",
];

const DAYS_EN: [&str; 7] = [
    "sunday",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
];

impl ScheduleLocale {
    /// 七个星期键，周日在前
    pub fn day_keys(&self) -> &'static [&'static str; 7] {
        match self {
            ScheduleLocale::Es => &DAYS_ES,
            ScheduleLocale::En => &DAYS_EN,
        }
    }

    /// 某个星期对应的键
    pub fn day_key(&self, weekday: Weekday) -> &'static str {
        self.day_keys()[weekday.num_days_from_sunday() as usize]
    }

    /// 本语言下的"全天休息"文本
    pub fn closed_label(&self) -> &'static str {
        match self {
            ScheduleLocale::Es => "Cerrado",
            ScheduleLocale::En => "Closed",
        }
    }
}

impl fmt::Display for ScheduleLocale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleLocale::Es => write!(f, "es"),
            ScheduleLocale::En => write!(f, "en"),
        }
    }
}

/// Error for unknown locale tags
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown schedule locale: {0}")]
pub struct UnknownLocale(pub String);

impl FromStr for ScheduleLocale {
    type Err = UnknownLocale;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "es" => Ok(ScheduleLocale::Es),
            "en" => Ok(ScheduleLocale::En),
            other => Err(UnknownLocale(other.to_string())),
        }
    }
}

/// 每周营业时间表：星期名 → "HH:MM - HH:MM" 或 "Cerrado"
///
/// 缺失的星期视为全天休息。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeeklySchedule(BTreeMap<String, String>);

impl WeeklySchedule {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// 所有星期都填入休息文本
    pub fn all_closed(locale: ScheduleLocale) -> Self {
        locale
            .day_keys()
            .iter()
            .map(|day| (*day, locale.closed_label()))
            .collect()
    }

    /// 设置某一天的时间表文本
    pub fn set(&mut self, day: impl Into<String>, hours: impl Into<String>) {
        self.0.insert(day.into(), hours.into());
    }

    /// 链式设置，便于构造
    pub fn with(mut self, day: impl Into<String>, hours: impl Into<String>) -> Self {
        self.set(day, hours);
        self
    }

    pub fn get(&self, day: &str) -> Option<&str> {
        self.0.get(day).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// 本语言下缺失的星期键
    pub fn missing_days(&self, locale: ScheduleLocale) -> Vec<&'static str> {
        locale
            .day_keys()
            .iter()
            .copied()
            .filter(|day| !self.0.contains_key(*day))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for WeeklySchedule {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// 营业状态设置（单例）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilitySettings {
    /// 当前是否营业（接单）
    #[serde(default)]
    pub is_open: bool,
    /// 是否由管理员手动设置
    #[serde(default)]
    pub is_manual_override: bool,
    #[serde(default)]
    pub schedule: WeeklySchedule,
    /// 最后修改时间 (Unix millis)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl AvailabilitySettings {
    pub fn new(schedule: WeeklySchedule) -> Self {
        Self {
            schedule,
            ..Default::default()
        }
    }

    /// 合并部分更新
    pub fn apply(&mut self, update: &AvailabilitySettingsUpdate) {
        if let Some(is_open) = update.is_open {
            self.is_open = is_open;
        }
        if let Some(manual) = update.is_manual_override {
            self.is_manual_override = manual;
        }
        if let Some(schedule) = &update.schedule {
            self.schedule = schedule.clone();
        }
    }

    pub fn state(&self) -> AvailabilityState {
        AvailabilityState {
            is_open: self.is_open,
            is_manual_override: self.is_manual_override,
        }
    }
}

/// Update availability settings payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilitySettingsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_open: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_manual_override: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<WeeklySchedule>,
}

impl AvailabilitySettingsUpdate {
    /// 开关状态 + 手动标志
    pub fn status(is_open: bool, is_manual_override: bool) -> Self {
        Self {
            is_open: Some(is_open),
            is_manual_override: Some(is_manual_override),
            schedule: None,
        }
    }

    pub fn schedule(schedule: WeeklySchedule) -> Self {
        Self {
            schedule: Some(schedule),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.is_open.is_none() && self.is_manual_override.is_none() && self.schedule.is_none()
    }
}

/// 对外暴露的当前状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityState {
    pub is_open: bool,
    pub is_manual_override: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_key_sunday_first() {
        assert_eq!(ScheduleLocale::Es.day_key(Weekday::Sun), "domingo");
        assert_eq!(ScheduleLocale::Es.day_key(Weekday::Mon), "lunes");
        assert_eq!(ScheduleLocale::Es.day_key(Weekday::Wed), "miércoles");
        assert_eq!(ScheduleLocale::Es.day_key(Weekday::Sat), "sábado");
        assert_eq!(ScheduleLocale::En.day_key(Weekday::Fri), "friday");
    }

    #[test]
    fn test_locale_from_str() {
        assert_eq!("ES".parse::<ScheduleLocale>(), Ok(ScheduleLocale::Es));
        assert_eq!(" en ".parse::<ScheduleLocale>(), Ok(ScheduleLocale::En));
        assert!("fr".parse::<ScheduleLocale>().is_err());
    }

    #[test]
    fn test_all_closed_has_seven_days() {
        let schedule = WeeklySchedule::all_closed(ScheduleLocale::Es);
        assert_eq!(schedule.len(), 7);
        assert_eq!(schedule.get("jueves"), Some("Cerrado"));
        assert!(schedule.missing_days(ScheduleLocale::Es).is_empty());
    }

    #[test]
    fn test_missing_days() {
        let schedule = WeeklySchedule::new()
            .with("lunes", "11:00 - 23:00")
            .with("viernes", "11:00 - 00:00");
        let missing = schedule.missing_days(ScheduleLocale::Es);
        assert_eq!(missing.len(), 5);
        assert!(missing.contains(&"domingo"));
        assert!(!missing.contains(&"lunes"));
    }

    #[test]
    fn test_settings_json_shape() {
        let settings = AvailabilitySettings {
            is_open: true,
            is_manual_override: false,
            schedule: WeeklySchedule::new().with("lunes", "11:00 - 23:00"),
            updated_at: None,
        };
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "isOpen": true,
                "isManualOverride": false,
                "schedule": { "lunes": "11:00 - 23:00" }
            })
        );
    }

    #[test]
    fn test_settings_missing_fields_default() {
        let settings: AvailabilitySettings = serde_json::from_str(r#"{"isOpen": true}"#).unwrap();
        assert!(settings.is_open);
        assert!(!settings.is_manual_override);
        assert!(settings.schedule.is_empty());
    }

    #[test]
    fn test_apply_partial_update() {
        let mut settings = AvailabilitySettings::new(WeeklySchedule::all_closed(ScheduleLocale::En));
        settings.apply(&AvailabilitySettingsUpdate::status(true, true));
        assert_eq!(
            settings.state(),
            AvailabilityState {
                is_open: true,
                is_manual_override: true
            }
        );
        assert_eq!(settings.schedule.len(), 7);

        settings.apply(&AvailabilitySettingsUpdate {
            is_manual_override: Some(false),
            ..Default::default()
        });
        assert!(settings.is_open);
        assert!(!settings.is_manual_override);
    }

    #[test]
    fn test_update_is_empty() {
        assert!(AvailabilitySettingsUpdate::default().is_empty());
        assert!(!AvailabilitySettingsUpdate::schedule(WeeklySchedule::new()).is_empty());
    }
}
