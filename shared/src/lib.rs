//! Shared types for the store-hours workspace
//!
//! Data model of the store availability settings record, the unified
//! error system, and small utilities used by every crate.

pub mod error;
pub mod models;
pub mod util;

// Re-exports
pub use error::{AppError, AppResult, ErrorCategory, ErrorCode};
pub use models::{
    AvailabilitySettings, AvailabilitySettingsUpdate, AvailabilityState, WeeklySchedule,
};
pub use serde::{Deserialize, Serialize};
