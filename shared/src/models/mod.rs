//! Data models
//!
//! Shared between the resolver, the settings stores and any frontend
//! consuming the settings record as JSON (camelCase field names).

pub mod store_availability;

// Re-exports
pub use store_availability::*;
