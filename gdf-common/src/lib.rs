//! # GDF Common Library
//!
//! Shared code for the GameDev Factory services including:
//! - Error type and result alias
//! - TOML configuration loading and root folder resolution
//! - Event types (GdfEvent enum) and the EventBus
//! - SQLite pool initialization
//! - Time and identifier helpers

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;
pub mod ids;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
