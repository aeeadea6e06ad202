//! Configuration resolution for gdf-profile
//!
//! Secrets resolve with Database → ENV → TOML priority; engine tuning comes
//! from the TOML file with compiled defaults.

use gdf_common::config::{QuotaConfig, TomlConfig};
use gdf_common::db;
use gdf_common::Result;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{info, warn};

/// Settings table key for the Generation Service API key
pub const GENERATION_API_KEY_SETTING: &str = "generation_api_key";

/// Environment override for the Generation Service API key
pub const GENERATION_API_KEY_ENV: &str = "GDF_GENERATION_API_KEY";

/// Tuning consumed by the reconciliation driver
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub quota: QuotaConfig,
    pub store_write_timeout: Duration,
    /// Registry drops drivers unused for this long
    pub driver_idle_timeout: Duration,
    pub generation_model: String,
    pub max_generated_points: i64,
    /// Ask the Generation Service for new task content on regeneration;
    /// when off, regenerated tasks use their static definition
    pub generate_task_content: bool,
}

impl EngineSettings {
    pub fn from_toml(config: &TomlConfig) -> Self {
        Self {
            quota: config.quota,
            store_write_timeout: Duration::from_millis(config.driver.store_write_timeout_ms),
            driver_idle_timeout: Duration::from_secs(config.driver.idle_timeout_secs),
            generation_model: config.generation.model.clone(),
            max_generated_points: config.generation.max_generated_points,
            generate_task_content: config.generation.refresh_tasks,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_toml(&TomlConfig::default())
    }
}

/// Resolve the Generation Service API key
///
/// **Priority:** Database → ENV → TOML. A missing key is not an error: AI
/// chat is then unavailable and task regeneration uses static definitions.
pub async fn resolve_generation_api_key(
    db: &SqlitePool,
    toml_config: &TomlConfig,
) -> Result<Option<String>> {
    let db_key = db::get_setting(db, GENERATION_API_KEY_SETTING)
        .await?
        .filter(|k| is_valid_key(k));
    let env_key = std::env::var(GENERATION_API_KEY_ENV)
        .ok()
        .filter(|k| is_valid_key(k));
    let toml_key = toml_config
        .generation
        .api_key
        .clone()
        .filter(|k| is_valid_key(k));

    let sources: Vec<&str> = [
        (db_key.is_some(), "database"),
        (env_key.is_some(), "environment"),
        (toml_key.is_some(), "TOML"),
    ]
    .iter()
    .filter(|(present, _)| *present)
    .map(|(_, name)| *name)
    .collect();

    if sources.len() > 1 {
        warn!(
            "Generation API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    if let Some(key) = db_key {
        info!("Generation API key loaded from database");
        return Ok(Some(key));
    }
    if let Some(key) = env_key {
        info!("Generation API key loaded from environment variable");
        return Ok(Some(key));
    }
    if let Some(key) = toml_key {
        info!("Generation API key loaded from TOML config");
        return Ok(Some(key));
    }

    warn!(
        "Generation API key not configured; AI chat disabled. Set {} or [generation].api_key",
        GENERATION_API_KEY_ENV
    );
    Ok(None)
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_settings_defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.quota.standard_limit, 10);
        assert_eq!(settings.quota.premium_limit, 100);
        assert_eq!(settings.store_write_timeout, Duration::from_millis(15_000));
        assert!(settings.generate_task_content);
    }

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key("abc"));
        assert!(!is_valid_key("   "));
        assert!(!is_valid_key(""));
    }
}
