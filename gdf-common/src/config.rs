//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a TOML file per service. Every field is
//! optional: a missing file or a missing section falls back to the compiled
//! defaults with a warning, never a startup failure.
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority, handled by the binary)
//! 2. Environment variable (`GDF_ROOT_FOLDER`, then `GDF_ROOT`)
//! 3. TOML config file (`root_folder` key)
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default HTTP port for gdf-profile
pub const DEFAULT_PORT: u16 = 5780;

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "gdf.db";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Data folder holding the SQLite database
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP server port
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub account_store: AccountStoreConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub quota: QuotaConfig,

    #[serde(default)]
    pub driver: DriverConfig,

    /// Static admin directory (email -> reserved user id)
    #[serde(default)]
    pub admins: Vec<AdminEntry>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Hosted account backend (auth + user metadata) connection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AccountStoreConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`
    #[serde(default)]
    pub url: Option<String>,

    /// Public (anon) API key sent with every request
    #[serde(default)]
    pub anon_key: Option<String>,
}

/// Text/image generation service settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_generation_model")]
    pub model: String,

    #[serde(default = "default_generation_endpoint")]
    pub endpoint: String,

    /// Upper bound accepted for generated task rewards
    #[serde(default = "default_max_generated_points")]
    pub max_generated_points: i64,

    /// Regenerate daily task content after the claim cooldown
    #[serde(default = "default_true")]
    pub refresh_tasks: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_generation_model(),
            endpoint: default_generation_endpoint(),
            max_generated_points: default_max_generated_points(),
            refresh_tasks: true,
        }
    }
}

/// AI request quota constants
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotaConfig {
    #[serde(default = "default_standard_limit")]
    pub standard_limit: i64,

    #[serde(default = "default_premium_limit")]
    pub premium_limit: i64,

    /// Requests allowed for signed-out visitors per device
    #[serde(default = "default_guest_limit")]
    pub guest_limit: i64,

    /// Days between automatic resets of `ai_requests_made`
    #[serde(default = "default_reset_interval_days")]
    pub reset_interval_days: i64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            standard_limit: default_standard_limit(),
            premium_limit: default_premium_limit(),
            guest_limit: default_guest_limit(),
            reset_interval_days: default_reset_interval_days(),
        }
    }
}

/// Reconciliation driver tuning
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DriverConfig {
    /// Account store write timeout; a timed out write counts as failed
    #[serde(default = "default_store_write_timeout_ms")]
    pub store_write_timeout_ms: u64,

    /// Drivers unused for this long are dropped from the registry
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            store_write_timeout_ms: default_store_write_timeout_ms(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

/// One admin directory entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdminEntry {
    pub email: String,
    pub viht_id: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_generation_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_generation_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_max_generated_points() -> i64 {
    100
}

fn default_true() -> bool {
    true
}

fn default_standard_limit() -> i64 {
    10
}

fn default_premium_limit() -> i64 {
    100
}

fn default_guest_limit() -> i64 {
    5
}

fn default_reset_interval_days() -> i64 {
    7
}

fn default_store_write_timeout_ms() -> u64 {
    15_000
}

fn default_idle_timeout_secs() -> u64 {
    30 * 60
}

/// OS-dependent compiled defaults (lowest priority tier)
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub port: u16,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: default_log_level(),
            port: DEFAULT_PORT,
        }
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/gdf (or /var/lib/gdf for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("gdf"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/gdf"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/gdf
        dirs::data_dir()
            .map(|d| d.join("gdf"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/gdf"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\gdf
        dirs::data_local_dir()
            .map(|d| d.join("gdf"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\gdf"))
    } else {
        PathBuf::from("./gdf_data")
    }
}

/// Default TOML path for a service: `<config dir>/gdf/<module>.toml`
pub fn config_file_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("gdf").join(format!("{}.toml", module_name)))
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))
}

/// Load a TOML config, degrading to defaults when the file is missing or invalid
///
/// A missing file is expected on first run and only logged at info level;
/// an unreadable or malformed file is a warning.
pub fn load_or_default(path: Option<&Path>) -> TomlConfig {
    let Some(path) = path else {
        info!("No config file location available, using compiled defaults");
        return TomlConfig::default();
    };

    if !path.exists() {
        info!("Config file {} not found, using compiled defaults", path.display());
        return TomlConfig::default();
    }

    match load_toml_config(path) {
        Ok(config) => {
            debug!("Loaded config from {}", path.display());
            config
        }
        Err(e) => {
            warn!("{} - continuing with compiled defaults", e);
            TomlConfig::default()
        }
    }
}

/// Write config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Resolves the data root folder following the priority order in the module docs
pub struct RootFolderResolver {
    module_name: String,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            toml_root: None,
        }
    }

    /// Supply the `root_folder` value from an already loaded TOML config
    pub fn with_toml_root(mut self, root: Option<PathBuf>) -> Self {
        self.toml_root = root;
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Ok(path) = std::env::var("GDF_ROOT_FOLDER") {
            debug!("{}: root folder from GDF_ROOT_FOLDER", self.module_name);
            return PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("GDF_ROOT") {
            debug!("{}: root folder from GDF_ROOT", self.module_name);
            return PathBuf::from(path);
        }

        if let Some(path) = &self.toml_root {
            debug!("{}: root folder from TOML config", self.module_name);
            return path.clone();
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder on first start
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            info!("Creating root folder: {}", self.root_folder.display());
            std::fs::create_dir_all(&self.root_folder)?;
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }
}
