//! Configuration infrastructure
//!
//! Serde-backed configuration with sensible defaults; an optional JSON file
//! overrides the defaults wholesale. Sections mirror the engine's concerns:
//! source API access, sync behavior, database, and logging.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Source marketplace API access
    #[serde(default)]
    pub source: SourceApiConfig,

    /// Sync pipeline behavior
    #[serde(default)]
    pub sync: SyncConfig,

    /// Internal store location
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Source marketplace API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceApiConfig {
    /// Base URL of the source REST API, e.g. `https://shop.example.com/wp-json/dokan/v1/`
    pub base_url: String,

    /// Page size for paginated collection fetches
    pub page_size: u32,

    /// Maximum requests per second against the source
    pub max_requests_per_second: u32,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// User agent presented to the source platform
    pub user_agent: String,

    /// Scrape SEO title/description from rendered product pages (best effort)
    pub scrape_seo_metadata: bool,
}

impl Default for SourceApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost/wp-json/".to_string(),
            page_size: 50,
            max_requests_per_second: 5,
            timeout_seconds: 30,
            user_agent: "bazaar-sync/0.2".to_string(),
            scrape_seo_metadata: false,
        }
    }
}

/// Sync pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Provider discriminator recorded in the identity map
    pub provider: String,

    /// Records buffered before a transactional batch commit
    pub batch_size: usize,

    /// Display name of the reserved marketplace vendor that owns offers
    /// until the vendor-link stage re-points them
    pub default_vendor_name: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            provider: "dokan".to_string(),
            batch_size: 100,
            default_vendor_name: "Marketplace".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection URL
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite:data/bazaar-sync.db".to_string() }
    }
}

/// Logging configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Emit JSON formatted logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json_format: false }
    }
}

impl AppConfig {
    /// Loads configuration from a JSON file, falling back to defaults when
    /// the file does not exist.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = AppConfig::default();
        assert!(config.sync.batch_size > 0);
        assert!(config.source.page_size > 0);
        assert_eq!(config.sync.provider, "dokan");
    }

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let config = AppConfig::load(Path::new("/nonexistent/config.json")).await.unwrap();
        assert_eq!(config.sync.batch_size, AppConfig::default().sync.batch_size);
    }

    #[tokio::test]
    async fn partial_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, r#"{"sync": {"provider": "woo", "batch_size": 7, "default_vendor_name": "Bazaar"}}"#)
            .await
            .unwrap();
        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.sync.provider, "woo");
        assert_eq!(config.sync.batch_size, 7);
        // Untouched sections keep their defaults
        assert_eq!(config.source.page_size, SourceApiConfig::default().page_size);
    }
}
