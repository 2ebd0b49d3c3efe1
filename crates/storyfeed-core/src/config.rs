//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the API base URL, the feed page size and which cached
//! feed to use.
//!
//! Configuration is stored at `~/.config/storyfeed/config.json`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::cache::FeedKey;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "storyfeed";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default API root
pub const DEFAULT_API_BASE_URL: &str = "https://story-api.dicoding.dev/v1";

/// Items per page requested from the API.
pub const DEFAULT_PAGE_SIZE: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub page_size: u32,
    /// How close to the end of loaded data a read may get before the next
    /// page is requested. Defaults to one page.
    pub prefetch_distance: Option<u32>,
    pub feed_key: FeedKey,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            prefetch_distance: None,
            feed_key: FeedKey::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::read_from(&path)?;
        config.apply_env();
        Ok(config)
    }

    /// Write the config file, returning where it went
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn read_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Environment overrides (`STORYFEED_API_URL`, `STORYFEED_PAGE_SIZE`)
    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("STORYFEED_API_URL") {
            if !url.trim().is_empty() {
                self.api_base_url = url.trim().trim_end_matches('/').to_string();
            }
        }
        if let Some(size) = std::env::var("STORYFEED_PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
        {
            self.page_size = size;
        }
    }

    /// Page size, never zero
    pub fn page_size(&self) -> u32 {
        self.page_size.max(1)
    }

    pub fn prefetch_distance(&self) -> u32 {
        self.prefetch_distance.unwrap_or_else(|| self.page_size())
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}
