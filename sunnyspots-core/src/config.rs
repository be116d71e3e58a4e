use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::PathBuf, time::Duration};

use crate::model::GeoCoordinate;

/// Third parties that need an API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    GooglePlaces,
    OpenWeather,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::GooglePlaces => "googleplaces",
            ProviderId::OpenWeather => "openweather",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::GooglePlaces, ProviderId::OpenWeather]
    }

    /// Environment variable that overrides the stored key.
    pub fn env_var(&self) -> &'static str {
        match self {
            ProviderId::GooglePlaces => "GOOGLE_PLACES_API_KEY",
            ProviderId::OpenWeather => "OPENWEATHER_API_KEY",
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "googleplaces" | "google" | "places" => Ok(ProviderId::GooglePlaces),
            "openweather" => Ok(ProviderId::OpenWeather),
            _ => Err(anyhow!(
                "Unknown provider '{value}'. Supported providers: googleplaces, openweather."
            )),
        }
    }
}

/// Configuration for a single provider (e.g., API key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
}

/// Base URLs of every upstream the application talks to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// Legacy Places API (nearby search, photos).
    pub legacy_places: String,
    /// Places API (New): autocomplete and details.
    pub places: String,
    pub weather: String,
    /// Terrarium-encoded elevation PNG tiles, addressed as `{z}/{x}/{y}.png`.
    pub elevation_tiles: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            legacy_places: "https://maps.googleapis.com/maps/api/place".to_string(),
            places: "https://places.googleapis.com/v1".to_string(),
            weather: "https://api.openweathermap.org/data/3.0".to_string(),
            elevation_tiles: "https://s3.amazonaws.com/elevation-tiles-prod/terrarium".to_string(),
        }
    }
}

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Top-level configuration stored on disk.
///
/// Built once at startup and handed to every client that needs a key or a
/// base URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Example TOML:
    /// [providers.googleplaces]
    /// api_key = "..."
    pub providers: HashMap<String, ProviderConfig>,

    pub endpoints: Endpoints,

    /// Where the map opens and searches start when nothing else is chosen.
    pub default_location: GeoCoordinate,

    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            endpoints: Endpoints::default(),
            default_location: GeoCoordinate::UTRECHT,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Invalid configuration TOML")
    }

    /// Load from disk, then let the environment override API keys.
    pub fn load_with_env() -> Result<Self> {
        let mut cfg = Self::load()?;
        cfg.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for id in ProviderId::all() {
            if let Some(key) = lookup(id.env_var()).filter(|k| !k.trim().is_empty()) {
                log::debug!("Using {} from the environment", id.env_var());
                self.upsert_provider_api_key(*id, key);
            }
        }
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "sunnyspots", "sunnyspots")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Set or replace a provider API key.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        self.providers
            .insert(provider_id.as_str().to_string(), ProviderConfig { api_key });
    }

    /// Returns API key for a provider, if present.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.providers
            .get(provider_id.as_str())
            .map(|cfg| cfg.api_key.as_str())
    }

    /// Like [`Config::provider_api_key`] but fails with a hint when missing.
    pub fn require_api_key(&self, provider_id: ProviderId) -> crate::Result<&str> {
        self.provider_api_key(provider_id)
            .ok_or(crate::Error::MissingApiKey(provider_id))
    }

    pub fn is_provider_configured(&self, provider_id: ProviderId) -> bool {
        self.provider_api_key(provider_id).is_some()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
