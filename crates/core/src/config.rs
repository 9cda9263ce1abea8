//! Application configuration and its persistence.
//!
//! Settings are stored as JSON in the user's config directory
//! (e.g., `~/.config/shotlens/settings.json` on Linux). Values missing from
//! the file can be supplied through the environment or a `.env` file.

use crate::error::{AppError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Named string settings of one provider (`api_key`, `model`, ...).
pub type ProviderSettings = BTreeMap<String, String>;

/// Environment variables consulted for blank provider settings.
const ENV_FALLBACKS: &[(&str, &str, &str)] = &[
    ("gemini", "api_key", "GEMINI_API_KEY"),
    ("gemini", "model", "GEMINI_MODEL"),
    ("openai", "api_key", "OPENAI_API_KEY"),
    ("openai", "api_base", "OPENAI_BASE_URL"),
];

/// Color scheme of the windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl std::str::FromStr for Theme {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            other => Err(AppError::config(format!("Unknown theme '{}'", other))),
        }
    }
}

/// User-configurable settings persisted between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub theme: Theme,
    /// Name of the active provider.
    pub provider: String,
    /// Stream text responses fragment by fragment.
    pub streaming: bool,
    /// Settings of every provider the user has touched, keyed by provider name.
    pub providers: BTreeMap<String, ProviderSettings>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            theme: Theme::Dark,
            provider: "gemini".to_string(),
            streaming: false,
            providers: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Returns the default path of the settings file.
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "shotlens").map(|dirs| dirs.config_dir().join("settings.json"))
    }

    /// Loads settings from the default location, falling back to defaults,
    /// then fills blank provider settings from the environment.
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();

        let mut config = match Self::config_path() {
            Some(path) => Self::load_from(&path).unwrap_or_else(|e| {
                warn!("Ignoring unreadable settings at {}: {}", path.display(), e);
                Self::default()
            }),
            None => Self::default(),
        };
        config.apply_env_fallback(|name| env::var(name).ok());
        config
    }

    /// Loads settings from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Persists settings to the default location.
    ///
    /// # Errors
    /// Returns an error if the config directory is unknown or writing fails.
    pub fn save(&self) -> Result<()> {
        let path =
            Self::config_path().ok_or_else(|| AppError::config("Cannot locate config directory"))?;
        self.save_to(&path)
    }

    /// Persists settings to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Fills blank provider settings from environment-style lookups.
    pub fn apply_env_fallback(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for (provider, key, var) in ENV_FALLBACKS {
            let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) else {
                continue;
            };
            let settings = self.providers.entry(provider.to_string()).or_default();
            let slot = settings.entry(key.to_string()).or_default();
            if slot.trim().is_empty() {
                *slot = value;
            }
        }
    }

    /// Settings of `provider`, empty if none were stored.
    pub fn provider_settings(&self, provider: &str) -> ProviderSettings {
        self.providers.get(provider).cloned().unwrap_or_default()
    }

    /// Stores one setting of `provider`.
    pub fn set_provider_setting(&mut self, provider: &str, key: &str, value: impl Into<String>) {
        self.providers
            .entry(provider.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    /// Copy with every credential replaced by a mask, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for settings in copy.providers.values_mut() {
            if let Some(key) = settings.get_mut("api_key") {
                if !key.is_empty() {
                    *key = "********".to_string();
                }
            }
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.theme, Theme::Dark);
        assert_eq!(config.provider, "gemini");
        assert!(!config.streaming);
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = AppConfig::load_from(&tmp.path().join("nope.json")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("dir").join("settings.json");

        let mut config = AppConfig::default();
        config.theme = Theme::Light;
        config.provider = "openai".to_string();
        config.streaming = true;
        config.set_provider_setting("openai", "api_model", "gpt-4o");
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.provider_settings("openai")["api_model"], "gpt-4o");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(&path, r#"{"theme":"light","extra":1}"#).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.theme, Theme::Light);
        assert_eq!(loaded.provider, "gemini");
        assert!(!loaded.streaming);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(AppError::Json(_))));
    }

    #[test]
    fn test_env_fills_only_blank_settings() {
        let mut config = AppConfig::default();
        config.set_provider_setting("openai", "api_key", "from-file");
        config.set_provider_setting("gemini", "api_key", "");

        config.apply_env_fallback(|name| match name {
            "GEMINI_API_KEY" => Some("gem-env".to_string()),
            "OPENAI_API_KEY" => Some("oai-env".to_string()),
            _ => None,
        });

        assert_eq!(config.provider_settings("gemini")["api_key"], "gem-env");
        assert_eq!(config.provider_settings("openai")["api_key"], "from-file");
        assert!(!config.provider_settings("gemini").contains_key("model"));
    }

    #[test]
    fn test_redacted_masks_keys() {
        let mut config = AppConfig::default();
        config.set_provider_setting("gemini", "api_key", "secret");
        config.set_provider_setting("gemini", "model", "gemini-2.5-pro");
        let shown = config.redacted();
        assert_eq!(shown.provider_settings("gemini")["api_key"], "********");
        assert_eq!(shown.provider_settings("gemini")["model"], "gemini-2.5-pro");
    }

    #[test]
    fn test_theme_from_str() {
        assert_eq!("Light".parse::<Theme>().unwrap(), Theme::Light);
        assert!("gradient".parse::<Theme>().is_err());
    }
}
