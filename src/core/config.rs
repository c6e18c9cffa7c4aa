use crate::core::models::DataPath;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:5000";

/// Persisted client configuration (`config.toml` in the data directory).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub ui: UiPreferences,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            access_key: None,
            theme: Theme::default(),
            polling: PollingConfig::default(),
            ui: UiPreferences::default(),
        }
    }
}

impl ClientConfig {
    pub fn access_key(&self) -> Option<&str> {
        self.access_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    #[serde(default = "default_primary_color")]
    pub primary_color: String,
    #[serde(default)]
    pub background_image: String,
    #[serde(default = "default_background_opacity")]
    pub background_opacity: f64,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary_color: default_primary_color(),
            background_image: String::new(),
            background_opacity: default_background_opacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_error_reset_ms")]
    pub error_reset_ms: u64,
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
    #[serde(default = "default_notification_interval_ms")]
    pub notification_interval_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            error_reset_ms: default_error_reset_ms(),
            max_polls: default_max_polls(),
            notification_interval_ms: default_notification_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl PollingConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiPreferences {
    #[serde(default = "default_true")]
    pub notifications: bool,
}

impl Default for UiPreferences {
    fn default() -> Self {
        Self {
            notifications: true,
        }
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}
fn default_primary_color() -> String {
    "#1677ff".to_string()
}
fn default_background_opacity() -> f64 {
    0.1
}
fn default_interval_ms() -> u64 {
    1000
}
fn default_error_reset_ms() -> u64 {
    5000
}
fn default_max_polls() -> u32 {
    600
}
fn default_notification_interval_ms() -> u64 {
    5000
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

/// Keys accepted by `config get` / `config set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    ApiUrl,
    AccessKey,
    Theme,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 3] = [ConfigKey::ApiUrl, ConfigKey::AccessKey, ConfigKey::Theme];

    pub fn name(&self) -> &'static str {
        match self {
            ConfigKey::ApiUrl => "api_url",
            ConfigKey::AccessKey => "access_key",
            ConfigKey::Theme => "theme",
        }
    }
}

impl FromStr for ConfigKey {
    type Err = io::Error;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        ConfigKey::ALL
            .into_iter()
            .find(|k| k.name() == key)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Unknown config key: {key} (expected api_url, access_key or theme)"),
                )
            })
    }
}

pub struct ConfigService;

impl ConfigService {
    /// Load the configuration, writing a default file on first use.
    pub fn load_config(data_path: &DataPath) -> io::Result<ClientConfig> {
        let config_path = data_path.config_path();
        if !config_path.exists() {
            let config = ClientConfig::default();
            fs::create_dir_all(&data_path.root)?;
            Self::save_config(&config, data_path)?;
            return Ok(config);
        }

        let content = fs::read_to_string(&config_path)?;
        let config: ClientConfig = toml::from_str(&content).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid config format in {}: {e}", config_path.display()),
            )
        })?;
        Ok(config)
    }

    pub fn save_config(config: &ClientConfig, data_path: &DataPath) -> io::Result<()> {
        let config_path = data_path.config_path();
        let toml_content = toml::to_string_pretty(config).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Failed to serialize config: {e}"),
            )
        })?;

        fs::write(&config_path, toml_content)?;
        log::info!("Saved configuration to {}", config_path.display());
        Ok(())
    }

    pub fn get_value(config: &ClientConfig, key: ConfigKey) -> String {
        match key {
            ConfigKey::ApiUrl => config.api_url.clone(),
            ConfigKey::AccessKey => config.access_key().unwrap_or_default().to_string(),
            // Serializing a plain struct of strings and floats cannot fail.
            ConfigKey::Theme => serde_json::to_string(&config.theme).unwrap_or_default(),
        }
    }

    pub fn set_value(config: &mut ClientConfig, key: ConfigKey, value: &str) -> io::Result<()> {
        match key {
            ConfigKey::ApiUrl => {
                validate_api_url(value)?;
                config.api_url = value.trim().trim_end_matches('/').to_string();
            }
            ConfigKey::AccessKey => {
                let value = value.trim();
                config.access_key = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            ConfigKey::Theme => {
                let theme: Theme = serde_json::from_str(value).map_err(|e| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("Invalid theme JSON: {e}"),
                    )
                })?;
                validate_theme(&theme)?;
                config.theme = theme;
            }
        }
        Ok(())
    }
}

pub fn validate_api_url(value: &str) -> io::Result<()> {
    let value = value.trim();
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "API URL must start with http:// or https://",
        ));
    }

    url::Url::parse(value).map_err(|e| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("Invalid API URL: {e}"))
    })?;
    Ok(())
}

fn validate_theme(theme: &Theme) -> io::Result<()> {
    if !(0.0..=1.0).contains(&theme.background_opacity) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "backgroundOpacity must be between 0 and 1",
        ));
    }
    Ok(())
}
