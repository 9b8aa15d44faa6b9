//! Configuration for the chat client.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::api::types::TypewriterConfig;
use crate::settings::error::{SettingsError, SettingsResult};

/// Default backend base URL.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8123/api/enhanced-agent";

/// Environment variable overriding the backend base URL.
pub const ENV_BASE_URL: &str = "AGENT_CHAT_BASE_URL";

/// Environment variable overriding the request timeout, in seconds.
pub const ENV_TIMEOUT_SECS: &str = "AGENT_CHAT_TIMEOUT_SECS";

/// Environment variable overriding the settings cache path.
pub const ENV_CACHE_PATH: &str = "AGENT_CHAT_CACHE_PATH";

/// Default primary color.
pub const DEFAULT_PRIMARY_COLOR: &str = "#3b82f6";

/// A named primary color.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThemePreset {
    /// Display name.
    pub name: &'static str,
    /// Hex color.
    pub color: &'static str,
}

/// Built-in primary color presets.
pub const THEME_PRESETS: [ThemePreset; 6] = [
    ThemePreset { name: "Blue", color: "#3b82f6" },
    ThemePreset { name: "Green", color: "#10b981" },
    ThemePreset { name: "Purple", color: "#8b5cf6" },
    ThemePreset { name: "Pink", color: "#ec4899" },
    ThemePreset { name: "Orange", color: "#f59e0b" },
    ThemePreset { name: "Red", color: "#ef4444" },
];

/// Top-level client configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Backend endpoint settings.
    pub endpoint: EndpointConfig,
    /// Location of the settings cache; in memory when unset.
    pub cache_path: Option<PathBuf>,
    /// User preferences.
    #[serde(flatten)]
    pub preferences: Preferences,
}

impl ClientConfig {
    /// Create a config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by the process environment.
    ///
    /// # Errors
    /// Returns an error if an override cannot be parsed.
    pub fn from_env() -> SettingsResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by `lookup`.
    ///
    /// # Errors
    /// Returns an error if an override cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> SettingsResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(base_url) = lookup(ENV_BASE_URL) {
            config.endpoint.base_url = base_url;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                SettingsError::InvalidConfig(format!("{ENV_TIMEOUT_SECS} must be an integer"))
            })?;
            config.endpoint.request_timeout = Duration::from_secs(secs);
        }
        if let Some(path) = lookup(ENV_CACHE_PATH) {
            config.cache_path = Some(PathBuf::from(path));
        }

        Ok(config)
    }

    /// Set the backend base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.endpoint.base_url = base_url.into();
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.endpoint.request_timeout = timeout;
        self
    }

    /// Set the settings cache location.
    #[must_use]
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> SettingsResult<()> {
        self.endpoint.validate()?;
        self.preferences.validate()
    }
}

/// Backend endpoint settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base URL all endpoints hang off.
    pub base_url: String,
    /// Total timeout for non-streaming requests.
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    /// Connection timeout.
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl EndpointConfig {
    /// Set the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn validate(&self) -> SettingsResult<()> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            SettingsError::InvalidConfig(format!("endpoint.base_url is invalid: {e}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SettingsError::InvalidConfig(
                "endpoint.base_url must use http or https".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(SettingsError::InvalidConfig(
                "endpoint.request_timeout must be > 0".to_string(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(SettingsError::InvalidConfig(
                "endpoint.connect_timeout must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Preferences persisted in the settings cache.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    /// Theme settings.
    pub theme: ThemeConfig,
    /// Agent behaviour settings.
    pub agent: AgentConfig,
    /// Application settings.
    pub app: AppConfig,
}

impl Preferences {
    /// Validate preference invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> SettingsResult<()> {
        if !is_hex_color(&self.theme.primary_color) {
            return Err(SettingsError::InvalidConfig(format!(
                "theme.primaryColor must be a #rrggbb color, got {}",
                self.theme.primary_color
            )));
        }
        if self.agent.max_messages == 0 {
            return Err(SettingsError::InvalidConfig(
                "agent.maxMessages must be > 0".to_string(),
            ));
        }
        if self.app.sidebar_width == 0 {
            return Err(SettingsError::InvalidConfig(
                "app.sidebarWidth must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn is_hex_color(value: &str) -> bool {
    value
        .strip_prefix('#')
        .is_some_and(|hex| hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Color scheme.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    /// Light scheme.
    #[default]
    Light,
    /// Dark scheme.
    Dark,
    /// Follow the system.
    Auto,
}

impl ThemeMode {
    /// Light becomes dark; anything else becomes light.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark | Self::Auto => Self::Light,
        }
    }
}

/// Theme settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeConfig {
    /// Color scheme.
    pub mode: ThemeMode,
    /// Primary color as `#rrggbb`.
    pub primary_color: String,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            mode: ThemeMode::Light,
            primary_color: DEFAULT_PRIMARY_COLOR.to_string(),
        }
    }
}

impl ThemeConfig {
    /// Whether the dark scheme is selected.
    #[must_use]
    pub const fn is_dark(&self) -> bool {
        matches!(self.mode, ThemeMode::Dark)
    }
}

/// Agent behaviour settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Typewriter settings shared with the backend.
    pub typewriter: TypewriterConfig,
    /// Maximum messages kept per conversation view.
    pub max_messages: usize,
    /// Save conversations automatically.
    pub auto_save: bool,
    /// Play notification sounds.
    pub sound_enabled: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            typewriter: TypewriterConfig::default(),
            max_messages: 100,
            auto_save: true,
            sound_enabled: false,
        }
    }
}

/// Text size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontSize {
    /// Small text.
    Small,
    /// Regular text.
    #[default]
    Medium,
    /// Large text.
    Large,
}

impl FontSize {
    /// Scale applied to the base font size.
    #[must_use]
    pub const fn multiplier(self) -> f32 {
        match self {
            Self::Small => 0.875,
            Self::Medium => 1.0,
            Self::Large => 1.125,
        }
    }
}

/// Application settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// UI language tag.
    pub language: String,
    /// Follow new messages.
    pub auto_scroll: bool,
    /// Show message timestamps.
    pub show_timestamp: bool,
    /// Dense layout.
    pub compact_mode: bool,
    /// Sidebar width in pixels.
    pub sidebar_width: u32,
    /// Text size.
    pub font_size: FontSize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            language: "zh-CN".to_string(),
            auto_scroll: true,
            show_timestamp: true,
            compact_mode: false,
            sidebar_width: 320,
            font_size: FontSize::Medium,
        }
    }
}

/// Serde module for Duration serialization.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
