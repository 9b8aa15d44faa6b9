//! Client settings.
//!
//! - `config`: client configuration, preferences and environment overrides
//! - `cache`: `SQLite` key/value cache
//! - `store`: preference mutators with best-effort persistence
//! - `error`: settings error type

pub mod cache;
pub mod config;
pub mod error;
pub mod store;

pub use cache::{SettingsCache, SqliteSettingsCache};
pub use config::{
    AgentConfig, AppConfig, ClientConfig, EndpointConfig, FontSize, Preferences, THEME_PRESETS,
    ThemeConfig, ThemeMode,
};
pub use error::{SettingsError, SettingsResult};
pub use store::{SETTINGS_CACHE_KEY, SettingsExport, SettingsStore};
