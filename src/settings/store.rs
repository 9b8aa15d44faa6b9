//! Settings store: preferences with best-effort local caching.
//!
//! Every mutator saves the preferences under [`SETTINGS_CACHE_KEY`]. Cache
//! failures are logged and never surface to the caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::api::client::ChatBackend;
use crate::api::types::TypewriterConfig;
use crate::settings::cache::SettingsCache;
use crate::settings::config::{FontSize, Preferences, ThemeMode};
use crate::settings::error::SettingsResult;

/// Cache key holding the serialized preferences.
pub const SETTINGS_CACHE_KEY: &str = "ai-agent-config";

/// Schema version written into settings exports.
pub const SETTINGS_EXPORT_VERSION: &str = "1.0.0";

const SECTIONS: [&str; 3] = ["theme", "agent", "app"];

/// Preferences plus export metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsExport {
    /// Exported preferences.
    #[serde(flatten)]
    pub preferences: Preferences,
    /// When the export was taken.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub export_time: DateTime<Utc>,
    /// Schema version string.
    pub version: String,
}

impl SettingsExport {
    /// Pretty JSON form.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> SettingsResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Download file name, e.g. `ai-agent-config-2024-05-01.json`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("ai-agent-config-{}.json", self.export_time.format("%Y-%m-%d"))
    }

    /// Write the export into `dir`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub async fn write_to(&self, dir: &Path) -> SettingsResult<PathBuf> {
        let path = dir.join(self.file_name());
        tokio::fs::write(&path, self.to_json_pretty()?).await?;
        Ok(path)
    }
}

/// Shallow-merge the sections of `incoming` over `base`.
///
/// Keys inside a section replace the base keys wholesale; sections that are
/// missing or not objects are left alone.
///
/// # Errors
/// Returns an error if the merged document is not a valid preference set.
pub fn merge_preferences(base: &Preferences, incoming: &Value) -> SettingsResult<Preferences> {
    let mut merged = serde_json::to_value(base)?;
    for section in SECTIONS {
        let (Some(Value::Object(patch)), Some(Value::Object(target))) =
            (incoming.get(section), merged.get_mut(section))
        else {
            continue;
        };
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }
    Ok(serde_json::from_value(merged)?)
}

/// User preferences backed by a settings cache.
pub struct SettingsStore {
    preferences: Preferences,
    cache: Arc<dyn SettingsCache>,
}

impl SettingsStore {
    /// Store with default preferences.
    #[must_use]
    pub fn new(cache: Arc<dyn SettingsCache>) -> Self {
        Self {
            preferences: Preferences::default(),
            cache,
        }
    }

    /// Load cached preferences over the defaults.
    ///
    /// Unreadable or invalid cache contents leave the defaults in place.
    pub async fn load(cache: Arc<dyn SettingsCache>) -> Self {
        let mut store = Self::new(cache);
        match store.cache.get(SETTINGS_CACHE_KEY).await {
            Ok(Some(json)) => match serde_json::from_str::<Value>(&json)
                .map_err(Into::into)
                .and_then(|value| merge_preferences(&store.preferences, &value))
            {
                Ok(preferences) => {
                    store.preferences = preferences;
                    info!("Settings loaded from cache");
                }
                Err(err) => warn!(error = %err, "Ignoring unreadable cached settings"),
            },
            Ok(None) => debug!("No cached settings"),
            Err(err) => error!(error = %err, "Failed to read cached settings"),
        }
        store
    }

    /// Current preferences.
    #[must_use]
    pub const fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    /// Persist the preferences. Failures are logged only.
    pub async fn save(&self) {
        let json = match serde_json::to_string(&self.preferences) {
            Ok(json) => json,
            Err(err) => {
                error!(error = %err, "Failed to serialize settings");
                return;
            }
        };
        if let Err(err) = self.cache.put(SETTINGS_CACHE_KEY, &json).await {
            error!(error = %err, "Failed to save settings to cache");
        }
    }

    /// Flip between light and dark and return the new mode.
    pub async fn toggle_theme(&mut self) -> ThemeMode {
        let mode = self.preferences.theme.mode.toggled();
        self.set_theme(mode).await;
        mode
    }

    /// Select a color scheme.
    pub async fn set_theme(&mut self, mode: ThemeMode) {
        self.preferences.theme.mode = mode;
        debug!(?mode, "Theme changed");
        self.save().await;
    }

    /// Set the primary color.
    pub async fn apply_theme_preset(&mut self, color: &str) {
        color.clone_into(&mut self.preferences.theme.primary_color);
        debug!(color, "Theme preset applied");
        self.save().await;
    }

    /// Set the text size.
    pub async fn set_font_size(&mut self, size: FontSize) {
        self.preferences.app.font_size = size;
        self.save().await;
    }

    /// Push typewriter settings to the backend, then keep them locally.
    ///
    /// # Errors
    /// Returns the backend error; the previous settings are kept.
    pub async fn update_typewriter_config(
        &mut self,
        backend: &dyn ChatBackend,
        config: TypewriterConfig,
    ) -> SettingsResult<()> {
        if let Err(err) = backend.configure_typewriter(&config).await {
            error!(error = %err, "Failed to update typewriter config");
            return Err(err.into());
        }
        self.preferences.agent.typewriter = config;
        info!(enabled = config.enabled, delay = config.delay, "Typewriter config updated");
        self.save().await;
        Ok(())
    }

    /// Restore every default.
    pub async fn reset_to_defaults(&mut self) {
        self.preferences = Preferences::default();
        info!("Settings reset to defaults");
        self.save().await;
    }

    /// Merge an imported settings document. Returns whether it was applied.
    pub async fn import_config(&mut self, data: &Value) -> bool {
        let merged = merge_preferences(&self.preferences, data)
            .and_then(|preferences| preferences.validate().map(|()| preferences));
        match merged {
            Ok(preferences) => {
                self.preferences = preferences;
                info!("Settings imported");
                self.save().await;
                true
            }
            Err(err) => {
                error!(error = %err, "Failed to import settings");
                false
            }
        }
    }

    /// Snapshot for download.
    #[must_use]
    pub fn export_config(&self) -> SettingsExport {
        SettingsExport {
            preferences: self.preferences.clone(),
            export_time: Utc::now(),
            version: SETTINGS_EXPORT_VERSION.to_string(),
        }
    }
}
