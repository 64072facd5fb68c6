//! Agent settings: typed core fields plus an open bag for plugin-specific
//! and server-pushed values.
//!
//! Held behind an [`arc_swap::ArcSwap`] by the collection loop so a settings
//! patch pushed back from the server can be applied without a lock gating
//! every tick's reads.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Core, always-present agent settings plus an open extension bag.
///
/// `extra` holds keys this crate doesn't know about yet (forward
/// compatibility with server-pushed settings); `plugin_settings` namespaces
/// per-plugin configuration under `[plugin:NAME]` Ini sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub api_url: String,
    pub api_key: Option<String>,
    /// Host identity assigned by the collector at registration. Required at
    /// startup alongside `api_key` — there is no in-process registration
    /// flow, since that's the operator CLI's job.
    #[serde(default)]
    pub server_id: Option<String>,
    pub tick_interval_secs: u64,
    pub slow_tick_every: u32,
    pub plugin_timeout_secs: u64,
    pub max_backoff_secs: u64,
    /// Directory to write rotated log files into. `None` means stderr only.
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default = "default_log_file_rotation")]
    pub log_file_rotation: String,
    #[serde(default = "default_log_file_rotation_count")]
    pub log_file_rotation_count: u32,
    /// Syslog facility name (e.g. `daemon`, `local0`). `None` disables
    /// syslog forwarding.
    #[serde(default)]
    pub syslog_facility: Option<String>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub plugin_settings: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

fn default_log_file_rotation() -> String {
    "daily".to_string()
}

fn default_log_file_rotation_count() -> u32 {
    7
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            api_url: "https://api.hostwarden.invalid".to_string(),
            api_key: None,
            server_id: None,
            tick_interval_secs: 60,
            slow_tick_every: 10,
            plugin_timeout_secs: 30,
            max_backoff_secs: 300,
            log_file: None,
            log_file_rotation: default_log_file_rotation(),
            log_file_rotation_count: default_log_file_rotation_count(),
            syslog_facility: None,
            debug: false,
            plugin_settings: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn plugin_timeout(&self) -> Duration {
        Duration::from_secs(self.plugin_timeout_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    /// Settings for one named plugin's private section, if any.
    pub fn plugin(&self, name: &str) -> Option<&BTreeMap<String, String>> {
        self.plugin_settings.get(name)
    }

    /// Build settings from environment variables, falling back to defaults
    /// for everything unset. Used mainly in containerized deployments where
    /// an Ini file isn't convenient.
    pub fn from_env() -> Self {
        let mut settings = Settings::default();

        if let Ok(url) = std::env::var("HOSTWARDEN_API_URL") {
            settings.api_url = url;
        }
        if let Ok(key) = std::env::var("HOSTWARDEN_API_KEY") {
            settings.api_key = Some(key);
        }
        if let Ok(server_id) = std::env::var("HOSTWARDEN_SERVER_ID") {
            settings.server_id = Some(server_id);
        }
        if let Ok(value) = std::env::var("HOSTWARDEN_TICK_INTERVAL_SECS") {
            if let Ok(parsed) = value.parse() {
                settings.tick_interval_secs = parsed;
            }
        }

        settings
    }

    /// Load settings from an Ini-format file at an explicit path. Directory
    /// discovery (e.g. `/etc/hostwarden.d/*.ini`) is out of scope — the
    /// caller names the one file to read.
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let source = config::Config::builder()
            .add_source(config::File::new(path, config::FileFormat::Ini))
            .build()
            .map_err(|err| ConfigError::Read {
                path: path.to_string(),
                source: Box::new(err),
            })?;

        source
            .try_deserialize()
            .map_err(|err| ConfigError::Read {
                path: path.to_string(),
                source: Box::new(err),
            })
    }

    /// Apply a patch of top-level string fields pushed back from the server,
    /// returning the set of keys that actually changed. Keys are the
    /// collector's documented settings names (`api_base`, `collect_interval_s`,
    /// `server_id`, ...), not this struct's Rust field names. Unknown keys
    /// land in `extra` rather than being rejected, since the server may be
    /// newer than this agent build.
    pub fn apply_patch(&mut self, patch: &BTreeMap<String, String>) -> Vec<String> {
        let mut changed = Vec::new();

        for (key, value) in patch {
            let previous = match key.as_str() {
                "api_base" => {
                    let prev = self.api_url.clone();
                    self.api_url = value.clone();
                    Some(prev)
                }
                "server_id" => {
                    let prev = self.server_id.clone().unwrap_or_default();
                    self.server_id = Some(value.clone());
                    Some(prev)
                }
                "collect_interval_s" => match value.parse() {
                    Ok(parsed) => {
                        let prev = self.tick_interval_secs.to_string();
                        self.tick_interval_secs = parsed;
                        Some(prev)
                    }
                    Err(_) => {
                        tracing::warn!(key, value, "settings patch field failed to parse, ignoring");
                        None
                    }
                },
                _ => {
                    let prev = self.extra.insert(key.clone(), value.clone());
                    Some(prev.unwrap_or_default())
                }
            };

            if let Some(prev) = previous {
                if &prev != value {
                    changed.push(key.clone());
                }
            }
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_patch_reports_only_changed_keys() {
        let mut settings = Settings::default();
        let mut patch = BTreeMap::new();
        patch.insert("api_base".to_string(), settings.api_url.clone());
        patch.insert("collect_interval_s".to_string(), "120".to_string());

        let changed = settings.apply_patch(&patch);
        assert_eq!(changed, vec!["collect_interval_s".to_string()]);
        assert_eq!(settings.tick_interval_secs, 120);
    }

    #[test]
    fn apply_patch_ignores_unparseable_values() {
        let mut settings = Settings::default();
        let mut patch = BTreeMap::new();
        patch.insert("collect_interval_s".to_string(), "not-a-number".to_string());

        let changed = settings.apply_patch(&patch);
        assert!(changed.is_empty());
        assert_eq!(settings.tick_interval_secs, 60);
    }

    #[test]
    fn apply_patch_updates_server_id() {
        let mut settings = Settings::default();
        let mut patch = BTreeMap::new();
        patch.insert("server_id".to_string(), "srv-1".to_string());

        let changed = settings.apply_patch(&patch);
        assert_eq!(changed, vec!["server_id".to_string()]);
        assert_eq!(settings.server_id, Some("srv-1".to_string()));
    }

    #[test]
    fn apply_patch_stashes_unknown_keys_in_extra() {
        let mut settings = Settings::default();
        let mut patch = BTreeMap::new();
        patch.insert("new_server_feature".to_string(), "on".to_string());

        let changed = settings.apply_patch(&patch);
        assert_eq!(changed, vec!["new_server_feature".to_string()]);
        assert_eq!(settings.extra.get("new_server_feature"), Some(&"on".to_string()));
    }

    #[test]
    fn from_env_falls_back_to_defaults_when_unset() {
        std::env::remove_var("HOSTWARDEN_API_URL");
        let settings = Settings::from_env();
        assert_eq!(settings.api_url, Settings::default().api_url);
    }
}
