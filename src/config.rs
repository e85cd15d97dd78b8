use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/firebase.json";
pub const DEFAULT_POLL_MS: u64 = 1500;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
}

/// Addresses of the managed services. All values are supplied externally.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FirebaseConfig {
    pub api_key: String,
    pub auth_domain: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub messaging_sender_id: String,
    pub app_id: String,
    pub measurement_id: String,
    pub oauth_client_id: String,
    pub oauth_client_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub firebase: FirebaseConfig,
    pub poll_interval_ms: u64,
    /// Identity used by the local backend.
    pub local_user: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            firebase: FirebaseConfig::default(),
            poll_interval_ms: DEFAULT_POLL_MS,
            local_user: "Local user".to_string(),
        }
    }
}

impl AppConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(100))
    }

    /// Environment variables win over the file.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let fb = &mut self.firebase;
        let fields: [(&str, &mut String); 9] = [
            ("FIREBASE_API_KEY", &mut fb.api_key),
            ("FIREBASE_AUTH_DOMAIN", &mut fb.auth_domain),
            ("FIREBASE_PROJECT_ID", &mut fb.project_id),
            ("FIREBASE_STORAGE_BUCKET", &mut fb.storage_bucket),
            ("FIREBASE_MESSAGING_SENDER_ID", &mut fb.messaging_sender_id),
            ("FIREBASE_APP_ID", &mut fb.app_id),
            ("FIREBASE_MEASUREMENT_ID", &mut fb.measurement_id),
            ("GOOGLE_OAUTH_CLIENT_ID", &mut fb.oauth_client_id),
            ("GOOGLE_OAUTH_CLIENT_SECRET", &mut fb.oauth_client_secret),
        ];
        for (key, slot) in fields {
            if let Some(value) = lookup(key).filter(|value| !value.is_empty()) {
                *slot = value;
            }
        }
    }
}

impl FirebaseConfig {
    /// Checks the settings the Firebase backend cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::Missing("api_key"));
        }
        if self.project_id.is_empty() {
            return Err(ConfigError::Missing("project_id"));
        }
        if self.oauth_client_id.is_empty() {
            return Err(ConfigError::Missing("oauth_client_id"));
        }
        Ok(())
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "firebase": { "project_id": "demo" } }"#).unwrap();
        assert_eq!(config.firebase.project_id, "demo");
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_MS);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = AppConfig::default();
        config.firebase.api_key = "from-file".into();
        config.apply_overrides(|key| match key {
            "FIREBASE_API_KEY" => Some("from-env".into()),
            "FIREBASE_PROJECT_ID" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.firebase.api_key, "from-env");
        assert_eq!(config.firebase.project_id, "");
    }

    #[test]
    fn validate_names_the_first_missing_setting() {
        let mut firebase = FirebaseConfig::default();
        assert_eq!(firebase.validate(), Err(ConfigError::Missing("api_key")));
        firebase.api_key = "k".into();
        firebase.project_id = "p".into();
        assert_eq!(
            firebase.validate(),
            Err(ConfigError::Missing("oauth_client_id"))
        );
        firebase.oauth_client_id = "c".into();
        assert!(firebase.validate().is_ok());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config("does/not/exist.json");
        assert_eq!(config.poll_interval(), Duration::from_millis(DEFAULT_POLL_MS));
    }
}
