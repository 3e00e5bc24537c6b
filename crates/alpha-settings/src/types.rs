//! Settings type definitions.
//!
//! All types use camelCase JSON and implement [`Default`] with production
//! values, so a partial `settings.json` fills in the rest.

use std::path::PathBuf;

use alpha_core::{InstallationId, PromptProfile};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Directory holding `settings.json`, the local cache and the default database.
pub fn alpha_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".alpha")
}

fn home_file(name: &str) -> String {
    alpha_home().join(name).to_string_lossy().into_owned()
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlphaSettings {
    /// Key of the single context record this installation reads and writes.
    pub installation_id: InstallationId,
    pub profile: PromptProfile,
    pub client: ClientSettings,
    pub server: ServerSettings,
    pub logging: LoggingSettings,
}

impl AlphaSettings {
    pub fn validate(&self) -> Result<()> {
        if self.installation_id.as_str().trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "installationId must not be empty".into(),
            ));
        }
        if self.client.autosave_delay_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "client.autosaveDelayMs must be positive".into(),
            ));
        }
        if self.server.transcription.max_bytes == 0 {
            return Err(SettingsError::InvalidValue(
                "server.transcription.maxBytes must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Base URL of the Alpha server. Unset means local-only operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    pub cache_path: String,
    /// Quiet period before a conversation is auto-saved.
    pub autosave_delay_ms: u64,
    pub request_timeout_ms: u64,
    pub model: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: None,
            cache_path: home_file("cache.db"),
            autosave_delay_ms: 2000,
            request_timeout_ms: 30_000,
            model: "gpt-4o".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// SQLite database backing the store endpoints. Unset disables them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
    pub chat: ChatUpstreamSettings,
    pub transcription: TranscriptionSettings,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            database_path: Some(home_file("alpha.db")),
            chat: ChatUpstreamSettings::default(),
            transcription: TranscriptionSettings::default(),
        }
    }
}

/// OpenAI-compatible chat completions endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatUpstreamSettings {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
}

impl Default for ChatUpstreamSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o".to_string(),
        }
    }
}

/// Whisper-compatible transcription endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscriptionSettings {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    pub language: String,
    pub max_bytes: u64,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key: None,
            model: "whisper-large-v3".to_string(),
            language: "en".to_string(),
            max_bytes: 25 * 1024 * 1024,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = AlphaSettings::default();
        assert_eq!(s.installation_id.as_str(), "default");
        assert_eq!(s.client.autosave_delay_ms, 2000);
        assert!(s.client.server_url.is_none());
        assert_eq!(s.server.transcription.model, "whisper-large-v3");
        assert_eq!(s.server.transcription.language, "en");
        assert!(s.validate().is_ok());
    }

    #[test]
    fn serializes_camel_case_and_omits_unset_options() {
        let json = serde_json::to_value(AlphaSettings::default()).unwrap();
        assert!(json["client"].get("autosaveDelayMs").is_some());
        assert!(json["client"].get("serverUrl").is_none());
        assert!(json["server"]["chat"].get("apiKey").is_none());
        assert_eq!(json["profile"]["assistantName"], "Alpha");
    }

    #[test]
    fn validate_rejects_zero_delay() {
        let mut s = AlphaSettings::default();
        s.client.autosave_delay_ms = 0;
        assert!(matches!(s.validate(), Err(SettingsError::InvalidValue(_))));
    }

    #[test]
    fn validate_rejects_blank_installation() {
        let s = AlphaSettings {
            installation_id: InstallationId::new("  "),
            ..Default::default()
        };
        assert!(s.validate().is_err());
    }
}
