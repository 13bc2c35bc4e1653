use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::errors::{ChatError, ChatResult};

pub const DEFAULT_API_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// The flat record read before every chat request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_endpoint: default_api_endpoint(),
            model: default_model(),
        }
    }
}

impl Settings {
    pub fn new<K, E, M>(api_key: K, api_endpoint: E, model: M) -> Self
    where
        K: Into<String>,
        E: Into<String>,
        M: Into<String>,
    {
        Self {
            api_key: api_key.into(),
            api_endpoint: api_endpoint.into(),
            model: model.into(),
        }
    }

    /// Fails with a configuration error naming every empty field
    pub fn validate(&self) -> ChatResult<()> {
        let missing: Vec<&str> = [
            ("api_key", &self.api_key),
            ("api_endpoint", &self.api_endpoint),
            ("model", &self.model),
        ]
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ChatError::Configuration(missing.join(", ")))
        }
    }
}

fn default_api_endpoint() -> String {
    DEFAULT_API_ENDPOINT.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

/// Key-value store the provider consults before each request
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> ChatResult<Settings>;

    fn save(&self, settings: &Settings) -> ChatResult<()>;
}

/// Settings kept in a JSON file, with `TEXCHAT_*` environment overrides
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/texchat/settings.json`
    pub fn default_path() -> ChatResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("texchat").join("settings.json"))
            .ok_or_else(|| ChatError::Configuration("could not determine config directory".into()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> ChatResult<Settings> {
        let config = Config::builder()
            .set_default("api_key", "")?
            .set_default("api_endpoint", DEFAULT_API_ENDPOINT)?
            .set_default("model", DEFAULT_MODEL)?
            .add_source(File::from(self.path.clone()).format(FileFormat::Json).required(false))
            .add_source(
                Environment::with_prefix("TEXCHAT")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        tracing::debug!(path = %self.path.display(), model = %settings.model, "loaded settings");
        Ok(settings)
    }

    fn save(&self, settings: &Settings) -> ChatResult<()> {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(settings)?;
            fs::write(&self.path, json)
        };
        write().map_err(|e| {
            ChatError::Configuration(format!("failed to write {}: {}", self.path.display(), e))
        })
    }
}

/// In-process store, used by tests and embedding hosts that manage settings themselves
#[derive(Default)]
pub struct MemorySettingsStore {
    settings: Mutex<Settings>,
}

impl MemorySettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(settings),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> ChatResult<Settings> {
        self.settings
            .lock()
            .map(|s| s.clone())
            .map_err(|_| ChatError::Configuration("settings lock poisoned".into()))
    }

    fn save(&self, settings: &Settings) -> ChatResult<()> {
        let mut current = self
            .settings
            .lock()
            .map_err(|_| ChatError::Configuration("settings lock poisoned".into()))?;
        *current = settings.clone();
        Ok(())
    }
}
