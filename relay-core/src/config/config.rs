use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use relay_llm::LlmClient;

use crate::backend::{ChatBackend, ModelBackend, ResponsesBackend};
use crate::roundtrip::{HistoryMode, RoundTripBuilder, DEFAULT_MAX_ROUNDS};

const CONFIG_FILE: &str = ".relay.config";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not find home directory")]
    NoHome,

    #[error("config file {} does not exist", .0.display())]
    Missing(PathBuf),

    #[error("config io: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("provider index {index} out of bounds (have {len} providers)")]
    OutOfBounds { index: usize, len: usize },

    #[error("failed to create {provider} client: {reason}")]
    Provider { provider: String, reason: String },

    #[error("no provider configured, set OPENAI_API_KEY or add a provider to ~/.relay.config")]
    NoProvider,

    #[error("no model available: {0}")]
    NoModel(String),

    #[error("provider {0} has no responses API")]
    NoResponsesApi(&'static str),
}

/// One saved endpoint with the variables it is built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: String,
    pub env_vars: HashMap<String, String>,
    /// empty means the provider default
    #[serde(default)]
    pub model: String,
}

/// Which API the round trip talks to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Responses,
    Chat,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(name.to_string()))
            .map_err(|_| format!("unknown backend '{}', expected responses or chat", name))
    }
}

/// Content of `~/.relay.config`, every field but the providers may be omitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub providers: Vec<ProviderConfig>,
    pub selected_provider: usize,
    pub backend: BackendKind,
    pub history: HistoryMode,
    pub max_rounds: usize,
    pub max_output_tokens: Option<u32>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            selected_provider: 0,
            backend: BackendKind::Responses,
            history: HistoryMode::Resend,
            max_rounds: DEFAULT_MAX_ROUNDS,
            max_output_tokens: None,
        }
    }
}

/// Persistence
impl RelayConfig {
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(dirs::home_dir().ok_or(ConfigError::NoHome)?.join(CONFIG_FILE))
    }

    pub fn exists() -> bool {
        Self::config_path().is_ok_and(|path| path.exists())
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    /// A selection pointing past the provider list falls back to the first one
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }

        let mut config: Self = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        if config.selected_provider >= config.providers.len() {
            config.selected_provider = 0;
        }
        debug!(target: "relay_core", path = %path.display(), providers = config.providers.len(), "config loaded");
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Provider list
impl RelayConfig {
    fn check_index(&self, index: usize) -> Result<(), ConfigError> {
        match index < self.providers.len() {
            true => Ok(()),
            false => Err(ConfigError::OutOfBounds { index, len: self.providers.len() }),
        }
    }

    /// Index of the new entry
    pub fn add_provider(&mut self, provider: String, env_vars: HashMap<String, String>, model: String) -> usize {
        self.providers.push(ProviderConfig { provider, env_vars, model });
        self.providers.len() - 1
    }

    pub fn is_duplicate_config(&self, provider: &str, env_vars: &HashMap<String, String>, model: &str) -> bool {
        self.providers
            .iter()
            .any(|p| p.provider == provider && &p.env_vars == env_vars && p.model == model)
    }

    pub fn get_selected_provider(&self) -> Option<&ProviderConfig> {
        self.providers.get(self.selected_provider)
    }

    pub fn set_selected_provider(&mut self, index: usize) -> Result<(), ConfigError> {
        self.check_index(index)?;
        self.selected_provider = index;
        Ok(())
    }

    /// The selection keeps pointing at the same entry when possible
    pub fn remove_provider(&mut self, index: usize) -> Result<ProviderConfig, ConfigError> {
        self.check_index(index)?;
        let removed = self.providers.remove(index);
        if self.selected_provider > index || self.selected_provider >= self.providers.len() {
            self.selected_provider = self.selected_provider.saturating_sub(1);
        }
        Ok(removed)
    }

    /// (index, provider, model)
    pub fn list_providers(&self) -> Vec<(usize, &str, &str)> {
        self.providers
            .iter()
            .enumerate()
            .map(|(index, p)| (index, p.provider.as_str(), p.model.as_str()))
            .collect()
    }

    /// Export the selected provider, RELAY_PROVIDER and RELAY_MODEL included
    pub fn set_env_vars(&self) {
        let Some(selected) = self.get_selected_provider() else {
            return;
        };
        selected.env_vars.iter().for_each(|(name, value)| std::env::set_var(name, value));
        if !selected.model.is_empty() {
            std::env::set_var("RELAY_MODEL", &selected.model);
        }
        std::env::set_var("RELAY_PROVIDER", &selected.provider);
    }
}

/// Wiring
impl RelayConfig {
    /// Client and model of the selected provider, the environment when none is saved
    pub async fn get_llm(&self) -> Result<(LlmClient, String), ConfigError> {
        self.set_env_vars();

        let llm = match self.get_selected_provider() {
            Some(selected) => LlmClient::create_provider(&selected.provider, &selected.env_vars).map_err(|e| {
                ConfigError::Provider { provider: selected.provider.clone(), reason: e.to_string() }
            })?,
            None => LlmClient::first_from_env().ok_or(ConfigError::NoProvider)?,
        };

        let model = llm.default_model().await.map_err(|e| ConfigError::NoModel(e.to_string()))?;
        Ok((llm, model))
    }

    /// Round trip defaults of this config
    pub fn configure(&self, builder: RoundTripBuilder) -> RoundTripBuilder {
        let builder = builder.history(self.history).max_rounds(self.max_rounds);
        match self.max_output_tokens {
            Some(max) => builder.max_output_tokens(max),
            None => builder,
        }
    }

    pub fn backend(&self, llm: Arc<LlmClient>) -> Result<Arc<dyn ModelBackend>, ConfigError> {
        self.backend_of(self.backend, llm)
    }

    /// The responses backend needs a provider that serves `/responses`
    pub fn backend_of(&self, kind: BackendKind, llm: Arc<LlmClient>) -> Result<Arc<dyn ModelBackend>, ConfigError> {
        let backend: Arc<dyn ModelBackend> = match kind {
            BackendKind::Responses => {
                let client = llm.responses().ok_or(ConfigError::NoResponsesApi(llm.provider_name()))?;
                Arc::new(ResponsesBackend::new(client))
            }
            BackendKind::Chat => Arc::new(ChatBackend::new(llm)),
        };
        Ok(backend)
    }
}
