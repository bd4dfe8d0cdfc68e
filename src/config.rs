use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::error::{Result, WikiError};

/// The only provider kept after loading `generator.json`
pub const SUPPORTED_PROVIDER: &str = "openai";

/// Overrides the directory the JSON configuration is read from
pub const CONFIG_DIR_ENV: &str = "DEEPWIKI_CONFIG_DIR";

/// Credential for the supported provider
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

const GENERATOR_FILE: &str = "generator.json";
const EMBEDDER_FILE: &str = "embedder.json";
const REPO_FILE: &str = "repo.json";

/// Copies of the bundled files, used when the source tree is not around
const EMBEDDED_GENERATOR: &str = include_str!("../config/generator.json");
const EMBEDDED_EMBEDDER: &str = include_str!("../config/embedder.json");
const EMBEDDED_REPO: &str = include_str!("../config/repo.json");

/// Client implementations a `client_class` string can resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientKind {
    /// `"OpenAIClient"`
    OpenAi,

    /// Unknown or missing class name; served by the OpenAI-compatible client
    #[default]
    Fallback,
}

impl ClientKind {
    /// Look up a `client_class` identifier in the registry
    pub fn from_class_name(name: Option<&str>) -> Self {
        match name {
            Some("OpenAIClient") => ClientKind::OpenAi,
            Some(other) => {
                debug!("Unknown client class '{}', using fallback client", other);
                ClientKind::Fallback
            }
            None => ClientKind::Fallback,
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            ClientKind::OpenAi => "OpenAIClient",
            ClientKind::Fallback => "OpenAIClient (fallback)",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Name of the client implementation in the registry
    #[serde(default)]
    pub client_class: Option<String>,

    /// Model used when the caller does not pick one
    #[serde(default)]
    pub default_model: Option<String>,

    /// Per-model parameter overrides (temperature, top_p, ...)
    #[serde(default)]
    pub models: BTreeMap<String, Map<String, Value>>,

    /// Resolved from `client_class` at load time
    #[serde(skip_deserializing, default)]
    pub client: ClientKind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbedderConfig {
    #[serde(default)]
    pub client_class: Option<String>,

    #[serde(default)]
    pub batch_size: Option<usize>,

    #[serde(default)]
    pub model_kwargs: Map<String, Value>,

    #[serde(skip_deserializing, default)]
    pub client: ClientKind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrieverConfig {
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextSplitterConfig {
    #[serde(default)]
    pub split_by: Option<String>,

    #[serde(default)]
    pub chunk_size: Option<usize>,

    #[serde(default)]
    pub chunk_overlap: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileFilters {
    /// Path substrings skipped when walking a repository
    #[serde(default)]
    pub excluded_dirs: Vec<String>,

    /// File patterns forwarded to the completion service
    #[serde(default)]
    pub excluded_files: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryConfig {
    #[serde(default)]
    pub max_size_mb: Option<u64>,
}

/// Merged view of `generator.json`, `embedder.json` and `repo.json`.
///
/// Built once by [`Settings::load`] and never mutated afterwards; components that
/// need configuration receive a reference to it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Settings {
    /// Directory the files were read from
    pub config_dir: PathBuf,

    pub default_provider: Option<String>,

    /// `None` when no generator configuration was loaded at all
    pub providers: Option<BTreeMap<String, ProviderConfig>>,

    pub embedder: Option<EmbedderConfig>,
    pub retriever: Option<RetrieverConfig>,
    pub text_splitter: Option<TextSplitterConfig>,
    pub file_filters: Option<FileFilters>,
    pub repository: Option<RepositoryConfig>,
}

/// A provider/model selection resolved against the loaded settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedModelConfig {
    pub client: ClientKind,
    pub model: String,

    /// `model` merged with the model's parameter overrides
    pub parameters: Map<String, Value>,
}

/// Pick the configuration directory: explicit path, then the environment, then
/// the directory bundled with the crate.
pub fn resolve_config_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }

    match std::env::var(CONFIG_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => default_config_dir(),
    }
}

pub fn default_config_dir() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/config"))
}

/// Read one JSON configuration file.
///
/// Never fails: a missing file, unreadable file, invalid JSON or a document that
/// is not an object all yield an empty mapping.
pub fn load_json_config(dir: &Path, filename: &str) -> Map<String, Value> {
    let config_path = dir.join(filename);
    info!("Loading configuration from {}", config_path.display());

    if !config_path.exists() {
        warn!("Configuration file {} does not exist", config_path.display());
        return Map::new();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(content) => parse_json_config(filename, &content),
        Err(e) => {
            error!("Error loading configuration file {}: {}", filename, e);
            Map::new()
        }
    }
}

fn parse_json_config(filename: &str, content: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            error!("Error loading configuration file {}: top-level value is not an object", filename);
            Map::new()
        }
        Err(e) => {
            error!("Error loading configuration file {}: {}", filename, e);
            Map::new()
        }
    }
}

/// Keep only the supported provider and attach its client implementation
pub fn resolve_providers(generator: &Map<String, Value>) -> BTreeMap<String, ProviderConfig> {
    let mut providers = BTreeMap::new();

    let Some(Value::Object(declared)) = generator.get("providers") else {
        return providers;
    };

    for (provider_id, raw) in declared {
        if provider_id != SUPPORTED_PROVIDER {
            debug!("Discarding unsupported provider '{}'", provider_id);
            continue;
        }

        match serde_json::from_value::<ProviderConfig>(raw.clone()) {
            Ok(mut provider) => {
                provider.client = ClientKind::from_class_name(provider.client_class.as_deref());
                providers.insert(provider_id.clone(), provider);
            }
            Err(e) => warn!("Ignoring malformed provider '{}': {}", provider_id, e),
        }
    }

    providers
}

fn load_section<T: DeserializeOwned>(source: &Map<String, Value>, key: &str, filename: &str) -> Option<T> {
    let raw = source.get(key)?;
    match serde_json::from_value(raw.clone()) {
        Ok(section) => Some(section),
        Err(e) => {
            warn!("Ignoring malformed '{}' section in {}: {}", key, filename, e);
            None
        }
    }
}

impl Settings {
    /// Load and merge all configuration files from `dir`
    pub fn load(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();

        Self::merge(
            dir.to_path_buf(),
            load_json_config(dir, GENERATOR_FILE),
            load_json_config(dir, EMBEDDER_FILE),
            load_json_config(dir, REPO_FILE),
        )
    }

    /// Settings from the copies of the bundled files compiled into the binary
    pub fn embedded() -> Self {
        Self::merge(
            default_config_dir(),
            parse_json_config(GENERATOR_FILE, EMBEDDED_GENERATOR),
            parse_json_config(EMBEDDER_FILE, EMBEDDED_EMBEDDER),
            parse_json_config(REPO_FILE, EMBEDDED_REPO),
        )
    }

    fn merge(
        config_dir: PathBuf,
        generator: Map<String, Value>,
        embedder: Map<String, Value>,
        repo: Map<String, Value>,
    ) -> Self {
        if api_key_from_env().is_none() {
            warn!("{} not set in environment. Some functionality may not work correctly.", API_KEY_ENV);
        }

        let mut settings = Settings {
            config_dir,
            ..Settings::default()
        };

        if !generator.is_empty() {
            settings.default_provider = Some(SUPPORTED_PROVIDER.to_string());
            settings.providers = Some(resolve_providers(&generator));
        }

        settings.embedder = load_section::<EmbedderConfig>(&embedder, "embedder", EMBEDDER_FILE)
            .map(|mut section| {
                section.client = ClientKind::from_class_name(section.client_class.as_deref());
                section
            });
        settings.retriever = load_section(&embedder, "retriever", EMBEDDER_FILE);
        settings.text_splitter = load_section(&embedder, "text_splitter", EMBEDDER_FILE);

        settings.file_filters = load_section(&repo, "file_filters", REPO_FILE);
        settings.repository = load_section(&repo, "repository", REPO_FILE);

        settings
    }

    /// Load from the directory chosen by [`resolve_config_dir`].
    ///
    /// Falls back to the embedded copies when the bundled directory is gone,
    /// as it is for an installed binary.
    pub fn from_env(explicit_dir: Option<&Path>) -> Self {
        let dir = resolve_config_dir(explicit_dir);
        if dir == default_config_dir() && !dir.is_dir() {
            info!("Bundled configuration directory {} not found, using embedded defaults", dir.display());
            return Self::embedded();
        }

        Self::load(dir)
    }

    /// Resolve a provider/model pair into a concrete parameter set.
    ///
    /// Any provider other than the supported one is coerced to it. A missing
    /// model falls back to the provider's default model; a model without its own
    /// parameters borrows the default model's.
    pub fn get_model_config(&self, provider: &str, model: Option<&str>) -> Result<ResolvedModelConfig> {
        let provider = if provider != SUPPORTED_PROVIDER {
            warn!("Only the {} provider is supported, ignoring '{}'", SUPPORTED_PROVIDER, provider);
            SUPPORTED_PROVIDER
        } else {
            provider
        };

        let providers = self.providers.as_ref()
            .ok_or_else(|| WikiError::Config("Provider configuration not loaded".to_string()))?;

        let provider_config = providers.get(provider)
            .ok_or_else(|| WikiError::Config("Configuration for OpenAI provider not found".to_string()))?;

        let model = match model.map(str::trim).filter(|m| !m.is_empty()) {
            Some(model) => model.to_string(),
            None => provider_config.default_model.clone()
                .filter(|m| !m.is_empty())
                .ok_or_else(|| WikiError::Config("No default model specified for OpenAI provider".to_string()))?,
        };

        let model_params = provider_config.models.get(&model)
            .or_else(|| {
                provider_config.default_model.as_ref()
                    .and_then(|default| provider_config.models.get(default))
            })
            .cloned()
            .unwrap_or_default();

        let mut parameters = Map::new();
        parameters.insert("model".to_string(), Value::String(model.clone()));
        parameters.extend(model_params);

        Ok(ResolvedModelConfig {
            client: provider_config.client,
            model,
            parameters,
        })
    }

    /// Directory exclusions from `repo.json`, empty when not configured
    pub fn default_excluded_dirs(&self) -> Vec<String> {
        self.file_filters.as_ref().map(|f| f.excluded_dirs.clone()).unwrap_or_default()
    }

    /// File exclusions from `repo.json`, empty when not configured
    pub fn default_excluded_files(&self) -> Vec<String> {
        self.file_filters.as_ref().map(|f| f.excluded_files.clone()).unwrap_or_default()
    }
}

pub fn api_key_from_env() -> Option<String> {
    std::env::var(API_KEY_ENV).ok().filter(|key| !key.is_empty())
}

/// Expose a caller-supplied credential to everything that reads the environment
pub fn set_api_key(key: &str) {
    if key.is_empty() {
        return;
    }
    std::env::set_var(API_KEY_ENV, key);
}

/// Serializes tests that touch process environment variables
#[cfg(test)]
pub(crate) fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
