//! Configuration management for IEDP
//!
//! A single TOML file, overlaid by the profile named after the active
//! environment and then by `IEDP_<SECTION>__<KEY>` environment variables.
//! Components never read this structure directly: they receive the
//! per-component structs produced by the `*_config` accessors below.

use crate::document::ChunkerConfig;
use crate::error::{IedpError, Result};
use crate::logging::{parse_rotation, LogFile};
use crate::orchestrator::OrchestratorConfig;
use crate::reasoning::ReasonerConfig;
use crate::retrieval::{FusionConfig, FusionStrategy, RetrieverSettings};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

pub const SCHEMA_VERSION: &str = "1.0.0";
const ENV_PREFIX: &str = "IEDP_";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta", default)]
    pub meta: MetaConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    /// Per-environment overrides, `[profiles.<env>.<section>]`
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub profiles: HashMap<String, toml::Table>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            created_at: current_timestamp(),
            last_modified: current_timestamp(),
        }
    }
}

/// Application identity and logging
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    /// Active environment; also selects the profile
    pub env: String,
    pub debug: bool,
    /// One of DEBUG, INFO, WARNING, ERROR, CRITICAL
    pub log_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    /// minutely, hourly, daily or never
    pub log_rotation: String,
    /// Rolled log files kept before the oldest is deleted
    pub log_max_files: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "intelligent-enterprise-document-analysis".to_string(),
            env: "development".to_string(),
            debug: false,
            log_level: "INFO".to_string(),
            log_file: None,
            log_rotation: "daily".to_string(),
            log_max_files: 7,
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            workers: 4,
        }
    }
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub models_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            models_dir: PathBuf::from("./models"),
            cache_dir: PathBuf::from("./.cache"),
        }
    }
}

/// Document chunking, in characters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Hybrid retrieval settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Default number of fragments per query
    pub k: usize,
    /// `rrf` or `weighted`
    pub fusion: String,
    pub rrf_k: f32,
    pub dense_weight: f32,
    pub sparse_weight: f32,
    /// Each index returns `k * candidate_multiplier` candidates
    pub candidate_multiplier: usize,
    pub min_score: f32,
    pub deduplicate: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 5,
            fusion: "rrf".to_string(),
            rrf_k: 60.0,
            dense_weight: 0.5,
            sparse_weight: 0.5,
            candidate_multiplier: 3,
            min_score: 0.0,
            deduplicate: true,
        }
    }
}

/// Embedding provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `hashing` (offline) or `openai`
    pub provider: String,
    pub model: String,
    pub dimension: usize,
    pub base_url: String,
    pub api_key_env: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hashing".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimension: 384,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

/// Dense index backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    /// `memory` or `qdrant`
    pub backend: String,
    pub url: String,
    pub collection: String,
    pub api_key_env: String,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            url: "http://localhost:6333".to_string(),
            collection: "iedp_fragments".to_string(),
            api_key_env: "QDRANT_API_KEY".to_string(),
        }
    }
}

/// Reasoning backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    /// `extractive` (offline) or `openai`
    pub backend: String,
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    pub temperature: f32,
    pub timeout: String,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            backend: "extractive".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.1,
            timeout: "60s".to_string(),
        }
    }
}

/// Orchestrator limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_iterations: usize,
    pub timeout: String,
    pub retry_budget: u32,
    pub retry_backoff: String,
    pub fragments_per_pass: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            timeout: "300s".to_string(),
            retry_budget: 2,
            retry_backoff: "200ms".to_string(),
            fragments_per_pass: 4,
        }
    }
}

impl Config {
    /// Load configuration from a file, applying the profile of `app.env`
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with_profile(path, None)
    }

    /// Load configuration with a specific profile applied
    ///
    /// Order: file, profile (explicit or `app.env`), environment, validation.
    pub fn load_with_profile(path: &Path, profile: Option<&str>) -> Result<Self> {
        if !path.exists() {
            return Err(IedpError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| IedpError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let config: Config = toml::from_str(&content)?;

        config.resolve(profile)
    }

    /// Apply profile and environment overrides, then validate
    pub fn resolve(mut self, profile: Option<&str>) -> Result<Self> {
        let profile = profile
            .map(str::to_string)
            .unwrap_or_else(|| self.app.env.clone());
        self.apply_profile(&profile)?;
        self.app.env = profile;

        self.apply_env_overrides();

        ConfigValidator::validate(&self)?;
        Ok(self)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| IedpError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| IedpError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply a profile's overrides to the configuration
    ///
    /// Unknown profiles are not an error: `development` usually has none.
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let Some(table) = self.profiles.get(profile).cloned() else {
            tracing::debug!("No overrides for profile '{}'", profile);
            return Ok(());
        };

        for (section, keys) in table {
            let Some(keys) = keys.as_table() else {
                return Err(IedpError::InvalidConfigValue {
                    path: format!("profiles.{}.{}", profile, section),
                    message: "profile entries must be tables of section keys".to_string(),
                });
            };
            for (key, value) in keys {
                let raw = match value {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                self.set_value(&section, key, &raw)?;
            }
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: IEDP_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    /// Apply `IEDP_SECTION__KEY` pairs from any source; other keys are ignored
    pub fn apply_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(config_key) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let Some((section, field)) = config_key.split_once("__") else {
                tracing::debug!("Ignoring env var without section separator: {}", key);
                continue;
            };
            if let Err(e) = self.set_value(section, field, &value) {
                tracing::warn!("Failed to apply env override {}: {}", key, e);
            }
        }
    }

    /// Set a single `section.key` from its string form
    pub fn set_value(&mut self, section: &str, key: &str, value: &str) -> Result<()> {
        let section = section.to_ascii_lowercase();
        let key = key.to_ascii_lowercase();
        let path = format!("{}.{}", section, key);

        match (section.as_str(), key.as_str()) {
            ("app", "name") => self.app.name = value.to_string(),
            ("app", "env") => self.app.env = value.to_string(),
            ("app", "debug") => self.app.debug = parse_value(&path, value)?,
            ("app", "log_level") => self.app.log_level = value.to_string(),
            ("app", "log_file") => {
                self.app.log_file = (!value.is_empty()).then(|| PathBuf::from(value))
            }
            ("app", "log_rotation") => self.app.log_rotation = value.to_string(),
            ("app", "log_max_files") => self.app.log_max_files = parse_value(&path, value)?,

            ("server", "host") => self.server.host = value.to_string(),
            ("server", "port") => self.server.port = parse_value(&path, value)?,
            ("server", "workers") => self.server.workers = parse_value(&path, value)?,

            ("paths", "data_dir") => self.paths.data_dir = PathBuf::from(value),
            ("paths", "models_dir") => self.paths.models_dir = PathBuf::from(value),
            ("paths", "cache_dir") => self.paths.cache_dir = PathBuf::from(value),

            ("chunking", "chunk_size") => self.chunking.chunk_size = parse_value(&path, value)?,
            ("chunking", "chunk_overlap") => {
                self.chunking.chunk_overlap = parse_value(&path, value)?
            }

            ("retrieval", "k") => self.retrieval.k = parse_value(&path, value)?,
            ("retrieval", "fusion") => self.retrieval.fusion = value.to_string(),
            ("retrieval", "rrf_k") => self.retrieval.rrf_k = parse_value(&path, value)?,
            ("retrieval", "dense_weight") => {
                self.retrieval.dense_weight = parse_value(&path, value)?
            }
            ("retrieval", "sparse_weight") => {
                self.retrieval.sparse_weight = parse_value(&path, value)?
            }
            ("retrieval", "candidate_multiplier") => {
                self.retrieval.candidate_multiplier = parse_value(&path, value)?
            }
            ("retrieval", "min_score") => self.retrieval.min_score = parse_value(&path, value)?,
            ("retrieval", "deduplicate") => {
                self.retrieval.deduplicate = parse_value(&path, value)?
            }

            ("embedding", "provider") => self.embedding.provider = value.to_string(),
            ("embedding", "model") => self.embedding.model = value.to_string(),
            ("embedding", "dimension") => self.embedding.dimension = parse_value(&path, value)?,
            ("embedding", "base_url") => self.embedding.base_url = value.to_string(),
            ("embedding", "api_key_env") => self.embedding.api_key_env = value.to_string(),

            ("vector_store", "backend") => self.vector_store.backend = value.to_string(),
            ("vector_store", "url") => self.vector_store.url = value.to_string(),
            ("vector_store", "collection") => self.vector_store.collection = value.to_string(),
            ("vector_store", "api_key_env") => {
                self.vector_store.api_key_env = value.to_string()
            }

            ("reasoning", "backend") => self.reasoning.backend = value.to_string(),
            ("reasoning", "model") => self.reasoning.model = value.to_string(),
            ("reasoning", "base_url") => self.reasoning.base_url = value.to_string(),
            ("reasoning", "api_key_env") => self.reasoning.api_key_env = value.to_string(),
            ("reasoning", "temperature") => {
                self.reasoning.temperature = parse_value(&path, value)?
            }
            ("reasoning", "timeout") => self.reasoning.timeout = value.to_string(),

            ("agent", "max_iterations") => {
                self.agent.max_iterations = parse_value(&path, value)?
            }
            ("agent", "timeout") => self.agent.timeout = value.to_string(),
            ("agent", "retry_budget") => self.agent.retry_budget = parse_value(&path, value)?,
            ("agent", "retry_backoff") => self.agent.retry_backoff = value.to_string(),
            ("agent", "fragments_per_pass") => {
                self.agent.fragments_per_pass = parse_value(&path, value)?
            }

            _ => {
                return Err(IedpError::InvalidConfigValue {
                    path,
                    message: "unknown configuration key".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Create the data, models and cache directories
    pub fn create_directories(&self) -> Result<()> {
        for dir in [
            &self.paths.data_dir,
            &self.paths.models_dir,
            &self.paths.cache_dir,
        ] {
            let dir = expand_path(dir);
            std::fs::create_dir_all(&dir).map_err(|e| IedpError::Io {
                source: e,
                context: format!("Failed to create directory: {:?}", dir),
            })?;
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| IedpError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("iedp").join("config.toml"))
    }

    /// Rolling file settings, when `app.log_file` is set
    pub fn log_file(&self) -> Result<Option<LogFile>> {
        let Some(path) = &self.app.log_file else {
            return Ok(None);
        };
        let rotation =
            parse_rotation(&self.app.log_rotation).ok_or_else(|| IedpError::InvalidConfigValue {
                path: "app.log_rotation".to_string(),
                message: format!("Unknown log rotation: {}", self.app.log_rotation),
            })?;

        Ok(Some(
            LogFile::new(expand_path(path)).with_rotation(rotation, self.app.log_max_files),
        ))
    }

    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            chunk_size: self.chunking.chunk_size,
            chunk_overlap: self.chunking.chunk_overlap,
        }
    }

    pub fn fusion_config(&self) -> Result<FusionConfig> {
        let strategy = FusionStrategy::from_str(&self.retrieval.fusion).map_err(|e| {
            IedpError::InvalidConfigValue {
                path: "retrieval.fusion".to_string(),
                message: e.to_string(),
            }
        })?;

        FusionConfig::new(
            strategy,
            self.retrieval.rrf_k,
            self.retrieval.dense_weight,
            self.retrieval.sparse_weight,
        )
        .map_err(|e| IedpError::InvalidConfigValue {
            path: "retrieval".to_string(),
            message: e.to_string(),
        })
    }

    pub fn retriever_settings(&self) -> Result<RetrieverSettings> {
        Ok(RetrieverSettings {
            fusion: self.fusion_config()?,
            candidate_multiplier: self.retrieval.candidate_multiplier.max(1),
            min_score: self.retrieval.min_score,
            deduplicate: self.retrieval.deduplicate,
        })
    }

    pub fn reasoner_config(&self) -> Result<ReasonerConfig> {
        Ok(ReasonerConfig {
            timeout: duration_at("reasoning.timeout", &self.reasoning.timeout)?,
        })
    }

    pub fn orchestrator_config(&self) -> Result<OrchestratorConfig> {
        Ok(OrchestratorConfig {
            max_iterations: self.agent.max_iterations,
            timeout: duration_at("agent.timeout", &self.agent.timeout)?,
            retry_budget: self.agent.retry_budget,
            retry_backoff: duration_at("agent.retry_backoff", &self.agent.retry_backoff)?,
            default_k: self.retrieval.k,
            fragments_per_pass: self.agent.fragments_per_pass.max(1),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig::default(),
            app: AppConfig::default(),
            server: ServerConfig::default(),
            paths: PathsConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            vector_store: VectorStoreConfig::default(),
            reasoning: ReasoningConfig::default(),
            agent: AgentConfig::default(),
            profiles: HashMap::new(),
        }
    }
}

fn parse_value<T: FromStr>(path: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| IedpError::InvalidConfigValue {
        path: path.to_string(),
        message: format!(
            "Cannot parse '{}' as {}",
            value,
            std::any::type_name::<T>()
        ),
    })
}

fn duration_at(path: &str, value: &str) -> Result<Duration> {
    parse_duration(value).ok_or_else(|| IedpError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Invalid duration format: {}", value),
    })
}

/// Parse `"250ms"`, `"60s"`, `"5m"`, `"1h"` or bare seconds (`"30"`, `"1.5"`)
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);

    let value: f64 = number.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }

    let seconds = match unit.trim() {
        "ms" => value / 1000.0,
        "" | "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        _ => return None,
    };
    Duration::try_from_secs_f64(seconds).ok()
}

/// Expand a leading `~/` to the home directory
pub fn expand_path(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
