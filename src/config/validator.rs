use crate::config::{parse_duration, Config, SCHEMA_VERSION};
use crate::error::{IedpError, Result, ValidationError};
use crate::logging::{parse_level, parse_rotation};
use crate::retrieval::FusionStrategy;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, reporting every violation at once
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_app(config, &mut errors);
        Self::validate_server(config, &mut errors);
        Self::validate_chunking(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_vector_store(config, &mut errors);
        Self::validate_reasoning(config, &mut errors);
        Self::validate_agent(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(IedpError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_app(config: &Config, errors: &mut Vec<ValidationError>) {
        if parse_level(&config.app.log_level).is_none() {
            errors.push(ValidationError::new(
                "app.log_level",
                format!(
                    "Log level must be one of DEBUG, INFO, WARNING, ERROR, CRITICAL, got '{}'",
                    config.app.log_level
                ),
            ));
        }

        if parse_rotation(&config.app.log_rotation).is_none() {
            errors.push(ValidationError::new(
                "app.log_rotation",
                format!(
                    "Log rotation must be one of minutely, hourly, daily, never, got '{}'",
                    config.app.log_rotation
                ),
            ));
        }

        if config.app.log_max_files == 0 {
            errors.push(ValidationError::new(
                "app.log_max_files",
                "At least one log file must be kept",
            ));
        }

        if config.app.env.trim().is_empty() {
            errors.push(ValidationError::new("app.env", "Environment cannot be empty"));
        }
    }

    fn validate_server(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.server.port == 0 {
            errors.push(ValidationError::new(
                "server.port",
                "Port must be greater than 0",
            ));
        }

        if config.server.workers == 0 {
            errors.push(ValidationError::new(
                "server.workers",
                "Worker count must be greater than 0",
            ));
        }
    }

    fn validate_chunking(config: &Config, errors: &mut Vec<ValidationError>) {
        let chunking = &config.chunking;
        if chunking.chunk_size == 0 {
            errors.push(ValidationError::new(
                "chunking.chunk_size",
                "Chunk size must be greater than 0",
            ));
        } else if chunking.chunk_overlap >= chunking.chunk_size {
            errors.push(ValidationError::new(
                "chunking.chunk_overlap",
                format!(
                    "Chunk overlap ({}) must be smaller than chunk size ({})",
                    chunking.chunk_overlap, chunking.chunk_size
                ),
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        if retrieval.k == 0 {
            errors.push(ValidationError::new(
                "retrieval.k",
                "k must be at least 1",
            ));
        }

        if retrieval.fusion.parse::<FusionStrategy>().is_err() {
            errors.push(ValidationError::new(
                "retrieval.fusion",
                format!(
                    "Fusion must be 'rrf' or 'weighted', got '{}'",
                    retrieval.fusion
                ),
            ));
        }

        if !retrieval.rrf_k.is_finite() || retrieval.rrf_k <= 0.0 {
            errors.push(ValidationError::new(
                "retrieval.rrf_k",
                format!("RRF k must be positive, got {}", retrieval.rrf_k),
            ));
        }

        for (path, weight) in [
            ("retrieval.dense_weight", retrieval.dense_weight),
            ("retrieval.sparse_weight", retrieval.sparse_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                errors.push(ValidationError::new(
                    path,
                    format!("Weight must be a non-negative number, got {}", weight),
                ));
            }
        }

        if retrieval.dense_weight == 0.0 && retrieval.sparse_weight == 0.0 {
            errors.push(ValidationError::new(
                "retrieval",
                "dense_weight and sparse_weight cannot both be zero",
            ));
        }

        if retrieval.candidate_multiplier == 0 {
            errors.push(ValidationError::new(
                "retrieval.candidate_multiplier",
                "Candidate multiplier must be at least 1",
            ));
        }

        if !retrieval.min_score.is_finite() {
            errors.push(ValidationError::new(
                "retrieval.min_score",
                "Minimum score must be a finite number",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let provider = &config.embedding.provider;
        let valid_providers = ["hashing", "openai"];
        if !valid_providers.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "embedding.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, provider
                ),
            ));
        }

        if config.embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Embedding dimension must be greater than 0",
            ));
        }

        if provider == "openai" {
            if config.embedding.model.is_empty() {
                errors.push(ValidationError::new(
                    "embedding.model",
                    "Model name cannot be empty",
                ));
            }
            Self::validate_api_key("embedding.api_key_env", &config.embedding.api_key_env, errors);
        }
    }

    fn validate_vector_store(config: &Config, errors: &mut Vec<ValidationError>) {
        let store = &config.vector_store;
        match store.backend.as_str() {
            "memory" => {}
            "qdrant" => {
                if store.url.is_empty() {
                    errors.push(ValidationError::new(
                        "vector_store.url",
                        "Qdrant URL cannot be empty",
                    ));
                }
                if store.collection.is_empty() {
                    errors.push(ValidationError::new(
                        "vector_store.collection",
                        "Collection name cannot be empty",
                    ));
                }
            }
            other => errors.push(ValidationError::new(
                "vector_store.backend",
                format!("Backend must be 'memory' or 'qdrant', got '{}'", other),
            )),
        }
    }

    fn validate_reasoning(config: &Config, errors: &mut Vec<ValidationError>) {
        let reasoning = &config.reasoning;
        let valid_backends = ["extractive", "openai"];
        if !valid_backends.contains(&reasoning.backend.as_str()) {
            errors.push(ValidationError::new(
                "reasoning.backend",
                format!(
                    "Backend must be one of {:?}, got '{}'",
                    valid_backends, reasoning.backend
                ),
            ));
        }

        if reasoning.backend == "openai" {
            Self::validate_api_key("reasoning.api_key_env", &reasoning.api_key_env, errors);
        }

        let temp = reasoning.temperature;
        if !(0.0..=2.0).contains(&temp) {
            errors.push(ValidationError::new(
                "reasoning.temperature",
                format!("Temperature must be between 0.0 and 2.0, got {}", temp),
            ));
        }

        Self::validate_positive_duration("reasoning.timeout", &reasoning.timeout, errors);
    }

    fn validate_agent(config: &Config, errors: &mut Vec<ValidationError>) {
        let agent = &config.agent;

        if agent.max_iterations == 0 {
            errors.push(ValidationError::new(
                "agent.max_iterations",
                "Max iterations must be at least 1",
            ));
        }

        if agent.fragments_per_pass == 0 {
            errors.push(ValidationError::new(
                "agent.fragments_per_pass",
                "Fragments per pass must be at least 1",
            ));
        }

        Self::validate_positive_duration("agent.timeout", &agent.timeout, errors);

        if parse_duration(&agent.retry_backoff).is_none() {
            errors.push(ValidationError::new(
                "agent.retry_backoff",
                format!("Invalid duration format: {}", agent.retry_backoff),
            ));
        }
    }

    fn validate_positive_duration(path: &str, value: &str, errors: &mut Vec<ValidationError>) {
        match parse_duration(value) {
            Some(d) if !d.is_zero() => {}
            Some(_) => errors.push(ValidationError::new(path, "Duration must be greater than 0")),
            None => errors.push(ValidationError::new(
                path,
                format!("Invalid duration format: {}", value),
            )),
        }
    }

    fn validate_api_key(path: &str, env_var: &str, errors: &mut Vec<ValidationError>) {
        match std::env::var(env_var) {
            Ok(key) if !key.is_empty() => {}
            Ok(_) => errors.push(ValidationError::new(
                path,
                format!("Environment variable {} is empty", env_var),
            )),
            Err(_) => errors.push(ValidationError::new(
                path,
                format!("Environment variable {} is not set", env_var),
            )),
        }
    }
}
