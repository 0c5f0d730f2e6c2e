//! Runtime configuration: env-driven, no config files, `EMAIL_INTEL_`-
//! prefixed variables, parsed once at startup with `.expect()`/
//! `unwrap_or_else` — the way `sem_os_server::main` reads `SEM_OS_*`.
//! Business logic never reads the environment directly.

use ei_pipeline::config::PipelineConfig;

pub struct Config {
    pub database_url: String,
    pub qdrant_url: String,
    pub qdrant_collection: String,
    pub provider_base_url: String,
    pub provider_access_token: String,
    pub ollama_base_url: String,
    pub embedding_model: String,
    pub generation_model: String,
    pub embedding_dimension: usize,
    pub bind_addr: String,
    pub calendar_enabled: bool,
    pub pipeline: PipelineConfig,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    /// Reads every `EMAIL_INTEL_*` variable this process needs. Panics with
    /// a descriptive message on a missing required value, at startup, not
    /// mid-pipeline.
    pub fn from_env() -> Self {
        let database_url = std::env::var("EMAIL_INTEL_DATABASE_URL")
            .expect("EMAIL_INTEL_DATABASE_URL must be set");
        let provider_access_token = std::env::var("EMAIL_INTEL_PROVIDER_ACCESS_TOKEN")
            .expect("EMAIL_INTEL_PROVIDER_ACCESS_TOKEN must be set");

        let qdrant_host = env_or("EMAIL_INTEL_QDRANT_HOST", "localhost");
        let qdrant_port: u16 = env_parsed_or("EMAIL_INTEL_QDRANT_PORT", 6333);

        let mut pipeline = PipelineConfig::default();
        pipeline.similarity_threshold = env_parsed_or("EMAIL_INTEL_SIMILARITY_THRESHOLD", pipeline.similarity_threshold);
        pipeline.labeler_version = env_or("EMAIL_INTEL_LABEL_VERSION", &pipeline.labeler_version);

        Config {
            database_url,
            qdrant_url: format!("http://{qdrant_host}:{qdrant_port}"),
            qdrant_collection: env_or("EMAIL_INTEL_QDRANT_COLLECTION", "email_intelligence"),
            provider_base_url: env_or("EMAIL_INTEL_PROVIDER_BASE_URL", "https://gmail.googleapis.com"),
            provider_access_token,
            ollama_base_url: env_or("EMAIL_INTEL_OLLAMA_HOST", "http://localhost:11434"),
            embedding_model: env_or("EMAIL_INTEL_EMBEDDING_MODEL", "all-minilm"),
            generation_model: env_or("EMAIL_INTEL_OLLAMA_MODEL", "llama3.1:8b"),
            embedding_dimension: env_parsed_or("EMAIL_INTEL_EMBEDDING_DIMENSION", 384),
            bind_addr: env_or("EMAIL_INTEL_BIND_ADDR", "0.0.0.0:4600"),
            calendar_enabled: env_parsed_or("EMAIL_INTEL_CALENDAR_ENABLED", 0) != 0,
            pipeline,
        }
    }
}
