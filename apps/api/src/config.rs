use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};

/// Where the per-key request logs for rate limiting live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitStorage {
    Memory,
    Redis,
}

impl FromStr for RateLimitStorage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "" => Ok(RateLimitStorage::Memory),
            "redis" => Ok(RateLimitStorage::Redis),
            other => bail!("RATE_LIMIT_STORAGE must be 'memory' or 'redis', got '{other}'"),
        }
    }
}

/// A sibling service polled by the health monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorTarget {
    pub key: String,
    pub name: String,
    pub url: String,
}

/// LLM provider settings (OpenAI-compatible chat + embeddings API).
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// LLM-backed features degrade gracefully when unset.
    pub api_key: Option<String>,
    pub base_url: String,
    pub chat_model: String,
    pub temperature: f32,
    pub embedding_model: String,
    pub embedding_dimension: usize,
}

/// Retrieval and offline indexing settings.
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub max_retrieval_results: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub structure_with_llm: bool,
    pub structure_max_chunk_size: usize,
    pub structure_chunk_overlap: usize,
    pub structure_enable_chunking: bool,
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub environment: String,
    pub database_url: String,
    pub data_dir: PathBuf,
    pub jwt_secret: String,
    pub jwt_access_ttl_secs: i64,
    pub jwt_refresh_ttl_secs: i64,
    pub firebase_project_id: Option<String>,
    pub allowed_origins: Vec<String>,
    pub rate_limit_storage: RateLimitStorage,
    pub redis_url: Option<String>,
    pub llm: LlmConfig,
    pub rag: RagConfig,
    pub monitor_targets: Vec<MonitorTarget>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let rate_limit_storage: RateLimitStorage = optional_env("RATE_LIMIT_STORAGE")
            .unwrap_or_else(|| "memory".to_string())
            .parse()?;
        let redis_url = optional_env("REDIS_URL");
        if rate_limit_storage == RateLimitStorage::Redis && redis_url.is_none() {
            bail!("REDIS_URL must be set when RATE_LIMIT_STORAGE=redis");
        }

        Ok(Config {
            port: parse_env("PORT", 8080)?,
            rust_log: optional_env("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            environment: optional_env("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            database_url: optional_env("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://compass.db?mode=rwc".to_string()),
            data_dir: PathBuf::from(optional_env("DATA_DIR").unwrap_or_else(|| "data".to_string())),
            jwt_secret: require_env("JWT_SECRET_KEY")?,
            jwt_access_ttl_secs: parse_env("JWT_ACCESS_TOKEN_EXPIRES", 1800)?,
            jwt_refresh_ttl_secs: parse_env("JWT_REFRESH_TOKEN_EXPIRES", 2_592_000)?,
            firebase_project_id: optional_env("FIREBASE_PROJECT_ID"),
            allowed_origins: parse_list(&optional_env("ALLOWED_ORIGINS").unwrap_or_default()),
            rate_limit_storage,
            redis_url,
            llm: LlmConfig {
                api_key: optional_env("LLM_API_KEY"),
                base_url: optional_env("LLM_BASE_URL")
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
                chat_model: optional_env("LLM_CHAT_MODEL")
                    .unwrap_or_else(|| "gpt-4o-mini".to_string()),
                temperature: parse_env("LLM_TEMPERATURE", 0.1)?,
                embedding_model: optional_env("EMBEDDING_MODEL_NAME")
                    .unwrap_or_else(|| "text-embedding-3-small".to_string()),
                embedding_dimension: parse_env("EMBEDDING_DIMENSION", 1536)?,
            },
            rag: RagConfig {
                max_retrieval_results: parse_env("MAX_RETRIEVAL_RESULTS", 5)?,
                chunk_size: parse_env("CHUNK_SIZE", 1000)?,
                chunk_overlap: parse_env("CHUNK_OVERLAP", 200)?,
                structure_with_llm: parse_env("STRUCTURE_WITH_LLM", false)?,
                structure_max_chunk_size: parse_env("STRUCTURE_MAX_CHUNK_SIZE", 20_000)?,
                structure_chunk_overlap: parse_env("STRUCTURE_CHUNK_OVERLAP", 2_000)?,
                structure_enable_chunking: parse_env("STRUCTURE_ENABLE_CHUNKING", true)?,
            },
            monitor_targets: parse_monitor_targets(
                &optional_env("MONITOR_TARGETS").unwrap_or_default(),
            )?,
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Returns the variable when set and non-blank.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} has an invalid value '{raw}': {e}")),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Parses `key|Display Name|url` entries separated by commas.
fn parse_monitor_targets(raw: &str) -> Result<Vec<MonitorTarget>> {
    parse_list(raw)
        .into_iter()
        .map(|entry| {
            let parts: Vec<&str> = entry.splitn(3, '|').map(str::trim).collect();
            match parts.as_slice() {
                [key, name, url] if !key.is_empty() && !url.is_empty() => Ok(MonitorTarget {
                    key: key.to_string(),
                    name: name.to_string(),
                    url: url.to_string(),
                }),
                _ => bail!("MONITOR_TARGETS entry '{entry}' must look like key|Name|url"),
            }
        })
        .collect()
}

#[cfg(test)]
impl Config {
    /// A config suitable for unit tests: in-memory database, no LLM, no identity provider.
    pub fn for_tests() -> Self {
        Config {
            port: 0,
            rust_log: "debug".to_string(),
            environment: "test".to_string(),
            database_url: "sqlite::memory:".to_string(),
            data_dir: PathBuf::from("data"),
            jwt_secret: "test-secret".to_string(),
            jwt_access_ttl_secs: 1800,
            jwt_refresh_ttl_secs: 2_592_000,
            firebase_project_id: None,
            allowed_origins: vec![],
            rate_limit_storage: RateLimitStorage::Memory,
            redis_url: None,
            llm: LlmConfig {
                api_key: None,
                base_url: "http://localhost:0".to_string(),
                chat_model: "test-chat".to_string(),
                temperature: 0.1,
                embedding_model: "test-embed".to_string(),
                embedding_dimension: 3,
            },
            rag: RagConfig {
                max_retrieval_results: 5,
                chunk_size: 1000,
                chunk_overlap: 200,
                structure_with_llm: false,
                structure_max_chunk_size: 20_000,
                structure_chunk_overlap: 2_000,
                structure_enable_chunking: true,
            },
            monitor_targets: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_skips_blanks() {
        assert_eq!(
            parse_list(" http://a.com , ,http://b.com"),
            vec!["http://a.com".to_string(), "http://b.com".to_string()]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_parse_monitor_targets() {
        let targets =
            parse_monitor_targets("cv|CV Evaluation Service|http://cv:5000/health").unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].key, "cv");
        assert_eq!(targets[0].name, "CV Evaluation Service");
        assert_eq!(targets[0].url, "http://cv:5000/health");
    }

    #[test]
    fn test_parse_monitor_targets_rejects_malformed() {
        assert!(parse_monitor_targets("just-a-url").is_err());
    }

    #[test]
    fn test_rate_limit_storage_parse() {
        assert_eq!("memory".parse::<RateLimitStorage>().unwrap(), RateLimitStorage::Memory);
        assert_eq!("REDIS".parse::<RateLimitStorage>().unwrap(), RateLimitStorage::Redis);
        assert!("postgres".parse::<RateLimitStorage>().is_err());
    }
}
