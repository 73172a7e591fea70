//! Configuration for talk2sql.
//!
//! Everything comes from environment variables. `./.env` is loaded via
//! dotenvy first and never overrides variables that are already set.
//! The database connection string has no built-in default: it carries a
//! credential and must be supplied by the deployment.

mod helpers;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;

use helpers::{first_env, optional_env, parse_bool_env, parse_optional_env, parse_string_env};
#[cfg(test)]
use helpers::ENV_MUTEX;

/// Main configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub artifacts: ArtifactConfig,
}

impl Config {
    /// Load everything needed to answer requests.
    ///
    /// Call `dotenvy::dotenv()` first if `./.env` should be honored.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database: DatabaseConfig::resolve()?,
            llm: LlmConfig::resolve()?,
            agent: AgentConfig::resolve()?,
            artifacts: ArtifactConfig::resolve()?,
        })
    }
}

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: SecretString,
    pub pool_size: usize,
    /// Retries on connection faults (never on statement failures).
    pub connect_retries: u32,
    /// Upper bound on one query execution, including connection setup.
    pub query_timeout: Duration,
}

impl DatabaseConfig {
    pub fn resolve() -> Result<Self, ConfigError> {
        let url = first_env(&["TALK2SQL_DATABASE_URL", "DATABASE_URL"])?.ok_or_else(|| {
            ConfigError::MissingRequired {
                key: "TALK2SQL_DATABASE_URL".to_string(),
                hint: "Set TALK2SQL_DATABASE_URL (or DATABASE_URL) to a postgres:// connection string"
                    .to_string(),
            }
        })?;

        if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
            return Err(ConfigError::InvalidValue {
                key: "TALK2SQL_DATABASE_URL".to_string(),
                message: "must start with postgres:// or postgresql://".to_string(),
            });
        }

        let pool_size = parse_optional_env("DATABASE_POOL_SIZE", 4)?;
        if pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "DATABASE_POOL_SIZE".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            url: SecretString::from(url),
            pool_size,
            connect_retries: parse_optional_env("DATABASE_CONNECT_RETRIES", 2)?,
            query_timeout: Duration::from_secs(parse_optional_env(
                "DATABASE_QUERY_TIMEOUT_SECS",
                30,
            )?),
        })
    }

    /// Get the database URL (exposes the secret).
    pub fn url(&self) -> &str {
        self.url.expose_secret()
    }
}

/// Configuration for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub max_retries: u32,
    pub request_timeout: Duration,
}

impl LlmConfig {
    fn resolve() -> Result<Self, ConfigError> {
        let base_url = parse_string_env("LLM_BASE_URL", "https://api.openai.com")?;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "LLM_BASE_URL".to_string(),
                message: "must start with http:// or https://".to_string(),
            });
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: first_env(&["LLM_API_KEY", "OPENAI_API_KEY"])?.map(SecretString::from),
            model: parse_string_env("LLM_MODEL", "gpt-4o-mini")?,
            max_retries: parse_optional_env("LLM_MAX_RETRIES", 3)?,
            request_timeout: Duration::from_secs(parse_optional_env("LLM_TIMEOUT_SECS", 120)?),
        })
    }
}

/// Agent persona and planning bounds.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub profile: String,
    pub goal: String,
    /// Maximum planner steps per request.
    pub max_tool_iterations: usize,
}

impl AgentConfig {
    fn resolve() -> Result<Self, ConfigError> {
        let max_tool_iterations = parse_optional_env("AGENT_MAX_TOOL_ITERATIONS", 10)?;
        if max_tool_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                key: "AGENT_MAX_TOOL_ITERATIONS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            name: parse_string_env("AGENT_NAME", "HealthQueryAgent")?,
            profile: parse_string_env("AGENT_PROFILE", "Medical Data Query Agent")?,
            goal: parse_string_env(
                "AGENT_GOAL",
                "Your goal is to help convert user queries to SQL expressions. You have access to patient records.",
            )?,
            max_tool_iterations,
        })
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "HealthQueryAgent".to_string(),
            profile: "Medical Data Query Agent".to_string(),
            goal: "Your goal is to help convert user queries to SQL expressions. You have access to patient records.".to_string(),
            max_tool_iterations: 10,
        }
    }
}

/// Where artifacts go and how they are shown.
#[derive(Debug, Clone)]
pub struct ArtifactConfig {
    pub dir: PathBuf,
    /// Artifact name used when the caller does not pick one.
    pub default_name: String,
    /// Open rendered views in the system viewer (false = headless).
    pub open_viewer: bool,
    pub display_timeout: Duration,
}

impl ArtifactConfig {
    fn resolve() -> Result<Self, ConfigError> {
        let default_name = parse_string_env("ARTIFACT_NAME", "patient_records")?;
        crate::artifact::ArtifactStore::validate_name(&default_name).map_err(|e| {
            ConfigError::InvalidValue {
                key: "ARTIFACT_NAME".to_string(),
                message: e.to_string(),
            }
        })?;

        Ok(Self {
            dir: optional_env("ARTIFACT_DIR")?
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            default_name,
            open_viewer: parse_bool_env("DISPLAY_OPEN_VIEWER", true)?,
            display_timeout: Duration::from_secs(parse_optional_env("DISPLAY_TIMEOUT_SECS", 5)?),
        })
    }
}
