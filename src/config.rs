use std::env;
use std::path::PathBuf;

use dotenvy::dotenv;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use url::Url;

use crate::error::AssistantError;

const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_OLLAMA_HOST: &str = "http://localhost";
const DEFAULT_OLLAMA_PORT: u16 = 11434;
const DEFAULT_MODEL: &str = "llama3.2:latest";

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub ssl_mode: PgSslMode,
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.name)
            .ssl_mode(self.ssl_mode)
    }
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub host: Url,
    pub port: u16,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub model: ModelConfig,
    pub cleanup_prompt_file: Option<PathBuf>,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, AssistantError> {
        dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable lookup. Every missing
    /// required variable is reported in a single error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AssistantError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let mut missing = Vec::new();
        let mut require = |name: &str| match get(name) {
            Some(value) => value,
            None => {
                missing.push(name.to_string());
                String::new()
            }
        };

        let host = require("DB_HOST");
        let user = require("DB_USER");
        let password = require("DB_PASSWORD");
        let name = require("DB_NAME");

        if !missing.is_empty() {
            return Err(AssistantError::MissingConfig(missing));
        }

        let port = match get("DB_PORT") {
            Some(raw) => parse_port("DB_PORT", &raw)?,
            None => DEFAULT_DB_PORT,
        };
        let ssl_mode = match get("DB_SSLMODE") {
            Some(raw) => parse_ssl_mode(&raw)?,
            None => PgSslMode::Require,
        };

        let model = ModelConfig {
            host: parse_host(get("OLLAMA_HOST").as_deref().unwrap_or(DEFAULT_OLLAMA_HOST))?,
            port: match get("OLLAMA_PORT") {
                Some(raw) => parse_port("OLLAMA_PORT", &raw)?,
                None => DEFAULT_OLLAMA_PORT,
            },
            model: get("OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        };

        Ok(Config {
            database: DatabaseConfig {
                host,
                port,
                user,
                password,
                name,
                ssl_mode,
            },
            model,
            cleanup_prompt_file: get("CLEANUP_PROMPT_FILE").map(PathBuf::from),
        })
    }
}

fn parse_port(name: &str, raw: &str) -> Result<u16, AssistantError> {
    raw.trim()
        .parse::<u16>()
        .map_err(|e| AssistantError::InvalidConfig {
            name: name.to_string(),
            reason: format!("{:?} is not a port number ({})", raw, e),
        })
}

/// The model host must be an absolute http(s) URL, e.g. `http://localhost`.
fn parse_host(raw: &str) -> Result<Url, AssistantError> {
    let invalid = |reason: String| AssistantError::InvalidConfig {
        name: "OLLAMA_HOST".to_string(),
        reason,
    };

    let url = Url::parse(raw.trim()).map_err(|e| invalid(format!("{:?} is not a URL ({})", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
        return Err(invalid(format!(
            "{:?} needs an http:// or https:// scheme and a host name",
            raw
        )));
    }

    Ok(url)
}

fn parse_ssl_mode(raw: &str) -> Result<PgSslMode, AssistantError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "disable" => Ok(PgSslMode::Disable),
        "prefer" => Ok(PgSslMode::Prefer),
        "require" => Ok(PgSslMode::Require),
        other => Err(AssistantError::InvalidConfig {
            name: "DB_SSLMODE".to_string(),
            reason: format!("expected disable, prefer or require, got {:?}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("DB_HOST", "db.example.com"),
        ("DB_USER", "assistant"),
        ("DB_PASSWORD", "secret"),
        ("DB_NAME", "products"),
    ];

    #[test]
    fn applies_defaults() {
        let config = Config::from_lookup(lookup(REQUIRED)).unwrap();

        assert_eq!(config.database.host, "db.example.com");
        assert_eq!(config.database.port, 5432);
        assert!(matches!(config.database.ssl_mode, PgSslMode::Require));
        assert_eq!(config.model.host.as_str(), "http://localhost/");
        assert_eq!(config.model.port, 11434);
        assert_eq!(config.model.model, "llama3.2:latest");
        assert!(config.cleanup_prompt_file.is_none());
    }

    #[test]
    fn reports_all_missing_variables() {
        let err = Config::from_lookup(lookup(&[("DB_HOST", "db"), ("DB_USER", "  ")])).unwrap_err();

        match err {
            AssistantError::MissingConfig(names) => {
                assert_eq!(names, vec!["DB_USER", "DB_PASSWORD", "DB_NAME"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_bad_port_and_ssl_mode() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("DB_PORT", "postgres"));
        let err = Config::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, AssistantError::InvalidConfig { ref name, .. } if name == "DB_PORT"));

        let mut vars = REQUIRED.to_vec();
        vars.push(("DB_SSLMODE", "sometimes"));
        let err = Config::from_lookup(lookup(&vars)).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn model_host_needs_a_scheme() {
        for host in ["localhost", "localhost:11434", "ftp://models.local", "http://"] {
            let mut vars = REQUIRED.to_vec();
            vars.push(("OLLAMA_HOST", host));
            let err = Config::from_lookup(lookup(&vars)).unwrap_err();
            assert!(
                matches!(err, AssistantError::InvalidConfig { ref name, .. } if name == "OLLAMA_HOST"),
                "{host} was accepted"
            );
        }

        let mut vars = REQUIRED.to_vec();
        vars.push(("OLLAMA_HOST", "https://models.internal"));
        let config = Config::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.model.host.host_str(), Some("models.internal"));
    }

    #[test]
    fn reads_overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("DB_PORT", "6543"),
            ("DB_SSLMODE", "Disable"),
            ("OLLAMA_MODEL", "mistral"),
            ("CLEANUP_PROMPT_FILE", "prompts/cleanup.txt"),
        ]);
        let config = Config::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(config.database.port, 6543);
        assert!(matches!(config.database.ssl_mode, PgSslMode::Disable));
        assert_eq!(config.model.model, "mistral");
        assert_eq!(
            config.cleanup_prompt_file,
            Some(PathBuf::from("prompts/cleanup.txt"))
        );
    }
}
