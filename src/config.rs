use std::{env, path::PathBuf};

use thiserror::Error;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_BODY_LIMIT_MB: usize = 10;
const DEFAULT_MODEL_PATH: &str = "model/tomato_disease_model.pb";
const DEFAULT_INPUT_OP: &str = "x";
const DEFAULT_OUTPUT_OP: &str = "Identity";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key} has invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Runtime settings, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub body_limit_bytes: usize,
    pub model_path: PathBuf,
    pub model_url: Option<String>,
    pub github_token: Option<String>,
    pub input_op: String,
    pub output_op: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| ConfigError::Invalid {
                key: "PORT",
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        let body_limit_mb = match get("BODY_LIMIT_MB") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(mb) if mb > 0 => mb,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "BODY_LIMIT_MB",
                        value: raw,
                    })
                }
            },
            None => DEFAULT_BODY_LIMIT_MB,
        };

        Ok(Config {
            host: get("HOST").unwrap_or_else(|| DEFAULT_HOST.into()),
            port,
            body_limit_bytes: body_limit_mb * 1024 * 1024,
            model_path: get("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            model_url: get("MODEL_URL"),
            github_token: get("GITHUB_TOKEN"),
            input_op: get("MODEL_INPUT_OP").unwrap_or_else(|| DEFAULT_INPUT_OP.into()),
            output_op: get("MODEL_OUTPUT_OP").unwrap_or_else(|| DEFAULT_OUTPUT_OP.into()),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            body_limit_bytes: DEFAULT_BODY_LIMIT_MB * 1024 * 1024,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            model_url: None,
            github_token: None,
            input_op: DEFAULT_INPUT_OP.into(),
            output_op: DEFAULT_OUTPUT_OP.into(),
        }
    }
}
