use std::{env, str::FromStr};

use thiserror::Error;

/// Runtime mode for the binary. `Live` requires a fresh chain snapshot and
/// real credentials; `Sim` tolerates a missing snapshot and is pointed at a
/// local feed simulator via `config.toml`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Live,
    Sim,
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "live" => Ok(Mode::Live),
            "sim" => Ok(Mode::Sim),
            other => Err(ConfigError::UnknownMode {
                value: other.to_string(),
            }),
        }
    }
}

/// Operator-provided credentials pulled from the shell environment.
#[derive(Clone)]
pub struct Secrets {
    pub api_key: String,
}

impl Secrets {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: require_env("MASSIVE_API_KEY")?,
        })
    }
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnv {
        key: key.to_string(),
    })
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown mode '{value}' (expected 'live' or 'sim')")]
    UnknownMode { value: String },
    #[error("missing environment variable {key}")]
    MissingEnv { key: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_parse_case_insensitively() {
        assert_eq!(Mode::from_str("live").unwrap(), Mode::Live);
        assert_eq!(Mode::from_str("SIM").unwrap(), Mode::Sim);
        assert!(Mode::from_str("prod").is_err());
    }
}
