// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment at startup (after an optional
//! `.env` file). Invalid values abort startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding `credentials.redb` | `./data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `5000` |
//! | `JWT_SECRET` | HMAC secret for signing tokens | Required |
//! | `JWT_EXPIRES_IN` | Token lifetime (`7d`, `12h`, ...) | `7d` |
//! | `BCRYPT_COST` | bcrypt work factor (4..=31) | `10` |
//! | `STORE_TIMEOUT` | Per-request store call timeout | `10s` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::{net::IpAddr, path::PathBuf, time::Duration};

use thiserror::Error;

pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";
pub const JWT_EXPIRES_IN_ENV: &str = "JWT_EXPIRES_IN";
pub const BCRYPT_COST_ENV: &str = "BCRYPT_COST";
pub const STORE_TIMEOUT_ENV: &str = "STORE_TIMEOUT";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_JWT_EXPIRES_IN: &str = "7d";
pub const DEFAULT_BCRYPT_COST: u32 = 10;
pub const DEFAULT_STORE_TIMEOUT: &str = "10s";

/// Work factors bcrypt accepts.
pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

#[derive(Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub host: IpAddr,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_expires_in: Duration,
    pub bcrypt_cost: u32,
    pub store_timeout: Duration,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("data_dir", &self.data_dir)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("jwt_secret", &"<redacted>")
            .field("jwt_expires_in", &self.jwt_expires_in)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("store_timeout", &self.store_timeout)
            .field("log_format", &self.log_format)
            .finish()
    }
}

fn invalid(var: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_duration(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let duration = humantime::parse_duration(value).map_err(|e| invalid(var, value, e))?;
    if duration.is_zero() {
        return Err(invalid(var, value, "must be greater than zero"));
    }
    Ok(duration)
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_dir = PathBuf::from(get(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.into()));

        let host_raw = get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.into());
        let host = host_raw
            .trim()
            .parse()
            .map_err(|e| invalid(HOST_ENV, &host_raw, e))?;

        let port = match get(PORT_ENV) {
            Some(raw) => raw.trim().parse().map_err(|e| invalid(PORT_ENV, &raw, e))?,
            None => DEFAULT_PORT,
        };

        let jwt_secret = get(JWT_SECRET_ENV).ok_or(ConfigError::Missing(JWT_SECRET_ENV))?;

        let expires_raw = get(JWT_EXPIRES_IN_ENV).unwrap_or_else(|| DEFAULT_JWT_EXPIRES_IN.into());
        let jwt_expires_in = parse_duration(JWT_EXPIRES_IN_ENV, &expires_raw)?;

        let bcrypt_cost = match get(BCRYPT_COST_ENV) {
            Some(raw) => {
                let cost: u32 = raw
                    .trim()
                    .parse()
                    .map_err(|e| invalid(BCRYPT_COST_ENV, &raw, e))?;
                if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&cost) {
                    return Err(invalid(
                        BCRYPT_COST_ENV,
                        &raw,
                        format!("must be in {MIN_BCRYPT_COST}..={MAX_BCRYPT_COST}"),
                    ));
                }
                cost
            }
            None => DEFAULT_BCRYPT_COST,
        };

        let timeout_raw = get(STORE_TIMEOUT_ENV).unwrap_or_else(|| DEFAULT_STORE_TIMEOUT.into());
        let store_timeout = parse_duration(STORE_TIMEOUT_ENV, &timeout_raw)?;

        let log_format = match get(LOG_FORMAT_ENV) {
            None => LogFormat::default(),
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                _ => return Err(invalid(LOG_FORMAT_ENV, &raw, "expected 'json' or 'pretty'")),
            },
        };

        Ok(Self {
            data_dir,
            host,
            port,
            jwt_secret,
            jwt_expires_in,
            bcrypt_cost,
            store_timeout,
            log_format,
        })
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(crate::storage::STORE_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let config = load(&[(JWT_SECRET_ENV, "s3cret")]).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.host.to_string(), "0.0.0.0");
        assert_eq!(config.port, 5000);
        assert_eq!(config.jwt_expires_in, Duration::from_secs(7 * 24 * 3600));
        assert_eq!(config.bcrypt_cost, 10);
        assert_eq!(config.store_timeout, Duration::from_secs(10));
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.store_path(), PathBuf::from("./data/credentials.redb"));
    }

    #[test]
    fn missing_or_blank_secret_is_an_error() {
        assert_eq!(load(&[]).unwrap_err(), ConfigError::Missing(JWT_SECRET_ENV));
        assert_eq!(
            load(&[(JWT_SECRET_ENV, "  ")]).unwrap_err(),
            ConfigError::Missing(JWT_SECRET_ENV)
        );
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            (JWT_SECRET_ENV, "s"),
            (PORT_ENV, "8080"),
            (HOST_ENV, "127.0.0.1"),
            (JWT_EXPIRES_IN_ENV, "12h"),
            (BCRYPT_COST_ENV, "4"),
            (STORE_TIMEOUT_ENV, "250ms"),
            (LOG_FORMAT_ENV, "JSON"),
            (DATA_DIR_ENV, "/var/lib/users"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.jwt_expires_in, Duration::from_secs(12 * 3600));
        assert_eq!(config.bcrypt_cost, 4);
        assert_eq!(config.store_timeout, Duration::from_millis(250));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/users"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let cases = [
            (PORT_ENV, "eighty"),
            (HOST_ENV, "not-an-ip"),
            (JWT_EXPIRES_IN_ENV, "forever"),
            (JWT_EXPIRES_IN_ENV, "0s"),
            (BCRYPT_COST_ENV, "3"),
            (BCRYPT_COST_ENV, "32"),
            (LOG_FORMAT_ENV, "xml"),
        ];
        for (var, value) in cases {
            let err = load(&[(JWT_SECRET_ENV, "s"), (var, value)]).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { var: v, .. } if v == var),
                "{var}={value} should be invalid, got {err:?}"
            );
        }
    }

    #[test]
    fn debug_redacts_secret() {
        let config = load(&[(JWT_SECRET_ENV, "super-secret-value")]).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret-value"));
        assert!(rendered.contains("<redacted>"));
    }
}
