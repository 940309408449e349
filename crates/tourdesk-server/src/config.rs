//! Server configuration.
//!
//! Sources in priority order: environment variables, the optional TOML file,
//! built-in defaults. Keys that fall back to a default are recorded in
//! [`ServerConfig::defaulted`] so the binary can report them once logging is up.

use serde::Deserialize;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, fs};

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATABASE_URL: &str = "sqlite://tourdesk.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_EXPIRE_SWEEP_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'text' or 'json', got '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,
    /// Seconds between expiry sweeps; 0 disables the sweeper
    pub expire_sweep_secs: u64,
    pub log_format: LogFormat,
    /// Keys that were not set anywhere
    pub defaulted: Vec<&'static str>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid {key} '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Shape of the TOML file; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    bind_address: Option<String>,
    port: Option<u16>,
    database_url: Option<String>,
    max_connections: Option<u32>,
    expire_sweep_secs: Option<u64>,
    log_format: Option<LogFormat>,
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl ServerConfig {
    /// Read `path` (if given) and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => read_file(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(file, |key| env::var(key).ok())
    }

    /// Resolve from TOML text and an explicit variable lookup
    pub fn from_sources(
        toml_text: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let file = toml::from_str(toml_text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        Self::resolve(file, lookup)
    }

    fn resolve(
        file: FileConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut defaulted = Vec::new();
        let mut sources = Sources {
            lookup: &lookup,
            defaulted: &mut defaulted,
        };

        let bind_address = sources.pick(
            "bind_address",
            "TOURDESK_BIND_ADDRESS",
            file.bind_address,
            DEFAULT_BIND_ADDRESS.to_string(),
        )?;
        let port = sources.pick("port", "TOURDESK_PORT", file.port, DEFAULT_PORT)?;
        let database_url = sources.pick(
            "database_url",
            "TOURDESK_DATABASE_URL",
            file.database_url,
            DEFAULT_DATABASE_URL.to_string(),
        )?;
        let max_connections = sources.pick(
            "max_connections",
            "TOURDESK_MAX_CONNECTIONS",
            file.max_connections,
            DEFAULT_MAX_CONNECTIONS,
        )?;
        let expire_sweep_secs = sources.pick(
            "expire_sweep_secs",
            "TOURDESK_EXPIRE_SWEEP_SECS",
            file.expire_sweep_secs,
            DEFAULT_EXPIRE_SWEEP_SECS,
        )?;
        let log_format = sources.pick("log_format", "LOG_FORMAT", file.log_format, LogFormat::Text)?;

        if max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "max_connections",
                value: "0".to_string(),
                reason: "at least one connection is required".to_string(),
            });
        }
        if database_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "database_url",
                value: database_url,
                reason: "must not be empty".to_string(),
            });
        }

        Ok(Self {
            bind_address,
            port,
            database_url,
            max_connections,
            expire_sweep_secs,
            log_format,
            defaulted,
        })
    }

    #[must_use]
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

struct Sources<'a, F> {
    lookup: &'a F,
    defaulted: &'a mut Vec<&'static str>,
}

impl<F: Fn(&str) -> Option<String>> Sources<'_, F> {
    fn pick<T>(
        &mut self,
        key: &'static str,
        env_key: &str,
        from_file: Option<T>,
        default: T,
    ) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        if let Some(raw) = (self.lookup)(env_key) {
            return raw.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
                key,
                value: raw.clone(),
                reason: err.to_string(),
            });
        }
        if let Some(value) = from_file {
            return Ok(value);
        }
        self.defaulted.push(key);
        Ok(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_sources_use_defaults() {
        let config = ServerConfig::from_sources("", env(&[])).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.defaulted.len(), 6);
        assert_eq!(config.listen_address(), "0.0.0.0:8080");
    }

    #[test]
    fn environment_overrides_file() {
        let config = ServerConfig::from_sources(
            "port = 9000\ndatabase_url = \"sqlite://file.db\"\n",
            env(&[("TOURDESK_PORT", "9100"), ("LOG_FORMAT", "JSON")]),
        )
        .unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.database_url, "sqlite://file.db");
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(!config.defaulted.contains(&"port"));
        assert!(config.defaulted.contains(&"bind_address"));
    }

    #[test]
    fn bad_values_are_errors() {
        let err = ServerConfig::from_sources("", env(&[("TOURDESK_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "port", .. }));

        let err = ServerConfig::from_sources("max_connections = 0", env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "max_connections", .. }));

        let err = ServerConfig::from_sources("colour = \"blue\"", env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn config_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tourdesk.toml");
        fs::write(&path, "expire_sweep_secs = 0\nlog_format = \"json\"\n").unwrap();
        let file = read_file(&path).unwrap();
        let config = ServerConfig::resolve(file, |_| None).unwrap();
        assert_eq!(config.expire_sweep_secs, 0);
        assert_eq!(config.log_format, LogFormat::Json);

        let missing = read_file(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }
}
