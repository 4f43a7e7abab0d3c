//! File and environment configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Runtime configuration, read from TOML and then overridden by the
/// environment. Every section and field is optional in the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Graph store location.
    pub database: DatabaseConfig,
    /// HTTP listener.
    pub server: ServerConfig,
    /// Log filter.
    pub log: LogConfig,
    /// CSV import directory.
    pub import: ImportDirConfig,
}

/// `[database]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQLite file holding the graph.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: PathBuf::from("menugraph.db"),
        }
    }
}

/// `[server]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// CORS origins; `"*"` allows any origin, empty disables CORS headers.
    pub allow_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 8080,
            allow_origins: Vec::new(),
        }
    }
}

/// `[log]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info` or `menugraph=debug`.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "info".into(),
        }
    }
}

/// `[import]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportDirConfig {
    /// Directory holding the four CSV files.
    pub data_dir: PathBuf,
}

impl Default for ImportDirConfig {
    fn default() -> Self {
        ImportDirConfig {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl Config {
    /// Loads `explicit`, or the per-user default location, then applies
    /// environment overrides. A missing default file yields the defaults; a
    /// missing explicit file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => read_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => read_file(&path)?,
                _ => Config::default(),
            },
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Parses a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Applies `MENUGRAPH_*` / `APP_PORT` overrides using `lookup` to read
    /// variables. `MENUGRAPH_PORT` wins over `APP_PORT`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        if let Some(path) = lookup("MENUGRAPH_DB") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(host) = lookup("MENUGRAPH_HOST") {
            self.server.host = host;
        }
        for name in ["APP_PORT", "MENUGRAPH_PORT"] {
            if let Some(raw) = lookup(name) {
                self.server.port = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                    name: name.to_string(),
                    value: raw.clone(),
                })?;
            }
        }
        if let Some(level) = lookup("MENUGRAPH_LOG") {
            self.log.level = level;
        }
        if let Some(dir) = lookup("MENUGRAPH_DATA_DIR") {
            self.import.data_dir = PathBuf::from(dir);
        }
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Config::from_toml(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Offending file.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`Config`].
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// Offending file.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
    /// An environment override could not be parsed.
    #[error("environment variable {name} has invalid value '{value}'")]
    InvalidEnv {
        /// Variable name.
        name: String,
        /// Raw value.
        value: String,
    },
}

/// `<config dir>/menugraph/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("menugraph").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = Config::from_toml("[server]\nport = 9000\n").unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.database.path, PathBuf::from("menugraph.db"));
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_toml("[server]\nprot = 1\n").is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = Config::from_toml(
            "[database]\npath = \"a.db\"\n[import]\ndata_dir = \"in\"\n",
        )
        .unwrap();
        config
            .apply_env(env(&[
                ("MENUGRAPH_DB", "b.db"),
                ("APP_PORT", "7000"),
                ("MENUGRAPH_PORT", "7100"),
                ("MENUGRAPH_DATA_DIR", ""),
            ]))
            .unwrap();
        assert_eq!(config.database.path, PathBuf::from("b.db"));
        assert_eq!(config.server.port, 7100);
        assert_eq!(config.import.data_dir, PathBuf::from("in"));
    }

    #[test]
    fn bad_port_names_the_variable() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("APP_PORT", "eighty")]))
            .unwrap_err();
        assert!(err.to_string().contains("APP_PORT"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
