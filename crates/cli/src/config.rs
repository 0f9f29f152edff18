//! `recluster serve` configuration.
//!
//! Sources, highest precedence first: command-line flags, `RECLUSTER_*`
//! environment variables, the TOML config file, built-in defaults.

use std::path::{Path, PathBuf};

use recluster_core::ALGORITHMS_VERSION;
use serde::Deserialize;

pub(crate) const DEFAULT_PORT: u16 = 8080;

const ENV_PORT: &str = "RECLUSTER_PORT";
const ENV_API_KEY: &str = "RECLUSTER_API_KEY";
const ENV_ALGORITHMS_VERSION: &str = "RECLUSTER_ALGORITHMS_VERSION";

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value for {name}: '{value}'")]
    InvalidEnv { name: &'static str, value: String },

    #[error("algorithms version must be positive, got {0}")]
    InvalidAlgorithmsVersion(i64),
}

/// Contents of the TOML config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    port: Option<u16>,
    algorithms_version: Option<i64>,
    api_key: Option<String>,
}

/// Resolved server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ServiceConfig {
    pub(crate) port: u16,
    /// Algorithms version this server reports as latest.
    pub(crate) algorithms_version: i64,
    /// API key required on every endpoint but `/health`. None = no auth.
    pub(crate) api_key: Option<String>,
}

impl ServiceConfig {
    /// Load from `path` (if given) and the process environment, then apply
    /// the `--port` flag.
    pub(crate) fn load(path: Option<&Path>, port_flag: Option<u16>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => read_file(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(file, |name| std::env::var(name).ok(), port_flag)
    }

    fn resolve(
        file: FileConfig,
        lookup: impl Fn(&str) -> Option<String>,
        port_flag: Option<u16>,
    ) -> Result<Self, ConfigError> {
        let env = |name: &'static str| lookup(name).filter(|v| !v.is_empty()).map(|v| (name, v));

        let env_port = env(ENV_PORT)
            .map(|(name, value)| {
                value
                    .parse::<u16>()
                    .map_err(|_| ConfigError::InvalidEnv { name, value })
            })
            .transpose()?;
        let env_algorithms_version = env(ENV_ALGORITHMS_VERSION)
            .map(|(name, value)| {
                value
                    .parse::<i64>()
                    .map_err(|_| ConfigError::InvalidEnv { name, value })
            })
            .transpose()?;
        let env_api_key = env(ENV_API_KEY).map(|(_, value)| value);

        let algorithms_version = env_algorithms_version
            .or(file.algorithms_version)
            .unwrap_or(ALGORITHMS_VERSION);
        if algorithms_version <= 0 {
            return Err(ConfigError::InvalidAlgorithmsVersion(algorithms_version));
        }

        Ok(ServiceConfig {
            port: port_flag.or(env_port).or(file.port).unwrap_or(DEFAULT_PORT),
            algorithms_version,
            api_key: env_api_key.or(file.api_key.filter(|k| !k.is_empty())),
        })
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_file(path, &text)
}

fn parse_file(path: &Path, text: &str) -> Result<FileConfig, ConfigError> {
    toml::from_str(text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    fn file(text: &str) -> FileConfig {
        parse_file(Path::new("test.toml"), text).unwrap()
    }

    #[test]
    fn defaults() {
        let config = ServiceConfig::resolve(FileConfig::default(), env_of(&[]), None).unwrap();
        assert_eq!(
            config,
            ServiceConfig {
                port: DEFAULT_PORT,
                algorithms_version: ALGORITHMS_VERSION,
                api_key: None,
            }
        );
    }

    #[test]
    fn file_values() {
        let f = file("port = 9000\nalgorithms_version = 7\napi_key = \"secret\"\n");
        let config = ServiceConfig::resolve(f, env_of(&[]), None).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.algorithms_version, 7);
        assert_eq!(config.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn flag_beats_env_beats_file() {
        let env = env_of(&[(ENV_PORT, "9100"), (ENV_API_KEY, "from-env")]);
        let f = file("port = 9000\napi_key = \"from-file\"\n");
        let config = ServiceConfig::resolve(f, &env, None).unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.api_key.as_deref(), Some("from-env"));

        let f = file("port = 9000\n");
        let config = ServiceConfig::resolve(f, &env, Some(9200)).unwrap();
        assert_eq!(config.port, 9200);
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let f = file("api_key = \"from-file\"\n");
        let config = ServiceConfig::resolve(f, env_of(&[(ENV_API_KEY, "")]), None).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = parse_file(Path::new("test.toml"), "prot = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn rejects_bad_env_values() {
        let err = ServiceConfig::resolve(
            FileConfig::default(),
            env_of(&[(ENV_PORT, "not-a-port")]),
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                name: ENV_PORT,
                ..
            }
        ));
    }

    #[test]
    fn rejects_non_positive_algorithms_version() {
        let err = ServiceConfig::resolve(file("algorithms_version = 0\n"), env_of(&[]), None)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAlgorithmsVersion(0)));
    }
}
