use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::domain::half_term::HalfTermSeed;
use crate::persistence::Defaults;

const DEFAULTS_TOML: &str = include_str!("defaults.toml");
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub categories: Vec<String>,
    pub half_terms: Vec<HalfTermSeed>,
    pub store: StoreConfig,
    pub lock: LockConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub remote_path: Option<PathBuf>,
    pub remote_timeout_ms: u64,
    pub max_blob_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub filter: String,
    pub json: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    categories: Option<Vec<String>>,
    half_terms: Option<Vec<HalfTermSeed>>,
    store: Option<StoreSection>,
    lock: Option<LockSection>,
    log: Option<LogSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoreSection {
    remote_path: Option<PathBuf>,
    remote_timeout_ms: Option<u64>,
    max_blob_bytes: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LockSection {
    timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LogSection {
    filter: Option<String>,
    json: Option<bool>,
}

impl Config {
    /// The embedded defaults alone.
    pub fn builtin() -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(DEFAULTS_TOML)?;
        let missing = |key: &str| ConfigError::Invalid(format!("built-in defaults lack '{}'", key));
        let store = file.store.ok_or_else(|| missing("store"))?;
        let lock = file.lock.ok_or_else(|| missing("lock"))?;
        let log = file.log.ok_or_else(|| missing("log"))?;

        let config = Self {
            categories: file.categories.ok_or_else(|| missing("categories"))?,
            half_terms: file.half_terms.ok_or_else(|| missing("half_terms"))?,
            store: StoreConfig {
                remote_path: store.remote_path,
                remote_timeout_ms: store
                    .remote_timeout_ms
                    .ok_or_else(|| missing("store.remote_timeout_ms"))?,
                max_blob_bytes: store
                    .max_blob_bytes
                    .ok_or_else(|| missing("store.max_blob_bytes"))?,
            },
            lock: LockConfig {
                timeout_ms: lock.timeout_ms.ok_or_else(|| missing("lock.timeout_ms"))?,
            },
            log: LogConfig {
                filter: log.filter.ok_or_else(|| missing("log.filter"))?,
                json: log.json.unwrap_or(false),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Built-in defaults overlaid by `<state_dir>/config.toml` when it exists.
    /// A relative `store.remote_path` is resolved against `root`.
    pub fn load(root: &Path, state_dir: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::builtin()?;
        let path = state_dir.join(CONFIG_FILE);
        match std::fs::read_to_string(&path) {
            Ok(raw) => {
                let file: ConfigFile = toml::from_str(&raw)?;
                config.overlay(file);
                config.validate()?;
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(ConfigError::Io { path, source: err }),
        }
        if let Some(remote) = config.store.remote_path.take() {
            config.store.remote_path = Some(if remote.is_relative() {
                root.join(remote)
            } else {
                remote
            });
        }
        Ok(config)
    }

    fn overlay(&mut self, file: ConfigFile) {
        if let Some(categories) = file.categories {
            self.categories = categories;
        }
        if let Some(half_terms) = file.half_terms {
            self.half_terms = half_terms;
        }
        if let Some(store) = file.store {
            if store.remote_path.is_some() {
                self.store.remote_path = store.remote_path;
            }
            if let Some(timeout) = store.remote_timeout_ms {
                self.store.remote_timeout_ms = timeout;
            }
            if let Some(bytes) = store.max_blob_bytes {
                self.store.max_blob_bytes = bytes;
            }
        }
        if let Some(timeout) = file.lock.and_then(|lock| lock.timeout_ms) {
            self.lock.timeout_ms = timeout;
        }
        if let Some(log) = file.log {
            if let Some(filter) = log.filter {
                self.log.filter = filter;
            }
            if let Some(json) = log.json {
                self.log.json = json;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.half_terms.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one half-term must be configured".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for term in &self.half_terms {
            if term.id.trim().is_empty() || term.name.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "half-terms need a non-empty id and name".to_string(),
                ));
            }
            if !seen.insert(term.id.to_ascii_lowercase()) {
                return Err(ConfigError::Invalid(format!(
                    "half-term id '{}' is configured twice",
                    term.id
                )));
            }
        }
        if self.store.max_blob_bytes == 0 {
            return Err(ConfigError::Invalid(
                "store.max_blob_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn defaults(&self) -> Defaults {
        Defaults {
            half_terms: self.half_terms.clone(),
        }
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.store.remote_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock.timeout_ms)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "could not read config {}: {}", path.display(), source)
            }
            ConfigError::Toml(err) => write!(f, "invalid config TOML: {}", err),
            ConfigError::Invalid(message) => write!(f, "invalid config: {}", message),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml(err) => Some(err),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        ConfigError::Toml(value)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use uuid::Uuid;

    use super::{Config, ConfigError, CONFIG_FILE};

    fn workspace() -> PathBuf {
        let root = std::env::temp_dir().join(format!("cadence-config-{}", Uuid::now_v7()));
        std::fs::create_dir_all(root.join(".cadence")).expect("workspace should be creatable");
        root
    }

    #[test]
    fn builtin_defaults_seed_six_half_terms() {
        let config = Config::builtin().expect("embedded defaults should parse");
        let ids: Vec<_> = config.half_terms.iter().map(|term| term.id.as_str()).collect();
        assert_eq!(ids, vec!["A1", "A2", "SP1", "SP2", "SM1", "SM2"]);
        assert_eq!(config.half_terms[0].name, "Autumn 1");
        assert_eq!(config.store.remote_timeout_ms, 2000);
        assert_eq!(config.store.max_blob_bytes, 5 * 1024 * 1024);
        assert_eq!(config.log.filter, "cadence=warn");
        assert!(config.store.remote_path.is_none());
        assert_eq!(config.categories[0], "Welcome");
    }

    #[test]
    fn workspace_file_overrides_individual_keys() {
        let root = workspace();
        let state_dir = root.join(".cadence");
        std::fs::write(
            state_dir.join(CONFIG_FILE),
            "categories = [\"Warm-up\"]\n\n[store]\nremote_path = \"shared/remote.sqlite\"\n\n[log]\njson = true\n",
        )
        .expect("config should be writable");

        let config = Config::load(&root, &state_dir).expect("config should load");
        assert_eq!(config.categories, vec!["Warm-up".to_string()]);
        assert_eq!(
            config.store.remote_path,
            Some(root.join("shared/remote.sqlite"))
        );
        assert_eq!(config.store.remote_timeout_ms, 2000);
        assert!(config.log.json);
        assert_eq!(config.log.filter, "cadence=warn");
        assert_eq!(config.half_terms.len(), 6);

        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn duplicate_half_terms_and_unknown_keys_are_rejected() {
        let root = workspace();
        let state_dir = root.join(".cadence");
        std::fs::write(
            state_dir.join(CONFIG_FILE),
            "[[half_terms]]\nid = \"T1\"\nname = \"One\"\n\n[[half_terms]]\nid = \"t1\"\nname = \"Two\"\n",
        )
        .expect("config should be writable");
        let err = Config::load(&root, &state_dir).expect_err("duplicate ids should fail");
        assert!(matches!(err, ConfigError::Invalid(ref message) if message.contains("twice")));

        std::fs::write(state_dir.join(CONFIG_FILE), "[store]\nremote = \"x\"\n")
            .expect("config should be writable");
        let err = Config::load(&root, &state_dir).expect_err("unknown keys should fail");
        assert!(matches!(err, ConfigError::Toml(_)));

        let _ = std::fs::remove_dir_all(root);
    }
}
