// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{keys, DEFAULT_REGION, ENV_PREFIX};
use crate::error::ConfigError;
use crate::policy::AclMode;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

type Result<T> = std::result::Result<T, ConfigError>;

/// A key/value source for the resource configuration
pub trait ConfigStore {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads `Name` from `BUCKETWRIGHT_NAME`, `ReleaseName` from
/// `BUCKETWRIGHT_RELEASE_NAME` and so on.
#[derive(Debug, Default, Clone)]
pub struct EnvStore;

impl EnvStore {
    pub fn env_var(key: &str) -> String {
        let mut var = String::from(ENV_PREFIX);
        let mut prev_lower = false;
        for c in key.chars() {
            if c.is_ascii_uppercase() && prev_lower {
                var.push('_');
            }
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
            var.push(c.to_ascii_uppercase());
        }
        var
    }
}

impl ConfigStore for EnvStore {
    fn get(&self, key: &str) -> Option<String> {
        env::var(Self::env_var(key)).ok()
    }
}

/// Stack configuration file in the `config:` map layout, where keys may be
/// bare (`Name`) or project-qualified (`my-project:Name`).
#[derive(Debug, Clone)]
pub struct FileStore {
    values: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct StackFile {
    #[serde(default)]
    config: BTreeMap<String, serde_yaml::Value>,
}

impl FileStore {
    pub fn open(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(&raw).map_err(|e| match e {
            ConfigError::File { message, .. } => ConfigError::File {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let file: StackFile = serde_yaml::from_str(raw).map_err(|e| ConfigError::File {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;

        let values = file
            .config
            .into_iter()
            .filter_map(|(k, v)| {
                let value = match v {
                    serde_yaml::Value::String(s) => s,
                    serde_yaml::Value::Number(n) => n.to_string(),
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                Some((k, value))
            })
            .collect();

        Ok(Self { values })
    }
}

impl ConfigStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        if let Some(v) = self.values.get(key) {
            return Some(v.clone());
        }
        self.values
            .iter()
            .find(|(k, _)| k.rsplit_once(':').is_some_and(|(_, bare)| bare == key))
            .map(|(_, v)| v.clone())
    }
}

/// In-memory store, mostly useful in tests
#[derive(Debug, Default, Clone)]
pub struct MapStore(pub BTreeMap<String, String>);

impl<const N: usize> From<[(&str, &str); N]> for MapStore {
    fn from(entries: [(&str, &str); N]) -> Self {
        MapStore(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl ConfigStore for MapStore {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

/// Naming scheme selected by the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Everything named `<namespace>-<name>`
    Service,
    /// Bucket and secret named after the release
    Release,
}

/// Resource configuration, immutable once loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub name: String,
    pub namespace: String,
    pub release_name: Option<String>,
    pub acl: AclMode,
}

impl Config {
    /// Load from the file named by `BUCKETWRIGHT_CONFIG_FILE`, or from the
    /// environment when unset
    pub fn load() -> Result<Self> {
        match env::var(format!("{ENV_PREFIX}CONFIG_FILE")) {
            Ok(path) => {
                debug!("Reading configuration from {}", path);
                Self::from_store(&FileStore::open(Path::new(&path))?)
            }
            Err(_) => Self::from_store(&EnvStore),
        }
    }

    pub fn from_store<S: ConfigStore + ?Sized>(store: &S) -> Result<Self> {
        let name = require(store, keys::NAME)?;
        let namespace = require(store, keys::NAMESPACE)?;
        let release_name = optional(store, keys::RELEASE_NAME);

        let acl = match (optional(store, keys::ACL), &release_name) {
            (Some(raw), _) => raw.parse()?,
            (None, Some(_)) => return Err(ConfigError::Missing(keys::ACL.to_string())),
            (None, None) => AclMode::Private,
        };

        Ok(Config {
            name,
            namespace,
            release_name,
            acl,
        })
    }

    pub fn layout(&self) -> Layout {
        if self.release_name.is_some() {
            Layout::Release
        } else {
            Layout::Service
        }
    }
}

fn require<S: ConfigStore + ?Sized>(store: &S, key: &str) -> Result<String> {
    optional(store, key).ok_or_else(|| ConfigError::Missing(key.to_string()))
}

fn optional<S: ConfigStore + ?Sized>(store: &S, key: &str) -> Option<String> {
    store.get(key).filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Command {
    #[default]
    Up,
    Preview,
    Down,
}

impl std::str::FromStr for Command {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "up" => Ok(Command::Up),
            "preview" => Ok(Command::Preview),
            "down" | "destroy" => Ok(Command::Down),
            other => Err(ConfigError::InvalidSetting {
                key: format!("{ENV_PREFIX}COMMAND"),
                message: format!("unknown command '{other}'"),
            }),
        }
    }
}

/// Static credentials for the object storage endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct StaticCredentials {
    pub access_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// How to reach the providers, loaded from environment variables
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub command: Command,
    pub endpoint: Option<Url>,
    pub region: String,
    pub credentials: Option<StaticCredentials>,
    pub kubeconfig: Option<PathBuf>,
}

impl RuntimeSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).filter(|v| !v.is_empty()).map(|v| (key, v))
        };

        let command = match var("COMMAND") {
            Some((_, v)) => v.parse()?,
            None => Command::default(),
        };

        let endpoint = var("ENDPOINT")
            .map(|(key, v)| {
                Url::parse(&v).map_err(|e| ConfigError::InvalidSetting {
                    key,
                    message: e.to_string(),
                })
            })
            .transpose()?;

        let region = var("REGION")
            .map(|(_, v)| v)
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let credentials = match (var("ACCESS_KEY"), var("SECRET_KEY")) {
            (Some((_, access_key)), Some((_, secret_key))) => Some(StaticCredentials {
                access_key,
                secret_key,
            }),
            (None, None) => None,
            (Some(_), None) | (None, Some(_)) => {
                return Err(ConfigError::InvalidSetting {
                    key: format!("{ENV_PREFIX}ACCESS_KEY"),
                    message: "access key and secret key must be set together".to_string(),
                })
            }
        };

        let kubeconfig = var("KUBECONFIG").map(|(_, v)| PathBuf::from(v));

        Ok(RuntimeSettings {
            command,
            endpoint,
            region,
            credentials,
            kubeconfig,
        })
    }
}
