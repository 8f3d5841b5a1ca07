//! Runtime settings
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML
//! file, then `SPECKEEP_*` environment variables. The master passphrase is
//! only ever read from the environment.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use speckeep_cache::CacheConfig;
use speckeep_workspace::HashedLocator;

use crate::pool::DEFAULT_POOL_SIZE;

/// Shortest master passphrase accepted
pub const MIN_PASSPHRASE_LEN: usize = 32;
/// Looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "speckeep.toml";

pub const ENV_CONFIG: &str = "SPECKEEP_CONFIG";
pub const ENV_PASSPHRASE: &str = "SPECKEEP_MASTER_PASSPHRASE";
pub const ENV_PROJECTS_ROOT: &str = "SPECKEEP_PROJECTS_ROOT";
pub const ENV_WORKSPACES_ROOT: &str = "SPECKEEP_WORKSPACES_ROOT";
pub const ENV_FILE_CACHE_SIZE: &str = "SPECKEEP_FILE_CACHE_SIZE";
pub const ENV_FILE_CACHE_TTL: &str = "SPECKEEP_FILE_CACHE_TTL";
pub const ENV_AI_CACHE_SIZE: &str = "SPECKEEP_AI_CACHE_SIZE";
pub const ENV_AI_CACHE_TTL: &str = "SPECKEEP_AI_CACHE_TTL";
pub const ENV_WORKER_THREADS: &str = "SPECKEEP_WORKER_THREADS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{ENV_PASSPHRASE} is not set")]
    MissingPassphrase,

    #[error("Master passphrase must be at least {MIN_PASSPHRASE_LEN} characters")]
    WeakPassphrase,

    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Shape of `speckeep.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SettingsFile {
    projects_root: Option<PathBuf>,
    workspaces_root: Option<PathBuf>,
    file_cache: Option<CacheConfig>,
    ai_cache: Option<CacheConfig>,
    worker_threads: Option<usize>,
}

/// Fully resolved settings
#[derive(Debug)]
pub struct Settings {
    pub projects_root: PathBuf,
    pub workspaces_root: PathBuf,
    pub master_passphrase: SecretString,
    pub file_cache: CacheConfig,
    pub ai_cache: CacheConfig,
    pub worker_threads: usize,
}

impl Settings {
    /// Load from `path` (or `$SPECKEEP_CONFIG`, or `./speckeep.toml` if it
    /// exists) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(ENV_CONFIG).map(PathBuf::from))
            .or_else(|| {
                let local = PathBuf::from(DEFAULT_CONFIG_FILE);
                local.is_file().then_some(local)
            });

        let contents = match &path {
            Some(path) => {
                debug!(path = %path.display(), "reading settings file");
                Some(std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?)
            }
            None => None,
        };

        Self::from_sources(contents.as_deref(), |key| std::env::var(key).ok())
    }

    /// Resolve settings from file contents and an environment lookup
    pub fn from_sources(
        file: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let file: SettingsFile = match file {
            Some(contents) => toml::from_str(contents)?,
            None => SettingsFile::default(),
        };

        let passphrase = env(ENV_PASSPHRASE)
            .filter(|p| !p.is_empty())
            .ok_or(ConfigError::MissingPassphrase)?;

        let mut file_cache = file.file_cache.unwrap_or(CacheConfig::file_default());
        let mut ai_cache = file.ai_cache.unwrap_or(CacheConfig::response_default());
        override_number(&env, ENV_FILE_CACHE_SIZE, &mut file_cache.max_size)?;
        override_number(&env, ENV_FILE_CACHE_TTL, &mut file_cache.ttl_seconds)?;
        override_number(&env, ENV_AI_CACHE_SIZE, &mut ai_cache.max_size)?;
        override_number(&env, ENV_AI_CACHE_TTL, &mut ai_cache.ttl_seconds)?;

        let mut worker_threads = file.worker_threads.unwrap_or(DEFAULT_POOL_SIZE);
        override_number(&env, ENV_WORKER_THREADS, &mut worker_threads)?;

        let projects_root = env(ENV_PROJECTS_ROOT)
            .map(PathBuf::from)
            .or(file.projects_root)
            .unwrap_or_else(|| PathBuf::from("."));
        let workspaces_root = env(ENV_WORKSPACES_ROOT)
            .map(PathBuf::from)
            .or(file.workspaces_root)
            .or_else(default_workspaces_root)
            .ok_or_else(|| ConfigError::Invalid {
                key: "workspaces_root",
                reason: "no home directory to default to".to_string(),
            })?;

        let settings = Self {
            projects_root,
            workspaces_root,
            master_passphrase: SecretString::new(passphrase),
            file_cache,
            ai_cache,
            worker_threads,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.master_passphrase.expose_secret().chars().count() < MIN_PASSPHRASE_LEN {
            return Err(ConfigError::WeakPassphrase);
        }
        for (key, cache) in [("file_cache", &self.file_cache), ("ai_cache", &self.ai_cache)] {
            if cache.max_size == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "max_size must be at least 1".to_string(),
                });
            }
        }
        if self.worker_threads == 0 {
            return Err(ConfigError::Invalid {
                key: "worker_threads",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Project-to-workspace mapping for these settings
    pub fn locator(&self) -> HashedLocator {
        HashedLocator::new(self.workspaces_root.clone())
    }
}

fn default_workspaces_root() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".speckeep").join("workspaces"))
}

fn override_number<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    target: &mut T,
) -> Result<(), ConfigError>
where
    T::Err: std::fmt::Display,
{
    if let Some(raw) = env(key) {
        *target = raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const GOOD_PASSPHRASE: &str = "0123456789abcdef0123456789abcdef";

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_sources(
            None,
            env(&[(ENV_PASSPHRASE, GOOD_PASSPHRASE), (ENV_WORKSPACES_ROOT, "/srv/ws")]),
        )
        .unwrap();
        assert_eq!(settings.file_cache, CacheConfig::new(100, 300));
        assert_eq!(settings.ai_cache, CacheConfig::new(50, 3600));
        assert_eq!(settings.worker_threads, 4);
        assert_eq!(settings.workspaces_root, PathBuf::from("/srv/ws"));
        assert_eq!(settings.projects_root, PathBuf::from("."));
    }

    #[test]
    fn test_file_then_env_precedence() {
        let file = r#"
            projects_root = "/code"
            workspaces_root = "/from-file"
            worker_threads = 8

            [file_cache]
            max_size = 10
            ttl_seconds = 20

            [ai_cache]
            max_size = 5
            ttl_seconds = 60
        "#;
        let settings = Settings::from_sources(
            Some(file),
            env(&[
                (ENV_PASSPHRASE, GOOD_PASSPHRASE),
                (ENV_WORKSPACES_ROOT, "/from-env"),
                (ENV_AI_CACHE_TTL, "90"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.projects_root, PathBuf::from("/code"));
        assert_eq!(settings.workspaces_root, PathBuf::from("/from-env"));
        assert_eq!(settings.worker_threads, 8);
        assert_eq!(settings.file_cache, CacheConfig::new(10, 20));
        assert_eq!(settings.ai_cache, CacheConfig::new(5, 90));
    }

    #[test]
    fn test_passphrase_required() {
        assert!(matches!(
            Settings::from_sources(None, env(&[(ENV_WORKSPACES_ROOT, "/ws")])),
            Err(ConfigError::MissingPassphrase)
        ));
    }

    #[test]
    fn test_short_passphrase_rejected() {
        assert!(matches!(
            Settings::from_sources(
                None,
                env(&[(ENV_PASSPHRASE, "too-short"), (ENV_WORKSPACES_ROOT, "/ws")])
            ),
            Err(ConfigError::WeakPassphrase)
        ));
    }

    #[test]
    fn test_bad_numbers_rejected() {
        let result = Settings::from_sources(
            None,
            env(&[
                (ENV_PASSPHRASE, GOOD_PASSPHRASE),
                (ENV_WORKSPACES_ROOT, "/ws"),
                (ENV_FILE_CACHE_SIZE, "lots"),
            ]),
        );
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { key: ENV_FILE_CACHE_SIZE, .. })
        ));

        let result = Settings::from_sources(
            None,
            env(&[
                (ENV_PASSPHRASE, GOOD_PASSPHRASE),
                (ENV_WORKSPACES_ROOT, "/ws"),
                (ENV_WORKER_THREADS, "0"),
            ]),
        );
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { key: "worker_threads", .. })
        ));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let result = Settings::from_sources(
            Some("passphrase = \"nope\""),
            env(&[(ENV_PASSPHRASE, GOOD_PASSPHRASE), (ENV_WORKSPACES_ROOT, "/ws")]),
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_debug_redacts_passphrase() {
        let settings = Settings::from_sources(
            None,
            env(&[(ENV_PASSPHRASE, GOOD_PASSPHRASE), (ENV_WORKSPACES_ROOT, "/ws")]),
        )
        .unwrap();
        assert!(!format!("{:?}", settings).contains(GOOD_PASSPHRASE));
    }
}
