use crate::error::{HandleError, Result};
use config::{Config, ConfigError};
use std::path::PathBuf;
use std::time::Duration;
use tracing::error;

/// Prefix registered to no one.
pub const EXAMPLE_PREFIX: &str = "123456789";

pub const DEFAULT_CANONICAL_PREFIX: &str = "https://hdl.handle.net/";

pub const DEFAULT_DIGEST_ALGORITHM: &str = "SHA-512";

pub const DEFAULT_HASH_ROUNDS: u32 = 1024;

pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 210_000;

/// Turn a missing key into `None`, keep every other failure.
fn optional<T>(value: std::result::Result<T, ConfigError>) -> Result<Option<T>> {
    match value {
        Ok(v) => Ok(Some(v)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(HandleError::from(e)),
    }
}

/// Read a list property given either as an array or a comma-separated string.
fn string_list(source: &Config, key: &str) -> Result<Vec<String>> {
    if let Ok(values) = source.get_array(key) {
        let mut list = Vec::with_capacity(values.len());
        for value in values {
            let value = value.into_string()?;
            let value = value.trim();
            if !value.is_empty() {
                list.push(value.to_string());
            }
        }
        return Ok(list);
    }
    Ok(optional(source.get_string(key))?
        .map(|joined| {
            joined
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default())
}

fn positive_u32(source: &Config, key: &str, default: u32) -> Result<u32> {
    match optional(source.get_int(key))? {
        None => Ok(default),
        Some(n) => u32::try_from(n)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| HandleError::Config(format!("{key} must be a positive integer, got {n}"))),
    }
}

/// Handle naming configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleConfig {
    pub prefix: String,
    pub canonical_prefix: String,
    pub additional_prefixes: Vec<String>,
    pub ui_url: String,
}

impl HandleConfig {
    pub fn new(prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if prefix.trim().is_empty() {
            error!(fallback = EXAMPLE_PREFIX, "handle.prefix is not configured");
            prefix = EXAMPLE_PREFIX.to_string();
        }
        Self {
            prefix,
            canonical_prefix: DEFAULT_CANONICAL_PREFIX.to_string(),
            additional_prefixes: Vec::new(),
            ui_url: "http://localhost:4000".to_string(),
        }
    }

    pub fn canonical_prefix(mut self, canonical: impl Into<String>) -> Self {
        self.canonical_prefix = canonical.into();
        self
    }

    pub fn additional_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.additional_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn ui_url(mut self, url: impl Into<String>) -> Self {
        self.ui_url = url.into();
        self
    }

    /// Load `handle.prefix`, `handle.canonical.prefix`,
    /// `handle.additional.prefixes` and `dspace.ui.url`.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a key holds a value of the wrong type.
    pub fn from_source(source: &Config) -> Result<Self> {
        let prefix = optional(source.get_string("handle.prefix"))?.unwrap_or_default();
        let mut config = Self::new(prefix);
        if let Some(canonical) = optional(source.get_string("handle.canonical.prefix"))? {
            config.canonical_prefix = canonical;
        }
        config.additional_prefixes = string_list(source, "handle.additional.prefixes")?;
        if let Some(url) = optional(source.get_string("dspace.ui.url"))? {
            config.ui_url = url;
        }
        Ok(config)
    }
}

/// Password hashing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordConfig {
    pub digest_algorithm: String,
    pub hash_rounds: u32,
    pub pbkdf2_iterations: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            digest_algorithm: DEFAULT_DIGEST_ALGORITHM.to_string(),
            hash_rounds: DEFAULT_HASH_ROUNDS,
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }
}

impl PasswordConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn digest_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.digest_algorithm = algorithm.into();
        self
    }

    pub fn hash_rounds(mut self, rounds: u32) -> Self {
        self.hash_rounds = rounds;
        self
    }

    pub fn pbkdf2_iterations(mut self, iterations: u32) -> Self {
        self.pbkdf2_iterations = iterations;
        self
    }

    /// Load `authentication-password.digestAlgorithm`, `eperson.hash.rounds`
    /// and `authentication-password.pbkdf2.iterations`.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a round or iteration count is not a positive integer.
    pub fn from_source(source: &Config) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            digest_algorithm: optional(
                source.get_string("authentication-password.digestAlgorithm"),
            )?
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.digest_algorithm),
            hash_rounds: positive_u32(source, "eperson.hash.rounds", defaults.hash_rounds)?,
            pbkdf2_iterations: positive_u32(
                source,
                "authentication-password.pbkdf2.iterations",
                defaults.pbkdf2_iterations,
            )?,
        })
    }
}

/// Connection settings for a remote Handle server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalConfig {
    pub server_url: String,
    pub admin_handle: String,
    pub admin_index: u32,
    pub secret_key_path: PathBuf,
    pub timeout: Duration,
}

impl ExternalConfig {
    pub fn new(server_url: impl Into<String>, prefix: &str, secret_key_path: impl Into<PathBuf>) -> Self {
        Self {
            server_url: server_url.into(),
            admin_handle: format!("0.NA/{prefix}"),
            admin_index: 300,
            secret_key_path: secret_key_path.into(),
            timeout: Duration::from_millis(5000),
        }
    }

    pub fn admin(mut self, handle: impl Into<String>, index: u32) -> Self {
        self.admin_handle = handle.into();
        self.admin_index = index;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load the `handle.remote.*` keys for handles under `prefix`.
    ///
    /// # Errors
    ///
    /// Returns `Config` if `handle.remote.url` or `handle.remote.secret.file` is
    /// missing, or a numeric key is not a positive integer.
    pub fn from_source(source: &Config, prefix: &str) -> Result<Self> {
        let url = optional(source.get_string("handle.remote.url"))?
            .ok_or_else(|| HandleError::Config("handle.remote.url is required".to_string()))?;
        let secret = optional(source.get_string("handle.remote.secret.file"))?.ok_or_else(|| {
            HandleError::Config("handle.remote.secret.file is required".to_string())
        })?;
        let mut config = Self::new(url, prefix, secret);
        if let Some(admin) = optional(source.get_string("handle.remote.admin"))? {
            config.admin_handle = admin;
        }
        config.admin_index = positive_u32(source, "handle.remote.admin.index", config.admin_index)?;
        let timeout_ms = positive_u32(source, "handle.remote.timeout.ms", 5000)?;
        config.timeout = Duration::from_millis(u64::from(timeout_ms));
        Ok(config)
    }
}

/// Background work queue sizing. Fixed for the lifetime of the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkQueueConfig {
    pub threads: usize,
    pub capacity: usize,
    pub task_timeout: Duration,
}

impl Default for WorkQueueConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            capacity: 64,
            task_timeout: Duration::from_secs(300),
        }
    }
}

impl WorkQueueConfig {
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
            ..Self::default()
        }
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Load `background.threads`, `background.queue.capacity` and
    /// `background.task.timeout.ms`.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a size is not positive or the timeout is negative.
    pub fn from_source(source: &Config) -> Result<Self> {
        let defaults = Self::default();
        let threads = positive_u32(source, "background.threads", 1)?;
        let capacity = positive_u32(source, "background.queue.capacity", 64)?;
        let timeout_ms = optional(source.get_int("background.task.timeout.ms"))?;
        let task_timeout = match timeout_ms {
            None => defaults.task_timeout,
            Some(ms) => Duration::from_millis(u64::try_from(ms).map_err(|_| {
                HandleError::Config(format!("background.task.timeout.ms must not be negative, got {ms}"))
            })?),
        };
        Ok(Self {
            threads: threads as usize,
            capacity: capacity as usize,
            task_timeout,
        })
    }
}
