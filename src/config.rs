//! Adapter configuration
//!
//! Read from `polydal.toml`. A `.env` file next to it is honoured, and the
//! following environment variables override file settings:
//!
//! - `POLYDAL_URI` - backend URI; its scheme selects the dialect
//! - `POLYDAL_STRICT_DECODE` - fail whole results on decode errors
//! - `POLYDAL_CACHE_TTL` - default cache TTL in seconds
//!
//! Variables already set in the process take precedence over `.env`.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "polydal.toml";

/// Environment variable names
pub const ENV_URI: &str = "POLYDAL_URI";
pub const ENV_STRICT_DECODE: &str = "POLYDAL_STRICT_DECODE";
pub const ENV_CACHE_TTL: &str = "POLYDAL_CACHE_TTL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdapterConfig {
    /// Backend URI, e.g. `sqlite://storage.db` or `mongodb://host/db`
    pub uri: String,
    /// Fail the whole result set when a row cannot be decoded
    #[serde(default)]
    pub strict_decode: bool,
    /// Order paginated selects by primary key when no order is given
    #[serde(default = "default_true")]
    pub orderby_on_limitby: bool,
    /// Log every executed statement at debug level
    #[serde(default = "default_true")]
    pub log_statements: bool,
    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
}

fn default_capacity() -> usize {
    1024
}

fn default_ttl_secs() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            default_ttl_secs: default_ttl_secs(),
        }
    }
}

impl AdapterConfig {
    /// Default configuration for `uri`
    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            strict_decode: false,
            orderby_on_limitby: true,
            log_statements: true,
            cache: CacheConfig::default(),
        }
    }

    /// Load configuration from a directory, applying `.env` and process
    /// environment overrides.
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let dotenv = read_dotenv(&dir.join(".env"))?;
        Self::load_with(dir, |key| std::env::var(key).ok().or_else(|| dotenv.get(key).cloned()))
    }

    /// Load configuration with an explicit variable lookup.
    pub fn load_with(dir: &Path, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            anyhow::bail!("Configuration file not found: {}", config_path.display());
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("reading {}", config_path.display()))?;
        let mut config: AdapterConfig = toml::from_str(&content)
            .with_context(|| format!("parsing {}", config_path.display()))?;

        config.apply_overrides(lookup)?;
        Ok(config)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(uri) = lookup(ENV_URI) {
            if !uri.is_empty() {
                self.uri = uri;
            }
        }

        if let Some(strict) = lookup(ENV_STRICT_DECODE) {
            self.strict_decode = match strict.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                other => anyhow::bail!("{} must be a boolean, got '{}'", ENV_STRICT_DECODE, other),
            };
        }

        if let Some(ttl) = lookup(ENV_CACHE_TTL) {
            self.cache.default_ttl_secs = ttl
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number of seconds", ENV_CACHE_TTL))?;
        }
        Ok(())
    }

    /// Save configuration to a directory
    pub fn save(&self, dir: &Path) -> anyhow::Result<()> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    /// Backend name taken from the URI scheme, lowercased
    pub fn backend(&self) -> anyhow::Result<String> {
        match url::Url::parse(&self.uri) {
            Ok(url) => Ok(url.scheme().to_ascii_lowercase()),
            Err(_) => match self.uri.split_once(':') {
                Some((scheme, _)) if !scheme.is_empty() => Ok(scheme.to_ascii_lowercase()),
                _ => anyhow::bail!("Cannot determine backend from uri '{}'", self.uri),
            },
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.default_ttl_secs)
    }
}

/// Variables from a `.env` file, without touching the process environment
fn read_dotenv(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let mut vars = HashMap::new();
    for item in dotenvy::from_path_iter(path)? {
        let (key, value) = item.with_context(|| format!("parsing {}", path.display()))?;
        vars.insert(key, value);
    }
    Ok(vars)
}
