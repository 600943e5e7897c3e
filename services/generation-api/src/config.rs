//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults. A missing config
//! file is not an error: every field has a default. Credentials are never
//! read from the TOML; pools scan the process environment for
//! `{KEY_TYPE}_{i}` entries.

use key_pool::{CredentialShape, PoolConfig};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for `store.ttl_hours`, about one year.
const MAX_TTL_HOURS: u64 = 24 * 366;

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub text: TextConfig,
    pub image: ImageConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub max_connections: usize,
}

/// Quarantine persistence settings, shared by every pool
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub quarantine_file: PathBuf,
    pub audit_log: PathBuf,
    pub ttl_hours: u64,
}

/// Which backend serves text generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEngineKind {
    #[default]
    Placeholder,
    OpenRouter,
}

/// Text generation pool and engine
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    pub key_type: String,
    pub max_keys: usize,
    pub engine: TextEngineKind,
    pub default_model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

/// Image generation pool (cookie pairs) and engine
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub key_type: String,
    pub max_keys: usize,
    pub placeholder_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            max_connections: 1000,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            quarantine_file: PathBuf::from("waiting_list.json"),
            audit_log: PathBuf::from("key_rotation.log"),
            ttl_hours: 24,
        }
    }
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            key_type: "MISTRALAI_MISTRAL_7B_INSTRUCT_FREE_KEY".into(),
            max_keys: key_pool::DEFAULT_MAX_KEYS,
            engine: TextEngineKind::default(),
            default_model: "openai/gpt-3.5-turbo".into(),
            base_url: provider::openrouter::DEFAULT_BASE_URL.into(),
            timeout_secs: 60,
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            key_type: "BING_AUTH_COOKIE".into(),
            max_keys: key_pool::DEFAULT_MAX_KEYS,
            placeholder_base_url: provider::placeholder::DEFAULT_IMAGE_BASE_URL.into(),
        }
    }
}

impl StoreConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours.saturating_mul(60 * 60))
    }
}

impl TextConfig {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new(&self.key_type, self.max_keys, CredentialShape::Single)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ImageConfig {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new(&self.key_type, self.max_keys, CredentialShape::Paired)
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.finish()
    }

    /// Like `load`, but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> common::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Config::default().finish()
        }
    }

    fn finish(mut self) -> common::Result<Self> {
        if let Ok(model) = std::env::var("DEFAULT_TEXT_MODEL") {
            let model = model.trim();
            if !model.is_empty() {
                self.text.default_model = model.to_string();
            }
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> common::Result<()> {
        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.store.ttl_hours == 0 {
            return Err(common::Error::Config(
                "ttl_hours must be greater than 0".into(),
            ));
        }
        if self.store.ttl_hours > MAX_TTL_HOURS {
            return Err(common::Error::Config(format!(
                "ttl_hours must be at most {MAX_TTL_HOURS}"
            )));
        }
        if self.text.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        for (section, pool) in [("text", &self.text.key_type), ("image", &self.image.key_type)] {
            if pool.trim().is_empty() {
                return Err(common::Error::Config(format!(
                    "{section}.key_type must not be empty"
                )));
            }
        }
        if self.text.max_keys == 0 || self.image.max_keys == 0 {
            return Err(common::Error::Config(
                "max_keys must be greater than 0".into(),
            ));
        }
        // Quarantine entries are keyed by credential name across all pools.
        if self.text.key_type == self.image.key_type {
            return Err(common::Error::Config(format!(
                "text and image pools must use different key types, both are {}",
                self.text.key_type
            )));
        }
        if !self.text.base_url.starts_with("http://") && !self.text.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.text.base_url
            )));
        }
        if self.text.default_model.trim().is_empty() {
            return Err(common::Error::Config(
                "default_model must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("generation-api.toml")
    }
}
