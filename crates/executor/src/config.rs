use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{Error, Result};

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub tls: TlsConfig,
    pub basic_auth: BasicAuthConfig,
    pub bearer_auth: BearerAuthConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    #[serde(rename = "crt")]
    pub cert_path: PathBuf,
    #[serde(rename = "key")]
    pub key_path: PathBuf,
}

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicAuthConfig {
    pub enabled: bool,
    pub username: String,
    pub password: String,
}

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BearerAuthConfig {
    pub enabled: bool,
    pub signing_key: String,
}

impl std::fmt::Debug for BasicAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuthConfig")
            .field("enabled", &self.enabled)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl std::fmt::Debug for BearerAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuthConfig")
            .field("enabled", &self.enabled)
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        // An empty document is a valid, all-defaults configuration.
        let config: Config = if raw.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(raw)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tls.enabled
            && (self.tls.cert_path.as_os_str().is_empty() || self.tls.key_path.as_os_str().is_empty())
        {
            return Err(Error::Config(
                "tls.crt and tls.key must be set when TLS is enabled".to_string(),
            ));
        }
        if self.basic_auth.enabled && self.basic_auth.username.is_empty() {
            return Err(Error::Config(
                "basicAuth.username must be set when basic auth is enabled".to_string(),
            ));
        }
        if self.bearer_auth.enabled && self.bearer_auth.signing_key.is_empty() {
            return Err(Error::Config(
                "bearerAuth.signingKey must be set when bearer auth is enabled".to_string(),
            ));
        }
        if self.basic_auth.enabled && self.bearer_auth.enabled {
            return Err(Error::Config(
                "basicAuth and bearerAuth cannot be enabled at the same time".to_string(),
            ));
        }
        Ok(())
    }
}

/// The active configuration plus the file it was read from.
///
/// Readers take an `Arc` snapshot; a reload swaps the whole value, so a
/// request never observes a half-applied configuration.
#[derive(Debug)]
pub struct ConfigHolder {
    path: PathBuf,
    current: RwLock<Arc<Config>>,
}

impl ConfigHolder {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = Config::load(&path)?;
        Ok(Self::new(path, config))
    }

    pub fn new(path: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(Arc::new(config)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn snapshot(&self) -> Arc<Config> {
        self.current.read().await.clone()
    }

    /// Reads and validates the source file without activating it.
    pub fn read_source(&self) -> Result<Config> {
        Config::load(&self.path)
    }

    pub async fn replace(&self, config: Config) -> Arc<Config> {
        let config = Arc::new(config);
        *self.current.write().await = config.clone();
        config
    }

    /// Re-reads the source file and activates it. On error the previous
    /// configuration stays active.
    pub async fn reload(&self) -> Result<Arc<Config>> {
        let config = self.read_source()?;
        Ok(self.replace(config).await)
    }
}
