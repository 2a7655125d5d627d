//! Configuration for the updater.

use crate::error::{Result, UpdaterError};
use ed25519_dalek::pkcs8::DecodePublicKey;
use ed25519_dalek::VerifyingKey;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// How long the background loop waits between update checks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(4 * 60 * 60);

const ENV_URL: &str = "AUTOUPDATE_URL";
const ENV_PUBLIC_KEY_FILE: &str = "AUTOUPDATE_PUBLIC_KEY_FILE";
const ENV_INTERVAL_SECS: &str = "AUTOUPDATE_INTERVAL_SECS";
const ENV_PROXY: &str = "AUTOUPDATE_PROXY";

/// Configuration for one [`Updater`](crate::Updater). Never mutated after the
/// updater is constructed.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Update-check endpoint.
    pub url: String,
    /// PEM-encoded Ed25519 public key used to authenticate releases.
    pub public_key: Vec<u8>,
    /// Delay between two checks of the background loop.
    #[serde(default = "default_check_interval", with = "duration_secs")]
    pub check_interval: Duration,
    /// Initial HTTP/S proxy for the transport. `None` or empty means direct.
    #[serde(default)]
    pub proxy: Option<String>,
    /// Executable that patches are applied to. Defaults to the running binary.
    #[serde(default)]
    pub executable: Option<PathBuf>,
}

fn default_check_interval() -> Duration {
    DEFAULT_CHECK_INTERVAL
}

mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

impl Config {
    /// Create a config with the default check interval and no proxy.
    pub fn new(url: impl Into<String>, public_key: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            public_key: public_key.into(),
            check_interval: DEFAULT_CHECK_INTERVAL,
            proxy: None,
            executable: None,
        }
    }

    /// Set the delay between checks.
    pub fn check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Route checks and downloads through an HTTP/S proxy.
    pub fn proxy(mut self, addr: impl Into<String>) -> Self {
        self.proxy = Some(addr.into());
        self
    }

    /// Apply patches to `path` instead of the running executable.
    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    /// Load the configuration from `AUTOUPDATE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var(ENV_URL)
            .map_err(|_| UpdaterError::Config(format!("{ENV_URL} is not set")))?;
        let key_path = std::env::var(ENV_PUBLIC_KEY_FILE)
            .map_err(|_| UpdaterError::Config(format!("{ENV_PUBLIC_KEY_FILE} is not set")))?;
        let mut config = Config::new(url, std::fs::read(key_path)?);

        if let Ok(secs) = std::env::var(ENV_INTERVAL_SECS) {
            let secs: u64 = secs.parse().map_err(|_| {
                UpdaterError::Config(format!("{ENV_INTERVAL_SECS} must be a number of seconds"))
            })?;
            config = config.check_interval(Duration::from_secs(secs));
        }
        if let Ok(proxy) = std::env::var(ENV_PROXY) {
            config = config.proxy(proxy);
        }
        Ok(config)
    }

    /// Decode [`Config::public_key`] into a verifying key.
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        let pem = std::str::from_utf8(&self.public_key)
            .map_err(|_| UpdaterError::InvalidPublicKey("public key is not valid UTF-8".into()))?;
        VerifyingKey::from_public_key_pem(pem)
            .map_err(|err| UpdaterError::InvalidPublicKey(err.to_string()))
    }

    /// The executable patches are applied to.
    pub fn target_executable(&self) -> Result<PathBuf> {
        match &self.executable {
            Some(path) => Ok(path.clone()),
            None => Ok(std::env::current_exe()?),
        }
    }
}
