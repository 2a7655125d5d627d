use crate::{
    error::{Result, UpdaterError},
    manifest::{CheckRequest, ReleaseManifest},
    patch::{Patch, SignedPatch},
    transport::Transport,
    version::VersionTag,
};
use async_trait::async_trait;
use ed25519_dalek::VerifyingKey;
use reqwest::StatusCode;
use std::path::PathBuf;
use tracing::debug;

/// Result of one update check.
#[derive(Debug)]
pub enum CheckOutcome {
    /// The server has nothing newer for this version.
    NoUpdate,
    /// A verified release is available.
    Available(Patch),
}

impl CheckOutcome {
    /// Collapse into a [`Patch`], empty for [`CheckOutcome::NoUpdate`].
    pub fn into_patch(self) -> Patch {
        match self {
            CheckOutcome::NoUpdate => Patch::none(),
            CheckOutcome::Available(patch) => patch,
        }
    }
}

/// Abstraction over contacting a remote update server.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Ask whether a release newer than `current` exists. Release metadata
    /// must be authenticated against `key` before a patch is returned.
    async fn check(&self, current: &VersionTag, key: &VerifyingKey) -> Result<CheckOutcome>;
}

/// Update source speaking JSON over HTTP.
///
/// The current version is POSTed to the endpoint. `204 No Content` means no
/// update; `200 OK` carries a [`ReleaseManifest`]. Any other status is a
/// protocol error.
#[derive(Clone)]
pub struct HttpUpdateSource {
    url: String,
    transport: Transport,
    executable: PathBuf,
}

impl HttpUpdateSource {
    /// Create a source checking `url` and patching `executable`.
    pub fn new(url: impl Into<String>, transport: Transport, executable: PathBuf) -> Self {
        Self {
            url: url.into(),
            transport,
            executable,
        }
    }

    /// Transport shared by checks and patch downloads.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Reconfigure the proxy for all subsequent checks and downloads.
    pub fn set_proxy(&self, addr: &str) {
        self.transport.set_proxy(addr);
    }
}

#[async_trait]
impl UpdateSource for HttpUpdateSource {
    async fn check(&self, current: &VersionTag, key: &VerifyingKey) -> Result<CheckOutcome> {
        let request = CheckRequest::for_current_platform(current);
        let response = self
            .transport
            .client()
            .post(&self.url)
            .json(&request)
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT => {
                debug!(current = %current, "update server reports no update");
                Ok(CheckOutcome::NoUpdate)
            }
            StatusCode::OK => {
                let body = response.bytes().await?;
                let manifest: ReleaseManifest = serde_json::from_slice(&body)?;
                manifest.verify(key)?;
                manifest.signed.parsed_version()?;

                Ok(CheckOutcome::Available(Patch::new(SignedPatch::new(
                    manifest,
                    *key,
                    self.transport.clone(),
                    self.executable.clone(),
                ))))
            }
            status => Err(UpdaterError::protocol(format!(
                "unexpected status {status} from update server"
            ))),
        }
    }
}
