use crate::{
    error::{Result, UpdaterError},
    install::install_executable,
    manifest::{PatchType, ReleaseManifest, SignedRelease},
    transport::Transport,
};
use async_trait::async_trait;
use ed25519_dalek::VerifyingKey;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Cursor;
use std::path::PathBuf;
use tokio::task;
use tracing::debug;

/// The capability to install one specific release.
#[async_trait]
pub trait PatchArtifact: Send + Sync {
    /// Target version tag of the release.
    fn version(&self) -> &str;

    /// Verify and install the release. Consumes the artifact.
    async fn apply(self: Box<Self>) -> Result<()>;
}

/// Answer to a single update check: either empty or one installable release.
///
/// An empty patch reports `""` from [`Patch::version`].
pub struct Patch {
    artifact: Option<Box<dyn PatchArtifact>>,
}

impl Patch {
    /// The empty patch returned when no update is available.
    pub fn none() -> Self {
        Self { artifact: None }
    }

    /// Wrap an artifact.
    pub fn new(artifact: impl PatchArtifact + 'static) -> Self {
        Self {
            artifact: Some(Box::new(artifact)),
        }
    }

    /// Target version, or `""` when there is no update.
    pub fn version(&self) -> &str {
        self.artifact
            .as_ref()
            .map(|artifact| artifact.version())
            .unwrap_or("")
    }

    /// True for the empty patch.
    pub fn is_empty(&self) -> bool {
        self.artifact.is_none()
    }

    /// Verify and install the patch. A patch can be applied at most once.
    ///
    /// Interrupting the process mid-apply is not recovered from.
    pub async fn apply(self) -> Result<()> {
        match self.artifact {
            Some(artifact) => artifact.apply().await,
            None => Err(UpdaterError::NoPatch),
        }
    }
}

impl fmt::Debug for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Patch")
            .field("version", &self.version())
            .finish()
    }
}

/// A release fetched from the update server whose signature verified at check time.
pub struct SignedPatch {
    manifest: ReleaseManifest,
    key: VerifyingKey,
    transport: Transport,
    executable: PathBuf,
}

impl SignedPatch {
    pub(crate) fn new(
        manifest: ReleaseManifest,
        key: VerifyingKey,
        transport: Transport,
        executable: PathBuf,
    ) -> Self {
        Self {
            manifest,
            key,
            transport,
            executable,
        }
    }

    /// Access the manifest.
    pub fn manifest(&self) -> &ReleaseManifest {
        &self.manifest
    }

    async fn download(&self) -> Result<Vec<u8>> {
        let url = &self.manifest.signed.patch_url;
        debug!(url = %url, "downloading patch");
        let response = self
            .transport
            .client()
            .get(url)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl PatchArtifact for SignedPatch {
    fn version(&self) -> &str {
        &self.manifest.signed.version
    }

    async fn apply(self: Box<Self>) -> Result<()> {
        self.manifest.verify(&self.key)?;
        let payload = self.download().await?;

        let SignedPatch {
            manifest,
            executable,
            ..
        } = *self;

        // Reading, patching and writing the executable is blocking work.
        task::spawn_blocking(move || {
            let current = std::fs::read(&executable)?;
            let image = patched_image(&manifest.signed, &current, &payload)?;
            install_executable(&image, &executable)
        })
        .await??;

        Ok(())
    }
}

/// Produce the new executable image and check it against the signed digest.
pub(crate) fn patched_image(
    release: &SignedRelease,
    current: &[u8],
    payload: &[u8],
) -> Result<Vec<u8>> {
    let image = match release.patch_type {
        PatchType::Full => payload.to_vec(),
        PatchType::Bsdiff => {
            let mut image = Vec::new();
            bsdiff::patch(current, &mut Cursor::new(payload), &mut image)
                .map_err(|err| UpdaterError::PatchFailed(err.to_string()))?;
            image
        }
    };

    let actual = hex::encode(Sha256::digest(&image));
    let expected = release.checksum.to_ascii_lowercase();
    if actual != expected {
        return Err(UpdaterError::Corrupt { expected, actual });
    }
    Ok(image)
}
