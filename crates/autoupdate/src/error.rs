/// Convenient result alias for update operations.
pub type Result<T> = std::result::Result<T, UpdaterError>;

/// Coarse classification of an [`UpdaterError`].
///
/// The polling loop treats every non-fatal kind the same way (log and retry
/// after the next interval); the kinds exist so hosts calling
/// [`Updater::query`](crate::Updater::query) directly can tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Programmer error in how the updater was set up. Callers must not proceed.
    Precondition,
    /// The update server or patch location could not be reached.
    Network,
    /// A signature did not verify against the configured public key.
    Verification,
    /// The server answered with something that is not a valid check response.
    Protocol,
    /// Local filesystem failure while reading or installing the executable.
    Io,
    /// The patch applied but did not produce the expected executable image.
    Corrupt,
}

/// Errors that can occur while checking for or applying an update.
#[derive(thiserror::Error, Debug)]
pub enum UpdaterError {
    /// A version string was not of the form `vMAJOR.MINOR.PATCH`.
    #[error("invalid version tag {tag:?}: {reason}")]
    InvalidVersion {
        /// The rejected input.
        tag: String,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// The part after the `v` is not a valid version.
    #[error("version error: {0}")]
    Version(#[from] semver::Error),
    /// An operation that needs the current version ran before `set_version`.
    #[error("the executable version must be set before checking for updates")]
    VersionUnset,
    /// Required configuration is missing or malformed.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The configured public key could not be decoded.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    /// `apply` was called on the empty patch returned when no update exists.
    #[error("there is no patch to apply")]
    NoPatch,
    /// Network request failed.
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// The check response could not be decoded from JSON.
    #[error("check response decoding failed: {0}")]
    Decode(#[from] serde_json::Error),
    /// The server response violated the check protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The release signature was malformed or invalid.
    #[error("release signature invalid")]
    SignatureInvalid,
    /// The patched executable did not match the signed checksum.
    #[error("patched executable is corrupt (expected {expected}, got {actual})")]
    Corrupt {
        /// Expected SHA-256 digest.
        expected: String,
        /// Actual SHA-256 digest.
        actual: String,
    },
    /// The patch payload could not be applied to the current executable.
    #[error("patch could not be applied: {0}")]
    PatchFailed(String),
    /// Failed to perform an I/O operation.
    #[error("filesystem operation failed: {0}")]
    Io(#[from] std::io::Error),
    /// A blocking task panicked or was cancelled.
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl UpdaterError {
    /// Helper for wrapping protocol violations.
    pub fn protocol(msg: impl Into<String>) -> Self {
        UpdaterError::Protocol(msg.into())
    }

    pub(crate) fn invalid_version(tag: &str, reason: &'static str) -> Self {
        UpdaterError::InvalidVersion {
            tag: tag.to_string(),
            reason,
        }
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            UpdaterError::InvalidVersion { .. }
            | UpdaterError::Version(_)
            | UpdaterError::VersionUnset
            | UpdaterError::Config(_)
            | UpdaterError::InvalidPublicKey(_)
            | UpdaterError::NoPatch => ErrorKind::Precondition,
            UpdaterError::Network(_) => ErrorKind::Network,
            UpdaterError::SignatureInvalid => ErrorKind::Verification,
            UpdaterError::Decode(_) | UpdaterError::Protocol(_) => ErrorKind::Protocol,
            UpdaterError::Io(_) | UpdaterError::Join(_) => ErrorKind::Io,
            UpdaterError::Corrupt { .. } | UpdaterError::PatchFailed(_) => ErrorKind::Corrupt,
        }
    }

    /// True for setup mistakes the caller must fix rather than retry.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Precondition
    }
}
