//! Self-update client for long-running processes.
//!
//! An [`Updater`] periodically asks an update server whether a release newer
//! than the running executable exists. Release metadata is signed with an
//! Ed25519 key; the updater verifies it against the configured public key,
//! applies the binary patch to the executable and announces the new version
//! on a notification channel so the host can update its own version marker.
//!
//! ```ignore
//! use autoupdate::{Config, Updater};
//!
//! # async fn demo(pem: Vec<u8>) -> autoupdate::Result<()> {
//! let updater = Updater::new(Config::new("https://updates.example.com/check", pem))?;
//! updater.set_version("v1.0.0")?;
//! let mut updates = updater.take_notifications().expect("first call");
//! updater.watch()?;
//!
//! while let Some(version) = updates.recv().await {
//!     println!("updated to {version}, restart to run it");
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod install;
mod manifest;
mod patch;
mod source;
mod transport;
mod updater;
pub mod version;

pub use config::{Config, DEFAULT_CHECK_INTERVAL};
pub use error::{ErrorKind, Result, UpdaterError};
pub use manifest::{CheckRequest, PatchType, ReleaseManifest, SignedRelease};
pub use patch::{Patch, PatchArtifact, SignedPatch};
pub use source::{CheckOutcome, HttpUpdateSource, UpdateSource};
pub use transport::{Transport, TransportBuilder};
pub use updater::Updater;
pub use version::{compare, compare_tags, Comparison, VersionTag};
