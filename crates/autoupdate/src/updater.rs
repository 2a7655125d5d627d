use crate::{
    config::Config,
    error::{Result, UpdaterError},
    patch::Patch,
    source::{HttpUpdateSource, UpdateSource},
    transport::Transport,
    version::{compare, Comparison, VersionTag},
};
use ed25519_dalek::VerifyingKey;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Background self-updater for the running executable.
///
/// Cloning is cheap and every clone drives the same state: one current
/// version, one notification channel and at most one polling loop.
pub struct Updater<S = HttpUpdateSource> {
    inner: Arc<Inner<S>>,
}

struct Inner<S> {
    config: Config,
    key: VerifyingKey,
    source: S,
    current: RwLock<Option<VersionTag>>,
    notify_tx: mpsc::Sender<String>,
    notify_rx: Mutex<Option<mpsc::Receiver<String>>>,
    watching: AtomicBool,
    cancel: CancellationToken,
}

impl<S> Clone for Updater<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Updater<HttpUpdateSource> {
    /// Create an updater that checks `config.url` over HTTP.
    ///
    /// An invalid initial proxy is logged and ignored, like any later
    /// [`Updater::set_proxy`] failure.
    pub fn new(config: Config) -> Result<Self> {
        let transport = Transport::builder().build()?;
        if let Some(proxy) = config.proxy.as_deref() {
            transport.set_proxy(proxy);
        }
        let source =
            HttpUpdateSource::new(config.url.clone(), transport, config.target_executable()?);
        Self::with_source(config, source)
    }

    /// Route subsequent checks and downloads through `addr`; empty means direct.
    pub fn set_proxy(&self, addr: &str) {
        self.inner.source.set_proxy(addr);
    }
}

impl<S> Updater<S>
where
    S: UpdateSource + 'static,
{
    /// Create an updater around a custom update source.
    ///
    /// Fails if `config.public_key` is not a PEM-encoded Ed25519 public key.
    pub fn with_source(config: Config, source: S) -> Result<Self> {
        let key = config.verifying_key()?;
        // One slot: a second update blocks until the host has read the first.
        let (notify_tx, notify_rx) = mpsc::channel(1);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                key,
                source,
                current: RwLock::new(None),
                notify_tx,
                notify_rx: Mutex::new(Some(notify_rx)),
                watching: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }),
        })
    }

    /// Configuration this updater was built with.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The update source checks go through.
    pub fn source(&self) -> &S {
        &self.inner.source
    }

    /// Set the version of the running executable.
    ///
    /// A tag that is not `vMAJOR.MINOR.PATCH` is rejected with a fatal
    /// error and the stored version is left alone.
    pub fn set_version(&self, tag: &str) -> Result<()> {
        let version = VersionTag::parse(tag)?;
        self.store_version(version);
        Ok(())
    }

    /// Current version tag, or `""` if [`Updater::set_version`] was never called.
    pub fn version(&self) -> String {
        self.current_version()
            .map(|version| version.to_string())
            .unwrap_or_default()
    }

    /// Parsed current version, `None` until [`Updater::set_version`] succeeds.
    pub fn current_version(&self) -> Option<VersionTag> {
        match self.inner.current.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn store_version(&self, version: VersionTag) {
        match self.inner.current.write() {
            Ok(mut guard) => *guard = Some(version),
            Err(poisoned) => *poisoned.into_inner() = Some(version),
        }
    }

    /// Take the receiving end of the notification channel.
    ///
    /// Every successfully applied update is announced with its version tag,
    /// in order. The host must keep draining the receiver: the loop blocks
    /// on the second unread update. Returns `None` after the first call.
    pub fn take_notifications(&self) -> Option<mpsc::Receiver<String>> {
        match self.inner.notify_rx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    /// Perform a single update check.
    ///
    /// Returns an empty [`Patch`] when the server has no update. Does not
    /// change the current version.
    pub async fn query(&self) -> Result<Patch> {
        let current = self.current_version().ok_or(UpdaterError::VersionUnset)?;
        let outcome = self.inner.source.check(&current, &self.inner.key).await?;
        Ok(outcome.into_patch())
    }

    /// Start the background polling loop and return immediately.
    ///
    /// Returns `Ok(true)` when this call started the loop and `Ok(false)` if
    /// it was already running. Fails with [`UpdaterError::VersionUnset`]
    /// when no version has been set. Must be called within a tokio runtime.
    pub fn watch(&self) -> Result<bool> {
        if self.current_version().is_none() {
            return Err(UpdaterError::VersionUnset);
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| UpdaterError::Config("watch requires a tokio runtime".into()))?;

        if self
            .inner
            .watching
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("update loop already running");
            return Ok(false);
        }

        runtime.spawn(self.clone().run());
        Ok(true)
    }

    /// True once [`Updater::watch`] has started the loop.
    pub fn is_watching(&self) -> bool {
        self.inner.watching.load(Ordering::Acquire)
    }

    /// Stop the polling loop. The loop cannot be restarted.
    ///
    /// A check or apply in progress is abandoned. If the loop is blocked
    /// announcing an update the host has not read yet, the executable on disk
    /// is already patched but that version is neither announced nor recorded.
    pub fn stop(&self) {
        self.inner.cancel.cancel();
    }

    async fn run(self) {
        let interval = self.inner.config.check_interval;
        info!(every = ?interval, "starting to watch for updates");

        loop {
            tokio::select! {
                _ = self.inner.cancel.cancelled() => break,
                _ = self.poll_once() => {}
            }

            tokio::select! {
                _ = self.inner.cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("stopped watching for updates");
    }

    async fn poll_once(&self) {
        let patch = match self.query().await {
            Ok(patch) => patch,
            Err(err) => {
                warn!("could not reach update server: {}", err);
                return;
            }
        };

        let Some(current) = self.current_version() else {
            return;
        };
        debug!(old = %current, new = patch.version(), "update check finished");

        if patch.is_empty() {
            debug!("already up to date");
            return;
        }

        let target = match VersionTag::parse(patch.version()) {
            Ok(target) => target,
            Err(err) => {
                warn!("update source returned an unusable version: {}", err);
                return;
            }
        };
        if compare(&target, &current) != Comparison::Higher {
            debug!("already up to date");
            return;
        }

        let tag = target.to_string();
        info!(version = %tag, "attempting to update");
        if let Err(err) = patch.apply().await {
            error!(version = %tag, "patching failed: {}", err);
            return;
        }
        info!(version = %tag, "patching succeeded");

        if self.inner.notify_tx.send(tag).await.is_err() {
            debug!("notification receiver dropped; recording update anyway");
        }
        self.store_version(target);
    }
}
