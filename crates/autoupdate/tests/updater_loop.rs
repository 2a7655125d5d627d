//! Polling-loop behaviour of [`Updater`] against an in-memory update source.

use async_trait::async_trait;
use autoupdate::{
    CheckOutcome, Config, ErrorKind, Patch, PatchArtifact, Result, UpdateSource, Updater,
    UpdaterError, VersionTag,
};
use ed25519_dalek::pkcs8::{spki::der::pem::LineEnding, EncodePublicKey};
use ed25519_dalek::{SigningKey, VerifyingKey};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::sleep;

const INTERVAL: Duration = Duration::from_secs(60);

#[derive(Default)]
struct Counters {
    checks: AtomicUsize,
    applies: AtomicUsize,
}

/// Source that always offers the same release (or nothing).
struct ScriptedSource {
    target: Mutex<Option<String>>,
    fail_check: AtomicBool,
    fail_apply: bool,
    counters: Arc<Counters>,
}

impl ScriptedSource {
    fn offering(target: Option<&str>) -> Self {
        Self {
            target: Mutex::new(target.map(str::to_string)),
            fail_check: AtomicBool::new(false),
            fail_apply: false,
            counters: Arc::default(),
        }
    }
}

struct ScriptedArtifact {
    version: String,
    fail: bool,
    counters: Arc<Counters>,
}

#[async_trait]
impl PatchArtifact for ScriptedArtifact {
    fn version(&self) -> &str {
        &self.version
    }

    async fn apply(self: Box<Self>) -> Result<()> {
        self.counters.applies.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(UpdaterError::protocol("patch download failed"));
        }
        Ok(())
    }
}

#[async_trait]
impl UpdateSource for ScriptedSource {
    async fn check(&self, _current: &VersionTag, _key: &VerifyingKey) -> Result<CheckOutcome> {
        self.counters.checks.fetch_add(1, Ordering::SeqCst);
        if self.fail_check.load(Ordering::SeqCst) {
            return Err(UpdaterError::SignatureInvalid);
        }
        let target = self.target.lock().unwrap().clone();
        Ok(match target {
            None => CheckOutcome::NoUpdate,
            Some(version) => CheckOutcome::Available(Patch::new(ScriptedArtifact {
                version,
                fail: self.fail_apply,
                counters: Arc::clone(&self.counters),
            })),
        })
    }
}

fn config() -> Config {
    let key = SigningKey::from_bytes(&[9u8; 32]).verifying_key();
    let pem = key.to_public_key_pem(LineEnding::LF).unwrap();
    Config::new("http://updates.invalid/check", pem.into_bytes()).check_interval(INTERVAL)
}

fn updater(source: ScriptedSource) -> (Updater<ScriptedSource>, Arc<Counters>) {
    let counters = Arc::clone(&source.counters);
    (Updater::with_source(config(), source).unwrap(), counters)
}

async fn wait_for_version(updater: &Updater<ScriptedSource>, expected: &str) {
    for _ in 0..100 {
        if updater.version() == expected {
            return;
        }
        sleep(Duration::from_millis(1)).await;
    }
    panic!("version never became {expected}, still {}", updater.version());
}

#[test]
fn set_version_validates_format() {
    let (updater, _) = updater(ScriptedSource::offering(None));
    assert_eq!(updater.version(), "");

    for bad in ["1.0.0", "v1.0", "vX.Y.Z"] {
        let err = updater.set_version(bad).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert_eq!(updater.version(), "");
    }

    updater.set_version("v0.0.1").unwrap();
    assert_eq!(updater.version(), "v0.0.1");
    updater.set_version("v12.3.45").unwrap();
    assert_eq!(updater.version(), "v12.3.45");
}

#[test]
fn rejects_invalid_public_key() {
    let config = Config::new("http://updates.invalid/check", b"bogus".to_vec());
    let err = Updater::with_source(config, ScriptedSource::offering(None))
        .err()
        .unwrap();
    assert!(err.is_fatal());
}

#[tokio::test]
async fn watch_requires_version() {
    let (updater, counters) = updater(ScriptedSource::offering(None));
    assert!(matches!(updater.watch(), Err(UpdaterError::VersionUnset)));
    assert!(!updater.is_watching());
    assert!(matches!(updater.query().await, Err(UpdaterError::VersionUnset)));
    assert_eq!(counters.checks.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn query_without_update_returns_empty_patch() {
    let (updater, _) = updater(ScriptedSource::offering(None));
    updater.set_version("v1.0.0").unwrap();

    let patch = updater.query().await.unwrap();
    assert_eq!(patch.version(), "");
    assert!(patch.is_empty());
}

#[tokio::test]
async fn query_is_repeatable_and_leaves_version_alone() {
    let (updater, counters) = updater(ScriptedSource::offering(Some("v1.2.0")));
    updater.set_version("v1.0.0").unwrap();

    let first = updater.query().await.unwrap();
    let second = updater.query().await.unwrap();
    assert_eq!(first.version(), "v1.2.0");
    assert_eq!(first.version(), second.version());
    assert_eq!(updater.version(), "v1.0.0");
    assert_eq!(counters.checks.load(Ordering::SeqCst), 2);
    assert_eq!(counters.applies.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn query_surfaces_check_errors() {
    let source = ScriptedSource::offering(Some("v1.2.0"));
    source.fail_check.store(true, Ordering::SeqCst);
    let (updater, _) = updater(source);
    updater.set_version("v1.0.0").unwrap();

    let err = updater.query().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Verification);
}

#[tokio::test(start_paused = true)]
async fn newer_release_is_applied_once_and_announced() {
    let (updater, counters) = updater(ScriptedSource::offering(Some("v1.2.0")));
    updater.set_version("v1.0.0").unwrap();
    let mut updates = updater.take_notifications().unwrap();
    assert!(updater.take_notifications().is_none());

    assert!(updater.watch().unwrap());
    assert_eq!(updates.recv().await.as_deref(), Some("v1.2.0"));
    wait_for_version(&updater, "v1.2.0").await;

    // Later checks see the same release, which is no longer newer.
    sleep(INTERVAL * 3).await;
    assert!(counters.checks.load(Ordering::SeqCst) >= 3);
    assert_eq!(counters.applies.load(Ordering::SeqCst), 1);
    assert!(matches!(updates.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(updater.version(), "v1.2.0");
}

#[tokio::test(start_paused = true)]
async fn announced_version_matches_recorded_version() {
    let (updater, counters) = updater(ScriptedSource::offering(Some("v01.2.0")));
    assert!(updater.set_version("v01.0.0").unwrap_err().is_fatal());
    updater.set_version("v1.0.0").unwrap();
    let mut updates = updater.take_notifications().unwrap();

    // A non-canonical tag from the source is never applied.
    updater.watch().unwrap();
    sleep(INTERVAL / 2).await;
    assert_eq!(counters.checks.load(Ordering::SeqCst), 1);
    assert_eq!(counters.applies.load(Ordering::SeqCst), 0);
    assert_eq!(updater.version(), "v1.0.0");

    *updater.source().target.lock().unwrap() = Some("v1.2.0".into());
    let announced = updates.recv().await.unwrap();
    wait_for_version(&updater, &announced).await;
    assert_eq!(announced, "v1.2.0");
    assert_eq!(updater.version(), announced);
}

#[tokio::test(start_paused = true)]
async fn older_release_is_ignored() {
    let (updater, counters) = updater(ScriptedSource::offering(Some("v1.9.0")));
    updater.set_version("v2.0.0").unwrap();
    let mut updates = updater.take_notifications().unwrap();

    updater.watch().unwrap();
    sleep(INTERVAL * 2 + INTERVAL / 2).await;

    assert_eq!(counters.checks.load(Ordering::SeqCst), 3);
    assert_eq!(counters.applies.load(Ordering::SeqCst), 0);
    assert!(matches!(updates.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(updater.version(), "v2.0.0");
}

#[tokio::test(start_paused = true)]
async fn equal_release_is_ignored() {
    let (updater, counters) = updater(ScriptedSource::offering(Some("v1.0.0")));
    updater.set_version("v1.0.0").unwrap();

    updater.watch().unwrap();
    sleep(INTERVAL / 2).await;

    assert_eq!(counters.checks.load(Ordering::SeqCst), 1);
    assert_eq!(counters.applies.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_apply_keeps_version_and_retries() {
    let mut source = ScriptedSource::offering(Some("v1.2.0"));
    source.fail_apply = true;
    let (updater, counters) = updater(source);
    updater.set_version("v1.0.0").unwrap();
    let mut updates = updater.take_notifications().unwrap();

    updater.watch().unwrap();
    sleep(INTERVAL + INTERVAL / 2).await;

    assert_eq!(counters.applies.load(Ordering::SeqCst), 2);
    assert!(matches!(updates.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(updater.version(), "v1.0.0");
}

#[tokio::test(start_paused = true)]
async fn check_failures_do_not_stop_the_loop() {
    let source = ScriptedSource::offering(Some("v1.2.0"));
    source.fail_check.store(true, Ordering::SeqCst);
    let (updater, counters) = updater(source);
    updater.set_version("v1.0.0").unwrap();
    let mut updates = updater.take_notifications().unwrap();

    updater.watch().unwrap();
    sleep(INTERVAL * 2 + INTERVAL / 2).await;
    assert_eq!(counters.checks.load(Ordering::SeqCst), 3);
    assert_eq!(counters.applies.load(Ordering::SeqCst), 0);

    updater.source().fail_check.store(false, Ordering::SeqCst);
    assert_eq!(updates.recv().await.as_deref(), Some("v1.2.0"));
}

#[tokio::test(start_paused = true)]
async fn watch_is_idempotent() {
    let (updater, counters) = updater(ScriptedSource::offering(None));
    updater.set_version("v1.0.0").unwrap();

    assert!(updater.watch().unwrap());
    assert!(!updater.watch().unwrap());
    assert!(!updater.clone().watch().unwrap());
    assert!(updater.is_watching());

    sleep(INTERVAL / 2).await;
    assert_eq!(counters.checks.load(Ordering::SeqCst), 1);
    sleep(INTERVAL).await;
    assert_eq!(counters.checks.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn stop_ends_the_loop() {
    let (updater, counters) = updater(ScriptedSource::offering(None));
    updater.set_version("v1.0.0").unwrap();

    updater.watch().unwrap();
    sleep(INTERVAL / 2).await;
    updater.stop();
    sleep(INTERVAL * 5).await;

    assert_eq!(counters.checks.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn unread_notifications_apply_backpressure() {
    let (updater, counters) = updater(ScriptedSource::offering(Some("v1.1.0")));
    updater.set_version("v1.0.0").unwrap();
    let mut updates = updater.take_notifications().unwrap();

    updater.watch().unwrap();
    wait_for_version(&updater, "v1.1.0").await;

    // The first update fills the single slot; the second blocks the loop.
    *updater.source().target.lock().unwrap() = Some("v1.2.0".into());
    sleep(INTERVAL * 3).await;
    assert_eq!(counters.applies.load(Ordering::SeqCst), 2);
    assert_eq!(counters.checks.load(Ordering::SeqCst), 2);
    assert_eq!(updater.version(), "v1.1.0");

    assert_eq!(updates.recv().await.as_deref(), Some("v1.1.0"));
    assert_eq!(updates.recv().await.as_deref(), Some("v1.2.0"));
    wait_for_version(&updater, "v1.2.0").await;
}

#[tokio::test(start_paused = true)]
async fn stop_while_announcing_leaves_update_unrecorded() {
    let (updater, counters) = updater(ScriptedSource::offering(Some("v1.1.0")));
    updater.set_version("v1.0.0").unwrap();
    let mut updates = updater.take_notifications().unwrap();

    updater.watch().unwrap();
    wait_for_version(&updater, "v1.1.0").await;

    *updater.source().target.lock().unwrap() = Some("v1.2.0".into());
    sleep(INTERVAL * 2).await;
    assert_eq!(counters.applies.load(Ordering::SeqCst), 2);

    // The loop is parked on the full channel when it is stopped.
    updater.stop();
    sleep(INTERVAL).await;

    assert_eq!(updates.recv().await.as_deref(), Some("v1.1.0"));
    assert!(matches!(updates.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(updater.version(), "v1.1.0");
}
