use anyhow::{bail, Context};
use autoupdate::{Config, Updater};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info,autoupdate=debug")
        .init();

    let Some(version) = std::env::args().nth(1) else {
        bail!("usage: autoupdate-watch <vMAJOR.MINOR.PATCH>");
    };

    let config = Config::from_env().context("loading AUTOUPDATE_* configuration")?;
    let updater = Updater::new(config)?;
    updater.set_version(&version)?;

    let mut updates = updater
        .take_notifications()
        .context("notification channel already taken")?;
    updater.watch()?;

    while let Some(version) = updates.recv().await {
        tracing::info!(%version, "executable updated, restart to run the new release");
    }
    Ok(())
}
