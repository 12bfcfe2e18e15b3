#![windows_subsystem = "windows"]

use anyhow::Result;
use multisend::{gui, user_settings::UserSettings};

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let settings = UserSettings::load();
    let config = settings.build_config().with_env_overrides()?;
    tracing::info!(
        "Starting on {} (chain {}), disperse contract {:?}",
        config.network_label(),
        config.chain_id,
        config.disperse_address
    );
    gui::launch(config, settings)?;

    Ok(())
}
