use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use procprio::common::config::SELF_NAME;
use procprio::common::{Cli, Config, Settings, logging};
use procprio::service::{self, Controller, ExitSignal, Platform, PriorityScheme, ProcessControl};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose).context("Failed to initialize logging")?;

    info!("== {} version {} ==", SELF_NAME, env!("CARGO_PKG_VERSION"));
    debug!("Command line arguments: {:?}", cli);

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let platform = Platform::host();
    let scheme = PriorityScheme::host();
    let mut control = service::host_control()?;

    // Every configuration error surfaces here, before any process is touched
    let settings = Settings::resolve(&cli, &config, platform, scheme, control.core_count())
        .context("Invalid configuration")?;
    let groups = settings
        .groups(platform, scheme)
        .context("Invalid target name")?;
    let self_name = platform.normalize(SELF_NAME)?;

    let exit = ExitSignal::new();
    exit.listen().context("Failed to install signal handlers")?;

    let mut controller = Controller::new(groups, control, settings.interval, &self_name);
    controller.run(&exit).await;
    controller.shutdown();

    Ok(())
}
