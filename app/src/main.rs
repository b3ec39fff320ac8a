use clap::Parser;
use querydesk::{
    commands,
    config::{config_dir, load_cli_settings, save_cli_settings},
    spawn_session_watcher, Cli, Shell,
};
use querydesk_core::{telemetry, GatewaySettings, SettingsOverrides};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = telemetry::init_tracing(telemetry::env_filter()) {
        eprintln!("failed to initialize logging: {err}");
    }

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = SettingsOverrides {
        api_url: cli.api_url.clone(),
        state_dir: cli.state_dir.clone(),
    };
    let gateway_settings = GatewaySettings::load(overrides)
        .map_err(|err| anyhow::anyhow!(err.user_message()))?;
    tracing::debug!(base_url = %gateway_settings.base_url, "gateway configured");

    let settings_dir = config_dir();
    let mut cli_settings = load_cli_settings(&settings_dir).await?;

    let (shell, events) = Shell::connect(&gateway_settings)?;
    let watcher = spawn_session_watcher(events);

    let outcome = commands::run(&shell, &mut cli_settings, cli.command).await;

    drop(shell);
    watcher.await.ok();
    save_cli_settings(&settings_dir, &cli_settings).await?;
    outcome
}
