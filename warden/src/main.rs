mod cli;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use warden::config::{self, WardenConfig};
use warden::logging::{self, panic_hook};
use warden::Warden;

use crate::cli::{Args, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let (config, source) =
        config::load(args.config.as_deref()).context("failed to load configuration")?;

    match args.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config, source).await,
        Commands::Once { compact } => once(config, compact).await,
        Commands::CheckConfig => check_config(&config, &source),
        Commands::Digest => digest(config).await,
    }
}

async fn run(config: WardenConfig, source: config::ConfigSource) -> anyhow::Result<()> {
    let (logging, _guard) =
        logging::init_logging(&config.logging).context("failed to initialize logging")?;
    panic_hook::install();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %source,
        log_filter = %logging.get_filter(),
        "Starting warden"
    );

    let mut warden = Warden::from_config(config).context("failed to build supervisor")?;
    let cancel = warden.cancellation_token();
    logging.start_retention_cleanup(cancel.clone());

    warden.start();

    tokio::select! {
        _ = shutdown_signal() => info!("Shutdown signal received"),
        _ = cancel.cancelled() => warn!("Supervisor stopped itself"),
    }

    if let Err(e) = warden.shutdown().await {
        error!(error = %e, "Supervisor terminated with an error");
        return Err(e.into());
    }
    Ok(())
}

async fn once(config: WardenConfig, compact: bool) -> anyhow::Result<()> {
    logging::init_console_logging(config.logging.filter.as_deref())?;

    let mut warden = Warden::from_config(config)?;
    warden.run_once().await;
    warden.flush().await;

    let snapshot = warden.status();
    let json = if compact {
        serde_json::to_string(&snapshot)?
    } else {
        serde_json::to_string_pretty(&snapshot)?
    };
    println!("{}", json);

    warden.shutdown().await?;
    Ok(())
}

async fn digest(config: WardenConfig) -> anyhow::Result<()> {
    logging::init_console_logging(config.logging.filter.as_deref())?;

    let mut warden = Warden::from_config(config)?;
    warden.run_once().await;

    let report = warden.digest_report();
    println!("Subject: {}\n\n{}", report.subject(), report.body());

    warden.shutdown().await?;
    Ok(())
}

fn check_config(config: &WardenConfig, source: &config::ConfigSource) -> anyhow::Result<()> {
    // Building probes and channels catches errors the schema cannot, like bad URLs.
    for probe in &config.probes {
        probe
            .build()
            .with_context(|| format!("invalid probe '{}'", probe.name()))?;
    }
    for channel in &config.notification.channels {
        channel
            .build()
            .with_context(|| format!("invalid {} channel", channel.channel_type()))?;
    }

    println!("# Configuration OK (source: {})", source);
    println!(
        "{}",
        toml::to_string_pretty(config).context("failed to render configuration")?
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
