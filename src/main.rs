// ABOUTME: Main entry point for the Steam/IRC/Slack chat relay
// ABOUTME: Parses the CLI, initializes logging and config, wires adapters into the relay loop

use anyhow::Result;
use chatrelay::cli::{Cli, Commands};
use chatrelay::config::Config;
use chatrelay::platform::SidecarClient;
use chatrelay::traits::SteamClient;
use chatrelay::{logging, paths, relay, Router, SteamSupervisor};
use clap::Parser;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Inbound events buffered between adapters and the relay loop
const EVENT_BUFFER: usize = 256;

/// How long adapters get to close their connections on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    match cli.selected() {
        Commands::CheckConfig => {
            logging::init_cli();
            let config = Config::load_with(cli.config.as_deref())?;
            println!("{:#?}", config);
            println!("Configuration OK");
            Ok(())
        }
        Commands::Run => run(cli.config.as_deref()).await,
    }
}

async fn run(config_path: Option<&Path>) -> Result<()> {
    let _log_guard = logging::init_service(&paths::log_dir())?;
    logging::install_panic_hook();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting chatrelay");

    let config = Config::load_with(config_path)?;
    tracing::info!(
        chatroom = %config.steam.chatroom,
        irc = config.irc.is_some(),
        slack = config.slack.is_some(),
        data_dir = %config.storage.data_dir().display(),
        "Configuration loaded"
    );

    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    let (steam, sidecar_task) = SidecarClient::spawn(&config.steam, events_tx.clone());
    tasks.push(sidecar_task);
    let supervisor = SteamSupervisor::new(
        steam,
        &config.steam,
        &config.watchdog,
        &config.storage,
        Instant::now(),
    );
    let router = Router::new(supervisor, &config);

    #[cfg(feature = "irc")]
    let router = match config.irc {
        Some(ref irc) => {
            let (sink, handle) = chatrelay::platform::IrcSink::spawn(irc, events_tx.clone());
            tasks.push(handle);
            router.with_irc(Box::new(sink), irc.channel.clone())
        }
        None => router,
    };
    #[cfg(not(feature = "irc"))]
    if config.irc.is_some() {
        tracing::warn!("[irc] is configured but IRC support is not compiled in (build with --features irc)");
    }

    #[cfg(feature = "slack")]
    let router = match config.slack {
        Some(ref slack) => {
            let (sink, handle) = chatrelay::platform::slack::spawn(slack, events_tx.clone());
            tasks.push(handle);
            router.with_slack(Box::new(sink))
        }
        None => router,
    };
    #[cfg(not(feature = "slack"))]
    if config.slack.is_some() {
        tracing::warn!("[slack] is configured but Slack support is not compiled in (build with --features slack)");
    }

    // Adapters hold the remaining senders; the loop ends if they all stop
    drop(events_tx);

    let router = relay::run(
        router,
        events_rx,
        config.watchdog.check_interval(),
        shutdown_signal(),
    )
    .await?;

    let pending = router.steam().pending_len();
    if pending > 0 {
        tracing::warn!(pending, "Shutting down with undelivered Steam messages");
    }
    if let Err(e) = router.steam().client().log_off() {
        tracing::debug!(error = %e, "Steam log-off on shutdown failed");
    }
    // Dropping the router drops every sink, which tells the adapter tasks to stop
    drop(router);

    for mut task in tasks {
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
            task.abort();
        }
    }

    tracing::info!("chatrelay stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("Shutdown signal received");
}
