//! Subcommand handling.
//!
//! Each subcommand gets its own tokio runtime, built here so `main` stays
//! synchronous.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::{broadcast, watch, Notify};
use tracing::{info, warn};

use crate::automation::{
    AutomationEngine, AutomationError, AutomationSettings, SimulatedProvider, UiAutomationProvider,
};
use crate::cli::{Commands, Target};
use crate::config::{self, Config};
use crate::control::{ClientEvent, CommandServer, SocketClient};
use crate::poller::StatusPoller;

/// How long `send` waits for the server to answer.
const SEND_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle a parsed subcommand with the loaded configuration.
pub fn handle_command(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Serve { simulate } => block_on(run_serve(config, simulate)),
        Commands::Exec { target, simulate } => block_on(run_exec(config, target, simulate)),
        Commands::Send { target } => block_on(run_send(config, target)),
        Commands::Watch => block_on(run_watch(config)),
        Commands::Config => {
            print!("{}", config::to_toml(&config.resolved())?);
            Ok(())
        }
    }
}

fn block_on<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;
    rt.block_on(future)
}

/// Choose the automation backend.
///
/// Only the simulated backend ships with this crate.
pub fn provider_for(
    simulate: bool,
    settings: &AutomationSettings,
) -> Result<Arc<dyn UiAutomationProvider>, AutomationError> {
    if simulate {
        info!("Using simulated conferencing application");
        return Ok(Arc::new(SimulatedProvider::meeting(
            &settings.labels,
            &settings.meeting_window_title,
        )));
    }
    Err(AutomationError::ProviderUnavailable(
        "this build has no native backend; run with --simulate".to_string(),
    ))
}

fn build_engine(config: &Config, simulate: bool) -> Result<Arc<AutomationEngine>> {
    let settings = config.automation_settings();
    let provider = provider_for(simulate, &settings)?;
    Ok(Arc::new(AutomationEngine::new(provider, settings)))
}

async fn run_serve(config: Config, simulate: bool) -> Result<()> {
    let engine = build_engine(&config, simulate)?;

    let (status_tx, _) = broadcast::channel(16);
    let resample = Arc::new(Notify::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poller = StatusPoller::new(engine.clone(), config.poll_interval());
    let poller_task = tokio::spawn(poller.run(status_tx.clone(), resample.clone(), shutdown_rx));

    let server = CommandServer::start(config.socket_path(), engine, status_tx, resample)
        .context("Failed to start command server")?;
    println!("Listening on {}", server.path().display());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Interrupted, shutting down");

    let _ = shutdown_tx.send(true);
    server.stop().await;
    if let Err(e) = poller_task.await {
        warn!("Status poller ended abnormally: {}", e);
    }
    Ok(())
}

async fn run_exec(config: Config, target: Target, simulate: bool) -> Result<()> {
    let engine = build_engine(&config, simulate)?;

    if let Some(verb) = target.verb() {
        let outcome = engine
            .execute(verb)
            .await
            .with_context(|| format!("{} failed", verb))?;
        println!("{}: {}", verb, outcome);
    }
    println!("{}", engine.snapshot());
    Ok(())
}

async fn run_send(config: Config, target: Target) -> Result<()> {
    let settings = config.client_settings();
    let path = settings.socket_path.clone();
    let connect_wait = settings.connect_timeout * 2;
    let (client, mut events) = SocketClient::start(settings);

    let result = async {
        match tokio::time::timeout(connect_wait, events.recv()).await {
            Ok(Some(ClientEvent::Connected)) => {}
            _ => bail!("Could not connect to {}", path.display()),
        }

        // The client asks for status as soon as it connects.
        let initial = next_answer(&mut events).await?;
        let Some(verb) = target.verb() else {
            println!("{}", initial);
            return Ok(());
        };

        client.send(verb).await;
        let answer = next_answer(&mut events).await?;
        println!("{}", answer);
        Ok(())
    }
    .await;

    client.stop().await;
    result
}

/// Wait for the next status or text reply, rendered for printing.
async fn next_answer(events: &mut tokio::sync::mpsc::Receiver<ClientEvent>) -> Result<String> {
    let deadline = tokio::time::Instant::now() + SEND_REPLY_TIMEOUT;
    loop {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Some(ClientEvent::Status(snapshot))) => return Ok(snapshot.to_string()),
            Ok(Some(ClientEvent::Reply(text))) => return Ok(text),
            Ok(Some(ClientEvent::Disconnected)) | Ok(None) => {
                bail!("Server closed the connection")
            }
            Ok(Some(ClientEvent::Connected)) => {}
            Err(_) => bail!("No answer from server within {:?}", SEND_REPLY_TIMEOUT),
        }
    }
}

async fn run_watch(config: Config) -> Result<()> {
    let (client, mut events) = SocketClient::start(config.client_settings());

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ClientEvent::Connected) => println!("connected"),
                Some(ClientEvent::Disconnected) => println!("disconnected"),
                Some(ClientEvent::Status(snapshot)) => println!("{}", snapshot),
                Some(ClientEvent::Reply(text)) => println!("{}", text),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.stop().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_provider_is_unavailable() {
        let err = provider_for(false, &AutomationSettings::default()).err().unwrap();
        assert!(matches!(err, AutomationError::ProviderUnavailable(_)));
        assert!(err.to_string().contains("--simulate"));
    }

    #[test]
    fn test_simulated_provider_uses_configured_labels() {
        let mut settings = AutomationSettings::default();
        settings.labels.mute = "Stummschalten".to_string();

        let provider = provider_for(true, &settings).unwrap();
        let engine = AutomationEngine::new(provider, settings);
        assert!(engine.meeting_active());
    }

    #[tokio::test]
    async fn test_exec_status_with_simulator() {
        run_exec(Config::default(), Target::Status, true).await.unwrap();
        run_exec(Config::default(), Target::Mute, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_exec_without_backend_fails() {
        assert!(run_exec(Config::default(), Target::Mute, false).await.is_err());
    }
}
