#![warn(clippy::all)]

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use yara_bot::{build_bot, spawn_processor};
use yara_channels::cli::CLI_USER_ID;
use yara_channels::{Channel, CliChannel, TelegramChannel};
use yara_common::Config;

/// Yara - Telegram assistant with Wikipedia lookup and LLM chat.
#[derive(Parser, Debug)]
#[command(name = "yara")]
#[command(version)]
#[command(about = "Telegram assistant with Wikipedia lookup and LLM chat.", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.yara/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Chat on the terminal instead of Telegram
    #[arg(long)]
    cli: bool,

    /// Keep conversation history in memory only
    #[arg(long)]
    ephemeral: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_with_env(cli.config.as_deref())?;
    yara_common::logging::init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    config
        .validate(!cli.cli)
        .context("Invalid configuration")?;

    if cli.cli {
        // The terminal user is always allowed.
        config.telegram.allowed_users.push(CLI_USER_ID.to_string());
    }

    let bot = Arc::new(build_bot(&config, cli.ephemeral).context("Failed to open history store")?);

    let mut channel: Box<dyn Channel> = if cli.cli {
        Box::new(CliChannel::new())
    } else {
        Box::new(TelegramChannel::with_api_base(
            config.require_telegram_bot_token()?,
            config.telegram.api_base.clone(),
            config.telegram.poll_timeout_secs,
        ))
    };
    channel
        .init()
        .await
        .with_context(|| format!("Failed to initialize {} channel", channel.name()))?;
    let channel: Arc<dyn Channel> = Arc::from(channel);

    let (tx, rx) = mpsc::channel(100);
    let processor = spawn_processor(bot, channel.clone(), rx);

    let listener_channel = channel.clone();
    let mut listener = tokio::spawn(async move { listener_channel.listen(tx).await });

    tracing::info!(channel = channel.name(), "Yara is running. Press Ctrl+C to stop.");

    tokio::select! {
        result = &mut listener => {
            match result {
                Ok(Ok(())) => tracing::info!("Listener finished"),
                Ok(Err(e)) => tracing::error!(error = %e, "Listener failed"),
                Err(e) => tracing::error!(error = %e, "Listener task panicked"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            listener.abort();
        }
    }

    // The listener owned the only sender; the processor drains and stops.
    if let Err(e) = processor.await {
        tracing::error!(error = %e, "Processor task panicked");
    }

    channel.shutdown().await?;
    Ok(())
}
