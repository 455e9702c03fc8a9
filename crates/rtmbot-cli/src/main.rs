//! `rtmbot` command-line bot runner.

use clap::{Parser, Subcommand};
use rtmbot_client::{
    DndUpdatedUser, HandlerResult, Handlers, HandshakeClient, Hello, MessageEvent,
    PresenceChange, RtmClient, Session, SessionSignals,
};
use rtmbot_core::RtmConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rtmbot", about = "rtmbot: Slack Real Time Messaging bot runner")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "rtmbot.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and log events until the session ends
    Run {
        /// Repeat every message back to its channel
        #[arg(long)]
        echo: bool,
    },
    /// Connect, send one message, and disconnect
    Send {
        /// Target channel id
        #[arg(long)]
        channel: String,
        /// Message text
        #[arg(long)]
        text: String,
    },
    /// Perform the handshake only and print the bot identity
    Whoami,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Load the config file if present, defaults otherwise.
fn load_config(path: &Path) -> anyhow::Result<RtmConfig> {
    let config = if path.exists() {
        RtmConfig::load(path)?
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
        RtmConfig::default()
    };
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is not an error.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = load_config(&cli.config)?;
    let token = config.resolve_token()?;

    match cli.command {
        Commands::Whoami => {
            let info = HandshakeClient::from_config(&config)?.connect(&token).await?;
            println!("bot:  {} ({})", info.bot_name, info.bot_id);
            println!("team: {} ({}, {}.slack.com)", info.team.name, info.team.id, info.team.domain);
        }
        Commands::Run { echo } => {
            let mut handlers = Handlers::new()
                .on_hello(log_hello)
                .on_presence_change(log_presence)
                .on_dnd_updated_user(log_dnd);
            handlers = if echo {
                handlers.on_message(echo_message)
            } else {
                handlers.on_message(log_message)
            };

            let client = RtmClient::new(&config)?.with_handlers(handlers);
            let (session, signals) = client.start(&token).await?;
            drive(session, signals).await;
        }
        Commands::Send { channel, text } => {
            let (hello_tx, mut hello_rx) = tokio::sync::mpsc::channel::<()>(1);
            let handlers = Handlers::new().on_hello(move |_session: Session, _hello: Hello| {
                let hello_tx = hello_tx.clone();
                async move {
                    let _ = hello_tx.try_send(());
                    HandlerResult::Ok(())
                }
            });

            let client = RtmClient::new(&config)?.with_handlers(handlers);
            let (session, _signals) = client.start(&token).await?;

            tokio::time::timeout(Duration::from_secs(30), hello_rx.recv())
                .await
                .map_err(|_| anyhow::anyhow!("Timed out waiting for hello"))?;
            let id = session.send_message(&channel, &text).await?;
            info!(id, channel = %channel, "Message sent");
            session.disconnect().await?;
        }
    }

    Ok(())
}

/// Drain both delivery queues until the session ends or Ctrl-C is pressed.
async fn drive(session: Session, mut signals: SessionSignals) {
    loop {
        tokio::select! {
            Some(err) = signals.callback_errors.recv() => {
                warn!(error = %err, "Callback error");
            }
            reason = signals.done.recv() => {
                info!(reason = ?reason, "Session ended");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, disconnecting");
                if let Err(e) = session.disconnect().await {
                    warn!(error = %e, "Disconnect failed");
                }
            }
        }
    }
}

async fn log_hello(session: Session, _hello: Hello) -> HandlerResult {
    info!(bot = %session.bot_name(), team = %session.team().name, "Session ready");
    Ok(())
}

async fn log_message(_session: Session, msg: MessageEvent) -> HandlerResult {
    info!(channel = %msg.channel, user = %msg.user, text = %msg.text, "Message");
    Ok(())
}

async fn echo_message(session: Session, msg: MessageEvent) -> HandlerResult {
    if msg.user.is_empty() || msg.user == session.bot_id() || msg.subtype.is_some() {
        return Ok(());
    }
    session.send_message(&msg.channel, &msg.text).await?;
    Ok(())
}

async fn log_presence(_session: Session, ev: PresenceChange) -> HandlerResult {
    info!(user = %ev.user, presence = %ev.presence, "Presence changed");
    Ok(())
}

async fn log_dnd(_session: Session, ev: DndUpdatedUser) -> HandlerResult {
    info!(
        user = %ev.user,
        enabled = ev.dnd_status.dnd_enabled,
        "Do-not-disturb updated"
    );
    Ok(())
}
