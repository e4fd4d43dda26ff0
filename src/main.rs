// ABOUTME: Main entry point for the Twitch clip bot
// ABOUTME: Initializes logging and config, wires chat session to the clip workflow, runs until Ctrl+C

use anyhow::Result;
use lore_clipper::{
    config::Config,
    orchestrator::{ClipBot, ClipOrchestrator},
    transport::{ChatSession, SessionConfig, TcpConnector},
    CommandRecognizer,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Set up panic hook to log panics before they crash the process
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\n╔══════════════════════════════════════════════════════════╗");
        eprintln!("║ PANIC! Clipper crashed with the following error:         ║");
        eprintln!("╚══════════════════════════════════════════════════════════╝\n");
        eprintln!("{}", panic_info);
        eprintln!("\nBacktrace:");
        eprintln!("{:?}", std::backtrace::Backtrace::force_capture());
    }));

    // Load .env first so RUST_LOG from it reaches the filter
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,reqwest=warn,hyper=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Lore Clipper");

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Invalid configuration");
            std::process::exit(1);
        }
    };

    tracing::info!(
        channel = %config.chat.channel,
        nick = %config.nick(),
        irc = %format!("{}:{}", config.chat.host, config.chat.port),
        trigger = %config.clips.trigger,
        cooldown_secs = config.clips.cooldown_secs,
        cooldown_mode = ?config.clips.cooldown_mode,
        clip_duration_secs = config.clips.duration_secs,
        "Configuration loaded"
    );

    let session = ChatSession::new(
        Arc::new(TcpConnector::new(config.chat.host.clone(), config.chat.port)),
        SessionConfig {
            host: config.chat.host.clone(),
            nick: config.nick(),
            password: config.chat_password(),
            channel: config.chat.channel.clone(),
            reconnect_delay: config.reconnect_delay(),
        },
    );

    let orchestrator = Arc::new(ClipOrchestrator::from_config(&config, session.sender())?);
    let bot = ClipBot::new(CommandRecognizer::new(&config.clips.trigger), orchestrator);

    tokio::select! {
        _ = session.run(&bot) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown requested, abandoning in-flight clip workers");
        }
    }

    Ok(())
}
