mod config;
mod console;
mod diagnostics;

use anyhow::{Context, Result};
use chatline_session::{ChatSession, CurrentUser, HttpConversationApi, WsTransport};
use clap::Parser;
use config::ClientConfig;
use diagnostics::{Cli, Command};
use std::sync::Arc;
use tracing::{info, warn};

fn dump_config(config: &ClientConfig, path: &std::path::Path, show_sensitive: bool) {
    println!("\n=== Client Configuration ===");
    println!("File: {}", path.display());

    println!("\n[Server]");
    println!("API URL: {}", config.server.api_url);
    println!("Socket URL: {}", config.server.socket_url);
    println!("Request timeout: {} seconds", config.server.request_timeout_secs);
    match (&config.server.auth_token, show_sensitive) {
        (Some(token), true) => println!("Auth token: {}", token),
        (Some(_), false) => println!("Auth token: <hidden>"),
        (None, _) => println!("Auth token: <none>"),
    }

    println!("\n[Account]");
    println!("User ID: {}", config.account.user_id);
    println!("Email: {}", config.account.email);

    println!("\n[Session]");
    println!(
        "Typing quiet period: {} ms",
        config.session.typing_quiet_period_ms
    );
    println!(
        "Remote typing timeout: {} ms",
        config.session.remote_typing_timeout_ms
    );
    println!("Event buffer: {}", config.session.event_buffer);
}

async fn run(config: ClientConfig) -> Result<()> {
    config.validate()?;

    let api = HttpConversationApi::new(config.server.api_config())
        .context("Failed to create API client")?;
    let transport = WsTransport::connect(config.server.socket_config(&config.session))
        .await
        .context("Failed to connect to the real-time service")?;

    let session = ChatSession::new(
        CurrentUser::new(config.account.user_id.clone(), config.account.email.clone()),
        Arc::new(api),
        Arc::new(transport),
        config.session.clone(),
    );

    session
        .start()
        .await
        .context("Failed to start chat session")?;

    let result = console::run(&session).await;

    if let Err(e) = session.shutdown().await {
        warn!("Error while closing the session: {}", e);
    }

    result
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    diagnostics::init_logging(&cli).context("Failed to initialize logging")?;

    let config_path = cli.config.clone().unwrap_or_else(ClientConfig::default_path);
    let config = ClientConfig::load(&config_path).context("Failed to load configuration")?;
    info!("Configuration loaded from {}", config_path.display());

    match cli.command.unwrap_or(Command::Run) {
        Command::DumpConfig { show_sensitive } => {
            dump_config(&config, &config_path, show_sensitive);
            Ok(())
        }
        Command::Run => run(config).await,
    }
}
