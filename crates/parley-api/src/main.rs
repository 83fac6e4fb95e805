//! Parley CLI entry point.
//!
//! Binary name: `parley`
//!
//! Parses CLI arguments, sets up tracing, loads configuration, then runs the
//! tool bridge server, the chat API server, or a one-off client command.

mod cli;
mod http;
mod state;

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use parley_infra::config::load_config;
use parley_infra::llm::create_provider;
use parley_infra::mcp::SseToolConnector;
use parley_observe::{TracingOptions, init_tracing, shutdown_tracing};
use state::{BridgeState, ChatState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let tracing_options = TracingOptions::from_verbosity(cli.verbose, cli.quiet)
        .with_json(cli.json)
        .with_otel(cli.otel);
    init_tracing(&tracing_options).map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need configuration
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "parley", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(cli.config.as_deref()).await?;
    let plain_output = !cli.quiet && !cli.json;

    match cli.command {
        Commands::Bridge { host, port } => {
            let host = host.unwrap_or_else(|| config.bridge.host.clone());
            let port = port.unwrap_or(config.bridge.port);

            let state = BridgeState::init(&config.bridge, &config.directory)?;
            let hub = state.hub.clone();

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("failed to bind {addr}"))?;
            announce(plain_output, "Tool bridge", &addr);
            tracing::info!(%addr, directory = %config.directory.base_url, "tool bridge listening");

            // Open streams never end on their own; close them so the
            // server can drain.
            axum::serve(listener, http::router::build_bridge_router(state))
                .with_graceful_shutdown(async move {
                    shutdown_signal().await;
                    hub.shutdown();
                })
                .await?;

            stopped(plain_output);
        }

        Commands::Chat { host, port } => {
            let host = host.unwrap_or_else(|| config.chat.host.clone());
            let port = port.unwrap_or(config.chat.port);

            let api_key = std::env::var(&config.chat.api_key_env).ok();
            let provider = create_provider(&config.chat, api_key).with_context(|| {
                format!("set {} to the provider API key", config.chat.api_key_env)
            })?;
            let state = ChatState::init(&config.chat, provider)?;

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("failed to bind {addr}"))?;
            announce(plain_output, "Chat API", &addr);
            tracing::info!(
                %addr,
                bridge = %config.chat.bridge_url,
                model = %config.chat.model,
                "chat API listening"
            );

            axum::serve(listener, http::router::build_chat_router(state))
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            stopped(plain_output);
        }

        Commands::Tools { url } => {
            let url = url.unwrap_or_else(|| config.chat.bridge_url.clone());
            let timeout = Duration::from_secs(config.chat.connect_timeout_secs.max(1));
            let connector = SseToolConnector::new(&url, timeout, config.chat.tool_call_timeout())?;
            cli::tools::list_tools(&connector, cli.json).await?;
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    shutdown_tracing();
    Ok(())
}

fn announce(plain_output: bool, what: &str, addr: &str) {
    if !plain_output {
        return;
    }
    println!(
        "  {} {} listening on {}",
        console::style("⚡").bold(),
        what,
        console::style(format!("http://{addr}")).cyan()
    );
    println!("  {}", console::style("Press Ctrl+C to stop").dim());
}

fn stopped(plain_output: bool) {
    if plain_output {
        println!("\n  Server stopped.");
    }
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
