//! flowbox CLI and HTTP API entry point.
//!
//! Binary name: `flowbox`
//!
//! Parses CLI arguments, loads the engine config, initializes tracing, then
//! dispatches to the command handler or starts the API server.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use flowbox_infra::config::{default_config_path, load_engine_config, resolve_data_dir};
use flowbox_infra::workflow_file::load_workflow_file;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "flowbox", &mut std::io::stdout());
        return Ok(());
    }

    let data_dir = resolve_data_dir();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| default_config_path(&data_dir));
    let config = load_engine_config(&config_path).await;

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,flowbox_core=debug",
        _ => "trace",
    };
    flowbox_observe::tracing_setup::init_tracing(config.log_format, filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let state = AppState::new(config, data_dir);
    let result = dispatch(cli, state).await;

    flowbox_observe::tracing_setup::shutdown_tracing();
    result
}

async fn dispatch(cli: Cli, state: AppState) -> anyhow::Result<()> {
    match cli.command {
        Commands::Validate { file } => cli::workflow::validate(&state, &file, cli.json).await,

        Commands::Order { file } => cli::workflow::order(&state, &file, cli.json).await,

        Commands::Run { file, boxes } => {
            cli::workflow::run(&state, &file, &boxes, cli.json).await
        }

        Commands::Serve { file, port, host } => {
            if let Some(file) = file {
                let parsed = load_workflow_file(&file).await?;
                let view = state.workflow_service.load_workflow(parsed).await?;
                tracing::info!(path = %file.display(), boxes = view.nodes.len(), "preloaded workflow");
            }
            tracing::info!(data_dir = %state.data_dir.display(), "starting API server");

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            if !cli.quiet {
                println!(
                    "  {} flowbox API listening on {}",
                    console::style("⚡").bold(),
                    console::style(format!("http://{addr}")).cyan()
                );
                println!("  {}", console::style("Press Ctrl+C to stop").dim());
            }

            let router = http::router::build_router(state);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            if !cli.quiet {
                println!("\n  Server stopped.");
            }
            Ok(())
        }

        // Handled before state initialization
        Commands::Completions { .. } => Ok(()),
    }
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
