use anyhow::Result;
use seawarn_server::app;
use seawarn_server::config::ServerConfig;
use seawarn_server::seed;
use seawarn_server::state::AppState;
use seawarn_storage::Store;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::time::{interval, Duration};
use tracing_subscriber::EnvFilter;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  seawarn-server [config.toml]                            Start the server");
    eprintln!("  seawarn-server init-directory <config.toml> <seed.json> Seed contacts and escalation policies");
}

#[tokio::main]
async fn main() -> Result<()> {
    seawarn_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("seawarn=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("init-directory") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-directory requires <config.toml> and <seed.json> arguments")
            })?;
            let seed_path = args.get(3).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-directory requires <seed.json> argument")
            })?;
            let config = ServerConfig::load(config_path)?;
            let store = Store::new(&config.db_url).await?;
            seed::init_from_seed_file(&store, seed_path).await
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            let config_path = args
                .get(1)
                .map(|s| s.as_str())
                .unwrap_or("config/server.toml");
            run_server(config_path).await
        }
    }
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;

    tracing::info!(
        http_port = config.http_port,
        dispatchers = config.dispatchers.len(),
        "seawarn-server starting"
    );

    let store = Arc::new(Store::new(&config.db_url).await?);
    let state = AppState::build(config.clone(), store);

    // Re-arm escalation timers for alerts that were live at shutdown.
    match state.engine.clone().resume().await {
        Ok(0) => {}
        Ok(count) => tracing::info!(count, "Resumed in-flight escalations"),
        Err(e) => tracing::error!(error = %e, "Failed to resume escalations"),
    }

    // Periodic rate-limit bookkeeping so idle keys do not accumulate.
    let sweep_guard = state.guard.clone();
    let sweep_handle = tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(600));
        loop {
            tick.tick().await;
            sweep_guard.sweep(chrono::Utc::now());
        }
    });

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let app = app::build_http_app(state);
    let listener = tokio::net::TcpListener::bind(http_addr).await?;

    tracing::info!(http = %http_addr, "Server started");

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server.with_graceful_shutdown(async { signal::ctrl_c().await.ok(); }) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server error");
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("Shutting down gracefully");
        }
    }

    sweep_handle.abort();
    tracing::info!("Server stopped");

    Ok(())
}
