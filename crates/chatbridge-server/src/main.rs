//! ChatBridge: tiered chat transport server (API, browser, human relay).

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

mod routes;
mod state;

use state::AppState;

fn resolve_data_dir() -> PathBuf {
    std::env::var("CHATBRIDGE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|p| p.to_path_buf()));
            if let Some(dir) = exe_dir {
                let parent_data = dir.join("../data");
                if parent_data.exists() {
                    return parent_data;
                }
            }
            PathBuf::from("data")
        })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "--help" | "-h" | "help" => {
                println!("ChatBridge — tiered chat transport server");
                println!();
                println!("Usage: chatbridge [command]");
                println!();
                println!("Commands:");
                println!("  (none)    Start the server");
                println!("  help      Show this help message");
                println!();
                println!("Environment:");
                println!("  CHATBRIDGE_DATA_DIR               Data directory (default: data)");
                println!("  PORT                              Listen port (default: 3010)");
                println!("  CHATBRIDGE_SESSION_TTL_SECS       Idle session lifetime");
                println!("  CHATBRIDGE_SWEEP_INTERVAL_SECS    Reaper sweep interval");
                println!("  CHATBRIDGE_RELAY_ENABLED          Human relay on/off");
                println!("  CHATBRIDGE_RELAY_TIMEOUT_SECS     Give up on a human after this long");
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'chatbridge help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());

    let config = chatbridge_core::BridgeConfig::from_env(&data_dir)?;
    let port = config.port;

    let bridge = chatbridge_runtime::ChatBridge::from_config(&config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize bridge: {}", e))?;
    bridge.start();

    let state = Arc::new(AppState::new(config, bridge));
    let app = routes::build_router(state.clone());

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("ChatBridge server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.bridge.shutdown().await;
    Ok(())
}
