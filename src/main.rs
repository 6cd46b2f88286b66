use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use sitewire::backend::BackendClient;
use sitewire::error::Result;
use sitewire::gateway::GatewayHandler;
use sitewire::options::ServerOptions;
use sitewire::registry::ConnectionRegistry;
use sitewire::relay::EventRelay;
use sitewire::{http_handler, ws_handler};

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = ServerOptions::default();

    let config_path =
        std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config/config.json".to_string());
    if Path::new(&config_path).exists() {
        // Basic println: logging is not initialized yet.
        println!("[PRE-LOG] Loading configuration from {config_path}");
        match ServerOptions::load_from_file(&config_path).await {
            Ok(file_config) => config = file_config,
            Err(e) => {
                eprintln!("[PRE-LOG-ERROR] {e}. Using defaults and environment variables.");
            }
        }
    }
    config.override_from_env();

    init_tracing(config.debug);
    info!(debug = config.debug, "logging initialized");

    let registry = Arc::new(ConnectionRegistry::new());
    let backend = BackendClient::new(&config.backend)?;
    let relay = EventRelay::new(&config.redis, Arc::clone(&registry))?;
    relay.start().await?;

    let handler = Arc::new(GatewayHandler::new(registry, backend, config.clone()));

    let router = Router::new()
        .route("/up", get(http_handler::up))
        .route("/{site}", get(ws_handler::handle_ws_upgrade))
        .with_state(Arc::clone(&handler));

    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "realtime gateway listening");

    let server = axum::serve(listener, router.into_make_service());
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!(error = %e, "server error");
            }
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received, starting graceful shutdown");
        }
    }

    handler.shutdown().await;
    info!("server shutdown complete");
    Ok(())
}

/// `RUST_LOG` wins when set; otherwise the debug flag picks the default
/// directive. Debug mode also turns on file/line locations.
fn init_tracing(debug: bool) {
    let default_directive = if debug { "info,sitewire=debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let builder = fmt::Subscriber::builder().with_env_filter(env_filter);
    if debug {
        builder
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .finish()
            .init();
    } else {
        builder.with_target(false).finish().init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
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
