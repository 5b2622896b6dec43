use anyhow::Result;
use litegate_core::{config::AppConfig, engine::EngineSetBuilder, sync::BlockSync};
use server::router::{create_router, AppState};
use std::{net::SocketAddr, sync::Arc};
use tokio::{signal, sync::broadcast};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the logging system based on the configuration.
///
/// `RUST_LOG` takes precedence over the configured level when set.
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.logging.level;
        EnvFilter::new(format!("warn,litegate_core={level},server={level}"))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format.as_str() == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty().with_target(false)).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config =
        AppConfig::load().map_err(|e| anyhow::anyhow!("configuration load failed: {e}"))?;
    // An empty lite-server list fails here: the process must not serve traffic
    // without a pool.
    config.validate().map_err(|e| anyhow::anyhow!("configuration invalid: {e}"))?;

    init_logging(&config);
    info!("starting lite-server gateway");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let engines =
        EngineSetBuilder::from_config(&config.lite_servers).build(&config.lite_servers.entries)?;

    let block_sync = Arc::new(BlockSync::new(
        Arc::new(engines.client.clone()),
        config.poll_interval(),
        config.sync.subscriber_buffer,
    ));
    let sync_handle = block_sync.start(shutdown_tx.subscribe());

    let state = AppState {
        client: engines.client,
        groups: Arc::new(engines.groups),
        block_sync,
    };
    let app = create_router(state, &config.server.cors_allowed_origins);

    let addr: SocketAddr = format!("{}:{}", config.server.bind_address, config.server.bind_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address: {e}"))?;
    info!(address = %addr, "gateway listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await {
        error!(error = %e, "server error occurred");
    }

    let _ = shutdown_tx.send(());
    let _ = sync_handle.await;
    info!("gateway shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install ctrl+c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install signal handler");
                () = std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, starting graceful shutdown");
}
