use clap::Parser;
use jrplugin_server::{
    ConsoleProducer, LogBridge, PluginServer,
    server::{
        config::{CliArgs, ServerConfig},
        runtime::{build_runtime, run_bounded},
        telemetry::init_telemetry,
    },
};
use std::sync::Arc;
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    if let Some(cookie) = &config.magic_cookie {
        cookie.verify()?;
    }

    // A hung work unit must not outlive the server.
    let grace = config.shutdown_timeout;
    run_bounded(build_runtime()?, grace, run(config))
}

async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let bridge = LogBridge::default();
    let providers = init_telemetry(&bridge, config.bridge_level)?;

    let server = PluginServer::new(config, bridge, Arc::new(ConsoleProducer));
    let result = async {
        server
            .bind()
            .await?
            .serve_with_shutdown(std::io::stdout(), shutdown_signal())
            .await
    }
    .await;

    if let Err(e) = &result {
        tracing::error!("Plugin server failed: {e:#}");
    }

    providers.shutdown();
    result
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }
}
