use std::sync::Arc;

use log::{error, info};
use tokio::net::TcpListener;

use beamctl::{Config, DeviceLink, ProjectorClient, ProjectorMonitor};

#[tokio::main]
async fn main() {
    // Info by default; RUST_LOG overrides (debug shows every frame).
    env_logger::Builder::new()
        .filter(None, log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    info!(
        "Controlling projector at {}:{} (response timeout {:?})",
        config.device_host, config.device_port, config.response_timeout
    );

    let link = DeviceLink::start(config.link_config());
    let client = ProjectorClient::new(link.clone());
    let monitor = Arc::new(ProjectorMonitor::start(client.clone()));
    let app = beamctl::router(client, Arc::clone(&monitor));

    let listener = match TcpListener::bind(&config.listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Cannot listen on {}: {e}", config.listen_addr);
            std::process::exit(1);
        }
    };
    info!("Serving on {}", config.listen_addr);

    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received");
    });

    if let Err(e) = server.await {
        error!("HTTP server failed: {e}");
    }

    monitor.shutdown().await;
    link.shut_down();
    info!("Shut down cleanly");
}
