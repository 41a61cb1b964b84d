//! Dockhand daemon entry point.

use std::sync::{Arc, RwLock};

use log::{debug, error, info};
use tokio::signal;

mod config;
mod discovery;
mod routes;
mod runtime;
mod watcher;

use config::Config;
use routes::Routes;
use runtime::DockerConnector;
use watcher::EventWatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting dockhand daemon with config: {:?}", cfg);

    // Latest published routing table, replaced wholesale on every
    // publication.  A reverse proxy would read routes from here.
    let table: Arc<RwLock<Routes>> = Arc::new(RwLock::new(Routes::new()));

    let table_for_watcher = Arc::clone(&table);
    let watcher = EventWatcher::new(DockerConnector, &cfg, move |routes: Routes| {
        info!("Routing table updated: {} routes", routes.len());
        debug!(
            "Routing table: {}",
            serde_json::to_string(&routes).unwrap_or_default()
        );
        match table_for_watcher.write() {
            Ok(mut table) => *table = routes,
            Err(e) => error!("Routing table lock poisoned: {}", e),
        }
    });
    let watcher_handle = tokio::spawn(watcher.run());

    // Graceful Shutdown
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down...");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }

    watcher_handle.abort();

    info!("Shutdown complete.");
    Ok(())
}
