//! Runs the sync server.

use crate::config::HearthConfig;
use hearth_mqtt::MqttIntegration;
use hearth_server::SyncServer;
use hearth_storage::{FileBackend, InMemoryBackend, ObjectBackend};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Starts the server and blocks until Ctrl-C.
pub async fn run(
    config: HearthConfig,
    storage: Option<PathBuf>,
    no_mqtt: bool,
) -> Result<(), Box<dyn Error>> {
    config.validate()?;
    let server_config = config.server_config()?;

    let backend: Arc<dyn ObjectBackend> = match storage.or_else(|| config.storage.path.clone()) {
        Some(path) => {
            let backend = FileBackend::open_with_create_dirs(&path)?;
            info!(path = %path.display(), objects = backend.len(), "opened journal");
            Arc::new(backend)
        }
        None => {
            warn!("no storage path configured, objects are kept in memory only");
            Arc::new(InMemoryBackend::new())
        }
    };

    let server = SyncServer::start(backend, server_config);

    match config.mqtt {
        Some(mqtt) if !no_mqtt => {
            let bridge = MqttIntegration::new(mqtt, server.store().clone());
            server.register_integration(Arc::new(bridge)).await?;
        }
        Some(_) => info!("MQTT bridge disabled on the command line"),
        None => info!("no MQTT bridge configured"),
    }

    info!(integrations = ?server.integrations(), "hearth running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    server.shutdown().await;
    Ok(())
}
