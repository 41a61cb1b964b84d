//! Docker implementation of the runtime traits, backed by bollard.

use super::{
    ContainerDetail, ContainerRuntime, ContainerSummary, PortBinding, RuntimeConnector,
    RuntimeError, RuntimeEvent,
};
use anyhow::Result;
use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::system::EventsOptions;
use bollard::Docker;
use futures_util::stream::StreamExt;
use log::error;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Events buffered between the daemon stream and the watcher.
const EVENT_BUFFER: usize = 100;

pub struct DockerRuntime {
    docker: Docker,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl DockerRuntime {
    pub fn new(docker: Docker) -> Self {
        Self {
            docker,
            forwarder: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let opts = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(opts)).await?;
        Ok(containers
            .into_iter()
            .filter_map(|c| c.id.map(|id| ContainerSummary { id }))
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetail> {
        let detail = self.docker.inspect_container(id, None).await?;
        Ok(detail_from_response(id, detail))
    }

    async fn ping(&self) -> Result<()> {
        self.docker.ping().await?;
        Ok(())
    }

    async fn subscribe_events(&self) -> Result<mpsc::Receiver<RuntimeEvent>, RuntimeError> {
        let mut forwarder = self.forwarder.lock().await;
        if forwarder.as_ref().map_or(false, |h| !h.is_finished()) {
            return Err(RuntimeError::AlreadySubscribed);
        }

        // Only container lifecycle traffic is of interest; the watcher
        // filters further by status.
        let opts = EventsOptions::<String> {
            filters: [("type".to_string(), vec!["container".to_string()])]
                .into_iter()
                .collect(),
            ..Default::default()
        };

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let docker = self.docker.clone();
        *forwarder = Some(tokio::spawn(async move {
            let mut stream = docker.events(Some(opts));
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(event) => {
                        let status = event.action.unwrap_or_default();
                        let id = event.actor.and_then(|a| a.id).unwrap_or_default();
                        if tx.send(RuntimeEvent { status, id }).await.is_err() {
                            // Receiver side is gone, nothing left to forward.
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error in container event stream: {}", e);
                        break;
                    }
                }
            }
            // Dropping the sender here surfaces the stream closure to
            // the watcher as an end-of-channel.
        }));

        Ok(rx)
    }

    async fn unsubscribe_events(&self) {
        if let Some(handle) = self.forwarder.lock().await.take() {
            handle.abort();
        }
    }
}

fn detail_from_response(
    id: &str,
    detail: bollard::models::ContainerInspectResponse,
) -> ContainerDetail {
    let mut container = ContainerDetail {
        id: detail.id.unwrap_or_else(|| id.to_string()),
        name: detail
            .name
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_default(),
        env: detail.config.and_then(|c| c.env).unwrap_or_default(),
        // The engine API reports no placement for containers reached
        // over a direct daemon socket; they are always local.
        node: None,
        ..Default::default()
    };

    if let Some(settings) = detail.network_settings {
        container.bridge_ip = settings.ip_address.unwrap_or_default();
        if let Some(ports) = settings.ports {
            container.ports = ports
                .into_iter()
                .map(|(port, bindings)| {
                    let bindings = bindings
                        .unwrap_or_default()
                        .into_iter()
                        .map(|b| PortBinding {
                            host_ip: b.host_ip.unwrap_or_default(),
                            host_port: b.host_port.unwrap_or_default(),
                        })
                        .collect();
                    (port, bindings)
                })
                .collect();
        }
        if let Some(networks) = settings.networks {
            container.network_ips = networks
                .into_values()
                .map(|n| n.ip_address.unwrap_or_default())
                .collect();
        }
    }

    container
}

/// Connects to the local Docker daemon using default settings.  This
/// handles the unix socket on Linux.
pub struct DockerConnector;

#[async_trait]
impl RuntimeConnector for DockerConnector {
    type Runtime = DockerRuntime;

    async fn connect(&self) -> Result<DockerRuntime> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(DockerRuntime::new(docker))
    }
}
