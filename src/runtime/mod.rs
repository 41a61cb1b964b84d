//! Container runtime abstraction.
//!
//! The event watcher and the discovery pass only ever talk to the
//! runtime through these traits, so the whole synchronization loop can
//! be exercised against a scripted in-memory runtime in tests.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod docker;
#[cfg(test)]
pub mod fake;

pub use docker::DockerConnector;

/// Errors at the runtime-client boundary that the watcher needs to tell
/// apart.  Everything else travels as an opaque transport error.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("already subscribed to the event stream")]
    AlreadySubscribed,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// One entry from the runtime's running-container listing.
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: String,
}

/// Point-in-time description of one running container, read during a
/// single discovery pass and dropped afterwards.
#[derive(Debug, Clone, Default)]
pub struct ContainerDetail {
    pub id: String,
    /// Container name without the leading slash the daemon prepends.
    pub name: String,
    /// Raw `KEY=VALUE` environment declarations.
    pub env: Vec<String>,
    /// Address on the default bridge network, if attached to it.
    pub bridge_ip: String,
    /// Addresses on any other attached networks, in arbitrary order.
    pub network_ips: Vec<String>,
    /// Port map keyed by `"<port>/<proto>"`, e.g. `"8080/tcp"`.  A key
    /// with no bindings means the port is exposed but not published on
    /// the host.
    pub ports: HashMap<String, Vec<PortBinding>>,
    /// Cluster node the container is scheduled on, when the daemon
    /// reports one.  `None` means the container runs on this host.
    pub node: Option<String>,
}

/// A host-side publication of a container port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortBinding {
    pub host_ip: String,
    pub host_port: String,
}

/// A container lifecycle event as delivered by the runtime.
#[derive(Debug, Clone)]
pub struct RuntimeEvent {
    pub status: String,
    pub id: String,
}

/// A connected client handle to the container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Lists the containers currently running.
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>>;

    /// Fetches the full metadata for one container.
    async fn inspect_container(&self, id: &str) -> Result<ContainerDetail>;

    /// Liveness probe against the runtime.
    async fn ping(&self) -> Result<()>;

    /// Subscribes to the runtime's lifecycle event stream.  The
    /// receiver yields `None` once the stream is torn down on the
    /// runtime side.  At most one subscription is active per handle.
    async fn subscribe_events(&self) -> Result<mpsc::Receiver<RuntimeEvent>, RuntimeError>;

    /// Drops the active event subscription, if any.
    async fn unsubscribe_events(&self);
}

/// Produces fresh runtime client handles.  A new handle fully replaces
/// the previous one after a reconnect.
#[async_trait]
pub trait RuntimeConnector: Send + Sync {
    type Runtime: ContainerRuntime;

    async fn connect(&self) -> Result<Self::Runtime>;
}
