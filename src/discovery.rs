//! Route discovery pass.
//!
//! One call produces one complete routing snapshot from the containers
//! currently running: list them, inspect each concurrently, and turn
//! every routable container into a table entry.  Listing failures abort
//! the pass; everything after that is best effort per container.

use crate::routes::{Route, Routes};
use crate::runtime::{ContainerDetail, ContainerRuntime};
use anyhow::Result;
use log::{debug, error};
use std::sync::Arc;

/// Host IP meaning "any interface"; unusable as a reachable endpoint.
const WILDCARD_HOST_IP: &str = "0.0.0.0";

/// Enumerates all running containers and assembles a fresh snapshot.
///
/// Inspections run one task per container; a failed inspection skips
/// that container and never fails the pass.  The snapshot is assembled
/// only after every inspection task has been joined.
pub async fn discover_routes<R>(runtime: &Arc<R>, fallback_ports: &[String]) -> Result<Routes>
where
    R: ContainerRuntime,
{
    let containers = runtime.list_containers().await?;

    let mut inspections = Vec::with_capacity(containers.len());
    for container in containers {
        let runtime = Arc::clone(runtime);
        inspections.push(tokio::spawn(async move {
            match runtime.inspect_container(&container.id).await {
                Ok(detail) => Some(detail),
                Err(e) => {
                    error!(
                        "Failed inspecting container {}: {}",
                        short_id(&container.id),
                        e
                    );
                    None
                }
            }
        }));
    }

    let mut routes = Routes::new();
    for inspection in inspections {
        let container = match inspection.await {
            Ok(Some(detail)) => detail,
            _ => continue,
        };
        if let Some(route) = route_for_container(&container, fallback_ports) {
            debug!(
                "Adding route {} -> {}:{} ({})",
                route.host,
                route.upstream.ip,
                route.upstream.port,
                container.name
            );
            routes.add(route);
        }
    }

    Ok(routes)
}

/// Completes the builder output for one container, or rules the
/// container out as unroutable.
fn route_for_container(container: &ContainerDetail, fallback_ports: &[String]) -> Option<Route> {
    let mut route = Route::from_env(&container.env);

    // Without a pinned port, take the first candidate the container
    // actually exposes.
    if route.upstream.port.is_empty() {
        for port in fallback_ports {
            if container.ports.contains_key(&format!("{}/tcp", port)) {
                route.upstream.port = port.clone();
                break;
            }
        }
    }

    if route.upstream.port.is_empty() {
        debug!(
            "Couldn't find a port to expose for {} ({})",
            container.name,
            short_id(&container.id)
        );
        return None;
    }

    route.upstream.container = container.name.clone();

    // A binding with a concrete host IP is reachable from outside the
    // local bridge, so it wins; the bound host port replaces the
    // container port.
    if let Some(bindings) = container.ports.get(&format!("{}/tcp", route.upstream.port)) {
        for binding in bindings {
            if !binding.host_ip.is_empty() && binding.host_ip != WILDCARD_HOST_IP {
                route.upstream.ip = binding.host_ip.clone();
                route.upstream.port = binding.host_port.clone();
                break;
            }
        }
    }

    let local = container.node.is_none();

    // The bridge address only makes sense when the container runs on
    // this host.
    if local && route.upstream.ip.is_empty() {
        route.upstream.ip = container.bridge_ip.clone();
    }

    if local && route.upstream.ip.is_empty() {
        for ip in &container.network_ips {
            if !ip.is_empty() {
                route.upstream.ip = ip.clone();
                break;
            }
        }
    }

    if route.upstream.ip.is_empty() {
        debug!(
            "Couldn't find an IP to reach {} ({})",
            container.name,
            short_id(&container.id)
        );
        return None;
    }

    route.is_valid().then_some(route)
}

fn short_id(id: &str) -> &str {
    id.get(..7).unwrap_or(id)
}
