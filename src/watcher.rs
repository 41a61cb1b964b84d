//! Event synchronization loop.
//!
//! A single control task owns the connection to the container runtime
//! and keeps the published routing table in sync with it: full
//! re-discovery on every (re)connect and on every relevant lifecycle
//! event, with fixed-interval liveness checks in between.  Every I/O
//! failure is recovered locally by backing off and retrying; the loop
//! itself never terminates.

use crate::config::Config;
use crate::discovery::discover_routes;
use crate::routes::Routes;
use crate::runtime::{ContainerRuntime, RuntimeConnector, RuntimeError, RuntimeEvent};
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

/// Lifecycle statuses that invalidate the current routing table.
const REFRESH_STATUSES: [&str; 3] = ["start", "stop", "die"];

/// Connection state of the control loop.  The runtime handle moves
/// along with the state, so a reconnect always starts from a fresh
/// handle and the old one is dropped wholesale.
enum WatchState<R> {
    /// No live connection to the runtime.
    Disconnected,
    /// Connected but not yet subscribed to lifecycle events.
    Idle { runtime: Arc<R> },
    /// Connected and consuming the lifecycle event stream.
    Watching {
        runtime: Arc<R>,
        events: mpsc::Receiver<RuntimeEvent>,
    },
}

/// Drives the synchronization loop and hands each complete snapshot to
/// the registered handler.
///
/// The handler is invoked synchronously from the control task, so a
/// slow consumer simply delays the next event check.
pub struct EventWatcher<C, F> {
    connector: C,
    fallback_ports: Vec<String>,
    ping_interval: Duration,
    reconnect_backoff: Duration,
    handler: F,
}

impl<C, F> EventWatcher<C, F>
where
    C: RuntimeConnector,
    F: FnMut(Routes) + Send,
{
    pub fn new(connector: C, config: &Config, handler: F) -> Self {
        Self {
            connector,
            fallback_ports: config.fallback_ports(),
            ping_interval: config.ping_interval(),
            reconnect_backoff: config.reconnect_backoff(),
            handler,
        }
    }

    /// Runs the loop for the lifetime of the process.
    pub async fn run(mut self) {
        let mut state = WatchState::Disconnected;
        loop {
            state = self.step(state).await;
        }
    }

    /// Performs one state transition.
    async fn step(&mut self, state: WatchState<C::Runtime>) -> WatchState<C::Runtime> {
        match state {
            WatchState::Disconnected => self.connect().await,
            WatchState::Idle { runtime } => self.subscribe(runtime).await,
            WatchState::Watching { runtime, events } => self.watch(runtime, events).await,
        }
    }

    async fn connect(&mut self) -> WatchState<C::Runtime> {
        let runtime = match self.connector.connect().await {
            Ok(runtime) => Arc::new(runtime),
            Err(e) => {
                error!("Unable to connect to the container runtime: {}", e);
                sleep(self.reconnect_backoff).await;
                return WatchState::Disconnected;
            }
        };

        debug!("Connected to the container runtime");
        // A failed first pass is not fatal; the loop proceeds to the
        // event subscription with whatever table was published before.
        self.refresh(&runtime).await;
        WatchState::Idle { runtime }
    }

    async fn subscribe(&mut self, runtime: Arc<C::Runtime>) -> WatchState<C::Runtime> {
        if let Err(e) = runtime.ping().await {
            error!("Unable to ping the container runtime: {}", e);
            sleep(self.reconnect_backoff).await;
            return WatchState::Disconnected;
        }

        match runtime.subscribe_events().await {
            Ok(events) => {
                info!("Watching container events...");
                WatchState::Watching { runtime, events }
            }
            Err(RuntimeError::AlreadySubscribed) => {
                // A previous subscription is still registered on this
                // handle; re-arm it on the next iteration without
                // backing off or dropping the connection.
                debug!("Event subscription already registered, re-arming");
                runtime.unsubscribe_events().await;
                WatchState::Idle { runtime }
            }
            Err(e) => {
                error!("Error subscribing to container events: {}", e);
                sleep(self.reconnect_backoff).await;
                WatchState::Idle { runtime }
            }
        }
    }

    async fn watch(
        &mut self,
        runtime: Arc<C::Runtime>,
        mut events: mpsc::Receiver<RuntimeEvent>,
    ) -> WatchState<C::Runtime> {
        if let Err(e) = runtime.ping().await {
            error!("Unable to ping the container runtime: {}", e);
            runtime.unsubscribe_events().await;
            sleep(self.reconnect_backoff).await;
            return WatchState::Disconnected;
        }

        match timeout(self.ping_interval, events.recv()).await {
            Ok(Some(event)) => {
                if REFRESH_STATUSES.contains(&event.status.as_str()) {
                    debug!(
                        "Received event {} for container {}",
                        event.status,
                        event.id.get(..12).unwrap_or(&event.id)
                    );
                    self.refresh(&runtime).await;
                }
                WatchState::Watching { runtime, events }
            }
            Ok(None) => {
                // The stream was torn down on the runtime side;
                // reconnect right away.
                info!("Container event stream closed");
                runtime.unsubscribe_events().await;
                WatchState::Disconnected
            }
            // Idle timeout: loop around to force the next liveness check.
            Err(_) => WatchState::Watching { runtime, events },
        }
    }

    /// Runs one discovery pass and publishes the snapshot on success.
    /// A failed pass leaves the previously published table standing.
    async fn refresh(&mut self, runtime: &Arc<C::Runtime>) {
        match discover_routes(runtime, &self.fallback_ports).await {
            Ok(routes) => {
                info!("Publishing {} routes", routes.len());
                (self.handler)(routes);
            }
            Err(e) => error!("Error enumerating routes: {}", e),
        }
    }
}
