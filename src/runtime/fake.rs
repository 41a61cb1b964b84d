//! Scripted in-memory runtime used by the discovery and watcher tests.

use super::{
    ContainerDetail, ContainerRuntime, ContainerSummary, RuntimeConnector, RuntimeError,
    RuntimeEvent,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Cheaply cloneable fake runtime handle; clones share state so a test
/// can keep a handle while the watcher owns another.
#[derive(Clone, Default)]
pub struct FakeRuntime {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    containers: Mutex<Vec<ContainerDetail>>,
    fail_listing: Mutex<bool>,
    failing_inspects: Mutex<Vec<String>>,
    failing_pings: Mutex<u32>,
    failing_subscribes: Mutex<u32>,
    event_tx: Mutex<Option<mpsc::Sender<RuntimeEvent>>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_containers(&self, containers: Vec<ContainerDetail>) {
        *self.inner.containers.lock().unwrap() = containers;
    }

    pub fn fail_listing(&self, fail: bool) {
        *self.inner.fail_listing.lock().unwrap() = fail;
    }

    /// Makes inspection of the given container id fail.
    pub fn fail_inspect(&self, id: &str) {
        self.inner
            .failing_inspects
            .lock()
            .unwrap()
            .push(id.to_string());
    }

    /// Makes the next `count` pings fail.
    pub fn fail_pings(&self, count: u32) {
        *self.inner.failing_pings.lock().unwrap() = count;
    }

    /// Makes the next `count` subscription attempts fail.
    pub fn fail_subscribes(&self, count: u32) {
        *self.inner.failing_subscribes.lock().unwrap() = count;
    }

    pub fn subscribed(&self) -> bool {
        self.inner.event_tx.lock().unwrap().is_some()
    }

    /// Delivers a lifecycle event to the active subscription.
    pub fn send_event(&self, status: &str, id: &str) {
        self.inner
            .event_tx
            .lock()
            .unwrap()
            .as_ref()
            .expect("no active event subscription")
            .try_send(RuntimeEvent {
                status: status.to_string(),
                id: id.to_string(),
            })
            .expect("event buffer full");
    }

    /// Tears the event stream down on the runtime side, as the daemon
    /// does when it goes away.
    pub fn close_events(&self) {
        self.inner.event_tx.lock().unwrap().take();
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        if *self.inner.fail_listing.lock().unwrap() {
            return Err(anyhow!("listing containers failed"));
        }
        Ok(self
            .inner
            .containers
            .lock()
            .unwrap()
            .iter()
            .map(|c| ContainerSummary { id: c.id.clone() })
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetail> {
        if self
            .inner
            .failing_inspects
            .lock()
            .unwrap()
            .iter()
            .any(|failing| failing == id)
        {
            return Err(anyhow!("inspect failed for {}", id));
        }
        self.inner
            .containers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| anyhow!("no such container: {}", id))
    }

    async fn ping(&self) -> Result<()> {
        let mut failing = self.inner.failing_pings.lock().unwrap();
        if *failing > 0 {
            *failing -= 1;
            return Err(anyhow!("ping failed"));
        }
        Ok(())
    }

    async fn subscribe_events(&self) -> Result<mpsc::Receiver<RuntimeEvent>, RuntimeError> {
        {
            let mut failing = self.inner.failing_subscribes.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(RuntimeError::Other(anyhow!("subscribe failed")));
            }
        }
        let mut slot = self.inner.event_tx.lock().unwrap();
        if slot.is_some() {
            return Err(RuntimeError::AlreadySubscribed);
        }
        let (tx, rx) = mpsc::channel(16);
        *slot = Some(tx);
        Ok(rx)
    }

    async fn unsubscribe_events(&self) {
        self.inner.event_tx.lock().unwrap().take();
    }
}

/// Connector handing out clones of one shared [`FakeRuntime`].
#[derive(Clone)]
pub struct FakeConnector {
    runtime: FakeRuntime,
    state: Arc<ConnectorState>,
}

#[derive(Default)]
struct ConnectorState {
    failures: Mutex<u32>,
    attempts: AtomicUsize,
}

impl FakeConnector {
    pub fn new(runtime: FakeRuntime) -> Self {
        Self {
            runtime,
            state: Arc::new(ConnectorState::default()),
        }
    }

    /// Makes the next `count` connection attempts fail.
    pub fn fail_connects(&self, count: u32) {
        *self.state.failures.lock().unwrap() = count;
    }

    pub fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RuntimeConnector for FakeConnector {
    type Runtime = FakeRuntime;

    async fn connect(&self) -> Result<FakeRuntime> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);
        let mut failures = self.state.failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(anyhow!("connection refused"));
        }
        Ok(self.runtime.clone())
    }
}
