//! Route model and the environment based route builder.
//!
//! Containers opt into routing by declaring well-known environment
//! variables.  Parsing is deliberately forgiving: anything the builder
//! does not recognise is skipped, and missing fields simply leave the
//! route incomplete.  Completing a route (filling in the upstream
//! address and port from the container's network settings) is the
//! discovery pass's job, not the builder's.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Environment key naming the host under which a container is published.
const HOST_KEY: &str = "VIRTUAL_HOST";
/// Environment key pinning the container port the route should target.
const PORT_KEY: &str = "VIRTUAL_PORT";

/// The concrete endpoint a route forwards to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upstream {
    pub ip: String,
    pub port: String,
    pub container: String,
}

/// A single host → upstream mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub host: String,
    pub upstream: Upstream,
}

impl Route {
    /// Builds a route skeleton from `KEY=VALUE` environment declarations.
    ///
    /// There is no failure mode here: malformed entries (no `=`) and
    /// unrecognised keys are ignored, and an empty input yields an
    /// incomplete route that fails [`Route::is_valid`] later.
    pub fn from_env<I, S>(env: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut route = Route::default();
        for entry in env {
            let (key, value) = match entry.as_ref().split_once('=') {
                Some(kv) => kv,
                None => continue,
            };
            match key {
                HOST_KEY => route.host = value.to_string(),
                PORT_KEY => route.upstream.port = value.to_string(),
                _ => {}
            }
        }
        route
    }

    /// A route is publishable only once the host and the full upstream
    /// endpoint are known.
    pub fn is_valid(&self) -> bool {
        !self.host.is_empty() && !self.upstream.ip.is_empty() && !self.upstream.port.is_empty()
    }
}

/// One complete routing table, keyed by host.
///
/// A snapshot is built from scratch by every discovery pass and handed
/// to the consumer as a whole; published snapshots are never mutated in
/// place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Routes(HashMap<String, Route>);

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits a route into the snapshot.  Routes that fail the validity
    /// check are dropped; a later route for the same host replaces the
    /// earlier one.
    pub fn add(&mut self, route: Route) {
        if route.is_valid() {
            self.0.insert(route.host.clone(), route);
        }
    }

    pub fn get(&self, host: &str) -> Option<&Route> {
        self.0.get(host)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
