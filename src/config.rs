use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Candidate container ports to route to, in priority order, for
    /// containers that don't pin one via `VIRTUAL_PORT`.
    pub route_ports: String,
    /// Seconds between liveness checks while watching events.
    pub ping_interval_secs: u64,
    /// Seconds to wait before retrying after a connection failure.
    pub reconnect_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            route_ports: "80,8080".into(),
            ping_interval_secs: 10,
            reconnect_secs: 10,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("dockhand.toml"))
            .merge(Json::file("dockhand.json"))
            .merge(Env::prefixed("DOCKHAND_"))
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
    }

    /// Fallback ports in declared priority order.
    pub fn fallback_ports(&self) -> Vec<String> {
        self.route_ports
            .split(',')
            .map(|port| port.trim().to_string())
            .filter(|port| !port.is_empty())
            .collect()
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_secs)
    }
}
