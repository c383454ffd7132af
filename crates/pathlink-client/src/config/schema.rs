use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde::Deserialize;
use pathlink_core::error::{PathlinkError, Result};
use pathlink_core::protocol::frame::DEFAULT_MAX_FRAME_BYTES;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub version: u32,

    #[serde(default)]
    pub coordinator: CoordinatorSection,

    pub client: NodeSection,

    #[serde(default)]
    pub session: SessionSection,
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(PathlinkError::InvalidConfig(format!(
                "unsupported config version: {}",
                self.version
            )));
        }

        self.coordinator.validate()?;
        self.client.validate()?;
        self.session.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoordinatorSection {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for CoordinatorSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl CoordinatorSection {
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(PathlinkError::InvalidConfig(
                "coordinator.host must not be empty".into(),
            ));
        }
        if self.port == 0 {
            return Err(PathlinkError::InvalidConfig(
                "coordinator.port must not be 0".into(),
            ));
        }
        if !(100..=60000).contains(&self.connect_timeout_ms) {
            return Err(PathlinkError::InvalidConfig(
                "coordinator.connect_timeout_ms must be between 100 and 60000".into(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_host() -> String {
    "localhost".into()
}
fn default_port() -> u16 {
    8081
}
fn default_connect_timeout_ms() -> u64 {
    5000
}

/// Identity and served paths of this node. Fixed for the session lifetime.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSection {
    pub id: String,

    pub paths: Vec<String>,

    /// Canned JSON replies keyed by path; other paths echo the request body.
    #[serde(default)]
    pub static_responses: BTreeMap<String, serde_json::Value>,
}

impl NodeSection {
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(PathlinkError::InvalidConfig("client.id must not be empty".into()));
        }
        if self.paths.is_empty() {
            return Err(PathlinkError::InvalidConfig("client.paths must not be empty".into()));
        }

        let mut seen = HashSet::new();
        for p in &self.paths {
            if !p.starts_with('/') {
                return Err(PathlinkError::InvalidConfig(format!(
                    "client.paths entry must start with '/': {p}"
                )));
            }
            if !seen.insert(p.as_str()) {
                return Err(PathlinkError::InvalidConfig(format!(
                    "client.paths contains duplicate: {p}"
                )));
            }
        }

        for p in self.static_responses.keys() {
            if !seen.contains(p.as_str()) {
                return Err(PathlinkError::InvalidConfig(format!(
                    "client.static_responses refers to unregistered path: {p}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionSection {
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    #[serde(default = "default_inbound_queue")]
    pub inbound_queue: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            max_frame_bytes: default_max_frame_bytes(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            inbound_queue: default_inbound_queue(),
        }
    }
}

impl SessionSection {
    pub fn validate(&self) -> Result<()> {
        if !(64..=u32::MAX as usize).contains(&self.max_frame_bytes) {
            return Err(PathlinkError::InvalidConfig(
                "session.max_frame_bytes must be between 64 and 4294967295".into(),
            ));
        }
        if !(100..=60000).contains(&self.heartbeat_interval_ms) {
            return Err(PathlinkError::InvalidConfig(
                "session.heartbeat_interval_ms must be between 100 and 60000".into(),
            ));
        }
        if self.inbound_queue == 0 {
            return Err(PathlinkError::InvalidConfig(
                "session.inbound_queue must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}
fn default_heartbeat_interval_ms() -> u64 {
    1000
}
fn default_inbound_queue() -> usize {
    1024
}
