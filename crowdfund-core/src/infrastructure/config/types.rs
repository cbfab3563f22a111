use crate::foundation::{DEFAULT_INBOX_CAPACITY, DEFAULT_SESSION_CHANNEL_CAPACITY, MAX_MESSAGE_SIZE_BYTES};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EscrowConfig {
    pub node: NodeConfig,
    pub transport: TransportConfig,
    pub notary: NotaryConfig,
    pub settlement: SettlementConfig,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Legal name the party is known by on the network.
    pub name: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self { name: "PartyA".to_string() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    pub session_channel_capacity: usize,
    pub inbox_capacity: usize,
    pub max_message_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            session_channel_capacity: DEFAULT_SESSION_CHANNEL_CAPACITY,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
            max_message_bytes: MAX_MESSAGE_SIZE_BYTES,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct NotaryConfig {
    pub name: String,
    /// Accepted distance between a transaction timestamp and the notary clock.
    pub time_tolerance_secs: u64,
}

impl Default for NotaryConfig {
    fn default() -> Self {
        Self { name: "Notary".to_string(), time_tolerance_secs: 30 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Broadcast started and ended campaigns to every observer.
    pub broadcast_to_observers: bool,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self { broadcast_to_observers: true }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Upper bound on a single sleep while waiting for a deadline.
    pub poll_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { enabled: true, poll_interval_ms: 1_000 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filters: String,
    pub log_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filters: "info".to_string(), log_dir: None }
    }
}
