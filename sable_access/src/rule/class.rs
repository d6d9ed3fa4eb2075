use serde::{Deserialize, Serialize};

/// A connection class, referenced by name from Client rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionClass {
    pub name: String,
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Seconds between pings to an idle client
    #[serde(default = "default_ping_frequency")]
    pub ping_frequency: u32,
    /// Maximum send queue, in bytes
    #[serde(default = "default_sendq")]
    pub sendq: usize,
}

fn default_max_clients() -> usize {
    1024
}

fn default_ping_frequency() -> u32 {
    120
}

fn default_sendq() -> usize {
    100_000
}

impl ConnectionClass {
    /// Name of the class that is always defined, and used by Client rules
    /// that name no class
    pub const DEFAULT_NAME: &'static str = "default";

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_clients: default_max_clients(),
            ping_frequency: default_ping_frequency(),
            sendq: default_sendq(),
        }
    }
}

impl Default for ConnectionClass {
    fn default() -> Self {
        Self::named(Self::DEFAULT_NAME)
    }
}
