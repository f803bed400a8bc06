use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Worker node holding shard placements.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Worker {
    /// Hostname or IP address.
    pub host: String,
    /// Port the worker accepts connections on.
    ///
    /// _Default:_ `5432`
    #[serde(default = "Worker::port")]
    pub port: u16,
    /// Inactive workers keep their placements in the catalog but are
    /// never selected for routing.
    ///
    /// _Default:_ `true`
    #[serde(default = "Worker::active")]
    pub active: bool,
}

impl Worker {
    fn port() -> u16 {
        5432
    }

    fn active() -> bool {
        true
    }

    /// Create an active worker.
    pub fn new(host: impl ToString, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            active: true,
        }
    }
}
