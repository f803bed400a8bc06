use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Settings that control the router planner itself.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct General {
    /// Plan `SELECT` statements that prune to a single shard per relation as
    /// router queries. When disabled, every `SELECT` falls back to the
    /// distributed planner. Modifications are always router planned.
    ///
    /// _Default:_ `true`
    #[serde(default = "General::enable_router_execution")]
    pub enable_router_execution: bool,

    /// First shard identifier handed out by the in-memory catalog.
    ///
    /// _Default:_ `102008`
    #[serde(default = "General::shard_id_start")]
    pub shard_id_start: u64,
}

impl Default for General {
    fn default() -> Self {
        Self {
            enable_router_execution: Self::enable_router_execution(),
            shard_id_start: Self::shard_id_start(),
        }
    }
}

impl General {
    fn enable_router_execution() -> bool {
        true
    }

    fn shard_id_start() -> u64 {
        102008
    }
}
