use std::fmt::Display;

use serde::{Deserialize, Serialize};
use shardplan_config::Worker;

use super::ShardId;

/// Worker identity: placements on the same host and port are on the same node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerNode {
    pub host: String,
    pub port: u16,
}

impl WorkerNode {
    pub fn new(host: impl ToString, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }
}

impl From<&Worker> for WorkerNode {
    fn from(worker: &Worker) -> Self {
        Self::new(&worker.host, worker.port)
    }
}

impl Display for WorkerNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementState {
    #[default]
    Finalized,
    /// Failed or being moved; not used for routing.
    Inactive,
}

/// One replica of a shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub shard_id: ShardId,
    pub node: WorkerNode,
    #[serde(default)]
    pub state: PlacementState,
}

impl Placement {
    pub fn new(shard_id: ShardId, node: WorkerNode) -> Self {
        Self {
            shard_id,
            node,
            state: PlacementState::Finalized,
        }
    }

    /// Placement on a worker that holds no shard, for statements
    /// pruned down to nothing.
    pub fn dummy(node: WorkerNode) -> Self {
        Self::new(ShardId::INVALID, node)
    }

    pub fn is_dummy(&self) -> bool {
        self.shard_id == ShardId::INVALID
    }

    pub fn is_finalized(&self) -> bool {
        self.state == PlacementState::Finalized
    }

    pub fn same_node(&self, other: &Placement) -> bool {
        self.node == other.node
    }
}
