//! Distribution metadata the planner reads.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod locks;
pub mod memory;
pub mod placement;
pub mod shard;

pub use locks::{LockManager, ShardLocks};
pub use memory::Catalog;
pub use placement::{Placement, PlacementState, WorkerNode};
pub use shard::{DistributedTable, ShardInterval};

pub use shardplan_config::{Hasher, PartitionMethod};

/// Identifier of a table.
pub type RelationId = u32;

/// Identifier of one shard, unique across all tables.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ShardId(pub u64);

impl ShardId {
    /// Not a shard. Used by placeholder placements.
    pub const INVALID: ShardId = ShardId(0);
}

impl Display for ShardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shard metadata lookups.
pub trait Metadata {
    /// Distribution of a table, `None` if it's not distributed.
    fn table(&self, relation_id: RelationId) -> Option<&DistributedTable>;

    /// Healthy placements of a shard, in the order they were created.
    /// The first one is the shard's first replica.
    fn finalized_placements(&self, shard_id: ShardId) -> Vec<Placement>;

    /// Live workers, in a stable order.
    fn active_workers(&self) -> Vec<WorkerNode>;

    /// Rows with the same distribution value of both tables are always
    /// stored on the same workers.
    fn colocated(&self, left: RelationId, right: RelationId) -> bool {
        if left == right {
            return true;
        }

        match (self.table(left), self.table(right)) {
            (Some(left), Some(right)) => {
                left.colocation_id.is_some() && left.colocation_id == right.colocation_id
            }
            _ => false,
        }
    }

    fn partition_method(&self, relation_id: RelationId) -> Option<PartitionMethod> {
        self.table(relation_id).map(|table| table.method)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Many holders, blocks exclusive holders only.
    Share,
    /// Single holder, e.g. a shard move.
    Exclusive,
}

/// Locks on the placement metadata of individual shards.
pub trait DistributionLocks {
    /// Block until the lock is granted. Held until the holder is released.
    fn lock_shard_metadata(&self, shard_id: ShardId, mode: LockMode);
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Config(#[from] shardplan_config::Error),

    #[error("table \"{0}\" has overlapping shard ranges")]
    OverlappingRanges(String),

    #[error("table \"{0}\" mixes value types in its shard ranges")]
    MixedRangeTypes(String),

    #[error("tables \"{0}\" and \"{1}\" share a colocation group but not the shard layout")]
    ColocationMismatch(String, String),
}
