//! Planner output.

use serde::Serialize;

use crate::catalog::{Placement, RelationId, ShardId};
use crate::query::Query;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Read-only statement routed to one worker.
    Router,
    /// Write to one shard, executed on every placement.
    Modify,
}

/// Which shard a relation of the statement reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelationShard {
    pub relation_id: RelationId,
    pub shard_id: ShardId,
}

/// Statement for one shard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub task_id: usize,
    pub task_type: TaskType,
    pub anchor_shard_id: ShardId,
    /// Where to run the task. Writes list the first replica first, so
    /// every writer reaches the replicas in the same order.
    pub placements: Vec<Placement>,
    pub upsert: bool,
    pub insert_select: bool,
    pub relation_shards: Vec<RelationShard>,
    /// Statement with relations rewritten to their shards, ready for deparsing.
    pub query: Query,
}

impl Task {
    pub fn new(task_type: TaskType, anchor_shard_id: ShardId, query: Query) -> Self {
        Self {
            task_id: 1,
            task_type,
            anchor_shard_id,
            placements: vec![],
            upsert: false,
            insert_select: false,
            relation_shards: vec![],
            query,
        }
    }

    /// Nodes the task runs on.
    pub fn nodes(&self) -> Vec<String> {
        self.placements.iter().map(|p| p.node.to_string()).collect()
    }
}

/// All tasks of one statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub tasks: Vec<Task>,
    /// Non-immutable functions must be evaluated by the coordinator
    /// before the tasks are sent to workers.
    pub requires_master_evaluation: bool,
}

impl Job {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
