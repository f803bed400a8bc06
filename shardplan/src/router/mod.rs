//! Router planner.
//!
//! Decides whether a statement can run on single workers and, if so,
//! builds the tasks that do it.

pub mod error;
pub mod insert_select;
pub mod modify;
pub mod placement;
pub mod restriction;
pub mod select;
pub mod sharding;
pub mod task;
pub mod validator;

pub use error::{Error, ErrorKind, Unsupported};
pub use restriction::{RelationRestriction, RestrictInfo, RestrictionContext};
pub use task::{Job, RelationShard, Task, TaskType};

use shardplan_config::General;
use tracing::debug;

use crate::catalog::{DistributionLocks, Metadata};
use crate::query::Query;
use insert_select::create_insert_select_router_plan;
use modify::router_modify_task;
use select::{multi_router_plannable_query, router_select_query};
use validator::error_if_modify_query_not_supported;

/// Query router.
#[derive(Debug)]
pub struct RouterPlanner<'a, M: Metadata, L: DistributionLocks> {
    metadata: &'a M,
    locks: &'a L,
    settings: &'a General,
}

impl<'a, M: Metadata, L: DistributionLocks> RouterPlanner<'a, M, L> {
    pub fn new(metadata: &'a M, locks: &'a L, settings: &'a General) -> Self {
        Self {
            metadata,
            locks,
            settings,
        }
    }

    /// Plan a statement.
    ///
    /// `Ok(None)` means the statement can't be router planned and should
    /// go to the distributed planner. Errors are statements nothing
    /// can plan.
    pub fn plan(&self, query: &Query, context: &RestrictionContext) -> Result<Option<Job>, Error> {
        debug!("creating router plan");

        if !multi_router_plannable_query(query, context, self.metadata, self.settings) {
            return Ok(None);
        }

        if query.is_insert_select() {
            return create_insert_select_router_plan(query, context, self.metadata, self.locks)
                .map(Some);
        }

        if query.command.is_modify() {
            error_if_modify_query_not_supported(query, self.metadata)?;
            let task = router_modify_task(query, self.metadata, self.locks)?;

            return Ok(Some(Job {
                tasks: vec![task],
                requires_master_evaluation: query.contains_mutable_functions(),
            }));
        }

        self.plan_select(query, context)
    }

    fn plan_select(
        &self,
        query: &Query,
        context: &RestrictionContext,
    ) -> Result<Option<Job>, Error> {
        let mut query = query.clone();
        let mut context = context.clone();

        let Some(route) = router_select_query(&mut query, &mut context, true, self.metadata)? else {
            return Ok(None);
        };

        let mut task = Task::new(TaskType::Router, route.anchor_shard_id, query);
        task.placements = route.placements;
        task.relation_shards = route.relation_shards;

        debug!(
            "SELECT routed to shard {} on [{}]",
            task.anchor_shard_id,
            task.nodes().join(", ")
        );

        Ok(Some(Job {
            tasks: vec![task],
            requires_master_evaluation: false,
        }))
    }
}

#[cfg(test)]
mod test;
