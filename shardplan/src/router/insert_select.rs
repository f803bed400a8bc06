//! `INSERT INTO target SELECT ... FROM source` between co-located tables.
//!
//! The statement is planned once per target shard: the source is
//! restricted to rows hashing into that shard and routed like a SELECT.
//! Restriction context indexes refer to the source subquery's range table.

use tracing::debug;

use super::error::{Error, Unsupported};
use super::placement::intersect_placement_list;
use super::restriction::{shard_bounds, RestrictInfo, RestrictionContext};
use super::select::router_select_query;
use super::sharding::{equivalent_vars, make_ands};
use super::task::{Job, Task, TaskType};
use crate::catalog::{
    DistributedTable, DistributionLocks, LockMode, Metadata, PartitionMethod, Placement,
    RelationId, ShardInterval,
};
use crate::query::{AttrNumber, Expr, Query, RangeTableEntry, ShardTarget, TargetEntry, Var};

/// One task per target shard with matching source rows.
pub fn create_insert_select_router_plan(
    query: &Query,
    context: &RestrictionContext,
    metadata: &impl Metadata,
    locks: &impl DistributionLocks,
) -> Result<Job, Error> {
    let relation_id = query.result_relation_id().ok_or(Error::NoTargetRelation)?;
    let table = metadata
        .table(relation_id)
        .ok_or(Error::UnknownRelation(relation_id))?;
    let all_reference_tables = context.all_reference_tables(metadata);

    error_if_insert_select_query_not_supported(query, all_reference_tables, metadata)?;

    let mut context = context.clone();
    if !all_reference_tables {
        add_uninstantiated_partition_restriction(query, &mut context, metadata);
    }

    let mut tasks = vec![];
    for (offset, shard) in table.shards.iter().enumerate() {
        let task = router_modify_task_for_shard_interval(
            query,
            table,
            shard,
            &context,
            all_reference_tables,
            metadata,
            locks,
        )?;

        if let Some(mut task) = task {
            task.task_id = offset + 1;
            tasks.push(task);
        }
    }

    debug!(
        "INSERT ... SELECT into \"{}\" planned as {} of {} shards",
        table.name,
        tasks.len(),
        table.shards.len()
    );

    Ok(Job {
        tasks,
        requires_master_evaluation: query.contains_mutable_functions(),
    })
}

/// Task for one target shard, `None` if the source has no rows for it.
fn router_modify_task_for_shard_interval(
    query: &Query,
    table: &DistributedTable,
    shard: &ShardInterval,
    context: &RestrictionContext,
    all_reference_tables: bool,
    metadata: &impl Metadata,
    locks: &impl DistributionLocks,
) -> Result<Option<Task>, Error> {
    let mut query = query.clone();
    let mut context = context.clone();

    locks.lock_shard_metadata(shard.shard_id, LockMode::Share);

    // Reference tables got no placeholder.
    if !all_reference_tables {
        context.instantiate_partition_qual(shard, table.method);
    }

    let subquery = query
        .insert_select_subquery_mut()
        .ok_or(Unsupported::SelectNotPushable)?;

    // Partition quals may not reach every relation, e.g. those in sublinks.
    if !all_reference_tables {
        add_shard_interval_restriction_to_select(subquery, shard, table.method, metadata);
    }

    let Some(route) = router_select_query(subquery, &mut context, false, metadata)? else {
        return Err(Unsupported::SelectNotPushable.into());
    };

    if route.placements.is_empty() {
        debug!(
            "skipping target shard interval {} since SELECT query for it pruned away",
            shard.shard_id
        );
        return Ok(None);
    }

    let placements = metadata.finalized_placements(shard.shard_id);
    if !same_nodes(&placements, &route.placements) {
        return Err(Unsupported::PlacementMismatch(shard.shard_id).into());
    }

    reorder_insert_select_target_lists(&mut query);

    let result_relation = query.result_relation;
    if let Some(RangeTableEntry::Relation { shard: target, .. }) =
        result_relation.and_then(|index| query.rte_mut(index))
    {
        *target = ShardTarget::Shard(shard.shard_id);
    }

    let upsert = query.on_conflict.is_some();
    let mut task = Task::new(TaskType::Modify, shard.shard_id, query);
    task.placements = placements;
    task.upsert = upsert;
    task.insert_select = true;
    task.relation_shards = route.relation_shards;

    Ok(Some(task))
}

/// Both lists are on exactly the same workers.
fn same_nodes(insert: &[Placement], select: &[Placement]) -> bool {
    insert.len() == select.len() && intersect_placement_list(insert, select).len() == insert.len()
}

/// Reject INSERT ... SELECT statements that can't be split by target shard.
pub fn error_if_insert_select_query_not_supported(
    query: &Query,
    all_reference_tables: bool,
    metadata: &impl Metadata,
) -> Result<(), Error> {
    let relation_id = query.result_relation_id().ok_or(Error::NoTargetRelation)?;
    let table = metadata
        .table(relation_id)
        .ok_or(Error::UnknownRelation(relation_id))?;
    let subquery = query
        .insert_select_subquery()
        .ok_or(Unsupported::SelectNotPushable)?;

    if query.contains_volatile_functions() {
        return Err(Unsupported::InsertSelectVolatile.into());
    }

    error_if_multi_task_select_unsupported(subquery)?;

    if table.is_reference() {
        if !all_reference_tables {
            return Err(Unsupported::ReferenceTargetSource.into());
        }
        return Ok(());
    }

    let Some(source) = select_partition_column_relation(query, subquery, table, metadata) else {
        return Err(Unsupported::PartitionColumnMismatch.into());
    };

    if !metadata.colocated(relation_id, source) {
        return Err(Unsupported::NotColocated.into());
    }

    Ok(())
}

/// Features that give wrong results when evaluated separately per shard,
/// at any nesting level.
fn error_if_multi_task_select_unsupported(subquery: &Query) -> Result<(), Unsupported> {
    for query in subquery.queries_recursive() {
        if query.limit_count.is_some() {
            return Err(Unsupported::InsertSelectLimit);
        }

        if query.limit_offset.is_some() {
            return Err(Unsupported::InsertSelectOffset);
        }

        if query.has_window_clause {
            return Err(Unsupported::InsertSelectWindow);
        }

        if query.has_set_operations {
            return Err(Unsupported::InsertSelectSetOperations);
        }

        if query.has_grouping_sets {
            return Err(Unsupported::InsertSelectGroupingSets);
        }

        if query.has_distinct_on {
            return Err(Unsupported::InsertSelectDistinctOn);
        }
    }

    Ok(())
}

/// Table whose distribution column the SELECT returns, bare, in the
/// position the INSERT reads its distribution column from.
fn select_partition_column_relation(
    query: &Query,
    subquery: &Query,
    table: &DistributedTable,
    metadata: &impl Metadata,
) -> Option<RelationId> {
    let attno = table.partition_column?;
    let entry = query
        .target_list
        .iter()
        .find(|entry| entry.resno == attno && entry.expr.as_var().is_some())?;
    let insert_var = entry.expr.as_var()?;
    let select_var = subquery.target_entry(insert_var.attno)?.expr.as_var()?;

    partition_column_relation(subquery, select_var, metadata)
}

/// Table `var` is the distribution column of, following subqueries.
/// Reference tables have no distribution column.
fn partition_column_relation(
    query: &Query,
    var: &Var,
    metadata: &impl Metadata,
) -> Option<RelationId> {
    let (relation_id, attno) = query.resolve_column(var)?;
    let table = metadata.table(relation_id)?;

    if !table.is_reference() && table.partition_column == Some(attno) {
        Some(relation_id)
    } else {
        None
    }
}

/// First output column of `subquery` that is a bare distribution column.
fn partition_column_target_var(subquery: &Query, metadata: &impl Metadata) -> Option<Var> {
    subquery.target_list.iter().find_map(|entry| {
        let var = entry.expr.as_var()?;
        partition_column_relation(subquery, var, metadata).map(|_| *var)
    })
}

/// Restrict the source relations to "the distribution value of the
/// target shard", to be replaced by concrete bounds per shard.
///
/// Added to every relation whose distribution column the WHERE clause
/// equates with the column the SELECT returns. Skipped for set
/// operations and when no bare distribution column is returned.
/// Returns `true` if anything was added.
pub fn add_uninstantiated_partition_restriction(
    query: &Query,
    context: &mut RestrictionContext,
    metadata: &impl Metadata,
) -> bool {
    let Some(subquery) = query.insert_select_subquery() else {
        return false;
    };

    if subquery.has_set_operations {
        return false;
    }

    let Some(column) = partition_column_target_var(subquery, metadata) else {
        return false;
    };

    let vars = {
        let mut clauses = subquery.where_clause_list();
        for relation in &context.relations {
            clauses.extend(relation.equivalence_clauses());
        }
        equivalent_vars(&clauses, column)
    };

    let mut added = false;

    for relation in context.relations.iter_mut() {
        let Some(var) = metadata
            .table(relation.relation_id)
            .and_then(|table| table.partition_var(relation.index))
        else {
            continue;
        };

        let present = relation
            .base_restrictions
            .iter()
            .any(|info| info.clause == Expr::PartitionPlaceholder(var));

        if vars.contains(&var) && !present {
            relation
                .base_restrictions
                .push(RestrictInfo::new(Expr::PartitionPlaceholder(var)));
            added = true;
        }
    }

    added
}

/// AND the bounds of `shard` on the returned distribution column into
/// the WHERE clause of `subquery`.
pub fn add_shard_interval_restriction_to_select(
    subquery: &mut Query,
    shard: &ShardInterval,
    method: PartitionMethod,
    metadata: &impl Metadata,
) {
    let Some(column) = partition_column_target_var(subquery, metadata) else {
        return;
    };

    if let Some(bounds) = make_ands(shard_bounds(column, shard, method)) {
        subquery.add_qual(bounds);
    }
}

/// Make the INSERT column list read the SELECT output in order.
///
/// Each INSERT column gets the SELECT entry it read, or its own
/// expression for constants and defaults, at the next output position.
/// Helper SELECT columns follow.
pub fn reorder_insert_select_target_lists(query: &mut Query) {
    let Some(source) = query.insert_select_source() else {
        return;
    };

    let insert_list = std::mem::take(&mut query.target_list);
    let Some(subquery) = query.insert_select_subquery_mut() else {
        query.target_list = insert_list;
        return;
    };
    let select_list = std::mem::take(&mut subquery.target_list);

    let mut new_select_list = vec![];
    let mut new_insert_list = vec![];

    for (position, entry) in insert_list.into_iter().enumerate() {
        let resno = (position + 1) as AttrNumber;
        let vars = entry.expr.pull_vars();
        assert!(
            vars.len() <= 1,
            "INSERT target entry references more than one column"
        );

        let mut select_entry = match vars.first() {
            Some(var) => {
                let select_entry = select_list
                    .iter()
                    .find(|select_entry| select_entry.resno == var.attno);
                assert!(
                    select_entry.is_some(),
                    "INSERT reads column {} the SELECT doesn't return",
                    var.attno
                );
                select_entry.cloned().unwrap_or_else(|| entry.clone())
            }
            None => entry.clone(),
        };
        select_entry.resno = resno;
        select_entry.resjunk = false;
        new_select_list.push(select_entry);

        new_insert_list.push(TargetEntry {
            resno: entry.resno,
            name: entry.name,
            expr: Expr::var(source, resno),
            resjunk: entry.resjunk,
        });
    }

    let mut resno = new_select_list.len() as AttrNumber;
    for mut entry in select_list.into_iter().filter(|entry| entry.resjunk) {
        resno += 1;
        entry.resno = resno;
        new_select_list.push(entry);
    }

    subquery.target_list = new_select_list;
    query.target_list = new_insert_list;
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::query::{CommandType, JoinTree, Operator};

    fn insert_select(insert: Vec<TargetEntry>, select: Vec<TargetEntry>) -> Query {
        let source = Query {
            range_table: vec![RangeTableEntry::relation(2)],
            join_tree: JoinTree {
                from: vec![1],
                quals: None,
            },
            target_list: select,
            ..Default::default()
        };

        Query {
            command: CommandType::Insert,
            range_table: vec![RangeTableEntry::relation(1), RangeTableEntry::subquery(source)],
            result_relation: Some(1),
            join_tree: JoinTree {
                from: vec![2],
                quals: None,
            },
            target_list: insert,
            ..Default::default()
        }
    }

    #[test]
    fn test_reorder_target_lists() {
        // INSERT INTO t (val, id, created) SELECT s.id, s.val, now() ... ORDER BY s.rank
        let mut rank = TargetEntry::new(3, Expr::var(1, 5));
        rank.resjunk = true;
        let mut query = insert_select(
            vec![
                TargetEntry::new(2, Expr::var(2, 2)),
                TargetEntry::new(1, Expr::var(2, 1)),
                TargetEntry::new(3, Expr::constant("2024-01-01")),
            ],
            vec![
                TargetEntry::new(1, Expr::var(1, 1)),
                TargetEntry::new(2, Expr::var(1, 2)),
                rank,
            ],
        );

        reorder_insert_select_target_lists(&mut query);

        let insert = query
            .target_list
            .iter()
            .map(|entry| (entry.resno, entry.expr.clone()))
            .collect::<Vec<_>>();
        assert_eq!(
            insert,
            vec![
                (2, Expr::var(2, 1)),
                (1, Expr::var(2, 2)),
                (3, Expr::var(2, 3)),
            ]
        );

        let select = query
            .insert_select_subquery()
            .unwrap()
            .target_list
            .iter()
            .map(|entry| (entry.resno, entry.expr.clone(), entry.resjunk))
            .collect::<Vec<_>>();
        assert_eq!(
            select,
            vec![
                (1, Expr::var(1, 2), false),
                (2, Expr::var(1, 1), false),
                (3, Expr::constant("2024-01-01"), false),
                (4, Expr::var(1, 5), true),
            ]
        );
    }

    #[test]
    #[should_panic]
    fn test_reorder_rejects_two_columns() {
        let mut query = insert_select(
            vec![TargetEntry::new(
                1,
                Expr::op(Operator::Other("+".into()), Expr::var(2, 1), Expr::var(2, 2)),
            )],
            vec![
                TargetEntry::new(1, Expr::var(1, 1)),
                TargetEntry::new(2, Expr::var(1, 2)),
            ],
        );
        reorder_insert_select_target_lists(&mut query);
    }

    #[test]
    fn test_multi_task_select_features() {
        let mut nested = Query::default();
        nested.has_distinct_on = true;

        let mut subquery = Query {
            range_table: vec![RangeTableEntry::subquery(nested)],
            ..Default::default()
        };
        assert_eq!(
            error_if_multi_task_select_unsupported(&subquery),
            Err(Unsupported::InsertSelectDistinctOn)
        );

        subquery.limit_count = Some(Expr::constant(10));
        assert_eq!(
            error_if_multi_task_select_unsupported(&subquery),
            Err(Unsupported::InsertSelectLimit)
        );

        assert!(error_if_multi_task_select_unsupported(&Query::default()).is_ok());
    }
}
