//! Single-shard INSERT, UPDATE and DELETE.

use tracing::debug;

use super::error::{Error, Unsupported};
use super::sharding::{fast_path_possible, find_shard_interval, prune_shard_list};
use super::task::{RelationShard, Task, TaskType};
use crate::catalog::{
    DistributedTable, DistributionLocks, LockMode, Metadata, PartitionMethod, ShardInterval,
};
use crate::query::{CommandType, Datum, Expr, Query, RangeTableEntry, ShardTarget};

/// Task writing to the one shard the statement targets.
///
/// Holds a share lock on the shard's metadata so its placements
/// can't change until the caller releases it.
pub fn router_modify_task(
    query: &Query,
    metadata: &impl Metadata,
    locks: &impl DistributionLocks,
) -> Result<Task, Error> {
    let shard = target_shard_interval_for_modify(query, metadata)?;
    locks.lock_shard_metadata(shard.shard_id, LockMode::Share);

    let mut rewritten = query.clone();
    rewritten.for_each_relation_mut(&mut |entry| {
        if let RangeTableEntry::Relation {
            relation_id,
            shard: target,
            ..
        } = entry
        {
            if *relation_id == shard.relation_id {
                *target = ShardTarget::Shard(shard.shard_id);
            }
        }
    });

    let mut task = Task::new(TaskType::Modify, shard.shard_id, rewritten);
    task.placements = metadata.finalized_placements(shard.shard_id);
    task.upsert = query.on_conflict.is_some();
    task.relation_shards = vec![RelationShard {
        relation_id: shard.relation_id,
        shard_id: shard.shard_id,
    }];

    debug!(
        "{:?} routed to shard {} on [{}]",
        query.command,
        shard.shard_id,
        task.nodes().join(", ")
    );

    Ok(task)
}

/// The one shard an INSERT, UPDATE or DELETE writes to.
pub fn target_shard_interval_for_modify(
    query: &Query,
    metadata: &impl Metadata,
) -> Result<ShardInterval, Error> {
    let rel = query.result_relation.ok_or(Error::NoTargetRelation)?;
    let relation_id = query.result_relation_id().ok_or(Error::NoTargetRelation)?;
    let table = metadata
        .table(relation_id)
        .ok_or(Error::UnknownRelation(relation_id))?;

    if table.shards.is_empty() {
        return Err(Error::NoShards {
            table: table.name.clone(),
        });
    }

    let shards = if query.command == CommandType::Insert && fast_path_possible(table.method) {
        let value = extract_insert_partition_value(query, table)?;
        find_shard_interval(table, &value)
            .cloned()
            .into_iter()
            .collect::<Vec<_>>()
    } else {
        let restrictions = query_restrict_list(query, table)?;
        let restrictions = restrictions.iter().collect::<Vec<_>>();
        prune_shard_list(table, rel, &restrictions, &table.shards)
    };

    let count = shards.len();
    match shards.into_iter().next() {
        Some(shard) if count == 1 => Ok(shard),
        _ => Err(exactly_one_shard(query.command, table, count)),
    }
}

/// Conditions a modified row satisfies: the inserted partition value,
/// or the WHERE clause of UPDATE and DELETE. None for reference tables.
pub fn query_restrict_list(query: &Query, table: &DistributedTable) -> Result<Vec<Expr>, Error> {
    if table.is_reference() {
        return Ok(vec![]);
    }

    if query.command == CommandType::Insert {
        let value = extract_insert_partition_value(query, table)?;
        let column = query
            .result_relation
            .and_then(|rel| table.partition_var(rel))
            .ok_or(Error::NoTargetRelation)?;

        return Ok(vec![Expr::eq(Expr::Var(column), Expr::Const(value))]);
    }

    Ok(query.where_clause_list().into_iter().cloned().collect())
}

/// Value an INSERT assigns to the distribution column.
pub fn extract_insert_partition_value(
    query: &Query,
    table: &DistributedTable,
) -> Result<Datum, Error> {
    let entry = table
        .partition_column
        .and_then(|attno| query.target_entry(attno));

    let Some(entry) = entry else {
        return Err(Error::NullPartitionValue);
    };

    match entry.expr {
        Expr::Const(Datum::Null) => Err(Error::NullPartitionValue),
        Expr::Const(ref value) => Ok(value.clone()),
        _ => Err(Unsupported::NonConstantPartitionValue.into()),
    }
}

fn exactly_one_shard(command: CommandType, table: &DistributedTable, count: usize) -> Error {
    let detail = if count == 0 {
        Some("This command modifies no shards.".to_string())
    } else if count == table.shards.len() {
        Some("This command modifies all shards.".to_string())
    } else {
        None
    };

    let column = table.partition_column_name();
    let mut hint = match command {
        CommandType::Update | CommandType::Delete => format!(
            "Consider using an equality filter on partition column \"{}\". \
             You can use master_modify_multiple_shards() to perform multi-shard \
             delete or update operations.",
            column
        ),
        _ => format!(
            "Make sure the value for partition column \"{}\" falls into a single shard.",
            column
        ),
    };

    if command == CommandType::Delete && table.method == PartitionMethod::Append {
        hint.push_str(
            " You can also use master_apply_delete_command() to drop all shards \
             satisfying delete criteria.",
        );
    }

    Error::ExactlyOneShard { detail, hint }
}
