//! Checks that a write can be replicated by running the same statement
//! on every placement of its shard.

pub mod changes_value;
pub mod irreducible;

pub use changes_value::target_entry_changes_value;
pub use irreducible::Irreducible;

use tracing::trace;

use super::error::Unsupported;
use crate::catalog::Metadata;
use crate::query::{CommandType, Query, RangeTableEntry};

/// Reject INSERT, UPDATE and DELETE statements the router can't
/// execute safely.
pub fn error_if_modify_query_not_supported(
    query: &Query,
    metadata: &impl Metadata,
) -> Result<(), Unsupported> {
    let command = query.command;
    let partition_column = query
        .result_relation
        .zip(query.result_relation_id())
        .and_then(|(index, relation_id)| {
            metadata
                .table(relation_id)
                .and_then(|table| table.partition_var(index))
        });

    if query.has_sublinks() {
        return Err(Unsupported::Subqueries);
    }

    if !query.ctes.is_empty() {
        return Err(Unsupported::CommonTableExpressions);
    }

    let mut relations = 0;
    let mut has_values = false;

    for entry in query.range_table_entries_recursive() {
        match entry {
            RangeTableEntry::Relation { .. } | RangeTableEntry::Excluded { .. } => relations += 1,
            RangeTableEntry::Values => has_values = true,
            RangeTableEntry::Subquery { .. } => return Err(Unsupported::Subqueries),
            RangeTableEntry::Join => return Err(Unsupported::Joins),
            RangeTableEntry::Function { .. } => return Err(Unsupported::FunctionInFrom),
            RangeTableEntry::Cte { .. } => return Err(Unsupported::UnrecognizedRangeTableEntry),
        }
    }

    // UPSERT reads from EXCLUDED as well as the target.
    if command != CommandType::Insert && relations != 1 {
        return Err(Unsupported::Joins);
    }

    if has_values {
        return Err(Unsupported::MultiRowInsert);
    }

    let mut changes_partition_value = false;
    let mut irreducible = Irreducible::default();
    let where_clause = query.where_clause_list();

    for entry in query.target_list.iter().filter(|entry| !entry.resjunk) {
        let partition_entry = partition_column
            .map(|column| column.attno == entry.resno)
            .unwrap_or(false);

        if command == CommandType::Update && entry.expr.contains_volatile_functions() {
            return Err(Unsupported::VolatileUpdate);
        }

        if command == CommandType::Update && partition_entry {
            if let Some(ref column) = partition_column {
                changes_partition_value |=
                    target_entry_changes_value(entry, column, &where_clause);
            }
        }

        if command == CommandType::Insert
            && partition_entry
            && entry.expr.as_const().is_none()
        {
            return Err(Unsupported::NonConstantPartitionValue);
        }

        if command == CommandType::Update {
            irreducible.check(&entry.expr);
        }
    }

    if let Some(ref quals) = query.join_tree.quals {
        if quals.contains_volatile_functions() {
            return Err(Unsupported::VolatileWhere);
        }
        irreducible.check(quals);
    }

    if irreducible.var_argument {
        return Err(Unsupported::StableWithColumnReference);
    }

    if irreducible.bad_coalesce {
        return Err(Unsupported::BadCoalesce);
    }

    if query
        .returning
        .iter()
        .any(|entry| entry.expr.contains_mutable_functions())
    {
        return Err(Unsupported::MutableReturning);
    }

    if command == CommandType::Insert {
        if let Some(ref on_conflict) = query.on_conflict {
            for entry in &on_conflict.set {
                let partition_entry = partition_column
                    .map(|column| column.attno == entry.resno)
                    .unwrap_or(false);

                if partition_entry {
                    let unchanged = matches!(
                        (entry.expr.as_var(), partition_column),
                        (Some(var), Some(column)) if var.attno == column.attno
                    );
                    changes_partition_value |= !unchanged;
                } else if entry.expr.as_var().is_none() && entry.expr.contains_mutable_functions()
                {
                    return Err(Unsupported::MutableOnConflictSet);
                }
            }

            let mutable_where = on_conflict
                .arbiter_where
                .iter()
                .chain(on_conflict.on_conflict_where.iter())
                .any(|expr| expr.contains_mutable_functions());

            if mutable_where {
                return Err(Unsupported::MutableOnConflictWhere);
            }
        }
    }

    if changes_partition_value {
        return Err(Unsupported::PartitionValueChanged);
    }

    trace!("modification is supported");

    Ok(())
}
