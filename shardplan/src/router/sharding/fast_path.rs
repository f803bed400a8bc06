//! Direct lookup of the shard owning a known distribution value.

use std::cmp::Ordering;

use super::hasher::token;
use crate::catalog::{DistributedTable, PartitionMethod, ShardInterval};
use crate::query::Datum;

/// Fast path only applies to single-row INSERTs into hash or range tables.
pub fn fast_path_possible(method: PartitionMethod) -> bool {
    matches!(method, PartitionMethod::Hash | PartitionMethod::Range)
}

/// Shard whose bounds contain `value`, `None` if no shard does.
///
/// Uniformly split hash tables compute the shard index from the token,
/// everything else searches the sorted bounds.
pub fn find_shard_interval<'a>(
    table: &'a DistributedTable,
    value: &Datum,
) -> Option<&'a ShardInterval> {
    let shards = &table.shards;
    if shards.is_empty() {
        return None;
    }

    match table.method {
        PartitionMethod::Hash => {
            let token = token(table.hasher, value)?;

            if table.has_uniform_hash_distribution() {
                let increment = (1i64 << 32) / shards.len() as i64;
                let index = ((token as i64 - i32::MIN as i64) / increment) as usize;
                // Last shard absorbs the remainder of the token space.
                shards.get(index.min(shards.len() - 1))
            } else {
                search(shards, &Datum::Integer(token as i64))
            }
        }

        PartitionMethod::Range | PartitionMethod::Append => {
            if value.is_null() {
                None
            } else {
                search(shards, value)
            }
        }

        PartitionMethod::Reference => shards.first(),
    }
}

/// Binary search over shards sorted by lower bound.
fn search<'a>(shards: &'a [ShardInterval], value: &Datum) -> Option<&'a ShardInterval> {
    let index = shards
        .binary_search_by(|shard| {
            let min = shard.min.as_ref().and_then(|min| min.compare(value));
            let max = shard.max.as_ref().and_then(|max| max.compare(value));

            match (min, max) {
                (Some(Ordering::Greater), _) => Ordering::Greater,
                (_, Some(Ordering::Less)) => Ordering::Less,
                (Some(_), Some(_)) => Ordering::Equal,
                // Bounds of a different type than the value.
                _ => Ordering::Less,
            }
        })
        .ok()?;

    shards.get(index)
}
