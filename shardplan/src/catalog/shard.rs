use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::{Hasher, PartitionMethod, RelationId, ShardId};
use crate::query::{AttrNumber, Datum, RangeTableIndex, Var};

/// Bounds of one shard.
///
/// Hash shards are bounded by hash tokens, range and append shards by
/// distribution column values. Reference table shards are unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardInterval {
    pub shard_id: ShardId,
    pub relation_id: RelationId,
    pub min: Option<Datum>,
    pub max: Option<Datum>,
}

impl ShardInterval {
    /// Hash shard covering tokens `min..=max`.
    pub fn hash(shard_id: ShardId, relation_id: RelationId, min: i32, max: i32) -> Self {
        Self {
            shard_id,
            relation_id,
            min: Some(Datum::Integer(min as i64)),
            max: Some(Datum::Integer(max as i64)),
        }
    }

    /// Hash token bounds.
    pub fn token_bounds(&self) -> Option<(i32, i32)> {
        let min = self.min.as_ref()?.integer()?;
        let max = self.max.as_ref()?.integer()?;
        Some((i32::try_from(min).ok()?, i32::try_from(max).ok()?))
    }
}

/// Evenly split the 32-bit token space into `count` intervals.
pub fn uniform_hash_bounds(count: usize) -> Vec<(i32, i32)> {
    if count == 0 {
        return vec![];
    }

    let increment = (1i64 << 32) / count as i64;
    (0..count as i64)
        .map(|index| {
            let min = i32::MIN as i64 + index * increment;
            let max = if index == count as i64 - 1 {
                i32::MAX as i64
            } else {
                min + increment - 1
            };
            (min as i32, max as i32)
        })
        .collect()
}

/// Distribution of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributedTable {
    pub relation_id: RelationId,
    pub name: String,
    pub method: PartitionMethod,
    /// Distribution column, `None` for reference tables.
    pub partition_column: Option<AttrNumber>,
    pub column_name: Option<String>,
    /// Sorted by lower bound.
    pub shards: Vec<ShardInterval>,
    pub colocation_id: Option<u32>,
    pub hasher: Hasher,
    uniform_hash: bool,
}

impl DistributedTable {
    pub fn new(
        relation_id: RelationId,
        name: &str,
        method: PartitionMethod,
        partition_column: Option<AttrNumber>,
        mut shards: Vec<ShardInterval>,
    ) -> Self {
        shards.sort_by(|a, b| match (&a.min, &b.min) {
            (Some(a), Some(b)) => a.compare(b).unwrap_or(Ordering::Equal),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });

        let uniform_hash = method == PartitionMethod::Hash && is_uniform(&shards);

        Self {
            relation_id,
            name: name.to_string(),
            method,
            partition_column: if method == PartitionMethod::Reference {
                None
            } else {
                partition_column
            },
            column_name: None,
            shards,
            colocation_id: None,
            hasher: Hasher::default(),
            uniform_hash,
        }
    }

    pub fn with_colocation_id(mut self, colocation_id: Option<u32>) -> Self {
        self.colocation_id = colocation_id;
        self
    }

    pub fn with_hasher(mut self, hasher: Hasher) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_column_name(mut self, column_name: Option<String>) -> Self {
        self.column_name = column_name;
        self
    }

    pub fn is_reference(&self) -> bool {
        self.method == PartitionMethod::Reference
    }

    /// Hash shards split the token space evenly, so the owning shard can
    /// be computed instead of searched.
    pub fn has_uniform_hash_distribution(&self) -> bool {
        self.uniform_hash
    }

    /// Distribution column as referenced from range table entry `rel`.
    pub fn partition_var(&self, rel: RangeTableIndex) -> Option<Var> {
        self.partition_column.map(|attno| Var::new(rel, attno))
    }

    /// Name used in messages about the distribution column.
    pub fn partition_column_name(&self) -> String {
        match (&self.column_name, self.partition_column) {
            (Some(name), _) => name.clone(),
            (None, Some(attno)) => format!("column {}", attno),
            (None, None) => String::new(),
        }
    }
}

fn is_uniform(shards: &[ShardInterval]) -> bool {
    let expected = uniform_hash_bounds(shards.len());
    !shards.is_empty()
        && shards
            .iter()
            .zip(expected)
            .all(|(shard, bounds)| shard.token_bounds() == Some(bounds))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_uniform_hash_bounds() {
        let bounds = uniform_hash_bounds(4);
        assert_eq!(
            bounds,
            vec![
                (i32::MIN, -1073741825),
                (-1073741824, -1),
                (0, 1073741823),
                (1073741824, i32::MAX),
            ]
        );

        let bounds = uniform_hash_bounds(3);
        assert_eq!(bounds[0].0, i32::MIN);
        assert_eq!(bounds[2].1, i32::MAX);
        for pair in bounds.windows(2) {
            assert_eq!(pair[0].1 + 1, pair[1].0);
        }
    }

    #[test]
    fn test_uniform_detection() {
        let shards = uniform_hash_bounds(4)
            .into_iter()
            .enumerate()
            .rev()
            .map(|(i, (min, max))| ShardInterval::hash(ShardId(i as u64 + 1), 1, min, max))
            .collect::<Vec<_>>();
        let table = DistributedTable::new(1, "t", PartitionMethod::Hash, Some(1), shards);
        assert!(table.has_uniform_hash_distribution());
        assert_eq!(table.shards[0].shard_id, ShardId(1));

        let mut skewed = table.shards.clone();
        skewed[1].max = Some(Datum::Integer(5));
        let table = DistributedTable::new(1, "t", PartitionMethod::Hash, Some(1), skewed);
        assert!(!table.has_uniform_hash_distribution());
    }
}
