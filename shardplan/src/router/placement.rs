//! Finding workers that hold every shard a statement touches.

use crate::catalog::{Metadata, Placement, ShardInterval};

/// Placements of `rhs` on a node that also appears in `lhs`, in `lhs` order.
///
/// Replication factors are small, a linear scan is enough.
pub fn intersect_placement_list(lhs: &[Placement], rhs: &[Placement]) -> Vec<Placement> {
    let mut placements = vec![];
    for left in lhs {
        for right in rhs {
            if left.same_node(right) {
                placements.push(right.clone());
            }
        }
    }
    placements
}

/// Placements on workers holding all the given shards. Relations pruned
/// to nothing are skipped; each remaining list must have exactly one shard.
///
/// Empty if no worker has them all.
pub fn workers_containing_all_shards(
    metadata: &impl Metadata,
    pruned: &[Vec<ShardInterval>],
) -> Vec<Placement> {
    let mut current: Option<Vec<Placement>> = None;

    for shards in pruned {
        let Some(shard) = shards.first() else {
            continue;
        };
        assert_eq!(shards.len(), 1, "relation pruned to more than one shard");

        let placements = metadata.finalized_placements(shard.shard_id);

        let intersected = match current {
            None => placements,
            Some(ref current) => intersect_placement_list(current, &placements),
        };

        if intersected.is_empty() {
            return vec![];
        }

        current = Some(intersected);
    }

    current.unwrap_or_default()
}
