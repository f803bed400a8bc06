//! SELECT statements that read one shard per relation.

use shardplan_config::General;
use tracing::{debug, trace};

use super::error::Error;
use super::placement::workers_containing_all_shards;
use super::restriction::RestrictionContext;
use super::sharding::{derive_equalities, prune_shard_list};
use super::task::RelationShard;
use crate::catalog::{Metadata, PartitionMethod, Placement, ShardId, ShardInterval};
use crate::query::{Query, RangeTableEntry, ShardTarget};

/// Where a single-worker SELECT runs.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectRoute {
    /// Workers holding every shard the statement reads. Empty when
    /// nothing is left to read and no placeholder was requested.
    pub placements: Vec<Placement>,
    pub anchor_shard_id: ShardId,
    pub relation_shards: Vec<RelationShard>,
}

/// Can the statement be considered for router planning at all.
/// Modifications always are; SELECTs only if every relation is
/// hash distributed or a reference table.
pub fn multi_router_plannable_query(
    query: &Query,
    context: &RestrictionContext,
    metadata: &impl Metadata,
    settings: &General,
) -> bool {
    if query.command.is_modify() {
        return true;
    }

    if !settings.enable_router_execution {
        return false;
    }

    if query.has_for_update {
        return false;
    }

    context.relations.iter().all(|relation| {
        matches!(
            metadata.partition_method(relation.relation_id),
            Some(PartitionMethod::Hash | PartitionMethod::Reference)
        )
    })
}

/// Find the shards each relation of a SELECT reads and rewrite
/// relation references to them.
///
/// `None` if the statement needs more than one shard of any relation or
/// no worker holds them all. If every relation is pruned away, `dummy`
/// routes the statement to the first active worker, which will return
/// nothing; otherwise the route has no placements.
pub fn router_select_query(
    query: &mut Query,
    context: &mut RestrictionContext,
    dummy: bool,
    metadata: &impl Metadata,
) -> Result<Option<SelectRoute>, Error> {
    let Some(pruned) = target_shard_intervals_for_select(context, metadata)? else {
        return Ok(None);
    };

    let mut anchor_shard_id = ShardId::INVALID;
    let mut relation_shards = vec![];

    for shard in pruned.iter().filter_map(|shards| shards.first()) {
        if anchor_shard_id == ShardId::INVALID {
            anchor_shard_id = shard.shard_id;
        }

        relation_shards.push(RelationShard {
            relation_id: shard.relation_id,
            shard_id: shard.shard_id,
        });
    }

    // A relation joined with itself must read the same shard.
    if relation_prunes_to_multiple_shards(&relation_shards) {
        return Ok(None);
    }

    let placements = if !relation_shards.is_empty() {
        workers_containing_all_shards(metadata, &pruned)
    } else if dummy {
        metadata
            .active_workers()
            .into_iter()
            .next()
            .map(Placement::dummy)
            .into_iter()
            .collect()
    } else {
        return Ok(Some(SelectRoute {
            placements: vec![],
            anchor_shard_id,
            relation_shards,
        }));
    };

    if placements.is_empty() {
        debug!("found no worker with all shard placements");
        return Ok(None);
    }

    update_relation_to_shard_names(query, &relation_shards);

    Ok(Some(SelectRoute {
        placements,
        anchor_shard_id,
        relation_shards,
    }))
}

/// Prune every relation of the context, recording the result in it.
///
/// `None` as soon as one relation keeps more than one shard. Relations
/// with a constant `false` restriction keep none.
pub fn target_shard_intervals_for_select(
    context: &mut RestrictionContext,
    metadata: &impl Metadata,
) -> Result<Option<Vec<Vec<ShardInterval>>>, Error> {
    let derived = {
        let clauses = context
            .relations
            .iter()
            .flat_map(|relation| relation.equivalence_clauses())
            .collect::<Vec<_>>();
        derive_equalities(&clauses)
    };

    let mut result = vec![];

    for relation in context.relations.iter_mut() {
        let table = metadata
            .table(relation.relation_id)
            .ok_or(Error::UnknownRelation(relation.relation_id))?;

        let pruned = if relation.contains_false_clause() {
            vec![]
        } else {
            let mut clauses = relation.restrict_clauses();
            clauses.extend(derived.iter().filter(|clause| {
                clause
                    .pull_vars()
                    .iter()
                    .all(|var| var.rel == relation.index)
            }));
            prune_shard_list(table, relation.index, &clauses, &table.shards)
        };

        trace!(
            "\"{}\" pruned to {} of {} shards",
            table.name,
            pruned.len(),
            table.shards.len()
        );

        relation.pruned_shards = pruned.clone();

        if pruned.len() > 1 {
            return Ok(None);
        }

        result.push(pruned);
    }

    Ok(Some(result))
}

/// Same relation mapped to more than one shard.
pub fn relation_prunes_to_multiple_shards(relation_shards: &[RelationShard]) -> bool {
    let mut sorted = relation_shards.to_vec();
    sorted.sort_by_key(|shard| (shard.relation_id, shard.shard_id));

    sorted.windows(2).any(|pair| {
        pair[0].relation_id == pair[1].relation_id && pair[0].shard_id != pair[1].shard_id
    })
}

/// Point every relation reference at its shard. Relations without one
/// were pruned away and read nothing.
pub fn update_relation_to_shard_names(query: &mut Query, relation_shards: &[RelationShard]) {
    query.for_each_relation_mut(&mut |entry| {
        if let RangeTableEntry::Relation {
            relation_id, shard, ..
        } = entry
        {
            *shard = relation_shards
                .iter()
                .find(|relation_shard| relation_shard.relation_id == *relation_id)
                .map(|relation_shard| ShardTarget::Shard(relation_shard.shard_id))
                .unwrap_or(ShardTarget::Empty);
        }
    });
}

#[cfg(test)]
mod test {
    use super::*;

    fn relation_shard(relation_id: u32, shard_id: u64) -> RelationShard {
        RelationShard {
            relation_id,
            shard_id: ShardId(shard_id),
        }
    }

    #[test]
    fn test_relation_prunes_to_multiple_shards() {
        assert!(!relation_prunes_to_multiple_shards(&[]));
        assert!(!relation_prunes_to_multiple_shards(&[
            relation_shard(1, 10),
            relation_shard(2, 20),
            relation_shard(1, 10),
        ]));
        assert!(relation_prunes_to_multiple_shards(&[
            relation_shard(1, 10),
            relation_shard(2, 20),
            relation_shard(1, 11),
        ]));
    }

    #[test]
    fn test_update_relation_to_shard_names() {
        let mut query = Query {
            range_table: vec![RangeTableEntry::relation(1), RangeTableEntry::relation(2)],
            ..Default::default()
        };
        update_relation_to_shard_names(&mut query, &[relation_shard(2, 20)]);

        let shards = query
            .range_table
            .iter()
            .map(|entry| match entry {
                RangeTableEntry::Relation { shard, .. } => *shard,
                _ => ShardTarget::Unresolved,
            })
            .collect::<Vec<_>>();
        assert_eq!(shards, vec![ShardTarget::Empty, ShardTarget::Shard(ShardId(20))]);
    }
}
