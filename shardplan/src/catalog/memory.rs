//! Catalog built from configuration.

use fnv::FnvHashMap as HashMap;
use shardplan_config::{Config, PartitionMethod};
use tracing::{debug, info};

use super::{
    shard::uniform_hash_bounds, DistributedTable, Error, Metadata, Placement, PlacementState,
    RelationId, ShardId, ShardInterval, WorkerNode,
};
use crate::query::Datum;

/// Distribution metadata held in memory.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: HashMap<RelationId, DistributedTable>,
    placements: HashMap<ShardId, Vec<Placement>>,
    workers: Vec<WorkerNode>,
}

impl Catalog {
    /// Create shards and placements for every configured table.
    ///
    /// Placements are assigned round-robin over active workers, so tables
    /// in the same colocation group get identical placements for shards at
    /// the same position. Reference table shards are placed on every worker.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        config.check()?;

        let workers = config
            .active_workers()
            .map(WorkerNode::from)
            .collect::<Vec<_>>();
        let mut catalog = Catalog {
            workers,
            ..Default::default()
        };

        let mut next_shard_id = config.general.shard_id_start;
        let mut groups: HashMap<String, (u32, String)> = HashMap::default();

        for (position, table) in config.tables.iter().enumerate() {
            let relation_id = table.relation_id;

            let shards = match table.method {
                PartitionMethod::Hash => uniform_hash_bounds(table.shard_count)
                    .into_iter()
                    .map(|(min, max)| {
                        let shard_id = ShardId(next_shard_id);
                        next_shard_id += 1;
                        ShardInterval::hash(shard_id, relation_id, min, max)
                    })
                    .collect::<Vec<_>>(),

                PartitionMethod::Range | PartitionMethod::Append => table
                    .ranges
                    .iter()
                    .map(|range| {
                        let shard_id = ShardId(next_shard_id);
                        next_shard_id += 1;
                        ShardInterval {
                            shard_id,
                            relation_id,
                            min: Some(Datum::from(&range.min)),
                            max: Some(Datum::from(&range.max)),
                        }
                    })
                    .collect(),

                PartitionMethod::Reference => {
                    let shard_id = ShardId(next_shard_id);
                    next_shard_id += 1;
                    vec![ShardInterval {
                        shard_id,
                        relation_id,
                        min: None,
                        max: None,
                    }]
                }
            };

            let colocation_id = match (table.method, &table.colocation_group) {
                (PartitionMethod::Reference, _) => Some(0),
                (_, Some(group)) => {
                    let next_id = groups.len() as u32 + 1;
                    let (id, first) = groups
                        .entry(group.clone())
                        .or_insert_with(|| (next_id, table.name.clone()));
                    if let Some(first) = config.table(first) {
                        if first.method != table.method
                            || first.effective_shard_count() != table.effective_shard_count()
                            || first.replication_factor != table.replication_factor
                        {
                            return Err(Error::ColocationMismatch(
                                first.name.clone(),
                                table.name.clone(),
                            ));
                        }
                    }
                    Some(*id)
                }
                (_, None) => None,
            };

            let distributed = DistributedTable::new(
                relation_id,
                &table.name,
                table.method,
                table.column_attno,
                shards,
            )
            .with_colocation_id(colocation_id)
            .with_hasher(table.hasher)
            .with_column_name(table.column.clone());

            check_ranges(&distributed)?;

            let replicas = if distributed.is_reference() {
                catalog.workers.len()
            } else {
                table.replication_factor
            };

            for (index, shard) in distributed.shards.iter().enumerate() {
                let placements = (0..replicas)
                    .map(|replica| {
                        let node = &catalog.workers[(index + replica) % catalog.workers.len()];
                        Placement::new(shard.shard_id, node.clone())
                    })
                    .collect::<Vec<_>>();
                catalog.placements.insert(shard.shard_id, placements);
            }

            debug!(
                "table \"{}\" [{}] has {} shards, {} replicas each",
                distributed.name,
                position,
                distributed.shards.len(),
                replicas
            );

            catalog.tables.insert(relation_id, distributed);
        }

        info!(
            "catalog loaded: {} tables, {} workers",
            catalog.tables.len(),
            catalog.workers.len()
        );

        Ok(catalog)
    }

    /// Add a table with explicit placements.
    pub fn add_table(&mut self, table: DistributedTable, placements: Vec<Placement>) {
        for placement in placements {
            self.placements
                .entry(placement.shard_id)
                .or_default()
                .push(placement);
        }
        self.tables.insert(table.relation_id, table);
    }

    /// Exclude a placement from routing, e.g. after a failed write.
    /// Returns `false` if there is no such placement.
    pub fn mark_placement_inactive(&mut self, shard_id: ShardId, node: &WorkerNode) -> bool {
        let placement = self
            .placements
            .get_mut(&shard_id)
            .and_then(|placements| placements.iter_mut().find(|p| &p.node == node));

        match placement {
            Some(placement) => {
                placement.state = PlacementState::Inactive;
                true
            }
            None => false,
        }
    }

    /// All placements of a shard, including inactive ones.
    pub fn placements(&self, shard_id: ShardId) -> &[Placement] {
        self.placements
            .get(&shard_id)
            .map(|placements| placements.as_slice())
            .unwrap_or(&[])
    }

    pub fn tables(&self) -> impl Iterator<Item = &DistributedTable> {
        self.tables.values()
    }
}

impl Metadata for Catalog {
    fn table(&self, relation_id: RelationId) -> Option<&DistributedTable> {
        self.tables.get(&relation_id)
    }

    fn finalized_placements(&self, shard_id: ShardId) -> Vec<Placement> {
        self.placements(shard_id)
            .iter()
            .filter(|placement| placement.is_finalized())
            .cloned()
            .collect()
    }

    fn active_workers(&self) -> Vec<WorkerNode> {
        self.workers.clone()
    }
}

/// Range shards of one table must not overlap. Append shards may.
fn check_ranges(table: &DistributedTable) -> Result<(), Error> {
    if table.method != PartitionMethod::Range && table.method != PartitionMethod::Append {
        return Ok(());
    }

    for shard in &table.shards {
        if let (Some(min), Some(max)) = (&shard.min, &shard.max) {
            if min.compare(max).is_none() {
                return Err(Error::MixedRangeTypes(table.name.clone()));
            }
        }
    }

    for pair in table.shards.windows(2) {
        let (Some(previous), Some(next)) = (&pair[0].max, &pair[1].min) else {
            continue;
        };

        match previous.compare(next) {
            None => return Err(Error::MixedRangeTypes(table.name.clone())),
            Some(std::cmp::Ordering::Less) => (),
            Some(_) if table.method == PartitionMethod::Range => {
                return Err(Error::OverlappingRanges(table.name.clone()))
            }
            Some(_) => (),
        }
    }

    Ok(())
}
