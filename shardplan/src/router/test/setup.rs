use shardplan_config::{
    Config, DistributedTable as TableConfig, FlexibleType, General, PartitionMethod, ShardRange,
    Worker,
};

use crate::catalog::{Catalog, LockManager, Metadata, ShardId, ShardLocks, WorkerNode};
use crate::query::{
    CommandType, Datum, Expr, JoinTree, OnConflict, Query, RangeTableEntry, ShardTarget,
    TargetEntry, Var, Volatility,
};
use crate::router::{Error, Job, RelationRestriction, RestrictionContext, RouterPlanner};

/// `t (id, val)`: hash, 4 shards, 2 replicas.
pub(super) const T: u32 = 1;
/// `s (id, val)`: co-located with `t`.
pub(super) const S: u32 = 2;
/// Reference tables.
pub(super) const COUNTRIES: u32 = 3;
pub(super) const REGIONS: u32 = 4;
/// `events (id, val)`: hash, 4 shards, not co-located with `t`.
pub(super) const EVENTS: u32 = 5;
/// `logs (ts, val)`: range, `[0, 99]` and `[100, 199]`.
pub(super) const LOGS: u32 = 6;

/// First shard of `t`: owns `hash(1)` and `hash(5)`.
pub(super) const T_SHARD_0: ShardId = ShardId(102008);
/// Last shard of `t`: owns `hash(2)`.
pub(super) const T_SHARD_3: ShardId = ShardId(102011);
pub(super) const S_SHARD_0: ShardId = ShardId(102012);
pub(super) const S_SHARD_3: ShardId = ShardId(102015);

pub(super) fn worker(n: usize) -> WorkerNode {
    WorkerNode::new(format!("10.0.0.{}", n), 5432)
}

fn hash_table(name: &str, relation_id: u32, group: Option<&str>) -> TableConfig {
    TableConfig {
        name: name.into(),
        relation_id,
        column: Some("id".into()),
        column_attno: Some(1),
        shard_count: 4,
        replication_factor: 2,
        colocation_group: group.map(String::from),
        ..Default::default()
    }
}

fn reference_table(name: &str, relation_id: u32) -> TableConfig {
    TableConfig {
        name: name.into(),
        relation_id,
        method: PartitionMethod::Reference,
        ..Default::default()
    }
}

pub(super) fn config() -> Config {
    Config {
        workers: vec![
            Worker::new("10.0.0.1", 5432),
            Worker::new("10.0.0.2", 5432),
            Worker::new("10.0.0.3", 5432),
        ],
        tables: vec![
            hash_table("t", T, Some("default")),
            hash_table("s", S, Some("default")),
            reference_table("countries", COUNTRIES),
            reference_table("regions", REGIONS),
            hash_table("events", EVENTS, None),
            TableConfig {
                name: "logs".into(),
                relation_id: LOGS,
                method: PartitionMethod::Range,
                column: Some("ts".into()),
                column_attno: Some(1),
                replication_factor: 1,
                ranges: vec![
                    ShardRange {
                        min: FlexibleType::Integer(0),
                        max: FlexibleType::Integer(99),
                    },
                    ShardRange {
                        min: FlexibleType::Integer(100),
                        max: FlexibleType::Integer(199),
                    },
                ],
                ..Default::default()
            },
        ],
        ..Default::default()
    }
}

/// Catalog, locks and settings for one planning unit.
pub(super) struct RouterTest {
    pub(super) catalog: Catalog,
    pub(super) locks: ShardLocks,
    pub(super) settings: General,
}

impl RouterTest {
    pub(super) fn new() -> Self {
        Self {
            catalog: Catalog::from_config(&config()).unwrap(),
            locks: ShardLocks::new(LockManager::new()),
            settings: General::default(),
        }
    }

    pub(super) fn plan(
        &self,
        query: &Query,
        context: &RestrictionContext,
    ) -> Result<Option<Job>, Error> {
        RouterPlanner::new(&self.catalog, &self.locks, &self.settings).plan(query, context)
    }

    /// Plan a write, which never needs a restriction context.
    pub(super) fn plan_modify(&self, query: &Query) -> Result<Job, Error> {
        self.plan(query, &RestrictionContext::default())
            .map(|job| job.expect("modifications are always router planned"))
    }

    /// Take a placement of the shard out of routing.
    pub(super) fn deactivate(&mut self, shard_id: ShardId, node: usize) {
        assert!(self.catalog.mark_placement_inactive(shard_id, &worker(node)));
    }

    pub(super) fn shard_nodes(&self, shard_id: ShardId) -> Vec<WorkerNode> {
        self.catalog
            .finalized_placements(shard_id)
            .into_iter()
            .map(|placement| placement.node)
            .collect()
    }
}

pub(super) fn column(rel: usize, attno: u16) -> Expr {
    Expr::var(rel, attno)
}

pub(super) fn eq(rel: usize, attno: u16, value: impl Into<Datum>) -> Expr {
    Expr::eq(column(rel, attno), Expr::constant(value))
}

pub(super) fn stable(name: &str, args: Vec<Expr>) -> Expr {
    Expr::func(name, Volatility::Stable, args)
}

pub(super) fn volatile(name: &str) -> Expr {
    Expr::func(name, Volatility::Volatile, vec![])
}

/// `INSERT INTO <relation> VALUES (...)`, one row.
pub(super) fn insert(relation_id: u32, values: Vec<Expr>) -> Query {
    Query {
        command: CommandType::Insert,
        range_table: vec![RangeTableEntry::relation(relation_id)],
        result_relation: Some(1),
        target_list: target_list(values),
        ..Default::default()
    }
}

/// `INSERT ... ON CONFLICT (id) DO UPDATE SET ...`. `EXCLUDED` is range
/// table entry 2.
pub(super) fn upsert(relation_id: u32, values: Vec<Expr>, set: Vec<TargetEntry>) -> Query {
    let mut query = insert(relation_id, values);
    query
        .range_table
        .push(RangeTableEntry::Excluded { relation_id });
    query.on_conflict = Some(OnConflict {
        set,
        arbiter_where: None,
        on_conflict_where: None,
    });
    query
}

/// `UPDATE <relation> SET ... WHERE ...`.
pub(super) fn update(relation_id: u32, set: Vec<TargetEntry>, quals: Option<Expr>) -> Query {
    Query {
        command: CommandType::Update,
        range_table: vec![RangeTableEntry::relation(relation_id)],
        result_relation: Some(1),
        join_tree: JoinTree {
            from: vec![1],
            quals,
        },
        target_list: set,
        ..Default::default()
    }
}

/// `DELETE FROM <relation> WHERE ...`.
pub(super) fn delete(relation_id: u32, quals: Option<Expr>) -> Query {
    Query {
        command: CommandType::Delete,
        ..update(relation_id, vec![], quals)
    }
}

/// `SELECT id, val FROM <relations> WHERE ...`, reading the first relation.
pub(super) fn select(relation_ids: &[u32], quals: Option<Expr>) -> Query {
    Query {
        command: CommandType::Select,
        range_table: relation_ids
            .iter()
            .map(|relation_id| RangeTableEntry::relation(*relation_id))
            .collect(),
        join_tree: JoinTree {
            from: (1..=relation_ids.len()).collect(),
            quals,
        },
        target_list: target_list(vec![column(1, 1), column(1, 2)]),
        ..Default::default()
    }
}

/// `INSERT INTO <target> (columns...) <source>`. The source is range table entry 2.
pub(super) fn insert_select(target: u32, insert: Vec<Expr>, source: Query) -> Query {
    Query {
        command: CommandType::Insert,
        range_table: vec![
            RangeTableEntry::relation(target),
            RangeTableEntry::subquery(source),
        ],
        result_relation: Some(1),
        join_tree: JoinTree {
            from: vec![2],
            quals: None,
        },
        target_list: target_list(insert),
        ..Default::default()
    }
}

/// `INSERT INTO <target> SELECT * FROM <source> WHERE ...`.
pub(super) fn insert_select_all(target: u32, source: u32, quals: Option<Expr>) -> Query {
    insert_select(
        target,
        vec![column(2, 1), column(2, 2)],
        select(&[source], quals),
    )
}

pub(super) fn target_list(values: Vec<Expr>) -> Vec<TargetEntry> {
    values
        .into_iter()
        .enumerate()
        .map(|(position, value)| TargetEntry::new(position as u16 + 1, value))
        .collect()
}

/// One relation per range table entry, with its restrictions.
pub(super) fn context(relations: Vec<(u32, Vec<Expr>)>) -> RestrictionContext {
    RestrictionContext::new(
        relations
            .into_iter()
            .enumerate()
            .map(|(position, (relation_id, clauses))| {
                clauses.into_iter().fold(
                    RelationRestriction::new(position + 1, relation_id),
                    |relation, clause| relation.with_restriction(clause),
                )
            })
            .collect(),
    )
}

/// Shard each relation reference of `query` was rewritten to.
pub(super) fn shard_targets(query: &Query) -> Vec<ShardTarget> {
    query
        .range_table
        .iter()
        .filter_map(|entry| match entry {
            RangeTableEntry::Relation { shard, .. } => Some(*shard),
            _ => None,
        })
        .collect()
}

pub(super) fn var(rel: usize, attno: u16) -> Var {
    Var::new(rel, attno)
}
