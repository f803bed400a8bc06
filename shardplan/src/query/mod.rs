//! Analyzed statement representation.
//!
//! Statements arrive already parsed and normalized; the planner only
//! inspects them and, for INSERT ... SELECT, rewrites private copies.

use serde::{Deserialize, Serialize};

use crate::catalog::{RelationId, ShardId};

pub mod datum;
pub mod expr;

pub use datum::Datum;
pub use expr::{
    ArrayCoerce, BoolExpr, BoolOp, CaseExpr, CaseWhen, CoerceViaIo, Expr, FuncExpr, NullTest,
    OpExpr, Operator, RowCompare, ScalarArrayOpExpr, Var, Volatility,
};

/// 1-based position in a query's range table.
pub type RangeTableIndex = usize;

/// 1-based column number.
pub type AttrNumber = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    #[default]
    Select,
    Insert,
    Update,
    Delete,
}

impl CommandType {
    pub fn is_modify(&self) -> bool {
        matches!(self, Self::Insert | Self::Update | Self::Delete)
    }
}

/// Entry of a target list or RETURNING list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetEntry {
    /// Target column for INSERT/UPDATE, output position for SELECT.
    pub resno: AttrNumber,
    #[serde(default)]
    pub name: Option<String>,
    pub expr: Expr,
    /// Helper column not part of the visible output.
    #[serde(default)]
    pub resjunk: bool,
}

impl TargetEntry {
    pub fn new(resno: AttrNumber, expr: Expr) -> Self {
        Self {
            resno,
            name: None,
            expr,
            resjunk: false,
        }
    }
}

/// Which shard a relation reference should be rewritten to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardTarget {
    /// Not planned yet.
    #[default]
    Unresolved,
    /// Read from this shard.
    Shard(ShardId),
    /// Pruned away entirely: produces no rows.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RangeTableEntry {
    Relation {
        relation_id: RelationId,
        #[serde(default)]
        alias: Option<String>,
        #[serde(default)]
        shard: ShardTarget,
    },
    /// `EXCLUDED` pseudo relation of `ON CONFLICT DO UPDATE`.
    Excluded { relation_id: RelationId },
    Subquery {
        query: Box<Query>,
        #[serde(default)]
        alias: Option<String>,
    },
    Join,
    /// `VALUES (...), (...)` list.
    Values,
    Function { name: String },
    Cte { name: String },
}

impl RangeTableEntry {
    pub fn relation(relation_id: RelationId) -> Self {
        Self::Relation {
            relation_id,
            alias: None,
            shard: ShardTarget::Unresolved,
        }
    }

    pub fn subquery(query: Query) -> Self {
        Self::Subquery {
            query: Box::new(query),
            alias: None,
        }
    }

    pub fn relation_id(&self) -> Option<RelationId> {
        match self {
            Self::Relation { relation_id, .. } | Self::Excluded { relation_id } => {
                Some(*relation_id)
            }
            _ => None,
        }
    }
}

/// FROM list and WHERE clause.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JoinTree {
    #[serde(default)]
    pub from: Vec<RangeTableIndex>,
    #[serde(default)]
    pub quals: Option<Expr>,
}

/// `ON CONFLICT` clause of an INSERT.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OnConflict {
    /// `DO UPDATE SET` list; empty for `DO NOTHING`.
    #[serde(default)]
    pub set: Vec<TargetEntry>,
    /// Predicate of a partial unique index used as conflict arbiter.
    #[serde(default)]
    pub arbiter_where: Option<Expr>,
    /// `DO UPDATE ... WHERE`.
    #[serde(default)]
    pub on_conflict_where: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonTableExpr {
    pub name: String,
    pub query: Box<Query>,
}

/// One analyzed statement.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Query {
    pub command: CommandType,
    pub range_table: Vec<RangeTableEntry>,
    /// Target of INSERT/UPDATE/DELETE.
    pub result_relation: Option<RangeTableIndex>,
    pub join_tree: JoinTree,
    pub target_list: Vec<TargetEntry>,
    pub returning: Vec<TargetEntry>,
    pub on_conflict: Option<OnConflict>,
    pub ctes: Vec<CommonTableExpr>,
    pub limit_count: Option<Expr>,
    pub limit_offset: Option<Expr>,
    pub has_window_clause: bool,
    pub has_set_operations: bool,
    pub has_grouping_sets: bool,
    pub has_distinct_on: bool,
    pub has_for_update: bool,
}

impl Query {
    /// Range table entry at the given 1-based index.
    pub fn rte(&self, index: RangeTableIndex) -> Option<&RangeTableEntry> {
        index
            .checked_sub(1)
            .and_then(|index| self.range_table.get(index))
    }

    pub fn rte_mut(&mut self, index: RangeTableIndex) -> Option<&mut RangeTableEntry> {
        index
            .checked_sub(1)
            .and_then(|index| self.range_table.get_mut(index))
    }

    /// Top-level AND-ed conditions of the WHERE clause.
    pub fn where_clause_list(&self) -> Vec<&Expr> {
        self.join_tree
            .quals
            .as_ref()
            .map(|quals| quals.conjuncts())
            .unwrap_or_default()
    }

    /// AND a condition into the WHERE clause.
    pub fn add_qual(&mut self, qual: Expr) {
        self.join_tree.quals = Some(match self.join_tree.quals.take() {
            Some(quals) => quals.and_with(qual),
            None => qual,
        });
    }

    pub fn target_entry(&self, resno: AttrNumber) -> Option<&TargetEntry> {
        self.target_list.iter().find(|entry| entry.resno == resno)
    }

    /// Every expression owned directly by this query, excluding
    /// those of nested queries.
    pub fn expressions(&self) -> Vec<&Expr> {
        let mut exprs: Vec<&Expr> = vec![];
        exprs.extend(self.target_list.iter().map(|entry| &entry.expr));
        exprs.extend(self.returning.iter().map(|entry| &entry.expr));
        exprs.extend(self.join_tree.quals.iter());
        if let Some(ref on_conflict) = self.on_conflict {
            exprs.extend(on_conflict.set.iter().map(|entry| &entry.expr));
            exprs.extend(on_conflict.arbiter_where.iter());
            exprs.extend(on_conflict.on_conflict_where.iter());
        }
        exprs.extend(self.limit_count.iter());
        exprs.extend(self.limit_offset.iter());
        exprs
    }

    /// Subqueries in FROM, sublinks and CTEs directly under this query.
    pub fn child_queries(&self) -> Vec<&Query> {
        let mut queries = vec![];
        for entry in &self.range_table {
            if let RangeTableEntry::Subquery { query, .. } = entry {
                queries.push(query.as_ref());
            }
        }
        for expr in self.expressions() {
            collect_sublinks(expr, &mut queries);
        }
        queries.extend(self.ctes.iter().map(|cte| cte.query.as_ref()));
        queries
    }

    pub fn child_queries_mut(&mut self) -> Vec<&mut Query> {
        let Query {
            range_table,
            join_tree,
            target_list,
            returning,
            on_conflict,
            ctes,
            limit_count,
            limit_offset,
            ..
        } = self;

        let mut queries = vec![];
        for entry in range_table.iter_mut() {
            if let RangeTableEntry::Subquery { query, .. } = entry {
                queries.push(query.as_mut());
            }
        }

        let mut exprs: Vec<&mut Expr> = vec![];
        exprs.extend(target_list.iter_mut().map(|entry| &mut entry.expr));
        exprs.extend(returning.iter_mut().map(|entry| &mut entry.expr));
        exprs.extend(join_tree.quals.iter_mut());
        if let Some(on_conflict) = on_conflict {
            exprs.extend(on_conflict.set.iter_mut().map(|entry| &mut entry.expr));
            exprs.extend(on_conflict.arbiter_where.iter_mut());
            exprs.extend(on_conflict.on_conflict_where.iter_mut());
        }
        exprs.extend(limit_count.iter_mut());
        exprs.extend(limit_offset.iter_mut());
        for expr in exprs {
            collect_sublinks_mut(expr, &mut queries);
        }

        queries.extend(ctes.iter_mut().map(|cte| cte.query.as_mut()));
        queries
    }

    /// This query followed by every query nested in it, at any depth.
    pub fn queries_recursive(&self) -> Vec<&Query> {
        let mut queries = vec![self];
        for child in self.child_queries() {
            queries.extend(child.queries_recursive());
        }
        queries
    }

    /// Range table entries of this query and all nested queries.
    pub fn range_table_entries_recursive(&self) -> Vec<&RangeTableEntry> {
        self.queries_recursive()
            .into_iter()
            .flat_map(|query| query.range_table.iter())
            .collect()
    }

    /// Apply `f` to every relation reference, including nested queries.
    pub fn for_each_relation_mut(&mut self, f: &mut impl FnMut(&mut RangeTableEntry)) {
        for entry in self.range_table.iter_mut() {
            if matches!(entry, RangeTableEntry::Relation { .. }) {
                f(entry);
            }
        }
        for child in self.child_queries_mut() {
            child.for_each_relation_mut(f);
        }
    }

    /// Subqueries in the WHERE clause or target list.
    pub fn has_sublinks(&self) -> bool {
        self.expressions()
            .into_iter()
            .any(|expr| expr.contains_sublink())
    }

    pub fn contains_volatility(&self, volatility: Volatility) -> bool {
        self.queries_recursive().into_iter().any(|query| {
            query
                .expressions()
                .into_iter()
                .any(|expr| expr.contains_volatility(volatility))
        })
    }

    pub fn contains_volatile_functions(&self) -> bool {
        self.contains_volatility(Volatility::Volatile)
    }

    pub fn contains_mutable_functions(&self) -> bool {
        self.contains_volatility(Volatility::Stable)
    }

    /// `INSERT INTO ... SELECT`: an INSERT reading from exactly one subquery.
    pub fn is_insert_select(&self) -> bool {
        self.insert_select_source().is_some()
    }

    /// Range table index of the INSERT ... SELECT source subquery.
    pub fn insert_select_source(&self) -> Option<RangeTableIndex> {
        if self.command != CommandType::Insert || self.join_tree.from.len() != 1 {
            return None;
        }

        let index = self.join_tree.from[0];
        match self.rte(index) {
            Some(RangeTableEntry::Subquery { .. }) => Some(index),
            _ => None,
        }
    }

    pub fn insert_select_subquery(&self) -> Option<&Query> {
        match self.insert_select_source().and_then(|index| self.rte(index)) {
            Some(RangeTableEntry::Subquery { query, .. }) => Some(query.as_ref()),
            _ => None,
        }
    }

    pub fn insert_select_subquery_mut(&mut self) -> Option<&mut Query> {
        let index = self.insert_select_source()?;
        match self.rte_mut(index) {
            Some(RangeTableEntry::Subquery { query, .. }) => Some(query.as_mut()),
            _ => None,
        }
    }

    /// Relation id of the INSERT/UPDATE/DELETE target.
    pub fn result_relation_id(&self) -> Option<RelationId> {
        self.result_relation
            .and_then(|index| self.rte(index))
            .and_then(|entry| entry.relation_id())
    }

    /// Follow a column reference through subqueries in FROM down to
    /// the table column it reads, if it reads one unmodified.
    pub fn resolve_column(&self, var: &Var) -> Option<(RelationId, AttrNumber)> {
        match self.rte(var.rel)? {
            RangeTableEntry::Relation { relation_id, .. } => Some((*relation_id, var.attno)),
            RangeTableEntry::Subquery { query, .. } => {
                let entry = query.target_entry(var.attno)?;
                let inner = entry.expr.as_var()?;
                query.resolve_column(inner)
            }
            _ => None,
        }
    }
}

fn collect_sublinks<'a>(expr: &'a Expr, queries: &mut Vec<&'a Query>) {
    match expr {
        Expr::SubLink(query) => queries.push(query.as_ref()),
        expr => expr
            .children()
            .into_iter()
            .for_each(|child| collect_sublinks(child, queries)),
    }
}

fn collect_sublinks_mut<'a>(expr: &'a mut Expr, queries: &mut Vec<&'a mut Query>) {
    match expr {
        Expr::SubLink(query) => queries.push(query.as_mut()),
        expr => expr
            .children_mut()
            .into_iter()
            .for_each(|child| collect_sublinks_mut(child, queries)),
    }
}
