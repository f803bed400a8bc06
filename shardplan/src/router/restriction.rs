//! Per-relation restrictions collected before routing.

use serde::{Deserialize, Serialize};

use crate::catalog::{Metadata, PartitionMethod, RelationId, ShardInterval};
use crate::query::{Expr, Operator, RangeTableIndex, Var};

/// One restriction clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestrictInfo {
    pub clause: Expr,
    /// Clause references no columns, e.g. `WHERE false`.
    #[serde(default)]
    pub pseudoconstant: bool,
    /// Alternatives of an OR clause, wrapped individually.
    #[serde(default)]
    pub or_clause: Vec<RestrictInfo>,
    /// Join condition of an outer join. Doesn't filter the outer side,
    /// so it can't contribute equalities to other relations.
    #[serde(default)]
    pub outer_join: bool,
}

impl RestrictInfo {
    pub fn new(clause: Expr) -> Self {
        Self {
            clause,
            pseudoconstant: false,
            or_clause: vec![],
            outer_join: false,
        }
    }

    pub fn pseudoconstant(clause: Expr) -> Self {
        Self {
            pseudoconstant: true,
            ..Self::new(clause)
        }
    }

    pub fn outer_join(clause: Expr) -> Self {
        Self {
            outer_join: true,
            ..Self::new(clause)
        }
    }

    /// Clause can be used to derive equalities between relations.
    pub fn is_equivalence_source(&self) -> bool {
        !self.pseudoconstant && !self.outer_join
    }

    fn instantiate(&mut self, shard: &ShardInterval, method: PartitionMethod) {
        instantiate_partition_qual(&mut self.clause, shard, method);
        for alternative in self.or_clause.iter_mut() {
            alternative.instantiate(shard, method);
        }
    }
}

/// Restrictions of one relation reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationRestriction {
    /// Range table index the clauses' column references use.
    pub index: RangeTableIndex,
    pub relation_id: RelationId,
    /// Clauses on this relation alone.
    #[serde(default)]
    pub base_restrictions: Vec<RestrictInfo>,
    /// Join clauses involving this relation.
    #[serde(default)]
    pub join_info: Vec<RestrictInfo>,
    /// Shards left after pruning.
    #[serde(default, skip_deserializing)]
    pub pruned_shards: Vec<ShardInterval>,
}

impl RelationRestriction {
    pub fn new(index: RangeTableIndex, relation_id: RelationId) -> Self {
        Self {
            index,
            relation_id,
            base_restrictions: vec![],
            join_info: vec![],
            pruned_shards: vec![],
        }
    }

    pub fn with_restriction(mut self, clause: Expr) -> Self {
        self.base_restrictions.push(RestrictInfo::new(clause));
        self
    }

    /// Clauses of this relation usable for equivalence classes.
    pub fn equivalence_clauses(&self) -> impl Iterator<Item = &Expr> {
        self.base_restrictions
            .iter()
            .chain(self.join_info.iter())
            .filter(|info| info.is_equivalence_source())
            .map(|info| &info.clause)
    }

    pub fn restrict_clauses(&self) -> Vec<&Expr> {
        self.base_restrictions.iter().map(|info| &info.clause).collect()
    }

    /// Constant `false` among the join-level pseudoconstant clauses:
    /// the relation contributes no rows.
    pub fn contains_false_clause(&self) -> bool {
        self.join_info
            .iter()
            .filter(|info| info.pseudoconstant)
            .flat_map(|info| info.clause.conjuncts())
            .any(|clause| clause.is_false_clause())
    }
}

/// Restrictions of every relation a statement reads.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RestrictionContext {
    #[serde(default)]
    pub relations: Vec<RelationRestriction>,
}

impl RestrictionContext {
    pub fn new(relations: Vec<RelationRestriction>) -> Self {
        Self { relations }
    }

    /// Every relation is a reference table.
    pub fn all_reference_tables(&self, metadata: &impl Metadata) -> bool {
        self.relations.iter().all(|relation| {
            metadata.partition_method(relation.relation_id) == Some(PartitionMethod::Reference)
        })
    }

    /// Replace partition placeholders in every clause with the bounds of `shard`.
    pub fn instantiate_partition_qual(&mut self, shard: &ShardInterval, method: PartitionMethod) {
        for relation in self.relations.iter_mut() {
            for info in relation
                .base_restrictions
                .iter_mut()
                .chain(relation.join_info.iter_mut())
            {
                info.instantiate(shard, method);
            }
        }
    }
}

/// `lower <= column <= upper` for the bounds of `shard`. Hash shards
/// bound the column's hash token instead of the column itself.
pub fn shard_bounds(column: Var, shard: &ShardInterval, method: PartitionMethod) -> Vec<Expr> {
    let operand = if method == PartitionMethod::Hash {
        Expr::ShardToken(column)
    } else {
        Expr::Var(column)
    };

    let mut bounds = vec![];
    if let Some(ref min) = shard.min {
        bounds.push(Expr::op(
            Operator::GtEq,
            operand.clone(),
            Expr::Const(min.clone()),
        ));
    }
    if let Some(ref max) = shard.max {
        bounds.push(Expr::op(Operator::LtEq, operand, Expr::Const(max.clone())));
    }
    bounds
}

/// Replace every partition placeholder inside `expr` with shard bounds.
pub fn instantiate_partition_qual(expr: &mut Expr, shard: &ShardInterval, method: PartitionMethod) {
    if let Expr::PartitionPlaceholder(column) = *expr {
        *expr = Expr::and(shard_bounds(column, shard, method));
        return;
    }

    for child in expr.children_mut() {
        instantiate_partition_qual(child, shard, method);
    }
}
