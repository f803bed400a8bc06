//! Boundary predicate pruning.
//!
//! A shard is dropped only when the restrictions provably can't hold for
//! any row inside its bounds. Anything the pruner doesn't understand keeps
//! the shard.

use std::cmp::Ordering;

use tracing::trace;

use super::{equivalence::derive_equalities, hasher::token};
use crate::catalog::{DistributedTable, PartitionMethod, ShardInterval};
use crate::query::{
    BoolOp, Datum, Expr, OpExpr, Operator, RangeTableIndex, ScalarArrayOpExpr, Var,
};

/// Shards of `table`, referenced as range table entry `rel`, that could
/// contain rows matching all of `restrictions`. Order is preserved.
pub fn prune_shard_list(
    table: &DistributedTable,
    rel: RangeTableIndex,
    restrictions: &[&Expr],
    shards: &[ShardInterval],
) -> Vec<ShardInterval> {
    if table.method == PartitionMethod::Reference {
        return shards.to_vec();
    }

    let Some(column) = table.partition_var(rel) else {
        return shards.to_vec();
    };

    let derived = derive_equalities(restrictions);
    let clauses = restrictions
        .iter()
        .copied()
        .chain(derived.iter())
        .collect::<Vec<_>>();

    let pruner = Pruner { table, column };

    shards
        .iter()
        .filter(|shard| {
            let refuted = clauses.iter().any(|clause| pruner.refutes(clause, shard));
            if refuted {
                trace!("shard {} of \"{}\" pruned", shard.shard_id, table.name);
            }
            !refuted
        })
        .cloned()
        .collect()
}

struct Pruner<'a> {
    table: &'a DistributedTable,
    column: Var,
}

impl Pruner<'_> {
    /// No row of `shard` can satisfy `clause`.
    fn refutes(&self, clause: &Expr, shard: &ShardInterval) -> bool {
        match clause {
            expr if expr.is_false_clause() => true,

            Expr::Bool(bool_expr) => match bool_expr.op {
                BoolOp::And => bool_expr.args.iter().any(|arg| self.refutes(arg, shard)),
                BoolOp::Or => bool_expr.args.iter().all(|arg| self.refutes(arg, shard)),
                BoolOp::Not => false,
            },

            Expr::Op(op) => self.refutes_op(op, shard),

            Expr::ScalarArrayOp(op) => self.refutes_array_op(op, shard),

            _ => false,
        }
    }

    fn refutes_op(&self, op: &OpExpr, shard: &ShardInterval) -> bool {
        let [left, right] = op.args.as_slice() else {
            return false;
        };

        let (operand, op, value) = match (left, right) {
            (operand, Expr::Const(value)) => (operand, op.op.clone(), value),
            (Expr::Const(value), operand) => match op.op.commute() {
                Some(commuted) => (operand, commuted, value),
                None => return false,
            },
            _ => return false,
        };

        self.refutes_comparison(operand, &op, value, shard)
    }

    fn refutes_comparison(
        &self,
        operand: &Expr,
        op: &Operator,
        value: &Datum,
        shard: &ShardInterval,
    ) -> bool {
        let column = match operand {
            Expr::Var(var) if var == &self.column => true,
            Expr::ShardToken(var) if var == &self.column => false,
            _ => return false,
        };

        // Comparison operators are strict: NULL never matches.
        if value.is_null() && !matches!(op, Operator::Other(_)) {
            return true;
        }

        match (self.table.method, column) {
            (PartitionMethod::Hash, true) => {
                // Hashing destroys order, only equality can be checked.
                if *op != Operator::Eq {
                    return false;
                }
                match token(self.table.hasher, value) {
                    Some(token) => refutes_interval(
                        op,
                        &Datum::Integer(token as i64),
                        shard.min.as_ref(),
                        shard.max.as_ref(),
                    ),
                    None => false,
                }
            }

            (PartitionMethod::Hash, false) => {
                refutes_interval(op, value, shard.min.as_ref(), shard.max.as_ref())
            }

            (PartitionMethod::Range | PartitionMethod::Append, true) => {
                refutes_interval(op, value, shard.min.as_ref(), shard.max.as_ref())
            }

            _ => false,
        }
    }

    /// `column = ANY(ARRAY[...])` is refuted when every element is,
    /// `column op ALL(...)` when any element is.
    fn refutes_array_op(&self, op: &ScalarArrayOpExpr, shard: &ShardInterval) -> bool {
        let Expr::Array(elements) = op.right.as_ref() else {
            return false;
        };

        let mut refuted = elements.iter().map(|element| match element {
            Expr::Const(value) => self.refutes_comparison(&op.left, &op.op, value, shard),
            _ => false,
        });

        if op.use_or {
            refuted.all(|refuted| refuted)
        } else {
            refuted.any(|refuted| refuted)
        }
    }
}

/// No value `x` in `[min, max]` satisfies `x op value`. Missing bounds are open.
fn refutes_interval(
    op: &Operator,
    value: &Datum,
    min: Option<&Datum>,
    max: Option<&Datum>,
) -> bool {
    let vs_min = min.and_then(|min| value.compare(min));
    let vs_max = max.and_then(|max| value.compare(max));

    match op {
        // value < min or value > max
        Operator::Eq => vs_min == Some(Ordering::Less) || vs_max == Some(Ordering::Greater),
        // x < value: min >= value
        Operator::Lt => matches!(vs_min, Some(Ordering::Less | Ordering::Equal)),
        // x <= value: min > value
        Operator::LtEq => vs_min == Some(Ordering::Less),
        // x > value: max <= value
        Operator::Gt => matches!(vs_max, Some(Ordering::Greater | Ordering::Equal)),
        // x >= value: max < value
        Operator::GtEq => vs_max == Some(Ordering::Greater),
        // only a single-value interval equal to value
        Operator::NotEq => vs_min == Some(Ordering::Equal) && vs_max == Some(Ordering::Equal),
        Operator::Other(_) => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::catalog::{shard::uniform_hash_bounds, ShardId};
    use crate::query::{ScalarArrayOpExpr, Volatility};

    fn hash_table() -> DistributedTable {
        let shards = uniform_hash_bounds(4)
            .into_iter()
            .enumerate()
            .map(|(i, (min, max))| ShardInterval::hash(ShardId(i as u64 + 1), 1, min, max))
            .collect();
        DistributedTable::new(1, "t", PartitionMethod::Hash, Some(1), shards)
    }

    fn range_table() -> DistributedTable {
        let shards = [(0, 99), (100, 199), (200, 299)]
            .into_iter()
            .enumerate()
            .map(|(i, (min, max))| ShardInterval {
                shard_id: ShardId(i as u64 + 10),
                relation_id: 2,
                min: Some(Datum::Integer(min)),
                max: Some(Datum::Integer(max)),
            })
            .collect();
        DistributedTable::new(2, "r", PartitionMethod::Range, Some(1), shards)
    }

    fn ids(shards: &[ShardInterval]) -> Vec<u64> {
        shards.iter().map(|shard| shard.shard_id.0).collect()
    }

    fn prune(table: &DistributedTable, clauses: &[Expr]) -> Vec<u64> {
        let clauses = clauses.iter().collect::<Vec<_>>();
        ids(&prune_shard_list(table, 1, &clauses, &table.shards))
    }

    #[test]
    fn test_hash_equality() {
        let table = hash_table();
        // hash(5) = -1330264708, first quarter of the token space.
        assert_eq!(
            prune(&table, &[Expr::eq(Expr::var(1, 1), Expr::constant(5))]),
            vec![1]
        );
        // Constant on the left.
        assert_eq!(
            prune(&table, &[Expr::eq(Expr::constant(5), Expr::var(1, 1))]),
            vec![1]
        );
        // Ranges over hashed values can't be pruned.
        assert_eq!(
            prune(
                &table,
                &[Expr::op(Operator::Lt, Expr::var(1, 1), Expr::constant(5))]
            ),
            vec![1, 2, 3, 4]
        );
        // Other columns don't matter.
        assert_eq!(
            prune(&table, &[Expr::eq(Expr::var(1, 2), Expr::constant(5))]),
            vec![1, 2, 3, 4]
        );
    }

    #[test]
    fn test_contradictions() {
        let table = hash_table();
        assert!(prune(&table, &[Expr::constant(false)]).is_empty());
        assert!(prune(&table, &[Expr::eq(Expr::var(1, 1), Expr::null())]).is_empty());
        // hash(1) and hash(2) live in different shards.
        assert!(prune(
            &table,
            &[
                Expr::eq(Expr::var(1, 1), Expr::constant(1)),
                Expr::eq(Expr::var(1, 1), Expr::constant(2)),
            ]
        )
        .is_empty());
    }

    #[test]
    fn test_or_and_any() {
        let table = hash_table();
        // hash(1) = -1905060026 (shard 1), hash(2) = 1134484726 (shard 4).
        let or = Expr::or(vec![
            Expr::eq(Expr::var(1, 1), Expr::constant(1)),
            Expr::eq(Expr::var(1, 1), Expr::constant(2)),
        ]);
        assert_eq!(prune(&table, &[or]), vec![1, 4]);

        let any = Expr::ScalarArrayOp(ScalarArrayOpExpr {
            op: Operator::Eq,
            use_or: true,
            left: Box::new(Expr::var(1, 1)),
            right: Box::new(Expr::Array(vec![Expr::constant(1), Expr::constant(2)])),
            volatility: Volatility::Immutable,
        });
        assert_eq!(prune(&table, &[any]), vec![1, 4]);

        let param = Expr::or(vec![
            Expr::eq(Expr::var(1, 1), Expr::constant(1)),
            Expr::eq(Expr::var(1, 1), Expr::Param(1)),
        ]);
        assert_eq!(prune(&table, &[param]), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_token_bounds() {
        let table = hash_table();
        let clauses = [
            Expr::op(
                Operator::GtEq,
                Expr::ShardToken(Var::new(1, 1)),
                Expr::constant(0),
            ),
            Expr::op(
                Operator::LtEq,
                Expr::ShardToken(Var::new(1, 1)),
                Expr::constant(1073741823),
            ),
        ];
        assert_eq!(prune(&table, &clauses), vec![3]);
    }

    #[test]
    fn test_range() {
        let table = range_table();
        assert_eq!(
            prune(&table, &[Expr::eq(Expr::var(1, 1), Expr::constant(150))]),
            vec![11]
        );
        assert_eq!(
            prune(
                &table,
                &[Expr::op(Operator::GtEq, Expr::var(1, 1), Expr::constant(100))]
            ),
            vec![11, 12]
        );
        assert_eq!(
            prune(
                &table,
                &[Expr::op(Operator::Lt, Expr::var(1, 1), Expr::constant(100))]
            ),
            vec![10]
        );
        assert!(prune(&table, &[Expr::eq(Expr::var(1, 1), Expr::constant(500))]).is_empty());
        // Wrong type: can't tell, keep everything.
        assert_eq!(
            prune(&table, &[Expr::eq(Expr::var(1, 1), Expr::constant("a"))]),
            vec![10, 11, 12]
        );
    }

    #[test]
    fn test_derived_equality() {
        let table = hash_table();
        // t.id = t.other AND t.other = 5
        let clauses = [
            Expr::eq(Expr::var(1, 1), Expr::var(1, 3)),
            Expr::eq(Expr::var(1, 3), Expr::constant(5)),
        ];
        assert_eq!(prune(&table, &clauses), vec![1]);
    }

    #[test]
    fn test_reference_table() {
        let table = DistributedTable::new(
            3,
            "ref",
            PartitionMethod::Reference,
            None,
            vec![ShardInterval {
                shard_id: ShardId(99),
                relation_id: 3,
                min: None,
                max: None,
            }],
        );
        assert_eq!(prune(&table, &[Expr::constant(false)]), vec![99]);
    }
}
