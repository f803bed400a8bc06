//! Does an assignment change the distribution column.

use crate::query::{Datum, Expr, OpExpr, Operator, TargetEntry, Var};

/// Assignment `entry` changes the value of `column` in the rows it
/// updates. Setting the column to itself, or to the constant the
/// WHERE clause already requires it to equal, doesn't.
pub fn target_entry_changes_value(
    entry: &TargetEntry,
    column: &Var,
    where_clause: &[&Expr],
) -> bool {
    if entry.resno != column.attno {
        return false;
    }

    match entry.expr {
        Expr::Var(ref value) => value.attno != column.attno,
        Expr::Const(ref value) => !implied_equality(column, value, where_clause),
        _ => true,
    }
}

/// `column = value` is one of the conjuncts.
fn implied_equality(column: &Var, value: &Datum, where_clause: &[&Expr]) -> bool {
    if value.is_null() {
        return false;
    }

    where_clause
        .iter()
        .flat_map(|clause| clause.conjuncts())
        .any(|clause| match clause {
            Expr::Op(OpExpr {
                op: Operator::Eq,
                args,
                ..
            }) => matches!(
                args.as_slice(),
                [Expr::Var(var), Expr::Const(constant)] | [Expr::Const(constant), Expr::Var(var)]
                    if var.attno == column.attno && constant == value
            ),
            _ => false,
        })
}

#[cfg(test)]
mod test {
    use super::*;

    fn column() -> Var {
        Var::new(1, 1)
    }

    #[test]
    fn test_other_column() {
        let entry = TargetEntry::new(2, Expr::constant("y"));
        assert!(!target_entry_changes_value(&entry, &column(), &[]));
    }

    #[test]
    fn test_self_assignment() {
        let entry = TargetEntry::new(1, Expr::var(1, 1));
        assert!(!target_entry_changes_value(&entry, &column(), &[]));

        let entry = TargetEntry::new(1, Expr::var(1, 2));
        assert!(target_entry_changes_value(&entry, &column(), &[]));
    }

    #[test]
    fn test_constant_implied_by_filter() {
        let filter = Expr::and(vec![
            Expr::eq(Expr::var(1, 2), Expr::constant("x")),
            Expr::eq(Expr::constant(5), Expr::var(1, 1)),
        ]);

        let entry = TargetEntry::new(1, Expr::constant(5));
        assert!(!target_entry_changes_value(&entry, &column(), &[&filter]));

        let entry = TargetEntry::new(1, Expr::constant(6));
        assert!(target_entry_changes_value(&entry, &column(), &[&filter]));

        let entry = TargetEntry::new(1, Expr::constant(5));
        assert!(target_entry_changes_value(&entry, &column(), &[]));
    }

    #[test]
    fn test_expression() {
        // SET id = id + 1
        let entry = TargetEntry::new(
            1,
            Expr::op(Operator::Other("+".into()), Expr::var(1, 1), Expr::constant(1)),
        );
        let filter = Expr::eq(Expr::var(1, 1), Expr::constant(5));
        assert!(target_entry_changes_value(&entry, &column(), &[&filter]));
    }
}
