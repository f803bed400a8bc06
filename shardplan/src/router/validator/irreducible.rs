//! Expressions replicas can't evaluate independently.
//!
//! Each placement of a shard runs the same statement text, so anything
//! the replicas could evaluate differently has to be rejected or
//! evaluated once by the coordinator.

use crate::query::{Expr, Volatility};

/// Findings accumulated over one or more expressions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Irreducible {
    /// A STABLE function is called with a column reference.
    pub var_argument: bool,
    /// CASE or COALESCE contains a non-immutable function.
    pub bad_coalesce: bool,
}

#[derive(Default)]
struct WalkerState {
    contains_var: bool,
    var_argument: bool,
    bad_coalesce: bool,
}

impl Irreducible {
    /// Walk `expr`, recording what can't be evaluated on each replica.
    /// Returns `true` if the coordinator can't reduce the expression
    /// to a constant.
    ///
    /// VOLATILE functions are expected to be rejected before this is called.
    pub fn check(&mut self, expr: &Expr) -> bool {
        let mut state = WalkerState::default();
        let irreducible = walk(expr, &mut state);

        self.var_argument |= state.var_argument;
        self.bad_coalesce |= state.bad_coalesce;

        irreducible
    }

    pub fn any(&self) -> bool {
        self.var_argument || self.bad_coalesce
    }
}

fn walk(expr: &Expr, state: &mut WalkerState) -> bool {
    match expr {
        // Branches are evaluated conditionally, so any non-immutable
        // function inside disqualifies the whole construct.
        Expr::Case(_) | Expr::Coalesce(_) => {
            let mutable = expr.contains_mutable_functions();
            state.bad_coalesce |= mutable;
            mutable
        }

        Expr::Var(_) | Expr::ShardToken(_) => {
            state.contains_var = true;
            false
        }

        expr if expr.own_volatility() >= Some(Volatility::Stable) => {
            let mut child = WalkerState::default();
            let disallowed = walk_children(expr, &mut child);

            if child.contains_var {
                state.var_argument = true;
            }
            state.bad_coalesce |= child.bad_coalesce;
            state.var_argument |= child.var_argument;

            disallowed || child.contains_var
        }

        expr => walk_children(expr, state),
    }
}

fn walk_children(expr: &Expr, state: &mut WalkerState) -> bool {
    expr.children().into_iter().any(|child| walk(child, state))
}
