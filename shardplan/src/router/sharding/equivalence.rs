//! Equalities implied by `a = b AND b = <const>`.

use std::collections::{BTreeMap, BTreeSet};

use crate::query::{BoolExpr, BoolOp, Datum, Expr, OpExpr, Operator, Var};

#[derive(Default)]
struct Classes {
    parent: BTreeMap<Var, Var>,
}

impl Classes {
    fn find(&mut self, var: Var) -> Var {
        let parent = *self.parent.entry(var).or_insert(var);
        if parent == var {
            return var;
        }
        let root = self.find(parent);
        self.parent.insert(var, root);
        root
    }

    fn union(&mut self, left: Var, right: Var) {
        let left = self.find(left);
        let right = self.find(right);
        if left != right {
            self.parent.insert(left.max(right), left.min(right));
        }
    }
}

/// `column = constant` conditions that follow from column-to-column
/// equalities among the top-level conjuncts, excluding ones already present.
pub fn derive_equalities(clauses: &[&Expr]) -> Vec<Expr> {
    let mut classes = Classes::default();
    let mut constants: Vec<(Var, &Datum)> = vec![];

    let conjuncts = clauses
        .iter()
        .flat_map(|clause| clause.conjuncts())
        .collect::<Vec<_>>();

    for conjunct in &conjuncts {
        let Expr::Op(OpExpr {
            op: Operator::Eq,
            args,
            ..
        }) = conjunct
        else {
            continue;
        };

        match args.as_slice() {
            [Expr::Var(left), Expr::Var(right)] => classes.union(*left, *right),
            [Expr::Var(var), Expr::Const(value)] | [Expr::Const(value), Expr::Var(var)]
                if !value.is_null() =>
            {
                constants.push((*var, value))
            }
            _ => (),
        }
    }

    if constants.is_empty() {
        return vec![];
    }

    let existing = constants
        .iter()
        .map(|(var, value)| (*var, (*value).clone()))
        .collect::<BTreeSet<_>>();

    let vars = classes.parent.keys().copied().collect::<Vec<_>>();
    let mut members: BTreeMap<Var, Vec<Var>> = BTreeMap::new();
    for var in vars {
        let root = classes.find(var);
        members.entry(root).or_default().push(var);
    }

    let mut derived = vec![];
    let mut seen = BTreeSet::new();
    for (var, value) in constants {
        let root = classes.find(var);
        let Some(members) = members.get(&root) else {
            continue;
        };
        for member in members {
            let key = (*member, value.clone());
            if existing.contains(&key) || !seen.insert(key) {
                continue;
            }
            derived.push(Expr::eq(Expr::Var(*member), Expr::Const(value.clone())));
        }
    }

    derived
}

/// Columns equal to `var` through `a = b` conjuncts, including `var` itself.
pub fn equivalent_vars(clauses: &[&Expr], var: Var) -> Vec<Var> {
    let mut classes = Classes::default();
    classes.find(var);

    for conjunct in clauses.iter().flat_map(|clause| clause.conjuncts()) {
        if let Expr::Op(OpExpr {
            op: Operator::Eq,
            args,
            ..
        }) = conjunct
        {
            if let [Expr::Var(left), Expr::Var(right)] = args.as_slice() {
                classes.union(*left, *right);
            }
        }
    }

    let root = classes.find(var);
    let vars = classes.parent.keys().copied().collect::<Vec<_>>();
    vars.into_iter()
        .filter(|member| classes.find(*member) == root)
        .collect()
}

/// AND together a list of conditions.
pub fn make_ands(mut clauses: Vec<Expr>) -> Option<Expr> {
    match clauses.len() {
        0 => None,
        1 => clauses.pop(),
        _ => Some(Expr::Bool(BoolExpr {
            op: BoolOp::And,
            args: clauses,
        })),
    }
}
