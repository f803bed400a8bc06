//! Expression trees.

use serde::{Deserialize, Serialize};

use super::{AttrNumber, Datum, Query, RangeTableIndex};

/// Column reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Var {
    /// Range table entry the column belongs to (1-based).
    pub rel: RangeTableIndex,
    /// Attribute number of the column (1-based).
    pub attno: AttrNumber,
}

impl Var {
    pub fn new(rel: RangeTableIndex, attno: AttrNumber) -> Self {
        Self { rel, attno }
    }
}

/// Declared volatility of a function or operator.
///
/// Ordered from least to most permissive, so `max` of two
/// volatilities is the volatility of an expression using both.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Volatility {
    /// Same inputs always give the same result.
    #[default]
    Immutable,
    /// Result is fixed within one statement, e.g. `now()`.
    Stable,
    /// Result can change on every call, e.g. `random()`.
    Volatile,
}

impl Volatility {
    pub fn most_permissive(self, other: Volatility) -> Volatility {
        self.max(other)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Other(String),
}

impl Operator {
    /// Operator with its arguments swapped: `a < b` is `b > a`.
    pub fn commute(&self) -> Option<Operator> {
        Some(match self {
            Self::Eq => Self::Eq,
            Self::NotEq => Self::NotEq,
            Self::Lt => Self::Gt,
            Self::LtEq => Self::GtEq,
            Self::Gt => Self::Lt,
            Self::GtEq => Self::LtEq,
            Self::Other(_) => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpExpr {
    pub op: Operator,
    pub args: Vec<Expr>,
    #[serde(default)]
    pub volatility: Volatility,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncExpr {
    pub name: String,
    #[serde(default)]
    pub args: Vec<Expr>,
    #[serde(default)]
    pub volatility: Volatility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoolOp {
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoolExpr {
    pub op: BoolOp,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseWhen {
    pub condition: Expr,
    pub result: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseExpr {
    #[serde(default)]
    pub arg: Option<Box<Expr>>,
    pub when: Vec<CaseWhen>,
    #[serde(default)]
    pub default: Option<Box<Expr>>,
}

/// `left op ANY(right)` or `left op ALL(right)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarArrayOpExpr {
    pub op: Operator,
    pub use_or: bool,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
    #[serde(default)]
    pub volatility: Volatility,
}

/// Cast through the text representation of a type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoerceViaIo {
    pub arg: Box<Expr>,
    /// Volatility of the result type's input function.
    #[serde(default)]
    pub input_volatility: Volatility,
    /// Volatility of the argument type's output function.
    #[serde(default)]
    pub output_volatility: Volatility,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayCoerce {
    pub arg: Box<Expr>,
    /// Per-element cast function, if any.
    #[serde(default)]
    pub element_function: Option<Volatility>,
}

/// `(a, b) < (c, d)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowCompare {
    pub operators: Vec<Volatility>,
    pub left: Vec<Expr>,
    pub right: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NullTest {
    pub arg: Box<Expr>,
    pub is_null: bool,
}

/// Expression node.
///
/// Every variant must be classified in [`Expr::own_volatility`] and
/// [`Expr::children`]; both are exhaustive matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Var(Var),
    Const(Datum),
    /// External parameter, `$n`.
    Param(u32),
    /// `column = <value required by the target shard>`, added to the source
    /// of an INSERT ... SELECT before the target shard is known.
    PartitionPlaceholder(Var),
    /// Hash token of a distribution column.
    ShardToken(Var),
    Op(OpExpr),
    Func(FuncExpr),
    Aggregate(FuncExpr),
    WindowFunc(FuncExpr),
    Bool(BoolExpr),
    Case(CaseExpr),
    Coalesce(Vec<Expr>),
    DistinctFrom(OpExpr),
    NullIf(OpExpr),
    ScalarArrayOp(ScalarArrayOpExpr),
    Array(Vec<Expr>),
    CoerceViaIo(CoerceViaIo),
    ArrayCoerce(ArrayCoerce),
    RowCompare(RowCompare),
    NullTest(NullTest),
    SubLink(Box<Query>),
}

impl Expr {
    pub fn var(rel: RangeTableIndex, attno: AttrNumber) -> Self {
        Self::Var(Var::new(rel, attno))
    }

    pub fn constant(value: impl Into<Datum>) -> Self {
        Self::Const(value.into())
    }

    pub fn null() -> Self {
        Self::Const(Datum::Null)
    }

    pub fn op(op: Operator, left: Expr, right: Expr) -> Self {
        Self::Op(OpExpr {
            op,
            args: vec![left, right],
            volatility: Volatility::Immutable,
        })
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::op(Operator::Eq, left, right)
    }

    pub fn func(name: &str, volatility: Volatility, args: Vec<Expr>) -> Self {
        Self::Func(FuncExpr {
            name: name.to_string(),
            args,
            volatility,
        })
    }

    pub fn and(args: Vec<Expr>) -> Self {
        Self::Bool(BoolExpr {
            op: BoolOp::And,
            args,
        })
    }

    pub fn or(args: Vec<Expr>) -> Self {
        Self::Bool(BoolExpr {
            op: BoolOp::Or,
            args,
        })
    }

    pub fn as_var(&self) -> Option<&Var> {
        match self {
            Self::Var(var) => Some(var),
            _ => None,
        }
    }

    pub fn as_const(&self) -> Option<&Datum> {
        match self {
            Self::Const(datum) => Some(datum),
            _ => None,
        }
    }

    /// Constant `false` or `NULL` used as a whole clause.
    pub fn is_false_clause(&self) -> bool {
        matches!(self, Self::Const(Datum::Bool(false)) | Self::Const(Datum::Null))
    }

    /// AND `other` into this expression, flattening nested ANDs.
    pub fn and_with(self, other: Expr) -> Expr {
        let mut args = self.into_conjuncts();
        args.extend(other.into_conjuncts());
        Expr::and(args)
    }

    /// Split a top-level AND into its arguments.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Self::Bool(BoolExpr {
                op: BoolOp::And,
                args,
            }) => args.iter().flat_map(|arg| arg.conjuncts()).collect(),
            expr => vec![expr],
        }
    }

    pub fn into_conjuncts(self) -> Vec<Expr> {
        match self {
            Self::Bool(BoolExpr {
                op: BoolOp::And,
                args,
            }) => args
                .into_iter()
                .flat_map(|arg| arg.into_conjuncts())
                .collect(),
            expr => vec![expr],
        }
    }

    /// Volatility of the function this node calls itself, not counting
    /// its arguments. `None` for nodes that call no function.
    pub fn own_volatility(&self) -> Option<Volatility> {
        match self {
            Self::Op(expr) | Self::DistinctFrom(expr) | Self::NullIf(expr) => {
                Some(expr.volatility)
            }
            Self::Func(expr) | Self::Aggregate(expr) | Self::WindowFunc(expr) => {
                Some(expr.volatility)
            }
            Self::ScalarArrayOp(expr) => Some(expr.volatility),
            Self::CoerceViaIo(expr) => Some(
                expr.input_volatility
                    .most_permissive(expr.output_volatility),
            ),
            Self::ArrayCoerce(expr) => expr.element_function,
            Self::RowCompare(expr) => expr
                .operators
                .iter()
                .copied()
                .reduce(Volatility::most_permissive),
            Self::Var(_)
            | Self::Const(_)
            | Self::Param(_)
            | Self::PartitionPlaceholder(_)
            | Self::ShardToken(_)
            | Self::Bool(_)
            | Self::Case(_)
            | Self::Coalesce(_)
            | Self::Array(_)
            | Self::NullTest(_)
            | Self::SubLink(_) => None,
        }
    }

    /// Direct sub-expressions. Subqueries are not expressions
    /// and are reached through [`Query::child_queries`].
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Self::Var(_)
            | Self::Const(_)
            | Self::Param(_)
            | Self::PartitionPlaceholder(_)
            | Self::ShardToken(_)
            | Self::SubLink(_) => vec![],
            Self::Op(expr) | Self::DistinctFrom(expr) | Self::NullIf(expr) => {
                expr.args.iter().collect()
            }
            Self::Func(expr) | Self::Aggregate(expr) | Self::WindowFunc(expr) => {
                expr.args.iter().collect()
            }
            Self::Bool(expr) => expr.args.iter().collect(),
            Self::Case(expr) => {
                let mut children = vec![];
                if let Some(ref arg) = expr.arg {
                    children.push(arg.as_ref());
                }
                for when in &expr.when {
                    children.push(&when.condition);
                    children.push(&when.result);
                }
                if let Some(ref default) = expr.default {
                    children.push(default.as_ref());
                }
                children
            }
            Self::Coalesce(args) | Self::Array(args) => args.iter().collect(),
            Self::ScalarArrayOp(expr) => vec![expr.left.as_ref(), expr.right.as_ref()],
            Self::CoerceViaIo(expr) => vec![expr.arg.as_ref()],
            Self::ArrayCoerce(expr) => vec![expr.arg.as_ref()],
            Self::RowCompare(expr) => expr.left.iter().chain(expr.right.iter()).collect(),
            Self::NullTest(expr) => vec![expr.arg.as_ref()],
        }
    }

    /// Mutable direct sub-expressions, same order as [`Expr::children`].
    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Self::Var(_)
            | Self::Const(_)
            | Self::Param(_)
            | Self::PartitionPlaceholder(_)
            | Self::ShardToken(_)
            | Self::SubLink(_) => vec![],
            Self::Op(expr) | Self::DistinctFrom(expr) | Self::NullIf(expr) => {
                expr.args.iter_mut().collect()
            }
            Self::Func(expr) | Self::Aggregate(expr) | Self::WindowFunc(expr) => {
                expr.args.iter_mut().collect()
            }
            Self::Bool(expr) => expr.args.iter_mut().collect(),
            Self::Case(expr) => {
                let mut children = vec![];
                if let Some(ref mut arg) = expr.arg {
                    children.push(arg.as_mut());
                }
                for when in expr.when.iter_mut() {
                    children.push(&mut when.condition);
                    children.push(&mut when.result);
                }
                if let Some(ref mut default) = expr.default {
                    children.push(default.as_mut());
                }
                children
            }
            Self::Coalesce(args) | Self::Array(args) => args.iter_mut().collect(),
            Self::ScalarArrayOp(expr) => vec![expr.left.as_mut(), expr.right.as_mut()],
            Self::CoerceViaIo(expr) => vec![expr.arg.as_mut()],
            Self::ArrayCoerce(expr) => vec![expr.arg.as_mut()],
            Self::RowCompare(expr) => expr
                .left
                .iter_mut()
                .chain(expr.right.iter_mut())
                .collect(),
            Self::NullTest(expr) => vec![expr.arg.as_mut()],
        }
    }

    /// Does this expression, or any subquery it contains, call a function
    /// at least as volatile as `volatility`.
    pub fn contains_volatility(&self, volatility: Volatility) -> bool {
        if self
            .own_volatility()
            .map(|own| own >= volatility)
            .unwrap_or(false)
        {
            return true;
        }

        if let Self::SubLink(query) = self {
            return query.contains_volatility(volatility);
        }

        self.children()
            .into_iter()
            .any(|child| child.contains_volatility(volatility))
    }

    pub fn contains_volatile_functions(&self) -> bool {
        self.contains_volatility(Volatility::Volatile)
    }

    /// Contains STABLE or VOLATILE functions.
    pub fn contains_mutable_functions(&self) -> bool {
        self.contains_volatility(Volatility::Stable)
    }

    pub fn contains_sublink(&self) -> bool {
        matches!(self, Self::SubLink(_))
            || self
                .children()
                .into_iter()
                .any(|child| child.contains_sublink())
    }

    /// All column references, in tree order.
    pub fn pull_vars(&self) -> Vec<Var> {
        let mut vars = vec![];
        self.collect_vars(&mut vars);
        vars
    }

    fn collect_vars(&self, vars: &mut Vec<Var>) {
        match self {
            Self::Var(var) => vars.push(*var),
            expr => expr
                .children()
                .into_iter()
                .for_each(|child| child.collect_vars(vars)),
        }
    }
}

impl From<Var> for Expr {
    fn from(value: Var) -> Self {
        Self::Var(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_conjuncts_flatten() {
        let expr = Expr::and(vec![
            Expr::eq(Expr::var(1, 1), Expr::constant(5)),
            Expr::and(vec![
                Expr::eq(Expr::var(1, 2), Expr::constant("a")),
                Expr::constant(true),
            ]),
        ]);
        assert_eq!(expr.conjuncts().len(), 3);

        let combined = expr.and_with(Expr::eq(Expr::var(1, 3), Expr::constant(1)));
        assert_eq!(combined.into_conjuncts().len(), 4);
    }

    #[test]
    fn test_contains_volatility() {
        let now = Expr::func("now", Volatility::Stable, vec![]);
        let random = Expr::func("random", Volatility::Volatile, vec![]);
        let expr = Expr::op(
            Operator::Lt,
            Expr::var(1, 2),
            Expr::Coalesce(vec![now.clone(), Expr::null()]),
        );

        assert!(expr.contains_mutable_functions());
        assert!(!expr.contains_volatile_functions());
        assert!(Expr::NullTest(NullTest {
            arg: Box::new(random),
            is_null: true
        })
        .contains_volatile_functions());
    }

    #[test]
    fn test_row_compare_volatility() {
        let expr = Expr::RowCompare(RowCompare {
            operators: vec![Volatility::Immutable, Volatility::Stable],
            left: vec![Expr::var(1, 1), Expr::var(1, 2)],
            right: vec![Expr::constant(1), Expr::constant(2)],
        });
        assert_eq!(expr.own_volatility(), Some(Volatility::Stable));
        assert_eq!(expr.pull_vars(), vec![Var::new(1, 1), Var::new(1, 2)]);
    }
}
