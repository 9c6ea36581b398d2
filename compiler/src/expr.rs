// expr.rs — Expression trees for instruction sides and substitution bodies.
//
// A closed sum type with one variant per node kind. Structural equality and
// hashing are derived, so two trees compare equal exactly when they print
// the same; the CSE memo relies on this.
//
// Traversal: `try_map_children` rebuilds a node from transformed children
// (identity-mapper style); `walk` visits nodes pre-order.

use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::dtype::ElementType;

// ── Literals ────────────────────────────────────────────────────────────────

/// Float literal compared and hashed by bit pattern.
#[derive(Debug, Clone, Copy)]
pub struct FloatLit(pub f64);

impl PartialEq for FloatLit {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatLit {}

impl Hash for FloatLit {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

// ── Operators ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Rem,
    Pow,
}

impl BinOp {
    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => " + ",
            BinOp::Sub => " - ",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Rem => "%",
            BinOp::Pow => "**",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinOp::Add | BinOp::Sub => PREC_SUM,
            BinOp::Mul | BinOp::Div | BinOp::FloorDiv | BinOp::Rem => PREC_PRODUCT,
            BinOp::Pow => PREC_POWER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReductionOp {
    Sum,
    Product,
    Max,
    Min,
}

impl ReductionOp {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sum" => Some(ReductionOp::Sum),
            "product" => Some(ReductionOp::Product),
            "max" => Some(ReductionOp::Max),
            "min" => Some(ReductionOp::Min),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ReductionOp::Sum => "sum",
            ReductionOp::Product => "product",
            ReductionOp::Max => "max",
            ReductionOp::Min => "min",
        }
    }
}

// ── Expression ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Int(i64),
    Float(FloatLit),
    Variable(String),
    Subscript {
        aggregate: Box<Expr>,
        index: Vec<Expr>,
    },
    Call {
        function: Box<Expr>,
        parameters: Vec<Expr>,
    },
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Aggregation of `expr` over `inames`.
    Reduction {
        op: ReductionOp,
        inames: Vec<String>,
        expr: Box<Expr>,
    },
    /// Sub-tree tagged for hoisting into its own temporary.
    CommonSubexpression {
        child: Box<Expr>,
        prefix: Option<String>,
        dtype: Option<ElementType>,
    },
    /// Only produced by the parser; legal solely as a reduction iname list.
    Tuple(Vec<Expr>),
}

const PREC_SUM: u8 = 1;
const PREC_PRODUCT: u8 = 2;
const PREC_UNARY: u8 = 3;
const PREC_POWER: u8 = 4;
const PREC_ATOM: u8 = 5;

impl Expr {
    pub fn var(name: impl Into<String>) -> Expr {
        Expr::Variable(name.into())
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn subscript(aggregate: Expr, index: Vec<Expr>) -> Expr {
        Expr::Subscript {
            aggregate: Box::new(aggregate),
            index,
        }
    }

    pub fn as_variable(&self) -> Option<&str> {
        match self {
            Expr::Variable(name) => Some(name),
            _ => None,
        }
    }

    /// Direct children, left to right.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Int(_) | Expr::Float(_) | Expr::Variable(_) => Vec::new(),
            Expr::Subscript { aggregate, index } => {
                std::iter::once(aggregate.as_ref()).chain(index).collect()
            }
            Expr::Call {
                function,
                parameters,
            } => std::iter::once(function.as_ref()).chain(parameters).collect(),
            Expr::Neg(inner) => vec![inner.as_ref()],
            Expr::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::Reduction { expr, .. } => vec![expr.as_ref()],
            Expr::CommonSubexpression { child, .. } => vec![child.as_ref()],
            Expr::Tuple(items) => items.iter().collect(),
        }
    }

    /// Rebuild this node with every direct child replaced by `f(child)`.
    pub fn try_map_children<E, F>(&self, mut f: F) -> Result<Expr, E>
    where
        F: FnMut(&Expr) -> Result<Expr, E>,
    {
        fn map_all<E, F>(items: &[Expr], f: &mut F) -> Result<Vec<Expr>, E>
        where
            F: FnMut(&Expr) -> Result<Expr, E>,
        {
            items.iter().map(f).collect()
        }

        Ok(match self {
            Expr::Int(_) | Expr::Float(_) | Expr::Variable(_) => self.clone(),
            Expr::Subscript { aggregate, index } => Expr::Subscript {
                aggregate: Box::new(f(aggregate)?),
                index: map_all(index, &mut f)?,
            },
            Expr::Call {
                function,
                parameters,
            } => Expr::Call {
                function: Box::new(f(function)?),
                parameters: map_all(parameters, &mut f)?,
            },
            Expr::Neg(inner) => Expr::Neg(Box::new(f(inner)?)),
            Expr::Binary { op, left, right } => Expr::Binary {
                op: *op,
                left: Box::new(f(left)?),
                right: Box::new(f(right)?),
            },
            Expr::Reduction { op, inames, expr } => Expr::Reduction {
                op: *op,
                inames: inames.clone(),
                expr: Box::new(f(expr)?),
            },
            Expr::CommonSubexpression {
                child,
                prefix,
                dtype,
            } => Expr::CommonSubexpression {
                child: Box::new(f(child)?),
                prefix: prefix.clone(),
                dtype: *dtype,
            },
            Expr::Tuple(items) => Expr::Tuple(map_all(items, &mut f)?),
        })
    }

    pub fn map_children<F>(&self, mut f: F) -> Expr
    where
        F: FnMut(&Expr) -> Expr,
    {
        match self.try_map_children(|child| Ok::<_, Infallible>(f(child))) {
            Ok(expr) => expr,
            Err(never) => match never {},
        }
    }

    /// Pre-order traversal.
    pub fn walk<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(&'a Expr),
    {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }

    /// Replace every variable for which `f` returns a value.
    pub fn substitute<F>(&self, f: &F) -> Expr
    where
        F: Fn(&str) -> Option<Expr>,
    {
        match self {
            Expr::Variable(name) => f(name).unwrap_or_else(|| self.clone()),
            _ => self.map_children(|child| child.substitute(f)),
        }
    }

    /// Names of all variables read by this expression (call targets excluded).
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut deps = BTreeSet::new();
        collect_dependencies(self, &mut deps);
        deps
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Int(n) if *n < 0 => PREC_UNARY,
            Expr::Float(x) if x.0.is_sign_negative() => PREC_UNARY,
            Expr::Neg(_) => PREC_UNARY,
            Expr::Binary { op, .. } => op.precedence(),
            _ => PREC_ATOM,
        }
    }
}

fn collect_dependencies(expr: &Expr, deps: &mut BTreeSet<String>) {
    match expr {
        Expr::Variable(name) => {
            deps.insert(name.clone());
        }
        Expr::Call { parameters, .. } => {
            for p in parameters {
                collect_dependencies(p, deps);
            }
        }
        _ => {
            for child in expr.children() {
                collect_dependencies(child, deps);
            }
        }
    }
}

// ── Display ─────────────────────────────────────────────────────────────────

struct Parenthesized<'a>(&'a Expr, bool);

impl fmt::Display for Parenthesized<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.1 {
            write!(f, "({})", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Int(n) => write!(f, "{}", n),
            Expr::Float(x) => write!(f, "{:?}", x.0),
            Expr::Variable(name) => f.write_str(name),
            Expr::Subscript { aggregate, index } => {
                let paren = aggregate.precedence() < PREC_ATOM;
                write!(f, "{}[", Parenthesized(aggregate, paren))?;
                write_list(f, index)?;
                f.write_str("]")
            }
            Expr::Call {
                function,
                parameters,
            } => {
                let paren = function.precedence() < PREC_ATOM;
                write!(f, "{}(", Parenthesized(function, paren))?;
                write_list(f, parameters)?;
                f.write_str(")")
            }
            Expr::Neg(inner) => {
                write!(f, "-{}", Parenthesized(inner, inner.precedence() < PREC_UNARY))
            }
            Expr::Binary { op, left, right } => {
                let prec = op.precedence();
                let (paren_left, paren_right) = if *op == BinOp::Pow {
                    (left.precedence() < PREC_ATOM, right.precedence() < PREC_ATOM)
                } else {
                    (left.precedence() < prec, right.precedence() <= prec)
                };
                write!(
                    f,
                    "{}{}{}",
                    Parenthesized(left, paren_left),
                    op.symbol(),
                    Parenthesized(right, paren_right)
                )
            }
            Expr::Reduction { op, inames, expr } => {
                write!(f, "{}(", op.name())?;
                if inames.len() == 1 {
                    f.write_str(&inames[0])?;
                } else {
                    write!(f, "({})", inames.join(", "))?;
                }
                write!(f, ", {})", expr)
            }
            Expr::CommonSubexpression {
                child,
                prefix,
                dtype,
            } => {
                write!(f, "cse({}", child)?;
                match (prefix, dtype) {
                    (None, None) => {}
                    (Some(p), None) => write!(f, ", {}", p)?,
                    (p, Some(ty)) => write!(f, ", {}, {}", p.as_deref().unwrap_or("var"), ty)?,
                }
                f.write_str(")")
            }
            Expr::Tuple(items) => {
                f.write_str("(")?;
                write_list(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
        }
    }
}

// ── Serde: expressions travel as their source text ─────────────────────────

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Expr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        crate::parser::parse_expr(&text).map_err(serde::de::Error::custom)
    }
}
