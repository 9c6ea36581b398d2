// polyset.rs — Basic integer sets over named dimensions
//
// A `BasicSet` is a conjunction of affine equalities and inequalities over
// named dimensions and symbolic parameters. Sets are created inside a
// `SetContext`; sets from different contexts never mix.
//
// Bound extraction projects out every other dimension (Fourier–Motzkin with
// integer tightening) and reads off the per-dimension lower bound and
// extent as affine expressions in the parameters.
//
// Preconditions: constraints only mention dimensions or parameters of the set.
// Postconditions: `dim_bounds` returns bounds free of other dimensions.
// Failure modes: unbounded, empty, or ambiguously-bounded dimensions, and
//   coefficients that overflow `i64`, produce an error message.
// Side effects: parsing bumps the owning context's set counter.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::diag::{codes, Diagnostic, Result};
use crate::expr::{BinOp, Expr};
use crate::parser::{parse_set_syntax, CmpOp};

// ── Context ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ContextInner {
    sets_parsed: AtomicUsize,
}

/// Owner of a family of compatible sets. Clones share identity.
#[derive(Debug, Clone, Default)]
pub struct SetContext {
    inner: Arc<ContextInner>,
}

impl SetContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn same_as(&self, other: &SetContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of sets parsed inside this context so far.
    pub fn sets_parsed(&self) -> usize {
        self.inner.sets_parsed.load(Ordering::Relaxed)
    }
}

// ── Affine expressions ──────────────────────────────────────────────────────

/// `sum(coeffs[v] * v) + constant`, zero coefficients never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Affine {
    coeffs: BTreeMap<String, i64>,
    constant: i64,
}

impl Affine {
    pub fn constant(value: i64) -> Self {
        Affine {
            coeffs: BTreeMap::new(),
            constant: value,
        }
    }

    pub fn var(name: impl Into<String>) -> Self {
        let mut coeffs = BTreeMap::new();
        coeffs.insert(name.into(), 1);
        Affine {
            coeffs,
            constant: 0,
        }
    }

    pub fn coeff(&self, name: &str) -> i64 {
        self.coeffs.get(name).copied().unwrap_or(0)
    }

    pub fn constant_term(&self) -> i64 {
        self.constant
    }

    pub fn is_constant(&self) -> bool {
        self.coeffs.is_empty()
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.coeffs.keys().map(String::as_str)
    }

    /// Copy with the term in `name` removed.
    pub fn without(&self, name: &str) -> Affine {
        let mut out = self.clone();
        out.coeffs.remove(name);
        out
    }

    /// Divide through by the gcd of the variable coefficients, rounding the
    /// constant down. Valid for `self >= 0` over the integers.
    fn tightened(&self) -> Affine {
        let g = self.coeffs.values().fold(0, |acc, &c| gcd(acc, c.unsigned_abs()));
        let g = match i64::try_from(g) {
            Ok(g) if g > 1 => g,
            _ => return self.clone(),
        };
        Affine {
            coeffs: self.coeffs.iter().map(|(k, &c)| (k.clone(), c / g)).collect(),
            constant: self.constant.div_euclid(g),
        }
    }

    /// Lower to an expression tree over parameter variables.
    pub fn to_expr(&self) -> Expr {
        let mut terms = self.coeffs.iter().map(|(name, &c)| {
            let v = Expr::var(name.clone());
            match c {
                1 => (false, v),
                -1 => (true, v),
                c if c < 0 && c != i64::MIN => {
                    (true, Expr::binary(BinOp::Mul, Expr::Int(-c), v))
                }
                c => (false, Expr::binary(BinOp::Mul, Expr::Int(c), v)),
            }
        });
        let mut acc = match terms.next() {
            None => return Expr::Int(self.constant),
            Some((true, t)) => Expr::Neg(Box::new(t)),
            Some((false, t)) => t,
        };
        for (negative, t) in terms {
            let op = if negative { BinOp::Sub } else { BinOp::Add };
            acc = Expr::binary(op, acc, t);
        }
        match self.constant {
            0 => acc,
            c if c < 0 && c != i64::MIN => Expr::binary(BinOp::Sub, acc, Expr::Int(-c)),
            c => Expr::binary(BinOp::Add, acc, Expr::Int(c)),
        }
    }

    /// Interpret an expression tree as an affine form, if it is one.
    pub fn from_expr(expr: &Expr) -> std::result::Result<Affine, String> {
        match expr {
            Expr::Int(n) => Ok(Affine::constant(*n)),
            Expr::Variable(name) => Ok(Affine::var(name.clone())),
            Expr::Neg(inner) => Affine::from_expr(inner)?.checked_neg(),
            Expr::Binary { op, left, right } => {
                let l = Affine::from_expr(left)?;
                let r = Affine::from_expr(right)?;
                match op {
                    BinOp::Add => l.checked_add(&r),
                    BinOp::Sub => l.checked_sub(&r),
                    BinOp::Mul if l.is_constant() => r.checked_scale(l.constant),
                    BinOp::Mul if r.is_constant() => l.checked_scale(r.constant),
                    _ => Err(format!("'{}' is not affine", expr)),
                }
            }
            _ => Err(format!("'{}' is not affine", expr)),
        }
    }

    fn normalized(mut self) -> Self {
        self.coeffs.retain(|_, c| *c != 0);
        self
    }

    // Checked arithmetic; overflow is an error, never a wrap or a panic.

    pub fn checked_add(&self, rhs: &Affine) -> std::result::Result<Affine, String> {
        let mut out = self.clone();
        for (name, &c) in &rhs.coeffs {
            let slot = out.coeffs.entry(name.clone()).or_insert(0);
            *slot = slot
                .checked_add(c)
                .ok_or_else(|| overflow(self, "+", rhs))?;
        }
        out.constant = out
            .constant
            .checked_add(rhs.constant)
            .ok_or_else(|| overflow(self, "+", rhs))?;
        Ok(out.normalized())
    }

    pub fn checked_sub(&self, rhs: &Affine) -> std::result::Result<Affine, String> {
        self.checked_add(&rhs.checked_neg()?)
    }

    pub fn checked_neg(&self) -> std::result::Result<Affine, String> {
        self.checked_scale(-1)
    }

    pub fn checked_scale(&self, k: i64) -> std::result::Result<Affine, String> {
        let mut out = self.clone();
        let fail = || overflow(self, "*", &Affine::constant(k));
        for c in out.coeffs.values_mut() {
            *c = c.checked_mul(k).ok_or_else(fail)?;
        }
        out.constant = out.constant.checked_mul(k).ok_or_else(fail)?;
        Ok(out.normalized())
    }
}

fn overflow(left: &Affine, op: &str, right: &Affine) -> String {
    format!("integer overflow in '({}) {} ({})'", left, op, right)
}

impl fmt::Display for Affine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_expr())
    }
}

fn gcd(a: u64, b: u64) -> u64 {
    let (mut a, mut b) = (a, b);
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

// ── Constraints ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    /// `aff == 0`
    Equality,
    /// `aff >= 0`
    Inequality,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub aff: Affine,
}

impl Constraint {
    pub fn eq(aff: Affine) -> Self {
        Constraint {
            kind: ConstraintKind::Equality,
            aff,
        }
    }

    pub fn ge(aff: Affine) -> Self {
        Constraint {
            kind: ConstraintKind::Inequality,
            aff,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rel = match self.kind {
            ConstraintKind::Equality => "=",
            ConstraintKind::Inequality => ">=",
        };
        write!(f, "{} {} 0", self.aff, rel)
    }
}

// ── Basic sets ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BasicSet {
    ctx: SetContext,
    params: Vec<String>,
    dims: Vec<Option<String>>,
    constraints: Vec<Constraint>,
}

/// Lower bound and trip count of one dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimBounds {
    pub lower: Affine,
    pub extent: Affine,
}

impl BasicSet {
    /// Unconstrained set; unnamed dimensions are `None`.
    pub fn universe(ctx: &SetContext, params: Vec<String>, dims: Vec<Option<String>>) -> Self {
        BasicSet {
            ctx: ctx.clone(),
            params,
            dims,
            constraints: Vec::new(),
        }
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Parse `[params] -> { [dims] : constraints }` inside `ctx`.
    pub fn parse(ctx: &SetContext, text: &str) -> Result<Self> {
        let syntax = parse_set_syntax(text)?;
        let fail = |msg: String| Diagnostic::new(codes::E0402, msg);

        let mut known: BTreeSet<&str> = syntax.params.iter().map(String::as_str).collect();
        for dim in &syntax.dims {
            if !known.insert(dim.as_str()) {
                return Err(fail(format!("name '{}' declared twice in '{}'", dim, text)));
            }
        }

        let mut constraints = Vec::new();
        for cmp in &syntax.constraints {
            let left = Affine::from_expr(&cmp.left).map_err(&fail)?;
            let right = Affine::from_expr(&cmp.right).map_err(&fail)?;
            let one = Affine::constant(1);
            if let Some(unknown) = left
                .variables()
                .chain(right.variables())
                .find(|v| !known.contains(v))
            {
                return Err(fail(format!("unknown identifier '{}' in '{}'", unknown, text)));
            }
            let constraint = match cmp.op {
                CmpOp::Le => right.checked_sub(&left).map(Constraint::ge),
                CmpOp::Lt => right
                    .checked_sub(&left)
                    .and_then(|d| d.checked_sub(&one))
                    .map(Constraint::ge),
                CmpOp::Ge => left.checked_sub(&right).map(Constraint::ge),
                CmpOp::Gt => left
                    .checked_sub(&right)
                    .and_then(|d| d.checked_sub(&one))
                    .map(Constraint::ge),
                CmpOp::Eq => left.checked_sub(&right).map(Constraint::eq),
            };
            constraints.push(constraint.map_err(|why| fail(format!("{} in '{}'", why, text)))?);
        }

        ctx.inner.sets_parsed.fetch_add(1, Ordering::Relaxed);
        Ok(BasicSet {
            ctx: ctx.clone(),
            params: syntax.params,
            dims: syntax.dims.into_iter().map(Some).collect(),
            constraints,
        })
    }

    pub fn context(&self) -> &SetContext {
        &self.ctx
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn dims(&self) -> &[Option<String>] {
        &self.dims
    }

    /// Names of the named dimensions, in order.
    pub fn dim_names(&self) -> impl Iterator<Item = &str> {
        self.dims.iter().filter_map(|d| d.as_deref())
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Intersection of `sets` in one space: dimensions are concatenated and
    /// parameters that some set declares as a dimension are dropped.
    pub fn combine<'a>(ctx: &SetContext, sets: impl IntoIterator<Item = &'a BasicSet>) -> Self {
        let mut params = Vec::new();
        let mut dims = Vec::new();
        let mut constraints = Vec::new();
        for set in sets {
            params.extend(set.params.iter().cloned());
            dims.extend(set.dims.iter().cloned());
            constraints.extend(set.constraints.iter().cloned());
        }
        let dim_names: BTreeSet<String> = dims.iter().flatten().cloned().collect();
        let mut seen = BTreeSet::new();
        params.retain(|p: &String| !dim_names.contains(p) && seen.insert(p.clone()));
        BasicSet {
            ctx: ctx.clone(),
            params,
            dims,
            constraints,
        }
    }

    /// Bounds of dimension `name` after projecting out all other dimensions.
    pub fn dim_bounds(&self, name: &str) -> std::result::Result<DimBounds, String> {
        let mut ineqs: Vec<Affine> = Vec::new();
        for c in &self.constraints {
            match c.kind {
                ConstraintKind::Inequality => ineqs.push(c.aff.clone()),
                ConstraintKind::Equality => {
                    ineqs.push(c.aff.clone());
                    ineqs.push(c.aff.checked_neg()?);
                }
            }
        }

        for other in self.dim_names().filter(|d| *d != name) {
            ineqs = eliminate(ineqs, other)?;
        }

        let mut lowers = Vec::new();
        let mut uppers = Vec::new();
        for ineq in &ineqs {
            let c = ineq.coeff(name);
            let rest = ineq.without(name);
            if c > 0 {
                // c*x + rest >= 0  =>  x >= -rest / c
                lowers.push(if c == 1 {
                    rest.checked_neg()?
                } else if rest.is_constant() {
                    Affine::constant(rest.constant.div_euclid(c)).checked_neg()?
                } else {
                    return Err(format!("non-unit coefficient on '{}' in '{} >= 0'", name, ineq));
                });
            } else if c < 0 {
                // -k*x + rest >= 0  =>  x <= rest / k
                let k = -c;
                uppers.push(if k == 1 {
                    rest
                } else if rest.is_constant() {
                    Affine::constant(rest.constant.div_euclid(k))
                } else {
                    return Err(format!("non-unit coefficient on '{}' in '{} >= 0'", name, ineq));
                });
            }
        }

        let lower = pick_bound(name, "lower", lowers, |diff| diff > 0)?;
        let upper = pick_bound(name, "upper", uppers, |diff| diff < 0)?;
        let extent = upper.checked_sub(&lower)?.checked_add(&Affine::constant(1))?;
        Ok(DimBounds { lower, extent })
    }
}

/// Fourier–Motzkin step removing `var` from a system of `aff >= 0`.
fn eliminate(ineqs: Vec<Affine>, var: &str) -> std::result::Result<Vec<Affine>, String> {
    let (with, mut out): (Vec<Affine>, Vec<Affine>) =
        ineqs.into_iter().partition(|a| a.coeff(var) != 0);
    let (pos, neg): (Vec<&Affine>, Vec<&Affine>) = with.iter().partition(|a| a.coeff(var) > 0);

    for p in &pos {
        for n in &neg {
            let a = p.coeff(var);
            let b = n
                .coeff(var)
                .checked_neg()
                .ok_or_else(|| format!("integer overflow eliminating '{}'", var))?;
            let combined = p.checked_scale(b)?.checked_add(&n.checked_scale(a)?)?;
            out.push(combined.tightened());
        }
    }

    let mut seen = BTreeSet::new();
    let mut result = Vec::with_capacity(out.len());
    for aff in out {
        if aff.is_constant() {
            if aff.constant < 0 {
                return Err("domain is empty".to_string());
            }
            continue;
        }
        if seen.insert(format!("{}", aff)) {
            result.push(aff);
        }
    }
    Ok(result)
}

/// Reduce candidate bounds to one; `keep_first(a - b)` says whether `a` wins.
fn pick_bound(
    name: &str,
    which: &str,
    candidates: Vec<Affine>,
    keep_first: impl Fn(i64) -> bool,
) -> std::result::Result<Affine, String> {
    let mut iter = candidates.into_iter();
    let mut best = iter
        .next()
        .ok_or_else(|| format!("no {} bound for '{}'", which, name))?;
    for cand in iter {
        let diff = cand.checked_sub(&best)?;
        if !diff.is_constant() {
            return Err(format!(
                "ambiguous {} bound for '{}': '{}' vs '{}'",
                which, name, best, cand
            ));
        }
        if keep_first(diff.constant) {
            best = cand;
        }
    }
    Ok(best)
}

impl fmt::Display for BasicSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.params.is_empty() {
            write!(f, "[{}] -> ", self.params.join(", "))?;
        }
        let dims: Vec<&str> = self
            .dims
            .iter()
            .map(|d| d.as_deref().unwrap_or("_"))
            .collect();
        write!(f, "{{ [{}]", dims.join(", "))?;
        for (i, c) in self.constraints.iter().enumerate() {
            f.write_str(if i == 0 { " : " } else { " and " })?;
            write!(f, "{}", c)?;
        }
        f.write_str(" }")
    }
}

impl Serialize for BasicSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
