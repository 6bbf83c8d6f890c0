//! Interval sets for buffer region relaxation.

use std::collections::HashMap;

use loft_ir::{BinOp, Expr, PrimExpr, Range};

use crate::analyzer::Analyzer;

/// Over-approximation of the values an expression takes.
#[derive(Debug, Clone)]
pub enum IntSet {
    /// No usable bound.
    Everything,
    /// Closed interval `[min, max]` of expressions.
    Interval { min: Expr, max: Expr },
}

impl IntSet {
    pub fn point(expr: &Expr) -> Self {
        Self::Interval { min: expr.clone(), max: expr.clone() }
    }

    pub fn interval(min: Expr, max: Expr) -> Self {
        Self::Interval { min, max }
    }

    /// The set of a half-open range `[min, min + extent)`.
    pub fn from_range(range: &Range, analyzer: &Analyzer) -> Self {
        let last = PrimExpr::sub(
            &PrimExpr::add(&range.min, &range.extent),
            &PrimExpr::one(range.extent.dtype()),
        );
        Self::Interval { min: range.min.clone(), max: analyzer.simplify(&last) }
    }

    fn as_point(&self) -> Option<&Expr> {
        match self {
            Self::Interval { min, max } if min == max => Some(min),
            _ => None,
        }
    }

    fn as_const_point(&self) -> Option<i64> {
        self.as_point()?.as_int()
    }

    /// Materialize as a range, falling back to the given full range when the
    /// set is unbounded.
    pub fn cover_range(&self, fallback: &Range, analyzer: &Analyzer) -> Range {
        match self {
            Self::Everything => fallback.clone(),
            Self::Interval { min, max } => {
                // The span must cancel exactly, e.g. (io*16 + 15) - io*16.
                let span = analyzer.simplify_sub(max, min);
                let extent =
                    analyzer.simplify(&PrimExpr::add(&span, &PrimExpr::one(min.dtype())));
                Range::new(analyzer.simplify(min), extent)
            }
        }
    }

    /// Union of the sets: min of mins, max of maxes.
    pub fn union(sets: &[IntSet], analyzer: &Analyzer) -> IntSet {
        let mut min_acc: Option<Expr> = None;
        let mut max_acc: Option<Expr> = None;
        for set in sets {
            let IntSet::Interval { min, max } = set else {
                return IntSet::Everything;
            };
            min_acc = Some(match min_acc {
                Some(acc) => fold_extreme(BinOp::Min, &acc, min, analyzer),
                None => min.clone(),
            });
            max_acc = Some(match max_acc {
                Some(acc) => fold_extreme(BinOp::Max, &acc, max, analyzer),
                None => max.clone(),
            });
        }
        match (min_acc, max_acc) {
            (Some(min), Some(max)) => IntSet::Interval { min, max },
            _ => IntSet::Everything,
        }
    }
}

fn fold_extreme(op: BinOp, lhs: &Expr, rhs: &Expr, analyzer: &Analyzer) -> Expr {
    analyzer.simplify(&PrimExpr::binary(op, lhs, rhs))
}

/// Evaluate the interval of an expression under a domain map.
///
/// Variables absent from the map are treated as symbolic points, so outer
/// iterators survive into the relaxed bounds unchanged.
pub fn eval_set(expr: &Expr, dom: &HashMap<u64, IntSet>, analyzer: &Analyzer) -> IntSet {
    match &**expr {
        PrimExpr::Int { .. } | PrimExpr::Float { .. } => IntSet::point(expr),
        PrimExpr::Var(var) => dom.get(&var.id()).cloned().unwrap_or_else(|| IntSet::point(expr)),
        PrimExpr::Cast { .. } => IntSet::point(expr),
        PrimExpr::Binary { op, lhs, rhs } => {
            let lset = eval_set(lhs, dom, analyzer);
            let rset = eval_set(rhs, dom, analyzer);
            eval_binary(*op, &lset, &rset, analyzer)
        }
        _ => IntSet::Everything,
    }
}

fn eval_binary(op: BinOp, lset: &IntSet, rset: &IntSet, analyzer: &Analyzer) -> IntSet {
    let (IntSet::Interval { min: lmin, max: lmax }, IntSet::Interval { min: rmin, max: rmax }) =
        (lset, rset)
    else {
        return IntSet::Everything;
    };
    let simp = |e: &Expr| analyzer.simplify(e);
    match op {
        BinOp::Add => IntSet::interval(
            simp(&PrimExpr::add(lmin, rmin)),
            simp(&PrimExpr::add(lmax, rmax)),
        ),
        BinOp::Sub => IntSet::interval(
            simp(&PrimExpr::sub(lmin, rmax)),
            simp(&PrimExpr::sub(lmax, rmin)),
        ),
        BinOp::Mul => {
            if let Some(c) = rset.as_const_point() {
                let scaled_min = simp(&PrimExpr::mul(lmin, &PrimExpr::int(c, lmin.dtype())));
                let scaled_max = simp(&PrimExpr::mul(lmax, &PrimExpr::int(c, lmax.dtype())));
                if c >= 0 {
                    IntSet::interval(scaled_min, scaled_max)
                } else {
                    IntSet::interval(scaled_max, scaled_min)
                }
            } else if let Some(c) = lset.as_const_point() {
                let scaled_min = simp(&PrimExpr::mul(rmin, &PrimExpr::int(c, rmin.dtype())));
                let scaled_max = simp(&PrimExpr::mul(rmax, &PrimExpr::int(c, rmax.dtype())));
                if c >= 0 {
                    IntSet::interval(scaled_min, scaled_max)
                } else {
                    IntSet::interval(scaled_max, scaled_min)
                }
            } else if let (Some(a), Some(b)) = (lset.as_point(), rset.as_point()) {
                IntSet::point(&simp(&PrimExpr::mul(a, b)))
            } else {
                IntSet::Everything
            }
        }
        BinOp::FloorDiv => match rset.as_const_point() {
            Some(c) if c > 0 => {
                let divisor = PrimExpr::int(c, lmin.dtype());
                IntSet::interval(
                    simp(&PrimExpr::floordiv(lmin, &divisor)),
                    simp(&PrimExpr::floordiv(lmax, &divisor)),
                )
            }
            _ => IntSet::Everything,
        },
        BinOp::FloorMod => match rset.as_const_point() {
            // Floor modulo by a positive constant always lands in [0, c).
            Some(c) if c > 0 => IntSet::interval(
                PrimExpr::zero(lmin.dtype()),
                PrimExpr::int(c - 1, lmin.dtype()),
            ),
            _ => IntSet::Everything,
        },
        BinOp::Min => IntSet::interval(
            simp(&PrimExpr::min(lmin, rmin)),
            simp(&PrimExpr::min(lmax, rmax)),
        ),
        BinOp::Max => IntSet::interval(
            simp(&PrimExpr::max(lmin, rmin)),
            simp(&PrimExpr::max(lmax, rmax)),
        ),
        _ => IntSet::Everything,
    }
}
