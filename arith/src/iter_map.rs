//! Affine factorization of block iterator bindings.
//!
//! [`subspace_divide`] splits every binding into an outer and an inner
//! iterator such that `binding = outer.source * inner.extent + inner.source`
//! holds over the enclosing loop domains. The result is a list of
//! `[outer, inner]` mark pairs, one per binding, followed by a final pair
//! whose extents are the outer and inner predicates.
//!
//! This is a conservative local solver: it accepts dense affine bindings
//! (inner strides are suffix products of the inner extents) under a
//! literally-true predicate and refuses everything else by returning an
//! empty division, leaving the caller to fall back or fail.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use itertools::Itertools;
use loft_ir::{Expr, PrimExpr, Range, Var};

use crate::analyzer::Analyzer;
use crate::linear::try_linear;

/// Factorization certificate: a derived iterator as a source expression and
/// its extent.
#[derive(Debug, Clone)]
pub struct IterMark {
    pub source: Expr,
    pub extent: Expr,
}

impl IterMark {
    pub fn new(source: Expr, extent: Expr) -> Self {
        Self { source, extent }
    }

    /// The absent side of a factorization: source 0, extent 1.
    pub fn unit() -> Self {
        Self { source: PrimExpr::int32(0), extent: PrimExpr::int32(1) }
    }

    /// Final-entry mark carrying a predicate as its extent.
    pub fn predicate(pred: Expr) -> Self {
        Self { source: PrimExpr::int32(0), extent: pred }
    }
}

/// Divide the bindings into outer and inner iterators.
///
/// * `bindings` - one value per block iterator
/// * `iter_extents` - the domain extent of each block iterator
/// * `loop_domains` - domain of every enclosing loop var, keyed by var id
/// * `inner_vars` - loop vars belonging to the inner subspace
/// * `predicate` - the realize predicate constraining the bindings
///
/// Returns `bindings.len() + 1` pairs on success, empty on failure.
pub fn subspace_divide(
    bindings: &[Expr],
    iter_extents: &[Expr],
    loop_domains: &HashMap<u64, Range>,
    inner_vars: &HashSet<u64>,
    predicate: &Expr,
    analyzer: &Analyzer,
) -> Vec<[IterMark; 2]> {
    assert_eq!(bindings.len(), iter_extents.len());
    if !analyzer.simplify(predicate).is_const_true() {
        return vec![];
    }

    let mut result = Vec::with_capacity(bindings.len() + 1);
    for (binding, iter_extent) in bindings.iter().zip(iter_extents) {
        match divide_binding(binding, iter_extent, loop_domains, inner_vars) {
            Some(pair) => result.push(pair),
            None => return vec![],
        }
    }
    result.push([
        IterMark::predicate(PrimExpr::true_()),
        IterMark::predicate(PrimExpr::true_()),
    ]);
    result
}

fn divide_binding(
    binding: &Expr,
    iter_extent: &Expr,
    loop_domains: &HashMap<u64, Range>,
    inner_vars: &HashSet<u64>,
) -> Option<[IterMark; 2]> {
    let form = try_linear(binding)?;
    let dtype = binding.dtype();

    let mut inner_terms: Vec<(Rc<Var>, i64)> = Vec::new();
    let mut outer_terms: Vec<(Rc<Var>, i64)> = Vec::new();
    for (var, coef) in form.terms {
        if inner_vars.contains(&var.id()) {
            inner_terms.push((var, coef));
        } else if loop_domains.contains_key(&var.id()) {
            outer_terms.push((var, coef));
        } else {
            return None;
        }
    }

    // Inner side: the terms must form a dense fused iterator, with strides
    // that are suffix products of the inner extents.
    let (inner_mark, inner_extent) = if inner_terms.is_empty() {
        (IterMark::unit(), 1i64)
    } else {
        let mut with_extents = Vec::with_capacity(inner_terms.len());
        for (var, coef) in inner_terms {
            let dom = &loop_domains[&var.id()];
            if !dom.min.is_zero() {
                return None;
            }
            let extent = dom.extent.as_int()?;
            if extent <= 0 {
                return None;
            }
            with_extents.push((var, coef, extent));
        }
        let sorted = with_extents.into_iter().sorted_by_key(|(_, coef, _)| -coef).collect_vec();
        let mut expected = 1i64;
        for (_, coef, extent) in sorted.iter().rev() {
            if *coef != expected {
                return None;
            }
            expected = expected.checked_mul(*extent)?;
        }
        let source = build_sum(&sorted, 0, dtype);
        (IterMark::new(source, PrimExpr::int(expected, dtype)), expected)
    };

    // Outer side: coefficients and the iterator extent must divide evenly by
    // the inner extent.
    let outer_mark = if outer_terms.is_empty() && form.constant == 0 {
        if let (Some(total), true) = (iter_extent.as_int(), inner_extent > 1) {
            if total != inner_extent {
                return None;
            }
        }
        IterMark::unit()
    } else {
        let mut scaled = Vec::with_capacity(outer_terms.len());
        for (var, coef) in outer_terms {
            if coef % inner_extent != 0 {
                return None;
            }
            let dom = &loop_domains[&var.id()];
            let extent = dom.extent.as_int().unwrap_or(i64::MAX);
            scaled.push((var, coef / inner_extent, extent));
        }
        if form.constant % inner_extent != 0 {
            return None;
        }
        let constant = form.constant / inner_extent;
        let scaled = scaled.into_iter().sorted_by_key(|(_, coef, _)| -coef).collect_vec();
        let source = build_sum(&scaled, constant, dtype);
        let extent = if inner_extent == 1 {
            iter_extent.clone()
        } else {
            let total = iter_extent.as_int()?;
            if total % inner_extent != 0 {
                return None;
            }
            PrimExpr::int(total / inner_extent, dtype)
        };
        IterMark::new(source, extent)
    };

    Some([outer_mark, inner_mark])
}

fn build_sum(
    terms: &[(Rc<Var>, i64, i64)],
    constant: i64,
    dtype: loft_dtype::DType,
) -> Expr {
    let mut acc: Option<Expr> = None;
    for (var, coef, _) in terms {
        let term = if *coef == 1 {
            PrimExpr::var(var)
        } else {
            PrimExpr::mul(&PrimExpr::var(var), &PrimExpr::int(*coef, dtype))
        };
        acc = Some(match acc {
            Some(sum) => PrimExpr::add(&sum, &term),
            None => term,
        });
    }
    match acc {
        Some(sum) if constant == 0 => sum,
        Some(sum) => PrimExpr::add(&sum, &PrimExpr::int(constant, dtype)),
        None => PrimExpr::int(constant, dtype),
    }
}
