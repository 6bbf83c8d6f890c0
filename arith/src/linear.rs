//! Linear normal forms over integer expressions.
//!
//! A linear form is `Σ coef·var + constant` with terms sorted by variable
//! identity. Extraction fails on anything nonlinear (division, modulo,
//! loads, float arithmetic), which is exactly the conservative behavior the
//! equality prover and the subspace divider want.

use std::collections::BTreeMap;
use std::rc::Rc;

use loft_dtype::DType;
use loft_ir::{BinOp, Expr, PrimExpr, Var};

#[derive(Debug, Clone)]
pub struct LinearForm {
    /// Sorted by variable id, zero coefficients dropped.
    pub terms: Vec<(Rc<Var>, i64)>,
    pub constant: i64,
}

impl PartialEq for LinearForm {
    fn eq(&self, other: &Self) -> bool {
        self.constant == other.constant
            && self.terms.len() == other.terms.len()
            && self
                .terms
                .iter()
                .zip(&other.terms)
                .all(|((va, ca), (vb, cb))| va.id() == vb.id() && ca == cb)
    }
}

impl LinearForm {
    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    /// Rebuild the canonical expression `Σ coef·var + constant`.
    pub fn to_expr(&self, dtype: DType) -> Expr {
        let mut acc: Option<Expr> = None;
        for (var, coef) in &self.terms {
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
            Some(sum) if self.constant == 0 => sum,
            Some(sum) => PrimExpr::add(&sum, &PrimExpr::int(self.constant, dtype)),
            None => PrimExpr::int(self.constant, dtype),
        }
    }
}

/// Extract the linear normal form of an integer expression, if it has one.
pub fn try_linear(expr: &Expr) -> Option<LinearForm> {
    let mut terms: BTreeMap<u64, (Rc<Var>, i64)> = BTreeMap::new();
    let mut constant = 0i64;
    accumulate(expr, 1, &mut terms, &mut constant)?;
    let terms = terms.into_values().filter(|(_, coef)| *coef != 0).collect();
    Some(LinearForm { terms, constant })
}

fn accumulate(
    expr: &Expr,
    scale: i64,
    terms: &mut BTreeMap<u64, (Rc<Var>, i64)>,
    constant: &mut i64,
) -> Option<()> {
    match &**expr {
        PrimExpr::Int { value, .. } => {
            *constant += value.checked_mul(scale)?;
            Some(())
        }
        PrimExpr::Var(var) if var.dtype.is_int() => {
            let entry = terms.entry(var.id()).or_insert_with(|| (var.clone(), 0));
            entry.1 = entry.1.checked_add(scale)?;
            Some(())
        }
        // Index casts are width changes only.
        PrimExpr::Cast { value, dtype } if dtype.is_int() => accumulate(value, scale, terms, constant),
        PrimExpr::Binary { op: BinOp::Add, lhs, rhs } => {
            accumulate(lhs, scale, terms, constant)?;
            accumulate(rhs, scale, terms, constant)
        }
        PrimExpr::Binary { op: BinOp::Sub, lhs, rhs } => {
            accumulate(lhs, scale, terms, constant)?;
            accumulate(rhs, scale.checked_neg()?, terms, constant)
        }
        PrimExpr::Binary { op: BinOp::Mul, lhs, rhs } => {
            if let Some(c) = rhs.as_int() {
                accumulate(lhs, scale.checked_mul(c)?, terms, constant)
            } else if let Some(c) = lhs.as_int() {
                accumulate(rhs, scale.checked_mul(c)?, terms, constant)
            } else {
                None
            }
        }
        _ => None,
    }
}
