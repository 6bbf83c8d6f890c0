//! Simplifying arithmetic analyzer.

use std::collections::HashMap;
use std::rc::Rc;

use loft_ir::{BinOp, Expr, PrimExpr, Range, Var};

use crate::linear::try_linear;

/// Per-transformation arithmetic scratchpad.
///
/// Holds variable domain bindings and uses them for domain-aware folds
/// (`x % c → x` when `x ∈ [0, c)`). Allocate one per transformation, bind
/// the inner iterator domains before relaxing regions, drop it on return.
#[derive(Default)]
pub struct Analyzer {
    dom: HashMap<u64, Range>,
}

impl Analyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a variable to a domain for the lifetime of this analyzer.
    pub fn bind(&mut self, var: &Rc<Var>, dom: &Range) {
        self.dom.insert(var.id(), dom.clone());
    }

    pub fn domain_of(&self, var: &Rc<Var>) -> Option<&Range> {
        self.dom.get(&var.id())
    }

    /// Recursively simplify: constant folding, identity elimination, and
    /// domain-aware division/modulo reduction.
    pub fn simplify(&self, expr: &Expr) -> Expr {
        match &**expr {
            PrimExpr::Int { .. } | PrimExpr::Float { .. } | PrimExpr::Var(_) => expr.clone(),
            PrimExpr::Cast { dtype, value } => {
                let value = self.simplify(value);
                if value.dtype() == *dtype {
                    return value;
                }
                if dtype.is_int() || dtype.is_bool() {
                    if let Some(c) = value.as_int() {
                        return PrimExpr::int(c, *dtype);
                    }
                }
                PrimExpr::cast(*dtype, &value)
            }
            PrimExpr::Binary { op, lhs, rhs } => {
                let lhs = self.simplify(lhs);
                let rhs = self.simplify(rhs);
                self.fold_binary(*op, &lhs, &rhs)
                    .unwrap_or_else(|| PrimExpr::binary(*op, &lhs, &rhs))
            }
            PrimExpr::Not(value) => {
                let value = self.simplify(value);
                match value.as_int() {
                    Some(c) => PrimExpr::bool_(c == 0),
                    None => PrimExpr::not_(&value),
                }
            }
            PrimExpr::Select { condition, true_value, false_value } => {
                let condition = self.simplify(condition);
                match condition.as_int() {
                    Some(c) if c != 0 => self.simplify(true_value),
                    Some(_) => self.simplify(false_value),
                    None => PrimExpr::select(
                        &condition,
                        &self.simplify(true_value),
                        &self.simplify(false_value),
                    ),
                }
            }
            PrimExpr::BufferLoad { buffer, indices } => {
                let indices = indices.iter().map(|index| self.simplify(index)).collect();
                PrimExpr::load(buffer, indices)
            }
        }
    }

    /// Equality provable by simplification or by linear normal forms.
    pub fn can_prove_equal(&self, lhs: &Expr, rhs: &Expr) -> bool {
        let lhs = self.simplify(lhs);
        let rhs = self.simplify(rhs);
        if lhs == rhs {
            return true;
        }
        match (try_linear(&lhs), try_linear(&rhs)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    fn fold_binary(&self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Option<Expr> {
        if let (Some(a), Some(b)) = (lhs.as_int(), rhs.as_int()) {
            let dtype = lhs.dtype();
            return match op {
                BinOp::Add => Some(PrimExpr::int(a + b, dtype)),
                BinOp::Sub => Some(PrimExpr::int(a - b, dtype)),
                BinOp::Mul => Some(PrimExpr::int(a * b, dtype)),
                BinOp::FloorDiv if b != 0 => Some(PrimExpr::int(a.div_euclid(b), dtype)),
                BinOp::FloorMod if b != 0 => Some(PrimExpr::int(a.rem_euclid(b), dtype)),
                BinOp::Min => Some(PrimExpr::int(a.min(b), dtype)),
                BinOp::Max => Some(PrimExpr::int(a.max(b), dtype)),
                BinOp::Lt => Some(PrimExpr::bool_(a < b)),
                BinOp::Le => Some(PrimExpr::bool_(a <= b)),
                BinOp::Eq => Some(PrimExpr::bool_(a == b)),
                BinOp::Ne => Some(PrimExpr::bool_(a != b)),
                BinOp::And => Some(PrimExpr::bool_(a != 0 && b != 0)),
                BinOp::Or => Some(PrimExpr::bool_(a != 0 || b != 0)),
                _ => None,
            };
        }
        match op {
            BinOp::Add => {
                if lhs.is_zero() {
                    Some(rhs.clone())
                } else if rhs.is_zero() {
                    Some(lhs.clone())
                } else {
                    None
                }
            }
            BinOp::Sub if rhs.is_zero() => Some(lhs.clone()),
            BinOp::Mul => {
                if lhs.is_one() {
                    Some(rhs.clone())
                } else if rhs.is_one() {
                    Some(lhs.clone())
                } else if lhs.is_zero() || rhs.is_zero() {
                    Some(PrimExpr::zero(lhs.dtype()))
                } else {
                    None
                }
            }
            BinOp::FloorDiv => {
                if rhs.is_one() {
                    return Some(lhs.clone());
                }
                let c = rhs.as_int()?;
                let (min, max) = self.const_bounds(lhs)?;
                (c > 0 && min >= 0 && max < c).then(|| PrimExpr::zero(lhs.dtype()))
            }
            BinOp::FloorMod => {
                if rhs.is_one() {
                    return Some(PrimExpr::zero(lhs.dtype()));
                }
                let c = rhs.as_int()?;
                let (min, max) = self.const_bounds(lhs)?;
                (c > 0 && min >= 0 && max < c).then(|| lhs.clone())
            }
            BinOp::Min | BinOp::Max if lhs == rhs => Some(lhs.clone()),
            BinOp::And => {
                if lhs.is_const_true() {
                    Some(rhs.clone())
                } else if rhs.is_const_true() {
                    Some(lhs.clone())
                } else if lhs.is_const_false() || rhs.is_const_false() {
                    Some(PrimExpr::false_())
                } else {
                    None
                }
            }
            BinOp::Or => {
                if lhs.is_const_false() {
                    Some(rhs.clone())
                } else if rhs.is_const_false() {
                    Some(lhs.clone())
                } else if lhs.is_const_true() || rhs.is_const_true() {
                    Some(PrimExpr::true_())
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Constant bounds of an expression under the bound domains.
    fn const_bounds(&self, expr: &Expr) -> Option<(i64, i64)> {
        match &**expr {
            PrimExpr::Int { value, .. } => Some((*value, *value)),
            PrimExpr::Var(var) => {
                let dom = self.dom.get(&var.id())?;
                let min = dom.min.as_int()?;
                let extent = dom.extent.as_int()?;
                Some((min, min + extent - 1))
            }
            PrimExpr::Cast { value, dtype } if dtype.is_int() => self.const_bounds(value),
            PrimExpr::Binary { op, lhs, rhs } => {
                let (lmin, lmax) = self.const_bounds(lhs)?;
                let (rmin, rmax) = self.const_bounds(rhs)?;
                match op {
                    BinOp::Add => Some((lmin + rmin, lmax + rmax)),
                    BinOp::Sub => Some((lmin - rmax, lmax - rmin)),
                    BinOp::Mul => {
                        let products =
                            [lmin * rmin, lmin * rmax, lmax * rmin, lmax * rmax];
                        Some((
                            *products.iter().min().unwrap(),
                            *products.iter().max().unwrap(),
                        ))
                    }
                    BinOp::FloorDiv if rmin == rmax && rmin > 0 => {
                        Some((lmin.div_euclid(rmin), lmax.div_euclid(rmin)))
                    }
                    BinOp::FloorMod if rmin == rmax && rmin > 0 && lmin >= 0 => {
                        Some((0, lmax.min(rmin - 1)))
                    }
                    BinOp::Min => Some((lmin.min(rmin), lmax.min(rmax))),
                    BinOp::Max => Some((lmin.max(rmin), lmax.max(rmax))),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// `lhs - rhs` in canonical form. Linear differences cancel exactly,
    /// which is what base-offset extraction relies on.
    pub fn simplify_sub(&self, lhs: &Expr, rhs: &Expr) -> Expr {
        let diff = PrimExpr::sub(lhs, rhs);
        let simplified = self.simplify(&diff);
        match try_linear(&simplified) {
            Some(form) => form.to_expr(lhs.dtype()),
            None => simplified,
        }
    }
}
