//! Expression nodes and variables.
//!
//! Expressions are algebraic terms over scalars, variables, and buffer loads.
//! They are shared as [`Expr`] (`Rc<PrimExpr>`); rebuilding a subtree never
//! mutates the original.

use std::hash::{Hash, Hasher};
use std::rc::Rc;

use loft_dtype::DType;
use smallvec::SmallVec;

use crate::buffer::Buffer;
use crate::next_node_id;

/// Shared expression handle.
pub type Expr = Rc<PrimExpr>;

/// A variable with identity.
///
/// Identity is the stable id, not the name; two vars with the same name are
/// distinct unless they are the same allocation. Names are purely diagnostic.
#[derive(Debug)]
pub struct Var {
    id: u64,
    pub name: String,
    pub dtype: DType,
}

impl Var {
    pub fn new(name: impl Into<String>, dtype: DType) -> Rc<Self> {
        Rc::new(Self { id: next_node_id(), name: name.into(), dtype })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Fresh variable with the same dtype and a suffixed name.
    pub fn copy_with_suffix(&self, suffix: &str) -> Rc<Self> {
        Self::new(format!("{}{}", self.name, suffix), self.dtype)
    }

    /// Fresh variable with the same name and a different dtype.
    pub fn with_dtype(&self, dtype: DType) -> Rc<Self> {
        Self::new(self.name.clone(), dtype)
    }
}

impl PartialEq for Var {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Var {}

impl Hash for Var {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Binary operation kinds.
///
/// Arithmetic operations take the dtype of their left operand; comparisons
/// and logic always produce `Bool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    /// Floor division, rounding toward negative infinity.
    FloorDiv,
    /// Floor modulo, result has the sign of the divisor.
    FloorMod,
    Min,
    Max,
    Lt,
    Le,
    Eq,
    Ne,
    And,
    Or,
}

impl BinOp {
    /// Comparison or logic operation, producing `Bool`.
    pub fn is_predicate(self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Eq | Self::Ne | Self::And | Self::Or)
    }
}

/// Expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimExpr {
    Int { value: i64, dtype: DType },
    Float { value: f64, dtype: DType },
    Var(Rc<Var>),
    Cast { dtype: DType, value: Expr },
    Binary { op: BinOp, lhs: Expr, rhs: Expr },
    Not(Expr),
    Select { condition: Expr, true_value: Expr, false_value: Expr },
    BufferLoad { buffer: Rc<Buffer>, indices: SmallVec<[Expr; 4]> },
}

impl PrimExpr {
    pub fn int(value: i64, dtype: DType) -> Expr {
        Rc::new(Self::Int { value, dtype })
    }

    pub fn int32(value: i64) -> Expr {
        Self::int(value, DType::Int32)
    }

    pub fn bool_(value: bool) -> Expr {
        Self::int(value as i64, DType::Bool)
    }

    pub fn true_() -> Expr {
        Self::bool_(true)
    }

    pub fn false_() -> Expr {
        Self::bool_(false)
    }

    pub fn float(value: f64, dtype: DType) -> Expr {
        Rc::new(Self::Float { value, dtype })
    }

    pub fn zero(dtype: DType) -> Expr {
        if dtype.is_float() { Self::float(0.0, dtype) } else { Self::int(0, dtype) }
    }

    pub fn one(dtype: DType) -> Expr {
        if dtype.is_float() { Self::float(1.0, dtype) } else { Self::int(1, dtype) }
    }

    pub fn var(var: &Rc<Var>) -> Expr {
        Rc::new(Self::Var(var.clone()))
    }

    pub fn cast(dtype: DType, value: &Expr) -> Expr {
        Rc::new(Self::Cast { dtype, value: value.clone() })
    }

    pub fn binary(op: BinOp, lhs: &Expr, rhs: &Expr) -> Expr {
        Rc::new(Self::Binary { op, lhs: lhs.clone(), rhs: rhs.clone() })
    }

    pub fn add(lhs: &Expr, rhs: &Expr) -> Expr {
        Self::binary(BinOp::Add, lhs, rhs)
    }

    pub fn sub(lhs: &Expr, rhs: &Expr) -> Expr {
        Self::binary(BinOp::Sub, lhs, rhs)
    }

    pub fn mul(lhs: &Expr, rhs: &Expr) -> Expr {
        Self::binary(BinOp::Mul, lhs, rhs)
    }

    pub fn floordiv(lhs: &Expr, rhs: &Expr) -> Expr {
        Self::binary(BinOp::FloorDiv, lhs, rhs)
    }

    pub fn floormod(lhs: &Expr, rhs: &Expr) -> Expr {
        Self::binary(BinOp::FloorMod, lhs, rhs)
    }

    pub fn min(lhs: &Expr, rhs: &Expr) -> Expr {
        Self::binary(BinOp::Min, lhs, rhs)
    }

    pub fn max(lhs: &Expr, rhs: &Expr) -> Expr {
        Self::binary(BinOp::Max, lhs, rhs)
    }

    pub fn cmplt(lhs: &Expr, rhs: &Expr) -> Expr {
        Self::binary(BinOp::Lt, lhs, rhs)
    }

    pub fn cmple(lhs: &Expr, rhs: &Expr) -> Expr {
        Self::binary(BinOp::Le, lhs, rhs)
    }

    pub fn cmpeq(lhs: &Expr, rhs: &Expr) -> Expr {
        Self::binary(BinOp::Eq, lhs, rhs)
    }

    pub fn cmpne(lhs: &Expr, rhs: &Expr) -> Expr {
        Self::binary(BinOp::Ne, lhs, rhs)
    }

    pub fn and_(lhs: &Expr, rhs: &Expr) -> Expr {
        Self::binary(BinOp::And, lhs, rhs)
    }

    pub fn or_(lhs: &Expr, rhs: &Expr) -> Expr {
        Self::binary(BinOp::Or, lhs, rhs)
    }

    pub fn not_(value: &Expr) -> Expr {
        Rc::new(Self::Not(value.clone()))
    }

    pub fn select(condition: &Expr, true_value: &Expr, false_value: &Expr) -> Expr {
        Rc::new(Self::Select {
            condition: condition.clone(),
            true_value: true_value.clone(),
            false_value: false_value.clone(),
        })
    }

    pub fn load(buffer: &Rc<Buffer>, indices: Vec<Expr>) -> Expr {
        Rc::new(Self::BufferLoad { buffer: buffer.clone(), indices: SmallVec::from_vec(indices) })
    }

    /// Result dtype of this expression.
    pub fn dtype(&self) -> DType {
        match self {
            Self::Int { dtype, .. } | Self::Float { dtype, .. } | Self::Cast { dtype, .. } => *dtype,
            Self::Var(var) => var.dtype,
            Self::Binary { op, lhs, .. } => {
                if op.is_predicate() {
                    DType::Bool
                } else {
                    lhs.dtype()
                }
            }
            Self::Not(_) => DType::Bool,
            Self::Select { true_value, .. } => true_value.dtype(),
            Self::BufferLoad { buffer, .. } => buffer.dtype,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn as_var(&self) -> Option<&Rc<Var>> {
        match self {
            Self::Var(var) => Some(var),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.as_int() == Some(0)
    }

    pub fn is_one(&self) -> bool {
        self.as_int() == Some(1)
    }

    /// The literal constant `1`, of any integer dtype including `Bool`.
    pub fn is_const_true(&self) -> bool {
        self.is_one()
    }

    pub fn is_const_false(&self) -> bool {
        self.is_zero() && self.dtype() == DType::Bool
    }
}
