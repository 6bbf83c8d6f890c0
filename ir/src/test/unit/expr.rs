use loft_dtype::DType;
use test_case::test_case;

use crate::expr::{BinOp, PrimExpr, Var};

#[test]
fn var_identity_is_not_name() {
    let a = Var::new("x", DType::Int32);
    let b = Var::new("x", DType::Int32);
    assert_ne!(a, b);
    assert_ne!(a.id(), b.id());
}

#[test]
fn copy_with_suffix_is_fresh() {
    let v = Var::new("i", DType::Int32);
    let outer = v.copy_with_suffix("_o");
    assert_eq!(outer.name, "i_o");
    assert_eq!(outer.dtype, DType::Int32);
    assert_ne!(v.id(), outer.id());
}

#[test_case(BinOp::Add, DType::Int32)]
#[test_case(BinOp::Mul, DType::Int32)]
#[test_case(BinOp::Lt, DType::Bool)]
#[test_case(BinOp::Eq, DType::Bool)]
#[test_case(BinOp::And, DType::Bool)]
fn binary_dtype(op: BinOp, expected: DType) {
    let a = PrimExpr::int32(1);
    let b = PrimExpr::int32(2);
    assert_eq!(PrimExpr::binary(op, &a, &b).dtype(), expected);
}

#[test]
fn const_inspection() {
    assert!(PrimExpr::int32(0).is_zero());
    assert!(PrimExpr::int32(1).is_one());
    assert!(PrimExpr::true_().is_const_true());
    assert!(!PrimExpr::false_().is_const_true());
    assert!(PrimExpr::int32(1).is_const_true());
    assert_eq!(PrimExpr::int32(7).as_int(), Some(7));
    assert_eq!(PrimExpr::float(7.0, DType::Float32).as_int(), None);
}

#[test]
fn zero_and_one_follow_dtype_kind() {
    assert_eq!(PrimExpr::zero(DType::Float32).dtype(), DType::Float32);
    assert!(PrimExpr::zero(DType::Int64).is_zero());
    assert!(PrimExpr::one(DType::Int16).is_one());
}
