use loft_dtype::DType;
use loft_ir::{PrimExpr, Range, Var};
use test_case::test_case;

use crate::analyzer::Analyzer;

#[test_case(6, 4, 10 ; "add")]
#[test_case(6, -4, 2 ; "add negative")]
fn const_add_folds(a: i64, b: i64, expected: i64) {
    let analyzer = Analyzer::new();
    let sum = PrimExpr::add(&PrimExpr::int32(a), &PrimExpr::int32(b));
    assert_eq!(analyzer.simplify(&sum).as_int(), Some(expected));
}

#[test]
fn floor_semantics() {
    let analyzer = Analyzer::new();
    let div = PrimExpr::floordiv(&PrimExpr::int32(-9), &PrimExpr::int32(5));
    assert_eq!(analyzer.simplify(&div).as_int(), Some(-2));
    let rem = PrimExpr::floormod(&PrimExpr::int32(-9), &PrimExpr::int32(5));
    assert_eq!(analyzer.simplify(&rem).as_int(), Some(1));
}

#[test]
fn identities() {
    let analyzer = Analyzer::new();
    let x = PrimExpr::var(&Var::new("x", DType::Int32));

    let same = analyzer.simplify(&PrimExpr::add(&x, &PrimExpr::int32(0)));
    assert_eq!(same, x);
    let same = analyzer.simplify(&PrimExpr::mul(&PrimExpr::int32(1), &x));
    assert_eq!(same, x);
    let zero = analyzer.simplify(&PrimExpr::mul(&x, &PrimExpr::int32(0)));
    assert!(zero.is_zero());
    let id = analyzer.simplify(&PrimExpr::floordiv(&x, &PrimExpr::int32(1)));
    assert_eq!(id, x);
}

#[test]
fn domain_aware_mod_and_div() {
    let mut analyzer = Analyzer::new();
    let x = Var::new("x", DType::Int32);
    analyzer.bind(&x, &Range::from_extent(&PrimExpr::int32(16)));

    let xe = PrimExpr::var(&x);
    let rem = analyzer.simplify(&PrimExpr::floormod(&xe, &PrimExpr::int32(16)));
    assert_eq!(rem, xe);
    let div = analyzer.simplify(&PrimExpr::floordiv(&xe, &PrimExpr::int32(16)));
    assert!(div.is_zero());

    // Not provable past the bound.
    let rem = analyzer.simplify(&PrimExpr::floormod(&xe, &PrimExpr::int32(8)));
    assert!(rem.as_int().is_none());
    assert_ne!(rem, xe);
}

#[test]
fn prove_equal_linear() {
    let analyzer = Analyzer::new();
    let a = Var::new("a", DType::Int32);
    let b = Var::new("b", DType::Int32);
    let ae = PrimExpr::var(&a);
    let be = PrimExpr::var(&b);

    // a*4 + b == b + (a + a)*2
    let lhs = PrimExpr::add(&PrimExpr::mul(&ae, &PrimExpr::int32(4)), &be);
    let rhs = PrimExpr::add(
        &be,
        &PrimExpr::mul(&PrimExpr::add(&ae, &ae), &PrimExpr::int32(2)),
    );
    assert!(analyzer.can_prove_equal(&lhs, &rhs));
    assert!(!analyzer.can_prove_equal(&lhs, &be));
}

#[test]
fn simplify_sub_cancels() {
    let analyzer = Analyzer::new();
    let o = Var::new("o", DType::Int32);
    let i = Var::new("i", DType::Int32);
    let oe = PrimExpr::var(&o);
    let ie = PrimExpr::var(&i);

    // (o*16 + i) - i == o*16
    let lhs = PrimExpr::add(&PrimExpr::mul(&oe, &PrimExpr::int32(16)), &ie);
    let diff = analyzer.simplify_sub(&lhs, &ie);
    let expected = PrimExpr::mul(&oe, &PrimExpr::int32(16));
    assert!(analyzer.can_prove_equal(&diff, &expected));
}
