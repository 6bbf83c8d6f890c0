use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use loft_dtype::DType;
use loft_ir::{Expr, PrimExpr, Range, Var};

use crate::analyzer::Analyzer;
use crate::iter_map::subspace_divide;

fn loop_var(name: &str, extent: i64) -> (Rc<Var>, Range) {
    (Var::new(name, DType::Int32), Range::from_extent(&PrimExpr::int32(extent)))
}

#[test]
fn tiled_binding_factors() {
    // binding = io*16 + ii, io in [0,8), ii in [0,16), iter extent 128.
    let (io, io_dom) = loop_var("io", 8);
    let (ii, ii_dom) = loop_var("ii", 16);
    let binding = PrimExpr::add(
        &PrimExpr::mul(&PrimExpr::var(&io), &PrimExpr::int32(16)),
        &PrimExpr::var(&ii),
    );
    let domains = HashMap::from([(io.id(), io_dom), (ii.id(), ii_dom)]);
    let inner = HashSet::from([ii.id()]);
    let analyzer = Analyzer::new();

    let division = subspace_divide(
        &[binding],
        &[PrimExpr::int32(128)],
        &domains,
        &inner,
        &PrimExpr::true_(),
        &analyzer,
    );
    assert_eq!(division.len(), 2);

    let [outer, inner_mark] = &division[0];
    assert_eq!(outer.extent.as_int(), Some(8));
    assert_eq!(inner_mark.extent.as_int(), Some(16));
    assert!(analyzer.can_prove_equal(&outer.source, &PrimExpr::var(&io)));
    assert!(analyzer.can_prove_equal(&inner_mark.source, &PrimExpr::var(&ii)));

    // The final entry carries true predicates on both sides.
    assert!(division[1][0].extent.is_const_true());
    assert!(division[1][1].extent.is_const_true());
}

#[test]
fn fused_inner_binding_factors() {
    // binding = i1*16 + i2 with both inner; fused extent is 256.
    let (i1, d1) = loop_var("i1", 16);
    let (i2, d2) = loop_var("i2", 16);
    let binding = PrimExpr::add(
        &PrimExpr::mul(&PrimExpr::var(&i1), &PrimExpr::int32(16)),
        &PrimExpr::var(&i2),
    );
    let domains = HashMap::from([(i1.id(), d1), (i2.id(), d2)]);
    let inner = HashSet::from([i1.id(), i2.id()]);
    let analyzer = Analyzer::new();

    let division = subspace_divide(
        &[binding.clone()],
        &[PrimExpr::int32(256)],
        &domains,
        &inner,
        &PrimExpr::true_(),
        &analyzer,
    );
    assert_eq!(division.len(), 2);
    let [outer, inner_mark] = &division[0];
    assert!(outer.extent.is_one());
    assert_eq!(inner_mark.extent.as_int(), Some(256));
    assert!(analyzer.can_prove_equal(&inner_mark.source, &binding));
}

#[test]
fn predicated_binding_is_rejected() {
    let (i, dom) = loop_var("i", 128);
    let binding = PrimExpr::var(&i);
    let predicate = PrimExpr::cmpeq(
        &PrimExpr::floormod(&binding, &PrimExpr::int32(3)),
        &PrimExpr::int32(0),
    );
    let domains = HashMap::from([(i.id(), dom)]);
    let inner = HashSet::from([i.id()]);
    let analyzer = Analyzer::new();

    let division = subspace_divide(
        &[binding],
        &[PrimExpr::int32(128)],
        &domains,
        &inner,
        &predicate,
        &analyzer,
    );
    assert!(division.is_empty());
}

#[test]
fn strided_binding_is_rejected() {
    // binding = 2*i is not surjective onto [0, 256).
    let (i, dom) = loop_var("i", 128);
    let binding = PrimExpr::mul(&PrimExpr::var(&i), &PrimExpr::int32(2));
    let domains = HashMap::from([(i.id(), dom)]);
    let inner = HashSet::from([i.id()]);
    let analyzer = Analyzer::new();

    let division = subspace_divide(
        &[binding],
        &[PrimExpr::int32(256)],
        &domains,
        &inner,
        &PrimExpr::true_(),
        &analyzer,
    );
    assert!(division.is_empty());
}

#[test]
fn mixed_extent_mismatch_is_rejected() {
    // binding = io*8 + ii with ii extent 16: stride does not match.
    let (io, io_dom) = loop_var("io", 8);
    let (ii, ii_dom) = loop_var("ii", 16);
    let binding = PrimExpr::add(
        &PrimExpr::mul(&PrimExpr::var(&io), &PrimExpr::int32(8)),
        &PrimExpr::var(&ii),
    );
    let domains = HashMap::from([(io.id(), io_dom), (ii.id(), ii_dom)]);
    let inner = HashSet::from([ii.id()]);
    let analyzer = Analyzer::new();

    let division = subspace_divide(
        &[binding],
        &[PrimExpr::int32(128)],
        &domains,
        &inner,
        &PrimExpr::true_(),
        &analyzer,
    );
    assert!(division.is_empty());
}

#[test]
fn constant_binding_divides_as_outer() {
    let (i, dom) = loop_var("i", 4);
    let domains = HashMap::from([(i.id(), dom)]);
    let inner = HashSet::from([i.id()]);
    let analyzer = Analyzer::new();

    let division = subspace_divide(
        &[PrimExpr::int32(5)],
        &[PrimExpr::int32(1)],
        &domains,
        &inner,
        &PrimExpr::true_(),
        &analyzer,
    );
    assert_eq!(division.len(), 2);
    let [outer, inner_mark] = &division[0];
    assert_eq!(outer.source.as_int(), Some(5));
    assert!(inner_mark.extent.is_one());
}

type DivCase = (Vec<Expr>, Vec<Expr>);

#[test]
fn multiple_bindings_all_or_nothing() {
    // One divisible binding and one nonlinear binding fail as a whole.
    let (i, di) = loop_var("i", 8);
    let (j, dj) = loop_var("j", 8);
    let nonlinear = PrimExpr::mul(&PrimExpr::var(&i), &PrimExpr::var(&j));
    let (bindings, extents): DivCase = (
        vec![PrimExpr::var(&i), nonlinear],
        vec![PrimExpr::int32(8), PrimExpr::int32(64)],
    );
    let domains = HashMap::from([(i.id(), di), (j.id(), dj)]);
    let inner = HashSet::from([i.id(), j.id()]);
    let analyzer = Analyzer::new();

    let division =
        subspace_divide(&bindings, &extents, &domains, &inner, &PrimExpr::true_(), &analyzer);
    assert!(division.is_empty());
}
