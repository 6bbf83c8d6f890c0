//! Property tests for binding derivation.
//!
//! Whatever the factor extents, the substitution of an original iterator is
//! one of `0`, `outer`, `inner`, or `outer * inner_extent + inner`, and the
//! produced iterator lists stay consistent with the division.

use loft_arith::IterMark;
use loft_dtype::DType;
use loft_ir::{IterType, IterVar, PrimExpr, Range, Var};
use proptest::prelude::*;

use crate::blockize::derive_block_binding;

proptest! {
    #[test]
    fn substitution_shapes(
        outer_extent in 1i64..32,
        inner_extent in 1i64..32,
        preserve_unit_iters: bool,
    ) {
        let outer_src = Var::new("o", DType::Int32);
        let inner_src = Var::new("n", DType::Int32);
        let vi = Var::new("vi", DType::Int32);

        let iter_vars = vec![IterVar::new(
            Range::from_extent(&PrimExpr::int32(outer_extent * inner_extent)),
            vi.clone(),
            IterType::DataPar,
        )];
        let division = vec![
            [
                IterMark::new(PrimExpr::var(&outer_src), PrimExpr::int32(outer_extent)),
                IterMark::new(PrimExpr::var(&inner_src), PrimExpr::int32(inner_extent)),
            ],
            [
                IterMark::predicate(PrimExpr::true_()),
                IterMark::predicate(PrimExpr::true_()),
            ],
        ];

        let mut outer_iter_vars = Vec::new();
        let mut outer_bindings = Vec::new();
        let mut inner_iter_vars = Vec::new();
        let mut inner_bindings = Vec::new();
        let subst = derive_block_binding(
            &iter_vars,
            &division,
            &mut outer_iter_vars,
            &mut outer_bindings,
            &mut inner_iter_vars,
            &mut inner_bindings,
            preserve_unit_iters,
            false,
        );

        // One outer iterator always exists and carries the source binding.
        prop_assert_eq!(outer_iter_vars.len(), 1);
        prop_assert_eq!(outer_bindings.len(), 1);
        prop_assert_eq!(outer_iter_vars[0].var.name.as_str(), "vi_o");
        prop_assert_eq!(
            outer_bindings[0].as_var().unwrap().id(),
            outer_src.id()
        );
        prop_assert_eq!(outer_iter_vars[0].dom.extent.as_int(), Some(outer_extent));

        // Inner iterators exist exactly for non-unit inner factors.
        prop_assert_eq!(inner_iter_vars.len(), usize::from(inner_extent > 1));

        let substitution = subst.get(&vi.id()).expect("every iter var is substituted");
        match (inner_extent > 1, outer_extent > 1) {
            (false, false) => {
                if preserve_unit_iters {
                    prop_assert_eq!(
                        substitution.as_var().unwrap().id(),
                        outer_iter_vars[0].var.id()
                    );
                } else {
                    prop_assert!(substitution.is_zero());
                }
            }
            (false, true) => {
                prop_assert_eq!(
                    substitution.as_var().unwrap().id(),
                    outer_iter_vars[0].var.id()
                );
            }
            (true, false) => {
                prop_assert_eq!(
                    substitution.as_var().unwrap().id(),
                    inner_iter_vars[0].var.id()
                );
            }
            (true, true) => {
                // outer * inner_extent + inner
                let loft_ir::PrimExpr::Binary { op: loft_ir::BinOp::Add, lhs, rhs } =
                    &**substitution
                else {
                    return Err(TestCaseError::fail("expected an affine recomposition"));
                };
                prop_assert_eq!(
                    rhs.as_var().unwrap().id(),
                    inner_iter_vars[0].var.id()
                );
                let loft_ir::PrimExpr::Binary { op: loft_ir::BinOp::Mul, lhs: base, rhs: scale } =
                    &**lhs
                else {
                    return Err(TestCaseError::fail("expected a scaled outer iterator"));
                };
                prop_assert_eq!(
                    base.as_var().unwrap().id(),
                    outer_iter_vars[0].var.id()
                );
                prop_assert_eq!(scale.as_int(), Some(inner_extent));
            }
        }
    }
}
