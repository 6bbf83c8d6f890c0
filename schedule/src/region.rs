//! Buffer region relaxation and union.

use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use loft_arith::{Analyzer, IntSet, eval_set};
use loft_ir::{Buffer, BufferRegion, PrimExpr, Range};

/// Iterator domains to relax over, keyed by var id.
pub type DomMap = HashMap<u64, IntSet>;

/// Relax each region over the domain map, clamping every dimension to the
/// buffer's full extent when no bound is derivable.
pub fn eval_set_regions(
    regions: &[BufferRegion],
    dom: &DomMap,
    analyzer: &Analyzer,
) -> Vec<BufferRegion> {
    regions
        .iter()
        .map(|buffer_region| {
            let buffer = &buffer_region.buffer;
            debug_assert_eq!(buffer_region.region.len(), buffer.ndim());
            let new_region = buffer_region
                .region
                .iter()
                .zip(&buffer.shape)
                .map(|(range, dim)| {
                    let last = PrimExpr::sub(
                        &PrimExpr::add(&range.min, &range.extent),
                        &PrimExpr::one(range.extent.dtype()),
                    );
                    let min_set = eval_set(&range.min, dom, analyzer);
                    let max_set = eval_set(&analyzer.simplify(&last), dom, analyzer);
                    let combined = match (min_set, max_set) {
                        (
                            IntSet::Interval { min, .. },
                            IntSet::Interval { max, .. },
                        ) => IntSet::interval(min, max),
                        _ => IntSet::Everything,
                    };
                    combined.cover_range(&Range::from_extent(dim), analyzer)
                })
                .collect();
            BufferRegion::new(buffer.clone(), new_region)
        })
        .collect()
}

/// Union regions per buffer, preserving first-seen buffer order, and
/// materialize every dimension as `[min, max + 1)` after simplification.
pub fn union_regions(regions: &[BufferRegion]) -> Vec<BufferRegion> {
    let analyzer = Analyzer::new();
    let mut grouped: IndexMap<u64, (Rc<Buffer>, Vec<Vec<IntSet>>)> = IndexMap::new();
    for buffer_region in regions {
        let buffer = &buffer_region.buffer;
        let entry = grouped
            .entry(buffer.id())
            .or_insert_with(|| (buffer.clone(), vec![Vec::new(); buffer.ndim()]));
        for (dim, range) in buffer_region.region.iter().enumerate() {
            entry.1[dim].push(IntSet::from_range(range, &analyzer));
        }
    }
    grouped
        .into_values()
        .map(|(buffer, dims)| {
            let region = dims
                .iter()
                .enumerate()
                .map(|(dim, sets)| match IntSet::union(sets, &analyzer) {
                    IntSet::Interval { min, max } => {
                        let min = analyzer.simplify(&min);
                        let end = analyzer
                            .simplify(&PrimExpr::add(&max, &PrimExpr::one(max.dtype())));
                        let extent = analyzer.simplify_sub(&end, &min);
                        Range::new(min, extent)
                    }
                    IntSet::Everything => Range::from_extent(&buffer.shape[dim]),
                })
                .collect();
            BufferRegion::new(buffer, region)
        })
        .collect()
}
