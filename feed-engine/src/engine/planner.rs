//! Tier planning and skip bookkeeping.
//!
//! The planner turns a page request plus the caller's cursor into per-tier
//! quotas and skip offsets. The fresh tier's two facets share the single
//! cumulative `skip`, split proportionally by the profile's fresh ratio;
//! the fallback tiers keep independent offsets that only advance when the
//! tier actually ran.

use crate::engine::cursor::PageCursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPlan {
    /// Rows of the page reserved for the followed-owner facet.
    pub fresh_quota: usize,
    /// Skip into the followed-owner facet's ranked sequence.
    pub fresh_skip: usize,
    /// Skip into the discovery facet's ranked sequence (the remainder of
    /// the cumulative skip).
    pub discover_skip: usize,
    /// Skip for the resurfacing tier.
    pub fallback1_skip: usize,
    /// Skip for the global fallback tier.
    pub fallback2_skip: usize,
}

fn fresh_skip_for(skip: u64, fresh_ratio: f64) -> u64 {
    (skip as f64 * fresh_ratio).round() as u64
}

pub fn plan(limit: usize, fresh_ratio: f64, cursor: &PageCursor) -> TierPlan {
    let ratio = fresh_ratio.clamp(0.0, 1.0);
    let fresh_skip = fresh_skip_for(cursor.skip, ratio);
    // The follower facet's share of the next `limit` slots, taken from the
    // same proportional split that divides the cumulative skip. Deriving
    // both from one function keeps facet positions aligned with the cursor
    // page after page; a fixed per-page rounding would slowly drift.
    let fresh_quota = (fresh_skip_for(cursor.skip + limit as u64, ratio) - fresh_skip) as usize;
    TierPlan {
        fresh_quota,
        fresh_skip: fresh_skip as usize,
        discover_skip: cursor.skip.saturating_sub(fresh_skip) as usize,
        fallback1_skip: cursor.fallback1_offset as usize,
        fallback2_skip: cursor.fallback2_offset as usize,
    }
}

/// Compute the next cumulative `skip` after a page consumed the fresh tier
/// up to `follow_pos` in the follower facet and `discover_pos` in the
/// discovery facet.
///
/// The returned value is the smallest skip whose proportional split lands
/// at or past both facet positions. When a facet under-fills its quota the
/// split cannot land exactly on both positions; advancing past an exhausted
/// facet's position only skips slots that facet can no longer fill, which
/// keeps the session free of repeats.
pub fn advance_skip(skip: u64, fresh_ratio: f64, follow_pos: u64, discover_pos: u64) -> u64 {
    let ratio = fresh_ratio.clamp(0.0, 1.0);
    let mut next = skip;
    loop {
        let fresh = fresh_skip_for(next, ratio);
        if fresh >= follow_pos && next - fresh >= discover_pos {
            return next;
        }
        next += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(skip: u64, f1: u64, f2: u64) -> PageCursor {
        PageCursor {
            skip,
            fallback1_offset: f1,
            fallback2_offset: f2,
        }
    }

    #[test]
    fn half_ratio_splits_page_and_skip() {
        let plan = plan(10, 0.5, &cursor(20, 0, 0));
        assert_eq!(plan.fresh_quota, 5);
        assert_eq!(plan.fresh_skip, 10);
        assert_eq!(plan.discover_skip, 10);
    }

    #[test]
    fn full_ratio_reserves_whole_page_for_followers() {
        let plan = plan(10, 1.0, &cursor(30, 0, 0));
        assert_eq!(plan.fresh_quota, 10);
        assert_eq!(plan.fresh_skip, 30);
        assert_eq!(plan.discover_skip, 0);
    }

    #[test]
    fn fallback_offsets_pass_through_untouched() {
        let plan = plan(10, 0.5, &cursor(0, 7, 11));
        assert_eq!(plan.fallback1_skip, 7);
        assert_eq!(plan.fallback2_skip, 11);
    }

    #[test]
    fn ratio_is_clamped() {
        let plan = plan(10, 2.0, &cursor(4, 0, 0));
        assert_eq!(plan.fresh_quota, 10);
        assert_eq!(plan.fresh_skip, 4);
    }

    #[test]
    fn advance_matches_exact_proportional_consumption() {
        // Both facets fill their share: skip advances by exactly the total.
        let next = advance_skip(0, 0.5, 5, 5);
        assert_eq!(next, 10);
        let again = advance_skip(next, 0.5, 10, 10);
        assert_eq!(again, 20);
    }

    #[test]
    fn advance_overshoots_an_exhausted_facet() {
        // Follower facet exhausted at 3 rows, discovery consumed 5. The
        // next skip must put the discovery position at >= 5 even if the
        // follower position overshoots its dead list.
        let next = advance_skip(0, 0.5, 3, 5);
        let fresh = (next as f64 * 0.5).round() as u64;
        assert!(fresh >= 3);
        assert!(next - fresh >= 5);

        // Splitting the new skip never points discovery before row 5, so
        // nothing returned on the first page can repeat.
        let plan = plan(10, 0.5, &cursor(next, 0, 0));
        assert!(plan.discover_skip >= 5);
    }

    #[test]
    fn advance_is_identity_when_nothing_was_consumed() {
        let plan0 = plan(10, 0.5, &cursor(9, 0, 0));
        let next = advance_skip(
            9,
            0.5,
            plan0.fresh_skip as u64,
            plan0.discover_skip as u64,
        );
        assert_eq!(next, 9);
    }

    #[test]
    fn advance_handles_edge_ratios() {
        assert_eq!(advance_skip(4, 1.0, 7, 0), 7);
        assert_eq!(advance_skip(4, 0.0, 0, 9), 9);
    }
}
