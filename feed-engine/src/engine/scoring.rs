//! Pure scoring policy.
//!
//! `score` is a function of the item, the clock and the tier only; no I/O
//! and no randomness. Identical inputs always produce identical ranks,
//! which is what keeps multi-call pagination stable. Fallback tiers break
//! ties with a jitter term derived from the immutable item id instead of a
//! random draw.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::FeedItem;

/// Which retrieval tier an entry was selected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Primary ranked retrieval excluding previously-viewed items.
    Fresh,
    /// Global fallback over never-seen items, invoked on shortfall.
    Global,
    /// Previously-viewed items resurfaced when everything else runs out.
    Resurfaced,
}

impl Tier {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Fresh => "fresh",
            Self::Global => "global",
            Self::Resurfaced => "resurfaced",
        }
    }
}

/// Tunable ranking weights for one feed surface.
///
/// The defaults mirror the empirically-tuned production values; none of
/// them is a contract, and all can be overridden through configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreProfile {
    /// Share of a page reserved for followed-owner content in the fresh
    /// tier. 1.0 disables the discovery facet entirely.
    pub fresh_ratio: f64,
    /// Linear recency decay window: an item this many hours old has zero
    /// recency component.
    pub recency_base_hours: f64,
    pub view_weight: f64,
    pub like_weight: f64,
    pub comment_weight: f64,
    /// Flat boost applied to followed-owner items in the fresh tier.
    pub follower_boost: f64,
    /// Modulus for the deterministic tie-break jitter on fallback tiers.
    pub jitter_modulus: u64,
    /// Cap on the engagement component in fallback tiers, so cold-start
    /// pages are not dominated by a handful of viral items.
    pub fallback_engagement_cap: f64,
    /// Multiplier applied to resurfaced items so they rank below anything
    /// fresh.
    pub resurface_damp: f64,
    /// Upper bound on candidates fetched per tier query. Also bounds how
    /// deep a paging session can go.
    pub max_candidates: usize,
    /// Look-back window for the viewed-item exclusion set.
    pub viewed_window_days: i64,
    /// Cap on the viewed-item exclusion set size.
    pub viewed_cap: usize,
}

impl ScoreProfile {
    /// Post feed: half the page reserved for followed authors, the rest
    /// open for discovery.
    pub fn posts() -> Self {
        Self {
            fresh_ratio: 0.5,
            recency_base_hours: 168.0,
            view_weight: 0.5,
            like_weight: 2.0,
            comment_weight: 3.0,
            follower_boost: 1000.0,
            jitter_modulus: 10,
            fallback_engagement_cap: 50.0,
            resurface_damp: 0.25,
            max_candidates: 500,
            viewed_window_days: 30,
            viewed_cap: 1000,
        }
    }

    /// Pet listings: follower content fills the whole fresh tier; there is
    /// no discovery facet.
    pub fn listings() -> Self {
        Self {
            fresh_ratio: 1.0,
            ..Self::posts()
        }
    }
}

/// Deterministic tie-break derived from the immutable item id.
pub fn jitter(item_id: Uuid, modulus: u64) -> f64 {
    if modulus == 0 {
        return 0.0;
    }
    (item_id.as_u128() % modulus as u128) as f64
}

/// Rank an item for one tier. Higher is better.
pub fn score<I: FeedItem>(
    profile: &ScoreProfile,
    item: &I,
    now: DateTime<Utc>,
    tier: Tier,
    from_followed: bool,
) -> f64 {
    let age_hours = (now - item.created_at()).num_minutes().max(0) as f64 / 60.0;
    let recency = (profile.recency_base_hours - age_hours).max(0.0);

    let counters = item.counters();
    let engagement = counters.views as f64 * profile.view_weight
        + counters.likes as f64 * profile.like_weight
        + counters.comments as f64 * profile.comment_weight;

    match tier {
        Tier::Fresh => {
            let boost = if from_followed {
                profile.follower_boost
            } else {
                0.0
            };
            recency + engagement + boost
        }
        Tier::Global => {
            recency
                + engagement.min(profile.fallback_engagement_cap)
                + jitter(item.id(), profile.jitter_modulus)
        }
        Tier::Resurfaced => {
            (recency + engagement.min(profile.fallback_engagement_cap)) * profile.resurface_damp
                + jitter(item.id(), profile.jitter_modulus)
        }
    }
}

/// Sort scored items by `(score desc, created_at desc, id desc)`.
///
/// The two trailing keys make the order strict and total, so engine-side
/// skip/limit over the sequence is stable even when many items tie on
/// score.
pub fn sort_ranked<I: FeedItem>(scored: &mut [(I, f64)]) {
    scored.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| b.0.created_at().cmp(&a.0.created_at()))
            .then_with(|| b.0.id().cmp(&a.0.id()))
    });
}
