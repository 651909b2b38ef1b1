//! The personalized feed retrieval engine.
//!
//! One page request runs `FetchContext -> Tier1 (fresh, faceted) ->
//! Tier2 (global fallback) -> Tier3 (resurfacing)`, where the fallback
//! tiers are only evaluated on shortfall. The context fetches run
//! concurrently; the tiers are strictly sequential because each depends on
//! the exclusion set accumulated by the previous one. A store failure or
//! deadline expiry aborts the remaining tiers and returns whatever was
//! already merged as a degraded partial page.

pub mod cursor;
pub mod planner;
pub mod scoring;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::FeedItem;
use crate::store::{
    CandidateQuery, ItemStore, OwnerScope, SocialGraph, StoreError, StoreResult, ViewLedger,
};
use cursor::PageCursor;
use scoring::{ScoreProfile, Tier};

/// Hard upper bound on a page; requests above it are clamped.
pub const MAX_PAGE_SIZE: usize = 100;

/// One ranked feed entry.
#[derive(Debug, Clone)]
pub struct FeedEntry<I> {
    pub item: I,
    pub score: f64,
    pub tier: Tier,
    /// Owner is followed by (or is) the viewer. Fallback tiers do not
    /// boost on this, but callers display it.
    pub from_followed: bool,
}

/// Result of one page request, including the bookkeeping a caller needs to
/// continue the session.
#[derive(Debug, Clone)]
pub struct FeedPage<I> {
    pub entries: Vec<FeedEntry<I>>,
    /// Amount to add to the cursor's `skip`. Includes facet slots skipped
    /// over when one fresh facet exhausted before its quota.
    pub fresh_consumed: u64,
    /// Rows the resurfacing tier actually returned.
    pub fallback1_returned: u64,
    /// Rows the global fallback tier actually returned.
    pub fallback2_returned: u64,
    pub has_next_page: bool,
    /// A store failure forced a partial page; remaining tiers were skipped.
    pub degraded: bool,
    /// Cursor for the next call, with the increments above already applied.
    pub next_cursor: PageCursor,
}

struct TierOutcome<I> {
    entries: Vec<FeedEntry<I>>,
    /// Ranked candidates left past what this slice consumed; drives
    /// `has_next_page`.
    remaining: usize,
    /// Every candidate id the tier query fetched, consumed or not.
    candidate_ids: Vec<Uuid>,
}

pub struct FeedEngine<S: ItemStore> {
    store: Arc<S>,
    views: Arc<dyn ViewLedger>,
    graph: Arc<dyn SocialGraph>,
    profile: ScoreProfile,
    store_timeout: Duration,
}

impl<S: ItemStore> FeedEngine<S> {
    pub fn new(
        store: Arc<S>,
        views: Arc<dyn ViewLedger>,
        graph: Arc<dyn SocialGraph>,
        profile: ScoreProfile,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            views,
            graph,
            profile,
            store_timeout,
        }
    }

    pub fn profile(&self) -> &ScoreProfile {
        &self.profile
    }

    /// Retrieve one feed page. Never fails outright: parameter problems
    /// clamp, store problems degrade to a partial page.
    pub async fn get_page(
        &self,
        user_id: Uuid,
        limit: usize,
        cursor: PageCursor,
        filter: S::Filter,
    ) -> FeedPage<S::Item> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let plan = planner::plan(limit, self.profile.fresh_ratio, &cursor);
        let now = Utc::now();
        let mut degraded = false;

        // Context fetches are independent reads; run them concurrently.
        let (viewed_res, following_res) = tokio::join!(
            timeout(
                self.store_timeout,
                self.views.viewed_item_ids(
                    user_id,
                    self.profile.viewed_window_days,
                    self.profile.viewed_cap,
                ),
            ),
            timeout(self.store_timeout, self.graph.following_ids(user_id)),
        );

        let viewed: Vec<Uuid> = match flatten_timeout(viewed_res) {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Viewed-set fetch failed for user {}: {}", user_id, e);
                degraded = true;
                vec![]
            }
        };
        let mut followees: HashSet<Uuid> = match flatten_timeout(following_res) {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                warn!("Following fetch failed for user {}: {}", user_id, e);
                degraded = true;
                HashSet::new()
            }
        };
        // Self-authored items surface like followed content.
        followees.insert(user_id);

        let viewed_set: HashSet<Uuid> = viewed.iter().copied().collect();
        let followee_list: Vec<Uuid> = followees.iter().copied().collect();

        let mut entries: Vec<FeedEntry<S::Item>> = Vec::with_capacity(limit);
        let mut selected: HashSet<Uuid> = HashSet::new();
        let mut fresh_pool_ids: HashSet<Uuid> = HashSet::new();
        let mut remaining_total = 0usize;
        let mut aborted = false;

        // Tier 1, follower facet.
        let mut follow_pos = plan.fresh_skip as u64;
        let mut discover_pos = plan.discover_skip as u64;
        match self
            .ranked_slice(
                OwnerScope::In(followee_list.clone()),
                &viewed_set,
                None,
                &filter,
                Tier::Fresh,
                &followees,
                now,
                plan.fresh_skip,
                plan.fresh_quota,
            )
            .await
        {
            Ok(outcome) => {
                follow_pos += outcome.entries.len() as u64;
                remaining_total += outcome.remaining;
                fresh_pool_ids.extend(outcome.candidate_ids.iter().copied());
                for entry in outcome.entries {
                    selected.insert(entry.item.id());
                    entries.push(entry);
                }
            }
            Err(e) => {
                warn!("Fresh follower facet failed for user {}: {}", user_id, e);
                degraded = true;
                aborted = true;
            }
        }

        // Tier 1, discovery facet. Only surfaces with a fresh ratio below
        // 1.0 have one.
        if !aborted && self.profile.fresh_ratio < 1.0 && entries.len() < limit {
            let need = limit - entries.len();
            match self
                .ranked_slice(
                    OwnerScope::NotIn(followee_list.clone()),
                    &viewed_set,
                    None,
                    &filter,
                    Tier::Fresh,
                    &followees,
                    now,
                    plan.discover_skip,
                    need,
                )
                .await
            {
                Ok(outcome) => {
                    discover_pos += outcome.entries.len() as u64;
                    remaining_total += outcome.remaining;
                    fresh_pool_ids.extend(outcome.candidate_ids.iter().copied());
                    for entry in outcome.entries {
                        selected.insert(entry.item.id());
                        entries.push(entry);
                    }
                }
                Err(e) => {
                    warn!("Fresh discovery facet failed for user {}: {}", user_id, e);
                    // A failed facet reports no consumption; serving the
                    // follower rows anyway would advance the skip past
                    // discovery rows that were never delivered.
                    entries.clear();
                    selected.clear();
                    fresh_pool_ids.clear();
                    follow_pos = plan.fresh_skip as u64;
                    degraded = true;
                    aborted = true;
                }
            }
        }

        let next_skip = planner::advance_skip(
            cursor.skip,
            self.profile.fresh_ratio,
            follow_pos,
            discover_pos,
        );
        let fresh_consumed = next_skip - cursor.skip;

        // Tier 2: global fallback. Excludes the whole fetched fresh pool,
        // not just the selected rows, so its ranked sequence stays stable
        // across the pages of a session.
        let mut fallback2_returned = 0u64;
        if !aborted && entries.len() < limit {
            let need = limit - entries.len();
            let mut exclude = viewed_set.clone();
            exclude.extend(fresh_pool_ids.iter().copied());
            exclude.extend(selected.iter().copied());
            match self
                .ranked_slice(
                    OwnerScope::Any,
                    &exclude,
                    None,
                    &filter,
                    Tier::Global,
                    &followees,
                    now,
                    plan.fallback2_skip,
                    need,
                )
                .await
            {
                Ok(outcome) => {
                    fallback2_returned = outcome.entries.len() as u64;
                    remaining_total += outcome.remaining;
                    for entry in outcome.entries {
                        selected.insert(entry.item.id());
                        entries.push(entry);
                    }
                }
                Err(e) => {
                    warn!("Global fallback tier failed for user {}: {}", user_id, e);
                    degraded = true;
                    aborted = true;
                }
            }
        }

        // Tier 3: resurface previously-viewed items once everything fresh
        // has run out.
        let mut fallback1_returned = 0u64;
        let mut resurfacing_ran = false;
        if !aborted && entries.len() < limit && !viewed.is_empty() {
            let need = limit - entries.len();
            let include: Vec<Uuid> = viewed
                .iter()
                .filter(|id| !selected.contains(id))
                .copied()
                .collect();
            if !include.is_empty() {
                resurfacing_ran = true;
                match self
                    .ranked_slice(
                        OwnerScope::Any,
                        &selected,
                        Some(include),
                        &filter,
                        Tier::Resurfaced,
                        &followees,
                        now,
                        plan.fallback1_skip,
                        need,
                    )
                    .await
                {
                    Ok(outcome) => {
                        fallback1_returned = outcome.entries.len() as u64;
                        remaining_total += outcome.remaining;
                        for entry in outcome.entries {
                            selected.insert(entry.item.id());
                            entries.push(entry);
                        }
                    }
                    Err(e) => {
                        warn!("Resurfacing tier failed for user {}: {}", user_id, e);
                        degraded = true;
                    }
                }
            }
        }

        entries.truncate(limit);

        let next_cursor = PageCursor {
            skip: cursor.skip + fresh_consumed,
            fallback1_offset: cursor.fallback1_offset + fallback1_returned,
            fallback2_offset: cursor.fallback2_offset + fallback2_returned,
        };
        // Degraded pages may have content we never got to see; let the
        // caller keep the session open. Viewed ids the resurfacing tier has
        // not yet worked through also keep it open, so a page that fresh
        // content fills exactly does not strand the resurfaceable backlog.
        let unresurfaced =
            (viewed.len() as u64).saturating_sub(next_cursor.fallback1_offset);
        let has_next_page =
            remaining_total > 0 || degraded || (!resurfacing_ran && unresurfaced > 0);

        debug!(
            "Feed page for user {}: entries={} fresh_consumed={} fb1={} fb2={} has_next={} degraded={}",
            user_id,
            entries.len(),
            fresh_consumed,
            fallback1_returned,
            fallback2_returned,
            has_next_page,
            degraded
        );

        FeedPage {
            entries,
            fresh_consumed,
            fallback1_returned,
            fallback2_returned,
            has_next_page,
            degraded,
            next_cursor,
        }
    }

    /// Run one tier query, score and order the candidates, then apply the
    /// tier's engine-side skip/take.
    #[allow(clippy::too_many_arguments)]
    async fn ranked_slice(
        &self,
        owners: OwnerScope,
        exclude: &HashSet<Uuid>,
        include: Option<Vec<Uuid>>,
        filter: &S::Filter,
        tier: Tier,
        followees: &HashSet<Uuid>,
        now: DateTime<Utc>,
        skip: usize,
        take: usize,
    ) -> StoreResult<TierOutcome<S::Item>> {
        if take == 0 {
            return Ok(TierOutcome {
                entries: vec![],
                remaining: 0,
                candidate_ids: vec![],
            });
        }

        let query = CandidateQuery {
            status: crate::models::ItemStatus::Active,
            owners,
            exclude_ids: exclude.iter().copied().collect(),
            include_ids: include,
            filter: filter.clone(),
            max_candidates: self.profile.max_candidates,
        };
        let fetched = match timeout(self.store_timeout, self.store.fetch_candidates(query)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(StoreError::Unavailable(format!(
                    "{} tier query timed out after {:?}",
                    tier.as_str(),
                    self.store_timeout
                )))
            }
        };

        let candidate_ids: Vec<Uuid> = fetched.iter().map(|item| item.id()).collect();
        let mut scored: Vec<(S::Item, f64)> = fetched
            .into_iter()
            .map(|item| {
                let from_followed = followees.contains(&item.owner_id());
                let score = scoring::score(&self.profile, &item, now, tier, from_followed);
                (item, score)
            })
            .collect();
        scoring::sort_ranked(&mut scored);

        let total = scored.len();
        let entries: Vec<FeedEntry<S::Item>> = scored
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|(item, score)| {
                let from_followed = followees.contains(&item.owner_id());
                FeedEntry {
                    item,
                    score,
                    tier,
                    from_followed,
                }
            })
            .collect();
        let remaining = total.saturating_sub(skip + entries.len());

        Ok(TierOutcome {
            entries,
            remaining,
            candidate_ids,
        })
    }
}

fn flatten_timeout<T>(
    result: Result<StoreResult<T>, tokio::time::error::Elapsed>,
) -> StoreResult<T> {
    match result {
        Ok(inner) => inner,
        Err(_) => Err(StoreError::Unavailable("context fetch timed out".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EngagementCounters, ItemStatus, Post, PostFilter};
    use crate::store::{MemoryItemStore, MockSocialGraph, MockViewLedger};
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn post_by(author: Uuid, minutes_ago: i64) -> Post {
        Post {
            id: Uuid::new_v4(),
            author_id: author,
            created_at: Utc::now() - ChronoDuration::minutes(minutes_ago),
            status: ItemStatus::Active,
            counters: EngagementCounters::default(),
            media_type: None,
        }
    }

    fn engine_with(
        store: Arc<MemoryItemStore<Post, PostFilter>>,
        views: Arc<dyn ViewLedger>,
        graph: Arc<dyn SocialGraph>,
    ) -> FeedEngine<MemoryItemStore<Post, PostFilter>> {
        FeedEngine::new(
            store,
            views,
            graph,
            ScoreProfile::posts(),
            Duration::from_secs(2),
        )
    }

    #[tokio::test]
    async fn graph_outage_degrades_instead_of_failing() {
        let user = Uuid::new_v4();
        let store = Arc::new(MemoryItemStore::with_items(vec![
            post_by(Uuid::new_v4(), 10),
            post_by(Uuid::new_v4(), 20),
        ]));

        let mut views = MockViewLedger::new();
        views
            .expect_viewed_item_ids()
            .returning(|_, _, _| Ok(vec![]));
        let mut graph = MockSocialGraph::new();
        graph
            .expect_following_ids()
            .returning(|_| Err(StoreError::Unavailable("graph down".into())));

        let engine = engine_with(store, Arc::new(views), Arc::new(graph));
        let page = engine
            .get_page(user, 10, PageCursor::default(), PostFilter::default())
            .await;

        assert!(page.degraded);
        // Discovery still serves strangers' posts.
        assert_eq!(page.entries.len(), 2);
        assert!(page.entries.iter().all(|e| !e.from_followed));
    }

    #[tokio::test]
    async fn ledger_outage_degrades_to_empty_viewed_set() {
        let user = Uuid::new_v4();
        let store = Arc::new(MemoryItemStore::with_items(vec![post_by(
            Uuid::new_v4(),
            5,
        )]));

        let mut views = MockViewLedger::new();
        views
            .expect_viewed_item_ids()
            .returning(|_, _, _| Err(StoreError::Unavailable("ledger down".into())));
        let mut graph = MockSocialGraph::new();
        graph.expect_following_ids().returning(|_| Ok(vec![]));

        let engine = engine_with(store, Arc::new(views), Arc::new(graph));
        let page = engine
            .get_page(user, 10, PageCursor::default(), PostFilter::default())
            .await;

        assert!(page.degraded);
        assert_eq!(page.entries.len(), 1);
    }

    #[tokio::test]
    async fn item_store_outage_returns_degraded_partial_page() {
        let user = Uuid::new_v4();
        let store: Arc<MemoryItemStore<Post, PostFilter>> =
            Arc::new(MemoryItemStore::with_items(vec![post_by(
                Uuid::new_v4(),
                5,
            )]));
        store.set_failing(true);

        let mut views = MockViewLedger::new();
        views
            .expect_viewed_item_ids()
            .returning(|_, _, _| Ok(vec![]));
        let mut graph = MockSocialGraph::new();
        graph.expect_following_ids().returning(|_| Ok(vec![]));

        let engine = engine_with(store, Arc::new(views), Arc::new(graph));
        let page = engine
            .get_page(user, 10, PageCursor::default(), PostFilter::default())
            .await;

        assert!(page.degraded);
        assert!(page.entries.is_empty());
        // Nothing was consumed, so the cursor must not move.
        assert_eq!(page.next_cursor, PageCursor::default());
        // State unknown; the caller may retry the same cursor.
        assert!(page.has_next_page);
    }

    /// Item store whose discovery-facet queries can be switched off while
    /// follower-facet queries keep working.
    struct FacetFailingStore {
        inner: MemoryItemStore<Post, PostFilter>,
        fail_discovery: AtomicBool,
    }

    #[async_trait]
    impl ItemStore for FacetFailingStore {
        type Item = Post;
        type Filter = PostFilter;

        async fn fetch_candidates(
            &self,
            query: CandidateQuery<PostFilter>,
        ) -> StoreResult<Vec<Post>> {
            if self.fail_discovery.load(Ordering::SeqCst)
                && matches!(&query.owners, OwnerScope::NotIn(_))
            {
                return Err(StoreError::Unavailable("discovery shard down".into()));
            }
            self.inner.fetch_candidates(query).await
        }
    }

    #[tokio::test]
    async fn discovery_facet_outage_does_not_advance_past_unserved_rows() {
        let user = Uuid::new_v4();
        let followed = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let mut posts = Vec::new();
        for i in 0..10 {
            posts.push(post_by(followed, 10 + i));
        }
        for i in 0..10 {
            posts.push(post_by(stranger, 40 + i));
        }
        let store = Arc::new(FacetFailingStore {
            inner: MemoryItemStore::with_items(posts),
            fail_discovery: AtomicBool::new(true),
        });

        let mut views = MockViewLedger::new();
        views
            .expect_viewed_item_ids()
            .returning(|_, _, _| Ok(vec![]));
        let mut graph = MockSocialGraph::new();
        graph
            .expect_following_ids()
            .returning(move |_| Ok(vec![followed]));

        let engine = FeedEngine::new(
            store.clone(),
            Arc::new(views),
            Arc::new(graph),
            ScoreProfile::posts(),
            Duration::from_secs(2),
        );

        let first = engine
            .get_page(user, 10, PageCursor::default(), PostFilter::default())
            .await;
        assert!(first.degraded);
        // The follower rows are withheld and the cursor stays put, so the
        // caller retries the same page instead of skipping over discovery
        // rows that were never served.
        assert!(first.entries.is_empty());
        assert_eq!(first.next_cursor, PageCursor::default());
        assert!(first.has_next_page);

        store.fail_discovery.store(false, Ordering::SeqCst);
        let mut cursor = first.next_cursor;
        let mut seen = HashSet::new();
        for _ in 0..10 {
            let page = engine
                .get_page(user, 10, cursor, PostFilter::default())
                .await;
            for entry in &page.entries {
                seen.insert(entry.item.id());
            }
            if !page.has_next_page {
                break;
            }
            cursor = page.next_cursor;
        }
        assert_eq!(seen.len(), 20, "every item delivered after recovery");
    }

    #[tokio::test]
    async fn zero_limit_is_clamped_to_one() {
        let user = Uuid::new_v4();
        let store = Arc::new(MemoryItemStore::with_items(vec![
            post_by(Uuid::new_v4(), 5),
            post_by(Uuid::new_v4(), 6),
        ]));

        let mut views = MockViewLedger::new();
        views
            .expect_viewed_item_ids()
            .returning(|_, _, _| Ok(vec![]));
        let mut graph = MockSocialGraph::new();
        graph.expect_following_ids().returning(|_| Ok(vec![]));

        let engine = engine_with(store, Arc::new(views), Arc::new(graph));
        let page = engine
            .get_page(user, 0, PageCursor::default(), PostFilter::default())
            .await;

        assert_eq!(page.entries.len(), 1);
    }

    #[tokio::test]
    async fn own_items_count_as_followed() {
        let user = Uuid::new_v4();
        let store = Arc::new(MemoryItemStore::with_items(vec![post_by(user, 5)]));

        let mut views = MockViewLedger::new();
        views
            .expect_viewed_item_ids()
            .returning(|_, _, _| Ok(vec![]));
        let mut graph = MockSocialGraph::new();
        graph.expect_following_ids().returning(|_| Ok(vec![]));

        let engine = engine_with(store, Arc::new(views), Arc::new(graph));
        let page = engine
            .get_page(user, 10, PageCursor::default(), PostFilter::default())
            .await;

        assert_eq!(page.entries.len(), 1);
        assert!(page.entries[0].from_followed);
        assert_eq!(page.entries[0].tier, Tier::Fresh);
    }
}
