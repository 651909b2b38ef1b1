//! In-memory backend.
//!
//! Deterministic reference implementation of the storage traits. This is
//! what the engine's tests run against instead of a live database; the
//! item store also carries a failure switch so degraded-page behavior can
//! be exercised.

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::models::{FeedItem, ItemFilter, ViewRecord};
use crate::store::{
    CandidateQuery, ItemStore, OwnerScope, SocialGraph, StoreError, StoreResult, ViewLedger,
};

pub struct MemoryItemStore<I, F> {
    items: RwLock<Vec<I>>,
    fail_queries: AtomicBool,
    _filter: PhantomData<F>,
}

impl<I: FeedItem, F> MemoryItemStore<I, F> {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            fail_queries: AtomicBool::new(false),
            _filter: PhantomData,
        }
    }

    pub fn with_items(items: Vec<I>) -> Self {
        let store = Self::new();
        *store.items.write().expect("item store lock poisoned") = items;
        store
    }

    pub fn insert(&self, item: I) {
        self.items.write().expect("item store lock poisoned").push(item);
    }

    /// Make subsequent queries fail with `StoreError::Unavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.fail_queries.store(failing, Ordering::SeqCst);
    }
}

impl<I: FeedItem, F> Default for MemoryItemStore<I, F> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<I, F> ItemStore for MemoryItemStore<I, F>
where
    I: FeedItem,
    F: ItemFilter<I>,
{
    type Item = I;
    type Filter = F;

    async fn fetch_candidates(
        &self,
        query: CandidateQuery<Self::Filter>,
    ) -> StoreResult<Vec<Self::Item>> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "memory item store switched to failing".to_string(),
            ));
        }

        let exclude: HashSet<Uuid> = query.exclude_ids.iter().copied().collect();
        let include: Option<HashSet<Uuid>> = query
            .include_ids
            .as_ref()
            .map(|ids| ids.iter().copied().collect());

        let items = self.items.read().expect("item store lock poisoned");
        let mut matched: Vec<I> = items
            .iter()
            .filter(|item| item.status() == query.status)
            .filter(|item| match &query.owners {
                OwnerScope::Any => true,
                OwnerScope::In(ids) => ids.contains(&item.owner_id()),
                OwnerScope::NotIn(ids) => !ids.contains(&item.owner_id()),
            })
            .filter(|item| !exclude.contains(&item.id()))
            .filter(|item| match &include {
                Some(ids) => ids.contains(&item.id()),
                None => true,
            })
            .filter(|item| query.filter.matches(item))
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(&a.id()))
        });
        matched.truncate(query.max_candidates);
        Ok(matched)
    }
}

#[derive(Default)]
pub struct MemoryViewLedger {
    records: RwLock<HashMap<(Uuid, Uuid), ViewRecord>>,
}

impl MemoryViewLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_count(&self) -> usize {
        self.records.read().expect("view ledger lock poisoned").len()
    }
}

#[async_trait]
impl ViewLedger for MemoryViewLedger {
    async fn viewed_item_ids(
        &self,
        user_id: Uuid,
        within_days: i64,
        cap: usize,
    ) -> StoreResult<Vec<Uuid>> {
        let horizon = Utc::now() - Duration::days(within_days);
        let records = self.records.read().expect("view ledger lock poisoned");
        let mut recent: Vec<&ViewRecord> = records
            .values()
            .filter(|r| r.user_id == user_id && r.viewed_at >= horizon)
            .collect();
        recent.sort_by(|a, b| {
            b.viewed_at
                .cmp(&a.viewed_at)
                .then_with(|| b.item_id.cmp(&a.item_id))
        });
        Ok(recent.into_iter().take(cap).map(|r| r.item_id).collect())
    }

    async fn mark_viewed(&self, user_id: Uuid, item_id: Uuid) -> StoreResult<ViewRecord> {
        let mut records = self.records.write().expect("view ledger lock poisoned");
        let record = records
            .entry((user_id, item_id))
            .and_modify(|r| {
                r.viewed_at = Utc::now();
                r.engagement_score += 1;
            })
            .or_insert_with(|| ViewRecord {
                user_id,
                item_id,
                viewed_at: Utc::now(),
                engagement_score: 1,
                interacted: false,
            });
        Ok(record.clone())
    }
}

#[derive(Default)]
pub struct MemorySocialGraph {
    edges: RwLock<HashSet<(Uuid, Uuid)>>,
}

impl MemorySocialGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a follow edge. Self-follows and duplicates are ignored.
    pub fn follow(&self, follower: Uuid, followee: Uuid) {
        if follower == followee {
            return;
        }
        self.edges
            .write()
            .expect("social graph lock poisoned")
            .insert((follower, followee));
    }

    pub fn unfollow(&self, follower: Uuid, followee: Uuid) {
        self.edges
            .write()
            .expect("social graph lock poisoned")
            .remove(&(follower, followee));
    }
}

#[async_trait]
impl SocialGraph for MemorySocialGraph {
    async fn following_ids(&self, user_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let edges = self.edges.read().expect("social graph lock poisoned");
        let mut ids: Vec<Uuid> = edges
            .iter()
            .filter(|(follower, _)| *follower == user_id)
            .map(|(_, followee)| *followee)
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EngagementCounters, ItemStatus, Post, PostFilter};

    fn post(created_minutes_ago: i64) -> Post {
        Post {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            created_at: Utc::now() - Duration::minutes(created_minutes_ago),
            status: ItemStatus::Active,
            counters: EngagementCounters::default(),
            media_type: None,
        }
    }

    #[tokio::test]
    async fn fetch_orders_newest_first_and_caps() {
        let store: MemoryItemStore<Post, PostFilter> = MemoryItemStore::new();
        store.insert(post(30));
        store.insert(post(10));
        store.insert(post(20));

        let got = store
            .fetch_candidates(CandidateQuery {
                status: ItemStatus::Active,
                owners: OwnerScope::Any,
                exclude_ids: vec![],
                include_ids: None,
                filter: PostFilter::default(),
                max_candidates: 2,
            })
            .await
            .unwrap();

        assert_eq!(got.len(), 2);
        assert!(got[0].created_at > got[1].created_at);
    }

    #[tokio::test]
    async fn mark_viewed_is_idempotent_upsert() {
        let ledger = MemoryViewLedger::new();
        let user = Uuid::new_v4();
        let item = Uuid::new_v4();

        let first = ledger.mark_viewed(user, item).await.unwrap();
        let second = ledger.mark_viewed(user, item).await.unwrap();

        assert_eq!(ledger.record_count(), 1);
        assert_eq!(first.engagement_score, 1);
        assert_eq!(second.engagement_score, 2);
        assert!(second.viewed_at >= first.viewed_at);
    }

    #[tokio::test]
    async fn self_follow_is_rejected() {
        let graph = MemorySocialGraph::new();
        let user = Uuid::new_v4();
        graph.follow(user, user);
        assert!(graph.following_ids(user).await.unwrap().is_empty());
    }
}
