//! Storage seams for the feed engine.
//!
//! The engine treats its backends as dumb filter+sort+paginate providers:
//! the item store returns newest-first candidate windows, the view ledger
//! answers "what has this user already seen", and the social graph answers
//! "who does this user follow". All scoring, skipping and merging happens
//! in engine code, so everything here is swappable and the engine is
//! testable against the in-memory backend.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{FeedItem, ItemFilter, ItemStatus, ViewRecord};

pub use memory::{MemoryItemStore, MemorySocialGraph, MemoryViewLedger};
pub use postgres::{PgListingStore, PgPostStore, PgSocialGraph, PgViewLedger};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    Query(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Owner membership predicate for a candidate query.
#[derive(Debug, Clone)]
pub enum OwnerScope {
    Any,
    In(Vec<Uuid>),
    NotIn(Vec<Uuid>),
}

/// One tier's query against the item store.
///
/// The store applies the predicates, orders by `(created_at desc, id desc)`
/// and caps the result at `max_candidates`. It never scores or skips; that
/// is the engine's job.
#[derive(Debug, Clone)]
pub struct CandidateQuery<F> {
    pub status: ItemStatus,
    pub owners: OwnerScope,
    pub exclude_ids: Vec<Uuid>,
    /// When set, restricts candidates to this id set (the resurfacing tier
    /// queries within the viewed set).
    pub include_ids: Option<Vec<Uuid>>,
    pub filter: F,
    pub max_candidates: usize,
}

#[async_trait]
pub trait ItemStore: Send + Sync {
    type Item: FeedItem;
    type Filter: ItemFilter<Self::Item>;

    /// Fetch a newest-first candidate window matching the query.
    async fn fetch_candidates(
        &self,
        query: CandidateQuery<Self::Filter>,
    ) -> StoreResult<Vec<Self::Item>>;
}

/// Durable record of which items a user has already been shown.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ViewLedger: Send + Sync {
    /// Ids the user has viewed within the window, newest first, capped to
    /// protect the size of exclusion lists.
    async fn viewed_item_ids(
        &self,
        user_id: Uuid,
        within_days: i64,
        cap: usize,
    ) -> StoreResult<Vec<Uuid>>;

    /// Idempotent upsert keyed on `(user, item)`. Repeat views refresh the
    /// timestamp and escalate the engagement score instead of duplicating.
    async fn mark_viewed(&self, user_id: Uuid, item_id: Uuid) -> StoreResult<ViewRecord>;
}

/// Read-only view of the follow-edge relation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SocialGraph: Send + Sync {
    async fn following_ids(&self, user_id: Uuid) -> StoreResult<Vec<Uuid>>;
}
