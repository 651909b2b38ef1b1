//! Postgres adapters for the storage traits.
//!
//! Plain runtime queries in the repository style used across the platform:
//! explicit binds, tuple rows, errors logged and mapped to `StoreError`.
//! Dynamic membership predicates are assembled with `QueryBuilder`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::error;
use uuid::Uuid;

use crate::models::{
    EngagementCounters, ItemStatus, ListingFilter, PetListing, Post, PostFilter, ViewRecord,
};
use crate::store::{
    CandidateQuery, ItemStore, OwnerScope, SocialGraph, StoreError, StoreResult, ViewLedger,
};

fn push_owner_scope(qb: &mut QueryBuilder<'_, Postgres>, column: &str, owners: &OwnerScope) {
    match owners {
        OwnerScope::Any => {}
        OwnerScope::In(ids) => {
            qb.push(format!(" AND {} = ANY(", column));
            qb.push_bind(ids.clone());
            qb.push(")");
        }
        OwnerScope::NotIn(ids) => {
            if !ids.is_empty() {
                qb.push(format!(" AND {} <> ALL(", column));
                qb.push_bind(ids.clone());
                qb.push(")");
            }
        }
    }
}

fn push_id_sets(qb: &mut QueryBuilder<'_, Postgres>, exclude: &[Uuid], include: &Option<Vec<Uuid>>) {
    if !exclude.is_empty() {
        qb.push(" AND id <> ALL(");
        qb.push_bind(exclude.to_vec());
        qb.push(")");
    }
    if let Some(ids) = include {
        qb.push(" AND id = ANY(");
        qb.push_bind(ids.clone());
        qb.push(")");
    }
}

pub struct PgPostStore {
    pool: PgPool,
}

impl PgPostStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ItemStore for PgPostStore {
    type Item = Post;
    type Filter = PostFilter;

    async fn fetch_candidates(
        &self,
        query: CandidateQuery<Self::Filter>,
    ) -> StoreResult<Vec<Post>> {
        // An empty IN set can never match; skip the round trip.
        if matches!(&query.owners, OwnerScope::In(ids) if ids.is_empty()) {
            return Ok(vec![]);
        }
        if matches!(&query.include_ids, Some(ids) if ids.is_empty()) {
            return Ok(vec![]);
        }

        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "SELECT id, author_id, created_at, status, views_count, likes_count, \
             comments_count, media_type FROM posts WHERE status = ",
        );
        qb.push_bind(query.status.as_str().to_string());
        push_owner_scope(&mut qb, "author_id", &query.owners);
        push_id_sets(&mut qb, &query.exclude_ids, &query.include_ids);
        if let Some(media_type) = &query.filter.media_type {
            qb.push(" AND media_type = ");
            qb.push_bind(media_type.clone());
        }
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        qb.push_bind(query.max_candidates as i64);

        let rows: Vec<(
            Uuid,
            Uuid,
            DateTime<Utc>,
            String,
            i64,
            i64,
            i64,
            Option<String>,
        )> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Post candidate query failed: {}", e);
                StoreError::Unavailable(e.to_string())
            })?;

        Ok(rows
            .into_iter()
            .map(
                |(id, author_id, created_at, status, views, likes, comments, media_type)| Post {
                    id,
                    author_id,
                    created_at,
                    status: ItemStatus::parse(&status),
                    counters: EngagementCounters {
                        views,
                        likes,
                        comments,
                    },
                    media_type,
                },
            )
            .collect())
    }
}

pub struct PgListingStore {
    pool: PgPool,
}

impl PgListingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ItemStore for PgListingStore {
    type Item = PetListing;
    type Filter = ListingFilter;

    async fn fetch_candidates(
        &self,
        query: CandidateQuery<Self::Filter>,
    ) -> StoreResult<Vec<PetListing>> {
        if matches!(&query.owners, OwnerScope::In(ids) if ids.is_empty()) {
            return Ok(vec![]);
        }
        if matches!(&query.include_ids, Some(ids) if ids.is_empty()) {
            return Ok(vec![]);
        }

        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "SELECT id, seller_id, created_at, status, views_count, likes_count, \
             comments_count, species, price_cents, vaccinated \
             FROM pet_listings WHERE status = ",
        );
        qb.push_bind(query.status.as_str().to_string());
        push_owner_scope(&mut qb, "seller_id", &query.owners);
        push_id_sets(&mut qb, &query.exclude_ids, &query.include_ids);
        if let Some(species) = &query.filter.species {
            qb.push(" AND LOWER(species) = LOWER(");
            qb.push_bind(species.clone());
            qb.push(")");
        }
        if let Some(min) = query.filter.min_price_cents {
            qb.push(" AND price_cents >= ");
            qb.push_bind(min);
        }
        if let Some(max) = query.filter.max_price_cents {
            qb.push(" AND price_cents <= ");
            qb.push_bind(max);
        }
        if let Some(vaccinated) = query.filter.vaccinated {
            qb.push(" AND vaccinated = ");
            qb.push_bind(vaccinated);
        }
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        qb.push_bind(query.max_candidates as i64);

        let rows: Vec<(
            Uuid,
            Uuid,
            DateTime<Utc>,
            String,
            i64,
            i64,
            i64,
            String,
            i64,
            bool,
        )> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Listing candidate query failed: {}", e);
                StoreError::Unavailable(e.to_string())
            })?;

        Ok(rows
            .into_iter()
            .map(
                |(
                    id,
                    seller_id,
                    created_at,
                    status,
                    views,
                    likes,
                    comments,
                    species,
                    price_cents,
                    vaccinated,
                )| PetListing {
                    id,
                    seller_id,
                    created_at,
                    status: ItemStatus::parse(&status),
                    counters: EngagementCounters {
                        views,
                        likes,
                        comments,
                    },
                    species,
                    price_cents,
                    vaccinated,
                },
            )
            .collect())
    }
}

pub struct PgViewLedger {
    pool: PgPool,
}

impl PgViewLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ViewLedger for PgViewLedger {
    async fn viewed_item_ids(
        &self,
        user_id: Uuid,
        within_days: i64,
        cap: usize,
    ) -> StoreResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT item_id
            FROM item_views
            WHERE user_id = $1
                AND viewed_at >= NOW() - make_interval(days => $2)
            ORDER BY viewed_at DESC, item_id DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(within_days as i32)
        .bind(cap as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Viewed-set query failed for user {}: {}", user_id, e);
            StoreError::Unavailable(e.to_string())
        })?;

        Ok(ids)
    }

    async fn mark_viewed(&self, user_id: Uuid, item_id: Uuid) -> StoreResult<ViewRecord> {
        let row = sqlx::query_as::<_, (Uuid, Uuid, DateTime<Utc>, i32, bool)>(
            r#"
            INSERT INTO item_views (user_id, item_id, viewed_at, engagement_score, interacted)
            VALUES ($1, $2, NOW(), 1, FALSE)
            ON CONFLICT (user_id, item_id) DO UPDATE
                SET viewed_at = NOW(),
                    engagement_score = item_views.engagement_score + 1
            RETURNING user_id, item_id, viewed_at, engagement_score, interacted
            "#,
        )
        .bind(user_id)
        .bind(item_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Mark-viewed upsert failed for user {}: {}", user_id, e);
            StoreError::Query(e.to_string())
        })?;

        let (user_id, item_id, viewed_at, engagement_score, interacted) = row;
        Ok(ViewRecord {
            user_id,
            item_id,
            viewed_at,
            engagement_score,
            interacted,
        })
    }
}

pub struct PgSocialGraph {
    pool: PgPool,
}

impl PgSocialGraph {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SocialGraph for PgSocialGraph {
    async fn following_ids(&self, user_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT followee_id FROM follows WHERE follower_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Following query failed for user {}: {}", user_id, e);
            StoreError::Unavailable(e.to_string())
        })?;

        Ok(ids)
    }
}
