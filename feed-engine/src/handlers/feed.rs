use std::sync::Arc;

use actix_web::{get, post, web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::engine::cursor::PageCursor;
use crate::engine::scoring::Tier;
use crate::engine::{FeedEngine, FeedPage, MAX_PAGE_SIZE};
use crate::error::Result;
use crate::metrics;
use crate::models::{FeedResponse, Post, PostFilter};
use crate::store::{PgPostStore, ViewLedger};

use super::require_user_id;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedQueryParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    pub cursor: Option<String>,
    pub media_type: Option<String>,
}

fn default_limit() -> u32 {
    20
}

pub struct FeedHandlerState {
    pub engine: Arc<FeedEngine<PgPostStore>>,
    pub views: Arc<dyn ViewLedger>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPostView {
    pub id: Uuid,
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub score: f64,
    pub tier: Tier,
    pub from_followed: bool,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

/// Count entries per tier for metrics.
pub(crate) fn tier_counts<I>(page: &FeedPage<I>) -> (u64, u64, u64) {
    let mut fresh = 0;
    let mut global = 0;
    let mut resurfaced = 0;
    for entry in &page.entries {
        match entry.tier {
            Tier::Fresh => fresh += 1,
            Tier::Global => global += 1,
            Tier::Resurfaced => resurfaced += 1,
        }
    }
    (fresh, global, resurfaced)
}

pub(crate) fn next_cursor_token<I>(page: &FeedPage<I>) -> Option<String> {
    if page.has_next_page {
        Some(page.next_cursor.encode())
    } else {
        None
    }
}

#[get("")]
pub async fn get_post_feed(
    query: web::Query<FeedQueryParams>,
    http_req: HttpRequest,
    state: web::Data<FeedHandlerState>,
) -> Result<HttpResponse> {
    let user_id = require_user_id(&http_req)?;
    let limit = (query.limit as usize).clamp(1, MAX_PAGE_SIZE);
    let cursor = PageCursor::decode(query.cursor.as_deref());
    let filter = PostFilter {
        media_type: query.media_type.clone(),
    };

    debug!(
        "Post feed request: user={} limit={} cursor={:?}",
        user_id, limit, cursor
    );

    let page = state.engine.get_page(user_id, limit, cursor, filter).await;

    let (fresh, global, resurfaced) = tier_counts(&page);
    metrics::observe_feed_page("posts", page.degraded, fresh, global, resurfaced);

    let cursor = next_cursor_token(&page);
    let items: Vec<FeedPostView> = page
        .entries
        .iter()
        .map(|entry| {
            let post: &Post = &entry.item;
            FeedPostView {
                id: post.id,
                author_id: post.author_id,
                created_at: post.created_at,
                score: entry.score,
                tier: entry.tier,
                from_followed: entry.from_followed,
                view_count: post.counters.views,
                like_count: post.counters.likes,
                comment_count: post.counters.comments,
                media_type: post.media_type.clone(),
            }
        })
        .collect();

    Ok(HttpResponse::Ok().json(FeedResponse {
        items,
        cursor,
        has_more: page.has_next_page,
        degraded: page.degraded,
    }))
}

/// Sibling write path to page retrieval: record that the viewer was shown
/// an item. Safe to call repeatedly; the ledger upserts by `(user, item)`.
#[post("/viewed/{item_id}")]
pub async fn mark_viewed(
    path: web::Path<Uuid>,
    http_req: HttpRequest,
    state: web::Data<FeedHandlerState>,
) -> Result<HttpResponse> {
    let user_id = require_user_id(&http_req)?;
    let item_id = path.into_inner();

    let record = state.views.mark_viewed(user_id, item_id).await?;
    Ok(HttpResponse::Ok().json(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FeedEntry;
    use crate::models::{EngagementCounters, ItemStatus};

    fn page_with_tiers(tiers: &[Tier], has_next: bool) -> FeedPage<Post> {
        FeedPage {
            entries: tiers
                .iter()
                .map(|t| FeedEntry {
                    item: Post {
                        id: Uuid::new_v4(),
                        author_id: Uuid::new_v4(),
                        created_at: Utc::now(),
                        status: ItemStatus::Active,
                        counters: EngagementCounters::default(),
                        media_type: None,
                    },
                    score: 1.0,
                    tier: *t,
                    from_followed: false,
                })
                .collect(),
            fresh_consumed: 0,
            fallback1_returned: 0,
            fallback2_returned: 0,
            has_next_page: has_next,
            degraded: false,
            next_cursor: PageCursor {
                skip: 3,
                fallback1_offset: 0,
                fallback2_offset: 1,
            },
        }
    }

    #[test]
    fn tier_counts_split_by_tier() {
        let page = page_with_tiers(&[Tier::Fresh, Tier::Fresh, Tier::Global, Tier::Resurfaced], true);
        assert_eq!(tier_counts(&page), (2, 1, 1));
    }

    #[test]
    fn cursor_token_absent_when_session_exhausted() {
        let exhausted = page_with_tiers(&[Tier::Fresh], false);
        assert!(next_cursor_token(&exhausted).is_none());

        let open = page_with_tiers(&[Tier::Fresh], true);
        let token = next_cursor_token(&open).expect("cursor expected");
        assert_eq!(PageCursor::decode(Some(&token)), open.next_cursor);
    }
}
