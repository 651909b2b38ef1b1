use std::sync::Arc;

use actix_web::{get, web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::engine::cursor::PageCursor;
use crate::engine::scoring::Tier;
use crate::engine::{FeedEngine, MAX_PAGE_SIZE};
use crate::error::Result;
use crate::metrics;
use crate::models::{FeedResponse, ListingFilter, PetListing};
use crate::store::PgListingStore;

use super::feed::{next_cursor_token, tier_counts};
use super::require_user_id;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingQueryParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    pub cursor: Option<String>,
    pub species: Option<String>,
    pub min_price_cents: Option<i64>,
    pub max_price_cents: Option<i64>,
    pub vaccinated: Option<bool>,
}

fn default_limit() -> u32 {
    20
}

pub struct ListingHandlerState {
    pub engine: Arc<FeedEngine<PgListingStore>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingView {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub score: f64,
    pub tier: Tier,
    pub from_followed: bool,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub species: String,
    pub price_cents: i64,
    pub vaccinated: bool,
}

#[get("")]
pub async fn get_listing_feed(
    query: web::Query<ListingQueryParams>,
    http_req: HttpRequest,
    state: web::Data<ListingHandlerState>,
) -> Result<HttpResponse> {
    let user_id = require_user_id(&http_req)?;
    let limit = (query.limit as usize).clamp(1, MAX_PAGE_SIZE);
    let cursor = PageCursor::decode(query.cursor.as_deref());
    let filter = ListingFilter {
        species: query.species.clone(),
        min_price_cents: query.min_price_cents,
        max_price_cents: query.max_price_cents,
        vaccinated: query.vaccinated,
    };

    debug!(
        "Listing feed request: user={} limit={} cursor={:?} species={:?}",
        user_id, limit, cursor, filter.species
    );

    let page = state.engine.get_page(user_id, limit, cursor, filter).await;

    let (fresh, global, resurfaced) = tier_counts(&page);
    metrics::observe_feed_page("listings", page.degraded, fresh, global, resurfaced);

    let cursor = next_cursor_token(&page);
    let items: Vec<ListingView> = page
        .entries
        .iter()
        .map(|entry| {
            let listing: &PetListing = &entry.item;
            ListingView {
                id: listing.id,
                seller_id: listing.seller_id,
                created_at: listing.created_at,
                score: entry.score,
                tier: entry.tier,
                from_followed: entry.from_followed,
                view_count: listing.counters.views,
                like_count: listing.counters.likes,
                comment_count: listing.counters.comments,
                species: listing.species.clone(),
                price_cents: listing.price_cents,
                vaccinated: listing.vaccinated,
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
