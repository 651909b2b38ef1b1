pub mod feed;
pub mod listings;

pub use feed::{get_post_feed, mark_viewed, FeedHandlerState};
pub use listings::{get_listing_feed, ListingHandlerState};

use actix_web::HttpRequest;
use uuid::Uuid;

use crate::error::AppError;

/// Viewer identity arrives from the authenticating proxy as a header;
/// authentication itself is outside this service.
pub(crate) fn require_user_id(req: &HttpRequest) -> Result<Uuid, AppError> {
    req.headers()
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| AppError::BadRequest("Missing or invalid X-User-Id header".to_string()))
}
