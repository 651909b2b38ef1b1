use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a content item. Only `Active` items are feed-eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Active,
    Hidden,
    Deleted,
}

impl ItemStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "active",
            Self::Hidden => "hidden",
            Self::Deleted => "deleted",
        }
    }

    /// Parse a stored status string; unknown values are treated as hidden so
    /// they never leak into a feed.
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => Self::Active,
            "deleted" => Self::Deleted,
            _ => Self::Hidden,
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Denormalized engagement counts used as ranking signals. Read-only from
/// the feed engine's perspective; incremented by external write paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementCounters {
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
}

/// Anything the feed engine can rank and paginate. Both social posts and
/// pet listings implement this; the engine is written once against it.
pub trait FeedItem: Clone + Send + Sync + 'static {
    fn id(&self) -> Uuid;
    fn owner_id(&self) -> Uuid;
    fn created_at(&self) -> DateTime<Utc>;
    fn status(&self) -> ItemStatus;
    fn counters(&self) -> &EngagementCounters;
}

/// Attribute filter a caller passes through unchanged into every tier query.
pub trait ItemFilter<I>: Clone + Send + Sync + 'static {
    fn matches(&self, item: &I) -> bool;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub status: ItemStatus,
    pub counters: EngagementCounters,
    pub media_type: Option<String>,
}

impl FeedItem for Post {
    fn id(&self) -> Uuid {
        self.id
    }

    fn owner_id(&self) -> Uuid {
        self.author_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn status(&self) -> ItemStatus {
        self.status
    }

    fn counters(&self) -> &EngagementCounters {
        &self.counters
    }
}

/// Attribute filter for the post feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostFilter {
    pub media_type: Option<String>,
}

impl ItemFilter<Post> for PostFilter {
    fn matches(&self, item: &Post) -> bool {
        match &self.media_type {
            Some(mt) => item.media_type.as_deref() == Some(mt.as_str()),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PetListing {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub status: ItemStatus,
    pub counters: EngagementCounters,
    pub species: String,
    pub price_cents: i64,
    pub vaccinated: bool,
}

impl FeedItem for PetListing {
    fn id(&self) -> Uuid {
        self.id
    }

    fn owner_id(&self) -> Uuid {
        self.seller_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn status(&self) -> ItemStatus {
        self.status
    }

    fn counters(&self) -> &EngagementCounters {
        &self.counters
    }
}

/// Attribute filter for the pet-listing feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingFilter {
    pub species: Option<String>,
    pub min_price_cents: Option<i64>,
    pub max_price_cents: Option<i64>,
    pub vaccinated: Option<bool>,
}

impl ItemFilter<PetListing> for ListingFilter {
    fn matches(&self, item: &PetListing) -> bool {
        if let Some(species) = &self.species {
            if !item.species.eq_ignore_ascii_case(species) {
                return false;
            }
        }
        if let Some(min) = self.min_price_cents {
            if item.price_cents < min {
                return false;
            }
        }
        if let Some(max) = self.max_price_cents {
            if item.price_cents > max {
                return false;
            }
        }
        if let Some(vaccinated) = self.vaccinated {
            if item.vaccinated != vaccinated {
                return false;
            }
        }
        true
    }
}

/// Record of a user having been shown an item. Unique per `(user, item)`;
/// repeat views update the row instead of duplicating it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewRecord {
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub viewed_at: DateTime<Utc>,
    pub engagement_score: i32,
    pub interacted: bool,
}

/// Feed response envelope returned by the HTTP surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedResponse<T: Serialize> {
    pub items: Vec<T>,
    /// Opaque continuation cursor; absent when the session is exhausted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    pub has_more: bool,
    /// True when a store failure forced a partial page.
    pub degraded: bool,
}
