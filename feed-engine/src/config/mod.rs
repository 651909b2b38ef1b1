use serde::{Deserialize, Serialize};

use crate::engine::scoring::ScoreProfile;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Feed tuning knobs. The weight profiles default to the empirically-tuned
/// values in `ScoreProfile`; only the commonly adjusted ones are exposed as
/// environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub store_timeout_ms: u64,
    pub posts: ScoreProfile,
    pub listings: ScoreProfile,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let mut posts = ScoreProfile::posts();
        posts.fresh_ratio = env_parse("FEED_POSTS_FRESH_RATIO", posts.fresh_ratio);
        posts.follower_boost = env_parse("FEED_FOLLOWER_BOOST", posts.follower_boost);
        posts.max_candidates = env_parse("FEED_MAX_CANDIDATES", posts.max_candidates);
        posts.viewed_window_days = env_parse("FEED_VIEWED_WINDOW_DAYS", posts.viewed_window_days);
        posts.viewed_cap = env_parse("FEED_VIEWED_CAP", posts.viewed_cap);

        let mut listings = ScoreProfile::listings();
        listings.fresh_ratio = env_parse("FEED_LISTINGS_FRESH_RATIO", listings.fresh_ratio);
        listings.follower_boost = posts.follower_boost;
        listings.max_candidates = posts.max_candidates;
        listings.viewed_window_days = posts.viewed_window_days;
        listings.viewed_cap = posts.viewed_cap;

        Ok(Config {
            app: AppConfig {
                env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                port: std::env::var("APP_PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()?,
                log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")?,
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
            },
            feed: FeedConfig {
                store_timeout_ms: env_parse("FEED_STORE_TIMEOUT_MS", 2000),
                posts,
                listings,
            },
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
