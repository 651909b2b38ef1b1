pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod store;

pub use config::Config;
pub use engine::cursor::PageCursor;
pub use engine::scoring::{ScoreProfile, Tier};
pub use engine::{FeedEngine, FeedEntry, FeedPage, MAX_PAGE_SIZE};
pub use error::{AppError, Result};
