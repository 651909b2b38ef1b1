use std::io;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use actix_web::{dev::Service, web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feed_engine::handlers::{
    get_listing_feed, get_post_feed, mark_viewed, FeedHandlerState, ListingHandlerState,
};
use feed_engine::store::{PgListingStore, PgPostStore, PgSocialGraph, PgViewLedger};
use feed_engine::store::{SocialGraph, ViewLedger};
use feed_engine::{Config, FeedEngine};

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true),
        )
        .init();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Configuration loading failed: {:#}", e);
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting feed-engine v{}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.app.env);

    let pool = match PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Database pool creation failed: {:#}", e);
            eprintln!("ERROR: Failed to create database pool: {}", e);
            std::process::exit(1);
        }
    };

    let store_timeout = Duration::from_millis(config.feed.store_timeout_ms);
    let views: Arc<dyn ViewLedger> = Arc::new(PgViewLedger::new(pool.clone()));
    let graph: Arc<dyn SocialGraph> = Arc::new(PgSocialGraph::new(pool.clone()));

    let post_engine = Arc::new(FeedEngine::new(
        Arc::new(PgPostStore::new(pool.clone())),
        views.clone(),
        graph.clone(),
        config.feed.posts.clone(),
        store_timeout,
    ));
    let listing_engine = Arc::new(FeedEngine::new(
        Arc::new(PgListingStore::new(pool.clone())),
        views.clone(),
        graph.clone(),
        config.feed.listings.clone(),
        store_timeout,
    ));

    let feed_state = web::Data::new(FeedHandlerState {
        engine: post_engine,
        views: views.clone(),
    });
    let listing_state = web::Data::new(ListingHandlerState {
        engine: listing_engine,
    });
    info!("Feed engines initialized for posts and pet listings");

    HttpServer::new(move || {
        App::new()
            .app_data(feed_state.clone())
            .app_data(listing_state.clone())
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/api/v1/health", web::get().to(|| async { "OK" }))
            .route("/metrics", web::get().to(feed_engine::metrics::serve_metrics))
            .wrap_fn(|req, srv| {
                let method = req.method().to_string();
                let path = req
                    .match_pattern()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| req.path().to_string());
                let start = Instant::now();

                let fut = srv.call(req);
                async move {
                    match fut.await {
                        Ok(res) => {
                            feed_engine::metrics::observe_http_request(
                                &method,
                                &path,
                                res.status().as_u16(),
                                start.elapsed(),
                            );
                            Ok(res)
                        }
                        Err(err) => {
                            feed_engine::metrics::observe_http_request(
                                &method,
                                &path,
                                500,
                                start.elapsed(),
                            );
                            Err(err)
                        }
                    }
                }
            })
            .service(
                web::scope("/api/v1/feed")
                    .service(get_post_feed)
                    .service(mark_viewed),
            )
            .service(web::scope("/api/v1/listings/feed").service(get_listing_feed))
    })
    .bind(format!("0.0.0.0:{}", config.app.port))?
    .run()
    .await
}
