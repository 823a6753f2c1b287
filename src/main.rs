//! Bookshelf - a books HTTP service
//!
//! PostgreSQL is the system of record, a Redis JSON cache sits in front of
//! it, and every change is announced on a Kafka topic.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bookshelf::api::{create_router, AppState};
use bookshelf::cache::RedisBookCache;
use bookshelf::config::Config;
use bookshelf::events::{KafkaEventSource, KafkaPublisher};
use bookshelf::service::BookService;
use bookshelf::store::PgBookStore;
use bookshelf::tasks::{spawn_event_consumer, ConsumerHandle, LoggingHandler};

/// Main entry point for the books service.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Connect the store, cache and event publisher
/// 4. Start the background event consumer
/// 5. Serve HTTP until SIGINT/SIGTERM, then stop the consumer
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookshelf=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting books service");

    let config = Config::from_env();
    info!(?config, "Configuration loaded");

    let store = PgBookStore::connect(&config.postgres)
        .await
        .context("failed to connect to PostgreSQL")?;
    let cache = RedisBookCache::connect(&config.redis)
        .await
        .context("failed to connect to Redis")?;
    let publisher = KafkaPublisher::new(&config.kafka).context("failed to create Kafka producer")?;

    let service = BookService::new(
        Arc::new(store),
        Arc::new(cache),
        Arc::new(publisher),
        config.kafka.topic.clone(),
    );

    let consumer = spawn_event_consumer(
        Arc::new(KafkaEventSource::new(&config.kafka)),
        config.kafka.topic.clone(),
        config.kafka.group_id.clone(),
        Arc::new(LoggingHandler),
    );
    info!(topic = %config.kafka.topic, group = %config.kafka.group_id, "Event consumer started");

    let app = create_router(AppState::new(service));

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(consumer))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then stops the consumer.
async fn shutdown_signal(consumer: ConsumerHandle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    consumer.shutdown().await;
}
