//! Bookshelf - a books HTTP service
//!
//! PostgreSQL is the system of record, a Redis JSON cache sits in front of
//! it, and every change is announced on a Kafka topic.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod service;
pub mod store;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use service::BookService;
pub use tasks::{spawn_event_consumer, ConsumerHandle, ConsumerState};
