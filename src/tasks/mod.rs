//! Background Tasks Module
//!
//! Contains tasks that run for the lifetime of the server.
//!
//! # Tasks
//! - Event consumer: reads book change notifications and hands them to a handler

mod consumer;

pub use consumer::{
    spawn_event_consumer, spawn_event_consumer_with, ConsumerHandle, ConsumerOptions,
    ConsumerState, ConsumerStatus, EventHandler, LoggingHandler,
};
