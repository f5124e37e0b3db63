//! # cityleague-import
//!
//! Queue-driven importer for City League tournament results.
//!
//! A producer publishes the day's official events onto a message queue. The
//! consumer drains the queue with a bounded worker pool: each worker fetches
//! an event's results, mirrors deck images into object storage, and records
//! every result in Postgres idempotently before acknowledging the message.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod imaging;
pub mod model;
pub mod queue;
pub mod retry;
pub mod store;
pub mod telemetry;
pub mod upstream;
