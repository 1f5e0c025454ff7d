//! # drainq
//!
//! Job trigger server with graceful shutdown. Each trigger fans out into
//! concurrently running work items; on SIGINT/SIGTERM the server stops
//! accepting triggers and refuses to exit until all dispatched work is done.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod jobs;
pub mod model;
pub mod server;
pub mod signal;
pub mod telemetry;
pub mod tracker;
