//! upwatch - single-node uptime and bandwidth monitor.
//!
//! The engine probes a fixed set of targets, measures throughput, keeps both as time series
//! in an embedded database and answers aggregate queries on demand.

pub mod aggregator;
pub mod config;
pub mod database;
pub mod monitoring;
pub mod orchestrator;
pub mod pool;
pub mod targets;

pub use aggregator::{Aggregator, SummaryStat, UptimeByLatency};
pub use config::Config;
pub use orchestrator::{Engine, EngineHandle};
