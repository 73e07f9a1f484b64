/// Monitoring engine module - the periodic measurement tasks
///
/// This module is responsible for:
/// - Probing targets for reachability and latency
/// - Measuring download/upload throughput
/// - Scheduling periodic work with cooperative shutdown
pub mod checker;
pub mod executor;
pub mod scheduler;
pub mod speedtest;
pub mod types;

pub use executor::HealthChecker;
pub use scheduler::{Schedule, spawn_periodic};
pub use speedtest::SpeedProber;
pub use types::TickReport;
