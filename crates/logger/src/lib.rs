//! Process-wide `tracing` subscriber setup shared by the upwatch binaries.

mod subscriber;

pub use subscriber::{LogFormat, init, init_with_level};
