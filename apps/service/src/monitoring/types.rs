use serde::Serialize;

/// What one health-check tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub probed: usize,
    pub up: usize,
    pub down: usize,
    /// Records that reached the store; lower than `probed` only on write failures
    pub persisted: usize,
}
