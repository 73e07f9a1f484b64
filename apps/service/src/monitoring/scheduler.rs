use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

/// Fixed-interval schedule for one periodic task
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub name: &'static str,
    pub period: Duration,
    /// Run a tick right away instead of waiting one period first
    pub run_immediately: bool,
}

impl Schedule {
    pub fn every(name: &'static str, period: Duration) -> Self {
        Self { name, period, run_immediately: true }
    }

    pub fn after_first_period(mut self) -> Self {
        self.run_immediately = false;
        self
    }
}

/// Spawn `job` on `schedule` until `shutdown` fires (or its sender is dropped).
///
/// A tick that is still running when shutdown arrives is dropped mid-flight. Ticks never
/// overlap: a slow tick pushes the next one back instead of queueing a burst.
pub fn spawn_periodic<F, Fut>(
    schedule: Schedule,
    mut shutdown: broadcast::Receiver<()>,
    mut job: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut timer = interval(schedule.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if !schedule.run_immediately {
            timer.tick().await;
        }

        info!(task = schedule.name, period_secs = schedule.period.as_secs(), "Periodic task started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = async {
                    timer.tick().await;
                    debug!(task = schedule.name, "Tick");
                    job().await;
                } => {}
            }
        }

        info!(task = schedule.name, "Periodic task shutting down");
    })
}
