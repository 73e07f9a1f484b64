//! Automatic retention of time-series data.
//!
//! - Check results: removed once older than the configured horizon (default 90 days)
//! - Speed tests: kept forever unless a horizon is configured
//!
//! Pruning runs as a periodic background task; a failed pass is logged and retried on the
//! next tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::RetentionSettings;
use crate::database::models::Collection;
use crate::database::{Store, StoreResult};

/// Retention horizons per collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub checks: Duration,
    pub speed_tests: Option<Duration>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from(&RetentionSettings::default())
    }
}

impl From<&RetentionSettings> for RetentionPolicy {
    fn from(settings: &RetentionSettings) -> Self {
        Self { checks: settings.check_retention(), speed_tests: settings.speedtest_retention() }
    }
}

/// `now - horizon`, saturating at the earliest representable instant
fn cutoff_for(now: DateTime<Utc>, horizon: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(horizon)
        .ok()
        .and_then(|horizon| now.checked_sub_signed(horizon))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// What one retention pass removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub checks_cutoff: DateTime<Utc>,
    pub checks_removed: u64,
    /// `None` when speed-test retention is disabled
    pub speedtests_removed: Option<u64>,
}

/// Deletes expired records
pub struct RetentionPruner {
    store: Arc<dyn Store>,
    policy: RetentionPolicy,
}

impl RetentionPruner {
    pub fn new(store: Arc<dyn Store>, policy: RetentionPolicy) -> Self {
        Self { store, policy }
    }

    /// Run one pass relative to `now`
    pub async fn prune_at(&self, now: DateTime<Utc>) -> StoreResult<PruneReport> {
        let checks_cutoff = cutoff_for(now, self.policy.checks);
        let checks_removed = self.store.delete_older_than(Collection::Checks, checks_cutoff).await?;

        let speedtests_removed = match self.policy.speed_tests {
            Some(horizon) => Some(
                self.store
                    .delete_older_than(Collection::SpeedTests, cutoff_for(now, horizon))
                    .await?,
            ),
            None => None,
        };

        Ok(PruneReport { checks_cutoff, checks_removed, speedtests_removed })
    }

    /// One scheduled tick: prune relative to the wall clock and log the outcome
    pub async fn run_once(&self) {
        match self.prune_at(Utc::now()).await {
            Ok(report) => info!(
                cutoff = %report.checks_cutoff.to_rfc3339(),
                checks_removed = report.checks_removed,
                speedtests_removed = ?report.speedtests_removed,
                "Pruned expired entries"
            ),
            Err(e) => warn!(error = %e, "Failed to prune old entries"),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::database::models::{CheckRecord, CheckStatus, Order, RangeQuery, SpeedRecord};
    use crate::database::test_support::create_test_store;

    const DAY: Duration = Duration::from_secs(24 * 3600);

    #[test]
    fn policy_follows_settings() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.checks, 90 * DAY);
        assert_eq!(policy.speed_tests, None);

        let settings = RetentionSettings { speedtest_retention_days: Some(365), ..Default::default() };
        assert_eq!(RetentionPolicy::from(&settings).speed_tests, Some(365 * DAY));
    }

    #[test]
    fn cutoff_saturates_for_huge_horizons() {
        let now = Utc::now();
        assert_eq!(cutoff_for(now, Duration::from_secs(u64::MAX)), DateTime::<Utc>::MIN_UTC);
        assert_eq!(cutoff_for(now, DAY), now - ChronoDuration::days(1));
    }

    #[tokio::test]
    async fn prunes_only_checks_older_than_the_horizon() -> anyhow::Result<()> {
        let (store, _dir) = create_test_store().await?;
        let now = Utc::now();
        let ages_days = [0, 10, 29, 31, 100];

        for age in ages_days {
            store
                .append_check(&CheckRecord::new("https://a.test", CheckStatus::Up, age).at(now - ChronoDuration::days(age)))
                .await?;
            store
                .append_speed_test(&SpeedRecord {
                    timestamp: now - ChronoDuration::days(age),
                    download_mbps: 1.0,
                    upload_mbps: 1.0,
                    latency_ms: age,
                })
                .await?;
        }

        let pruner = RetentionPruner::new(store.clone(), RetentionPolicy { checks: 30 * DAY, speed_tests: None });
        let report = pruner.prune_at(now).await?;
        assert_eq!(report.checks_removed, 2);
        assert_eq!(report.speedtests_removed, None);

        let all = RangeQuery::new(now - ChronoDuration::days(365), now + ChronoDuration::days(1)).order(Order::Ascending);
        let left: Vec<i64> = store.query_checks(&all).await?.iter().map(|r| r.latency_ms).collect();
        assert_eq!(left, vec![29, 10, 0]);
        assert_eq!(store.query_speed_tests(&all).await?.len(), 5);
        Ok(())
    }

    #[tokio::test]
    async fn prunes_speed_tests_when_configured() -> anyhow::Result<()> {
        let (store, _dir) = create_test_store().await?;
        let now = Utc::now();
        for age in [1, 400] {
            store
                .append_speed_test(&SpeedRecord {
                    timestamp: now - ChronoDuration::days(age),
                    download_mbps: 50.0,
                    upload_mbps: 10.0,
                    latency_ms: 20,
                })
                .await?;
        }

        let pruner =
            RetentionPruner::new(store.clone(), RetentionPolicy { checks: 30 * DAY, speed_tests: Some(365 * DAY) });
        let report = pruner.prune_at(now).await?;
        assert_eq!(report.speedtests_removed, Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn prune_on_empty_store_is_a_no_op() -> anyhow::Result<()> {
        let (store, _dir) = create_test_store().await?;
        let pruner = RetentionPruner::new(store, RetentionPolicy::default());
        assert_eq!(pruner.prune_at(Utc::now()).await?.checks_removed, 0);
        pruner.run_once().await;
        Ok(())
    }
}
