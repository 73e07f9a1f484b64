//! On-demand statistics over a trailing window.
//!
//! Two distinct notions of uptime live here and are never mixed:
//! - reachability uptime ([`SummaryStat`]): share of checks whose probe succeeded
//! - latency (SLA) uptime ([`UptimeByLatency`]): share of checks answered within a threshold
//!
//! Latency recorded for a failed probe is the time until the probe gave up. It is not a
//! response time, so failed checks are left out of the average latency. Latency uptime looks
//! at `latency_ms` alone and counts every check in the window, whatever its status.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::QuerySettings;
use crate::database::models::{CheckRecord, RangeQuery, SpeedRecord, StorageFootprint};
use crate::database::{Store, StoreResult};
use crate::targets::TargetRegistry;

/// Reachability statistics for one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStat {
    pub target: String,
    pub uptime_pct: f64,
    /// `None` (JSON `null`) when no reachable check exists in the window
    pub avg_latency_ms: Option<f64>,
    pub total_checks: usize,
}

/// Latency-threshold statistics for one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UptimeByLatency {
    pub target: String,
    pub uptime_pct: f64,
    pub total_checks: usize,
    pub window_hours: f64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 { 0.0 } else { round2(100.0 * part as f64 / total as f64) }
}

/// Reachability summary over an already-windowed set of checks for one target.
///
/// An empty set yields `uptime_pct = 0.0` and `avg_latency_ms = None`.
pub fn summarize(target: &str, records: &[CheckRecord]) -> SummaryStat {
    let reachable: Vec<i64> =
        records.iter().filter(|r| r.status.is_up()).map(|r| r.latency_ms).collect();

    let avg_latency_ms = if reachable.is_empty() {
        None
    } else {
        Some(round2(reachable.iter().sum::<i64>() as f64 / reachable.len() as f64))
    };

    SummaryStat {
        target: target.to_string(),
        uptime_pct: percentage(reachable.len(), records.len()),
        avg_latency_ms,
        total_checks: records.len(),
    }
}

/// Latency uptime over an already-windowed set of checks for one target:
/// `100 * count(latency_ms <= threshold) / total`
pub fn latency_uptime(
    target: &str,
    records: &[CheckRecord],
    threshold_ms: i64,
    window: Duration,
) -> UptimeByLatency {
    let within = records.iter().filter(|r| r.latency_ms <= threshold_ms).count();

    UptimeByLatency {
        target: target.to_string(),
        uptime_pct: percentage(within, records.len()),
        total_checks: records.len(),
        window_hours: window.as_secs_f64() / 3600.0,
    }
}

/// Stateless query front-end over the store
pub struct Aggregator {
    store: Arc<dyn Store>,
    targets: Arc<TargetRegistry>,
    settings: QuerySettings,
}

impl Aggregator {
    pub fn new(store: Arc<dyn Store>, targets: Arc<TargetRegistry>, settings: QuerySettings) -> Self {
        Self { store, targets, settings }
    }

    /// `[now - window, now]`; the end is nudged forward so a record stamped exactly `now`
    /// is included by the store's exclusive upper bound
    fn window_query(window: Duration) -> RangeQuery {
        let now = Utc::now();
        let span = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
        let start = now.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC);
        RangeQuery::new(start, now + chrono::Duration::milliseconds(1))
    }

    async fn target_checks(&self, target: &str, window: Duration) -> StoreResult<Vec<CheckRecord>> {
        self.store.query_checks(&Self::window_query(window).target(target)).await
    }

    /// Most recent checks across every target, newest first, capped at the status page size
    pub async fn status_snapshot(&self, window: Duration) -> StoreResult<Vec<CheckRecord>> {
        self.store
            .query_checks(&Self::window_query(window).limit(self.settings.status_page_size))
            .await
    }

    pub async fn summary(&self, target: &str, window: Duration) -> StoreResult<SummaryStat> {
        let records = self.target_checks(target, window).await?;
        Ok(summarize(target, &records))
    }

    /// [`Self::summary`] for every registered target, in registry order
    pub async fn summaries(&self, window: Duration) -> StoreResult<Vec<SummaryStat>> {
        let mut summaries = Vec::with_capacity(self.targets.len());
        for target in self.targets.iter() {
            summaries.push(self.summary(target, window).await?);
        }
        Ok(summaries)
    }

    pub async fn uptime_by_latency(
        &self,
        target: &str,
        window: Duration,
        threshold_ms: i64,
    ) -> StoreResult<UptimeByLatency> {
        let records = self.target_checks(target, window).await?;
        Ok(latency_uptime(target, &records, threshold_ms, window))
    }

    /// [`Self::uptime_by_latency`] for every registered target, in registry order
    pub async fn uptime_by_latency_all(
        &self,
        window: Duration,
        threshold_ms: i64,
    ) -> StoreResult<Vec<UptimeByLatency>> {
        let mut results = Vec::with_capacity(self.targets.len());
        for target in self.targets.iter() {
            results.push(self.uptime_by_latency(target, window, threshold_ms).await?);
        }
        Ok(results)
    }

    /// Most recent speed tests, newest first, capped at the speed-test page size
    pub async fn recent_speed_tests(&self, window: Duration) -> StoreResult<Vec<SpeedRecord>> {
        self.store
            .query_speed_tests(&Self::window_query(window).limit(self.settings.speedtest_page_size))
            .await
    }

    pub async fn storage_footprint(&self) -> StoreResult<StorageFootprint> {
        Ok(StorageFootprint { size_bytes: self.store.size_bytes().await? })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::database::models::CheckStatus;
    use crate::database::test_support::create_test_store;

    const HOUR: Duration = Duration::from_secs(3600);

    fn checks(samples: &[(CheckStatus, i64)]) -> Vec<CheckRecord> {
        samples.iter().map(|&(status, latency)| CheckRecord::new("t", status, latency)).collect()
    }

    #[test]
    fn three_of_four_up_is_75_percent() {
        use CheckStatus::{Down, Up};
        let stat = summarize("t", &checks(&[(Up, 100), (Up, 200), (Up, 300), (Down, 10_000)]));

        assert_eq!(stat.uptime_pct, 75.0);
        assert_eq!(stat.total_checks, 4);
        // The failed probe's time-to-failure is not a response time.
        assert_eq!(stat.avg_latency_ms, Some(200.0));
    }

    #[test]
    fn latency_threshold_counts_checks_at_or_below() {
        use CheckStatus::Up;
        let records = checks(&[(Up, 100), (Up, 200), (Up, 300), (Up, 240)]);
        let stat = latency_uptime("t", &records, 250, HOUR);

        assert_eq!(stat.uptime_pct, 75.0);
        assert_eq!(stat.total_checks, 4);
        assert_eq!(stat.window_hours, 1.0);

        let inclusive = latency_uptime("t", &records, 240, HOUR);
        assert_eq!(inclusive.uptime_pct, 75.0);
    }

    #[test]
    fn latency_uptime_ignores_reachability_status() {
        use CheckStatus::{Down, Up};
        let records = checks(&[(Up, 100), (Up, 200), (Up, 300), (Down, 240)]);
        let stat = latency_uptime("t", &records, 250, HOUR);
        assert_eq!(stat.uptime_pct, 75.0);
        assert_eq!(stat.total_checks, 4);

        // Same checks, different question: only three of four were reachable.
        assert_eq!(summarize("t", &records).uptime_pct, 75.0);
        let slow_but_up = latency_uptime("t", &checks(&[(Up, 900), (Down, 3)]), 250, HOUR);
        assert_eq!(slow_but_up.uptime_pct, 50.0);
    }

    #[test]
    fn empty_window_yields_sentinels() {
        let stat = summarize("t", &[]);
        assert_eq!(stat.uptime_pct, 0.0);
        assert_eq!(stat.avg_latency_ms, None);
        assert_eq!(stat.total_checks, 0);

        let json = serde_json::to_value(&stat).unwrap();
        assert!(json["avg_latency_ms"].is_null());

        let sla = latency_uptime("t", &[], 250, Duration::from_secs(90 * 60));
        assert_eq!(sla.uptime_pct, 0.0);
        assert_eq!(sla.window_hours, 1.5);
    }

    #[test]
    fn all_down_has_null_average() {
        let stat = summarize("t", &checks(&[(CheckStatus::Down, 5_000)]));
        assert_eq!(stat.uptime_pct, 0.0);
        assert_eq!(stat.avg_latency_ms, None);
    }

    #[test]
    fn percentages_are_rounded_to_two_decimals() {
        use CheckStatus::{Down, Up};
        let stat = summarize("t", &checks(&[(Up, 1), (Up, 2), (Down, 0)]));
        assert_eq!(stat.uptime_pct, 66.67);
        assert_eq!(stat.avg_latency_ms, Some(1.5));
    }

    async fn seeded() -> anyhow::Result<(Aggregator, Arc<crate::database::LibsqlStore>, tempfile::TempDir)> {
        let (store, dir) = create_test_store().await?;
        let targets = Arc::new(TargetRegistry::from_csv("https://a.test,https://b.test,https://idle.test")?);
        let now = Utc::now();

        let samples = [
            ("https://a.test", CheckStatus::Up, 100, 1),
            ("https://a.test", CheckStatus::Up, 200, 2),
            ("https://a.test", CheckStatus::Up, 300, 3),
            ("https://a.test", CheckStatus::Down, 900, 4),
            ("https://b.test", CheckStatus::Up, 40, 5),
            // Outside a one-hour window
            ("https://a.test", CheckStatus::Down, 1, 120),
            ("https://b.test", CheckStatus::Down, 1, 180),
        ];
        for (target, status, latency, minutes_ago) in samples {
            store
                .append_check(&CheckRecord::new(target, status, latency).at(now - ChronoDuration::minutes(minutes_ago)))
                .await?;
        }

        let settings = QuerySettings { status_page_size: 3, speedtest_page_size: 2, ..QuerySettings::default() };
        Ok((Aggregator::new(store.clone(), targets, settings), store, dir))
    }

    #[tokio::test]
    async fn summaries_cover_every_target_in_registry_order() -> anyhow::Result<()> {
        let (aggregator, _store, _dir) = seeded().await?;
        let summaries = aggregator.summaries(HOUR).await?;

        let targets: Vec<&str> = summaries.iter().map(|s| s.target.as_str()).collect();
        assert_eq!(targets, ["https://a.test", "https://b.test", "https://idle.test"]);

        assert_eq!(summaries[0].uptime_pct, 75.0);
        assert_eq!(summaries[0].total_checks, 4);
        assert_eq!(summaries[0].avg_latency_ms, Some(200.0));
        assert_eq!(summaries[1].uptime_pct, 100.0);
        assert_eq!(summaries[2].total_checks, 0);
        assert_eq!(summaries[2].avg_latency_ms, None);
        Ok(())
    }

    #[tokio::test]
    async fn widening_the_window_includes_older_checks() -> anyhow::Result<()> {
        let (aggregator, _store, _dir) = seeded().await?;
        let stat = aggregator.summary("https://a.test", 3 * HOUR).await?;
        assert_eq!(stat.total_checks, 5);
        assert_eq!(stat.uptime_pct, 60.0);
        Ok(())
    }

    #[tokio::test]
    async fn sla_uptime_per_target() -> anyhow::Result<()> {
        let (aggregator, _store, _dir) = seeded().await?;
        let all = aggregator.uptime_by_latency_all(HOUR, 250).await?;

        assert_eq!(all.len(), 3);
        assert_eq!(all[0].uptime_pct, 50.0);
        assert_eq!(all[1].uptime_pct, 100.0);
        assert_eq!(all[2].uptime_pct, 0.0);
        assert!(all.iter().all(|u| u.window_hours == 1.0));
        Ok(())
    }

    #[tokio::test]
    async fn status_snapshot_is_newest_first_and_capped() -> anyhow::Result<()> {
        let (aggregator, _store, _dir) = seeded().await?;
        let snapshot = aggregator.status_snapshot(HOUR).await?;

        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].latency_ms, 100);
        assert_eq!(snapshot[1].latency_ms, 200);
        assert_eq!(snapshot[2].latency_ms, 300);
        assert!(snapshot.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
        Ok(())
    }

    #[tokio::test]
    async fn recent_speed_tests_are_capped() -> anyhow::Result<()> {
        let (aggregator, store, _dir) = seeded().await?;
        let now = Utc::now();
        for minutes_ago in [5, 10, 15, 500] {
            store
                .append_speed_test(&SpeedRecord {
                    timestamp: now - ChronoDuration::minutes(minutes_ago),
                    download_mbps: minutes_ago as f64,
                    upload_mbps: 1.0,
                    latency_ms: 9,
                })
                .await?;
        }

        let recent = aggregator.recent_speed_tests(HOUR).await?;
        assert_eq!(recent.iter().map(|r| r.download_mbps).collect::<Vec<_>>(), vec![5.0, 10.0]);

        let footprint = aggregator.storage_footprint().await?;
        assert!(footprint.size_bytes > 0);
        Ok(())
    }
}
