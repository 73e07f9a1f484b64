use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::checker::Prober;
use super::types::TickReport;
use crate::database::Store;
use crate::database::models::CheckRecord;
use crate::targets::TargetRegistry;

/// Health checker - probes every registered target once per tick
pub struct HealthChecker {
    targets: Arc<TargetRegistry>,
    prober: Arc<dyn Prober>,
    store: Arc<dyn Store>,
}

impl HealthChecker {
    pub fn new(targets: Arc<TargetRegistry>, prober: Arc<dyn Prober>, store: Arc<dyn Store>) -> Self {
        Self { targets, prober, store }
    }

    /// Probe all targets concurrently and append one record per target.
    ///
    /// A probe that fails is recorded as `down`; a record that cannot be written is logged
    /// and dropped. Neither affects the other targets of the tick.
    pub async fn run_all_checks(&self) -> TickReport {
        let probes = self.targets.iter().map(|target| async move {
            let outcome = self.prober.probe(target).await;
            let record = CheckRecord::new(target.clone(), outcome.status(), outcome.latency_ms());

            match &outcome.result {
                Ok(code) => debug!(url = %target, code, latency_ms = record.latency_ms, "Target up"),
                Err(e) => info!(url = %target, latency_ms = record.latency_ms, error = %e, "Target down"),
            }

            let persisted = match self.store.append_check(&record).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(url = %target, error = %e, "Failed to persist check result");
                    false
                }
            };

            (record.status, persisted)
        });

        let mut report = TickReport::default();
        for (status, persisted) in join_all(probes).await {
            report.probed += 1;
            if status.is_up() {
                report.up += 1;
            } else {
                report.down += 1;
            }
            if persisted {
                report.persisted += 1;
            }
        }

        info!(
            probed = report.probed,
            up = report.up,
            down = report.down,
            persisted = report.persisted,
            "Health check tick completed"
        );
        report
    }
}
