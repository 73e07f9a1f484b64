/// Orchestrator module - owns the engine lifecycle
///
/// The orchestrator:
/// - Initializes the store schema before anything else runs
/// - Launches the health checker, speed prober and retention pruner as independent periodic tasks
/// - Hands out the on-demand [`Aggregator`] for queries
/// - Stops every task on a process-wide shutdown signal
pub mod retention;


pub use retention::{PruneReport, RetentionPolicy, RetentionPruner};

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::aggregator::Aggregator;
use crate::config::Config;
use crate::database::{LibsqlStore, Store, initialize_database};
use crate::monitoring::checker::{HttpProber, Prober};
use crate::monitoring::scheduler::{Schedule, spawn_periodic};
use crate::monitoring::speedtest::{Bandwidth, HttpBandwidth};
use crate::monitoring::{HealthChecker, SpeedProber};
use crate::pool::{LibsqlPool, open_pool};
use crate::targets::TargetRegistry;

/// Everything the engine needs, fully constructed before any task starts
pub struct Engine {
    config: Arc<Config>,
    store: Arc<dyn Store>,
    targets: Arc<TargetRegistry>,
    prober: Arc<dyn Prober>,
    bandwidth: Arc<dyn Bandwidth>,
}

impl Engine {
    /// Open the configured database, migrate it and build the production probers.
    ///
    /// Any error here is a startup failure: nothing has been spawned yet.
    pub async fn open(config: Config) -> Result<Self> {
        let targets = TargetRegistry::new(&config.monitor.targets).context("invalid target list")?;

        let pool = open_pool(&config.database.path, config.database.pool_size)
            .await
            .with_context(|| format!("failed to open database {}", config.database.path.display()))?;
        let store = Arc::new(open_store(pool).await?);

        let prober = Arc::new(HttpProber::new(config.monitor.timeout())?);
        let bandwidth =
            Arc::new(HttpBandwidth::new(config.speedtest.clone(), config.monitor.timeout())?);

        Ok(Self::with_parts(config, store, targets, prober, bandwidth))
    }

    /// Assemble an engine from explicit parts (used with fake probers in tests)
    pub fn with_parts(
        config: Config,
        store: Arc<dyn Store>,
        targets: TargetRegistry,
        prober: Arc<dyn Prober>,
        bandwidth: Arc<dyn Bandwidth>,
    ) -> Self {
        Self { config: Arc::new(config), store, targets: Arc::new(targets), prober, bandwidth }
    }

    pub fn aggregator(&self) -> Aggregator {
        Aggregator::new(self.store.clone(), self.targets.clone(), self.config.query.clone())
    }

    /// Spawn the three periodic tasks. They run until [`EngineHandle::shutdown`].
    pub fn start(self) -> EngineHandle {
        let (shutdown_tx, _) = broadcast::channel(1);
        let config = &self.config;

        info!(
            targets = self.targets.len(),
            check_interval_secs = config.monitor.check_interval_seconds,
            speedtest_interval_secs = config.speedtest.interval_seconds,
            prune_interval_secs = config.retention.prune_interval_seconds,
            "Starting monitoring engine"
        );

        let checker = Arc::new(HealthChecker::new(
            self.targets.clone(),
            self.prober.clone(),
            self.store.clone(),
        ));
        let checks = spawn_periodic(
            Schedule::every("health-checker", config.monitor.check_interval()),
            shutdown_tx.subscribe(),
            move || {
                let checker = checker.clone();
                async move {
                    checker.run_all_checks().await;
                }
            },
        );

        let speed_prober = Arc::new(SpeedProber::new(
            self.bandwidth.clone(),
            self.store.clone(),
            config.speedtest.download_bytes,
            config.speedtest.upload_bytes,
        ));
        let speed_tests = spawn_periodic(
            Schedule::every("speed-prober", config.speedtest.interval()),
            shutdown_tx.subscribe(),
            move || {
                let speed_prober = speed_prober.clone();
                async move {
                    if let Err(e) = speed_prober.run_speed_test().await {
                        warn!(error = %e, "Speed test error");
                    }
                }
            },
        );

        let policy = RetentionPolicy::from(&config.retention);
        info!(
            check_retention_days = config.retention.check_retention_days,
            speedtest_retention_days = ?config.retention.speedtest_retention_days,
            "Retention policy"
        );
        let pruner = Arc::new(RetentionPruner::new(self.store.clone(), policy));
        let pruning = spawn_periodic(
            Schedule::every("retention-pruner", config.retention.prune_interval()),
            shutdown_tx.subscribe(),
            move || {
                let pruner = pruner.clone();
                async move { pruner.run_once().await }
            },
        );

        EngineHandle {
            shutdown_tx,
            task_handles: vec![checks, speed_tests, pruning],
        }
    }
}

/// Migrate the schema on one pooled connection, then wrap the pool in a store
pub async fn open_store(pool: LibsqlPool) -> Result<LibsqlStore> {
    let conn = pool.get().await.context("failed to get database connection")?;
    info!("Initializing database schema...");
    initialize_database(&conn).await.context("schema initialization failed")?;
    drop(conn);
    Ok(LibsqlStore::new_from_pool(pool))
}

/// Running engine
pub struct EngineHandle {
    shutdown_tx: broadcast::Sender<()>,
    task_handles: Vec<JoinHandle<()>>,
}

impl EngineHandle {
    /// Signal every task to stop and wait for them to exit
    pub async fn shutdown(self) {
        info!("Shutting down monitoring engine...");
        // No receivers left only if every task already exited.
        let _ = self.shutdown_tx.send(());

        for handle in self.task_handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Periodic task ended abnormally");
            }
        }
        info!("Monitoring engine stopped");
    }
}
