use anyhow::{Context, Result};
use libsql::Connection;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 2;

/// Run database migrations
///
/// Idempotent: already-applied versions are skipped, so this runs on every startup.
pub async fn run_migrations(conn: &Connection) -> Result<()> {
    enable_wal(conn).await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::info!(version = current_version, "Database schema is up to date");
        return Ok(());
    }

    tracing::info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await.context("migration v1 failed")?;
        record_migration(conn, 1, "Create checks and speedtests collections").await?;
    }

    if current_version < 2 {
        run_migration_v2(conn).await.context("migration v2 failed")?;
        record_migration(conn, 2, "Index checks by target and time").await?;
    }

    tracing::info!(version = SCHEMA_VERSION, "Database migrations completed successfully");
    Ok(())
}

/// WAL lets readers keep going while a writer commits
async fn enable_wal(conn: &Connection) -> Result<()> {
    let mut rows = conn.query("PRAGMA journal_mode = WAL", ()).await?;
    if let Some(row) = rows.next().await? {
        let mode: String = row.get(0)?;
        tracing::debug!(journal_mode = %mode, "Configured journal mode");
    }
    Ok(())
}

async fn get_current_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<()> {
    let now = chrono::Utc::now().timestamp();

    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, now, description],
    )
    .await?;

    tracing::info!("Applied migration v{}: {}", version, description);
    Ok(())
}

/// Migration v1: the two time-series collections, each indexed on time
async fn run_migration_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS checks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp INTEGER NOT NULL,
            target TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('up', 'down')),
            latency_ms INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS speedtests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp INTEGER NOT NULL,
            download_mbps REAL NOT NULL,
            upload_mbps REAL NOT NULL,
            latency_ms INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_checks_time ON checks(timestamp)", ()).await?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_speedtests_time ON speedtests(timestamp)", ())
        .await?;

    Ok(())
}

/// Migration v2: per-target aggregation scans
async fn run_migration_v2(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_checks_target_time ON checks(target, timestamp DESC)",
        (),
    )
    .await?;
    Ok(())
}
