use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Row, Value, params};
use tokio::sync::Mutex;

use super::models::{
    CheckRecord, CheckStatus, Collection, RangeQuery, SpeedRecord, from_millis, to_millis,
    to_millis_ceil,
};
use crate::pool::{LibsqlManager, LibsqlPool};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool::managed::PoolError<libsql::Error>),
    #[error("database error: {0}")]
    Sql(#[from] libsql::Error),
    #[error("corrupt row in {collection}: {reason}")]
    Corrupt { collection: Collection, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Append-only time-series persistence shared by every engine task
#[async_trait]
pub trait Store: Send + Sync {
    /// Durably append one check record
    async fn append_check(&self, record: &CheckRecord) -> StoreResult<()>;

    /// Durably append one complete speed-test record
    async fn append_speed_test(&self, record: &SpeedRecord) -> StoreResult<()>;

    /// Range scan over the checks collection
    async fn query_checks(&self, query: &RangeQuery) -> StoreResult<Vec<CheckRecord>>;

    /// Range scan over the speed-test collection
    async fn query_speed_tests(&self, query: &RangeQuery) -> StoreResult<Vec<SpeedRecord>>;

    /// Remove every record with `timestamp < cutoff`, returning how many went
    async fn delete_older_than(
        &self,
        collection: Collection,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<u64>;

    /// Current on-disk footprint in bytes
    async fn size_bytes(&self) -> StoreResult<i64>;
}

/// LibSQL-backed store.
///
/// SQLite already serializes commits at the file level; the per-collection locks keep our own
/// writers queued in-process instead of spinning on the busy timeout. Readers never take them.
/// A writer checks out a connection only once it holds its lock, so queued writers never
/// starve readers of pooled connections.
pub struct LibsqlStore {
    pool: LibsqlPool,
    checks_writer: Mutex<()>,
    speedtests_writer: Mutex<()>,
}

impl LibsqlStore {
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool, checks_writer: Mutex::new(()), speedtests_writer: Mutex::new(()) }
    }

    async fn get_conn(&self) -> StoreResult<deadpool::managed::Object<LibsqlManager>> {
        Ok(self.pool.get().await?)
    }

    fn writer(&self, collection: Collection) -> &Mutex<()> {
        match collection {
            Collection::Checks => &self.checks_writer,
            Collection::SpeedTests => &self.speedtests_writer,
        }
    }

    /// Shared SELECT builder for both collections
    async fn select(
        conn: &Connection,
        collection: Collection,
        columns: &str,
        query: &RangeQuery,
    ) -> StoreResult<libsql::Rows> {
        let mut sql = format!(
            "SELECT {columns} FROM {} WHERE timestamp >= ? AND timestamp < ?",
            collection.table()
        );
        let mut values: Vec<Value> = vec![
            Value::Integer(to_millis_ceil(query.start)),
            Value::Integer(to_millis_ceil(query.end)),
        ];

        if let (Collection::Checks, Some(target)) = (collection, &query.target) {
            sql.push_str(" AND target = ?");
            values.push(Value::Text(target.clone()));
        }

        sql.push_str(&format!(" ORDER BY timestamp {}, id {}", query.order_sql(), query.order_sql()));

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        }

        Ok(conn.query(&sql, values).await?)
    }

    fn timestamp(row: &Row, collection: Collection) -> StoreResult<DateTime<Utc>> {
        let millis: i64 = row.get(0)?;
        from_millis(millis).ok_or_else(|| StoreError::Corrupt {
            collection,
            reason: format!("timestamp {millis} out of range"),
        })
    }

    fn check_from_row(row: &Row) -> StoreResult<CheckRecord> {
        let status: String = row.get(2)?;
        Ok(CheckRecord {
            timestamp: Self::timestamp(row, Collection::Checks)?,
            target: row.get(1)?,
            status: status
                .parse::<CheckStatus>()
                .map_err(|reason| StoreError::Corrupt { collection: Collection::Checks, reason })?,
            latency_ms: row.get(3)?,
        })
    }

    fn speed_from_row(row: &Row) -> StoreResult<SpeedRecord> {
        Ok(SpeedRecord {
            timestamp: Self::timestamp(row, Collection::SpeedTests)?,
            download_mbps: row.get(1)?,
            upload_mbps: row.get(2)?,
            latency_ms: row.get(3)?,
        })
    }
}

#[async_trait]
impl Store for LibsqlStore {
    async fn append_check(&self, record: &CheckRecord) -> StoreResult<()> {
        let _guard = self.writer(Collection::Checks).lock().await;
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO checks (timestamp, target, status, latency_ms) VALUES (?, ?, ?, ?)",
            params![
                to_millis(record.timestamp),
                record.target.clone(),
                record.status.as_str(),
                record.latency_ms
            ],
        )
        .await?;
        Ok(())
    }

    async fn append_speed_test(&self, record: &SpeedRecord) -> StoreResult<()> {
        let _guard = self.writer(Collection::SpeedTests).lock().await;
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO speedtests (timestamp, download_mbps, upload_mbps, latency_ms) VALUES (?, ?, ?, ?)",
            params![
                to_millis(record.timestamp),
                record.download_mbps,
                record.upload_mbps,
                record.latency_ms
            ],
        )
        .await?;
        Ok(())
    }

    async fn query_checks(&self, query: &RangeQuery) -> StoreResult<Vec<CheckRecord>> {
        let conn = self.get_conn().await?;
        let mut rows = Self::select(
            &conn,
            Collection::Checks,
            "timestamp, target, status, latency_ms",
            query,
        )
        .await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(Self::check_from_row(&row)?);
        }
        Ok(results)
    }

    async fn query_speed_tests(&self, query: &RangeQuery) -> StoreResult<Vec<SpeedRecord>> {
        let conn = self.get_conn().await?;
        let mut rows = Self::select(
            &conn,
            Collection::SpeedTests,
            "timestamp, download_mbps, upload_mbps, latency_ms",
            query,
        )
        .await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(Self::speed_from_row(&row)?);
        }
        Ok(results)
    }

    async fn delete_older_than(
        &self,
        collection: Collection,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let _guard = self.writer(collection).lock().await;
        let conn = self.get_conn().await?;

        let sql = format!("DELETE FROM {} WHERE timestamp < ?", collection.table());
        let removed = conn.execute(&sql, params![to_millis_ceil(cutoff)]).await?;
        Ok(removed)
    }

    async fn size_bytes(&self) -> StoreResult<i64> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
                (),
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }
}
