//! Append-only sample storage
//!
//! Samples are written once per cycle inside a single transaction, so a
//! cycle is either fully persisted or not at all. The schema is created
//! with idempotent DDL before first use and re-created if a write finds
//! the table missing.

use crate::models::ResourceSample;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Idempotent DDL for the samples table and its indexes
const SCHEMA_STATEMENTS: &[&str] = &[
    r"CREATE TABLE IF NOT EXISTS container_resource_samples (
        id BIGSERIAL PRIMARY KEY,
        sampled_at TIMESTAMPTZ NOT NULL,
        namespace TEXT NOT NULL,
        pod_uid TEXT NOT NULL,
        pod_name TEXT NOT NULL,
        container_name TEXT NOT NULL,
        container_id TEXT NOT NULL,
        cpu_raw TEXT NOT NULL,
        memory_raw TEXT NOT NULL,
        cpu_millicores BIGINT NOT NULL CHECK (cpu_millicores >= 0),
        memory_bytes BIGINT NOT NULL CHECK (memory_bytes >= 0)
    )",
    r"CREATE INDEX IF NOT EXISTS idx_resource_samples_container_id
        ON container_resource_samples (container_id)",
    r"CREATE INDEX IF NOT EXISTS idx_resource_samples_sampled_at
        ON container_resource_samples (sampled_at DESC)",
];

const INSERT_SAMPLE: &str = r"INSERT INTO container_resource_samples
    (sampled_at, namespace, pod_uid, pod_name, container_name, container_id,
     cpu_raw, memory_raw, cpu_millicores, memory_bytes)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)";

const SELECT_COLUMNS: &str = "sampled_at, namespace, pod_uid, pod_name, container_name, \
    container_id, cpu_raw, memory_raw, cpu_millicores, memory_bytes";

/// Postgres SQLSTATE for "relation does not exist"
const UNDEFINED_TABLE: &str = "42P01";

/// Storage for resource samples
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Create the table and indexes if they do not exist
    async fn ensure_schema(&self) -> Result<()>;

    /// Insert one cycle's samples atomically, returning the number written
    async fn insert_samples(&self, samples: &[ResourceSample]) -> Result<u64>;

    /// Most recent `limit` samples for a container, newest first
    async fn recent_samples(&self, container_id: &str, limit: u32) -> Result<Vec<ResourceSample>>;

    /// Samples for a container taken at or after `since`, oldest first
    async fn samples_since(
        &self,
        container_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ResourceSample>>;
}

/// Connection parameters for the sample database
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            database: "telemetry".to_string(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

/// Sample store backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgSampleStore {
    pool: PgPool,
}

impl PgSampleStore {
    /// Open the connection pool, failing if the database is unreachable
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to {}:{}/{}",
                    config.host, config.port, config.database
                )
            })?;

        info!(
            host = %config.host,
            database = %config.database,
            max_connections = config.max_connections,
            "Connected to sample database"
        );
        Ok(Self { pool })
    }

    async fn query_samples(
        &self,
        sql: &str,
        container_id: &str,
        bind: QueryBind,
    ) -> Result<Vec<ResourceSample>> {
        let query = sqlx::query(sql).bind(container_id);
        let query = match bind {
            QueryBind::Limit(limit) => query.bind(i64::from(limit)),
            QueryBind::Since(since) => query.bind(since),
        };

        let rows = query
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to query samples for container {}", container_id))?;

        rows.iter().map(sample_from_row).collect()
    }
}

enum QueryBind {
    Limit(u32),
    Since(DateTime<Utc>),
}

#[async_trait]
impl SampleStore for PgSampleStore {
    async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA_STATEMENTS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to ensure sample schema")?;
        }
        info!("Sample schema ready");
        Ok(())
    }

    async fn insert_samples(&self, samples: &[ResourceSample]) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to open sample transaction")?;

        for sample in samples {
            let result = sqlx::query(INSERT_SAMPLE)
                .bind(sample.sampled_at)
                .bind(&sample.namespace)
                .bind(&sample.pod_uid)
                .bind(&sample.pod_name)
                .bind(&sample.container_name)
                .bind(&sample.container_id)
                .bind(&sample.cpu_raw)
                .bind(&sample.memory_raw)
                .bind(to_i64(sample.cpu_millicores))
                .bind(to_i64(sample.memory_bytes))
                .execute(&mut *tx)
                .await;

            if let Err(e) = result {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Failed to roll back sample transaction");
                }
                heal_missing_table(self, &e).await?;
                return Err(e).with_context(|| {
                    format!(
                        "Failed to insert sample for {}/{}",
                        sample.pod_name, sample.container_name
                    )
                });
            }
        }

        tx.commit()
            .await
            .context("Failed to commit sample transaction")?;

        debug!(count = samples.len(), "Committed sample batch");
        Ok(samples.len() as u64)
    }

    async fn recent_samples(&self, container_id: &str, limit: u32) -> Result<Vec<ResourceSample>> {
        let sql = format!(
            "SELECT {} FROM container_resource_samples WHERE container_id = $1 \
             ORDER BY sampled_at DESC LIMIT $2",
            SELECT_COLUMNS
        );
        self.query_samples(&sql, container_id, QueryBind::Limit(limit))
            .await
    }

    async fn samples_since(
        &self,
        container_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ResourceSample>> {
        let sql = format!(
            "SELECT {} FROM container_resource_samples WHERE container_id = $1 \
             AND sampled_at >= $2 ORDER BY sampled_at ASC",
            SELECT_COLUMNS
        );
        self.query_samples(&sql, container_id, QueryBind::Since(since))
            .await
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Re-create the schema when a write failed because the table is gone
///
/// The failed write is not retried; the next cycle writes into the fresh
/// table. Returns whether the schema was re-created.
async fn heal_missing_table<S>(store: &S, err: &sqlx::Error) -> Result<bool>
where
    S: SampleStore + ?Sized,
{
    if !is_undefined_table(err) {
        return Ok(false);
    }
    warn!("Sample table missing, recreating schema");
    store.ensure_schema().await?;
    Ok(true)
}

fn is_undefined_table(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map_or(false, |code| code == UNDEFINED_TABLE)
}

fn sample_from_row(row: &PgRow) -> Result<ResourceSample> {
    let cpu: i64 = row.try_get("cpu_millicores")?;
    let memory: i64 = row.try_get("memory_bytes")?;

    Ok(ResourceSample {
        sampled_at: row.try_get("sampled_at")?,
        namespace: row.try_get("namespace")?,
        pod_uid: row.try_get("pod_uid")?,
        pod_name: row.try_get("pod_name")?,
        container_name: row.try_get("container_name")?,
        container_id: row.try_get("container_id")?,
        cpu_raw: row.try_get("cpu_raw")?,
        memory_raw: row.try_get("memory_raw")?,
        cpu_millicores: cpu.max(0) as u64,
        memory_bytes: memory.max(0) as u64,
    })
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-memory store with failure injection for tests

    use super::{heal_missing_table, SampleStore, UNDEFINED_TABLE};
    use crate::models::ResourceSample;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::collections::HashSet;
    use std::error::Error as StdError;
    use std::fmt;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    const MISSING_TABLE_MESSAGE: &str = r#"relation "container_resource_samples" does not exist"#;

    /// Database error as Postgres reports a dropped table
    #[derive(Debug)]
    pub(crate) struct UndefinedTable;

    impl fmt::Display for UndefinedTable {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(MISSING_TABLE_MESSAGE)
        }
    }

    impl StdError for UndefinedTable {}

    impl DatabaseError for UndefinedTable {
        fn message(&self) -> &str {
            MISSING_TABLE_MESSAGE
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(UNDEFINED_TABLE))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    pub(crate) fn undefined_table() -> sqlx::Error {
        sqlx::Error::Database(Box::new(UndefinedTable))
    }

    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub samples: Mutex<Vec<ResourceSample>>,
        pub fail_inserts: AtomicBool,
        pub fail_schema: AtomicBool,
        /// Table dropped behind the store's back; cleared by `ensure_schema`
        pub table_missing: AtomicBool,
        pub schema_calls: AtomicUsize,
        /// Container ids whose queries fail
        pub failing_queries: Mutex<HashSet<String>>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_samples(samples: Vec<ResourceSample>) -> Self {
            let store = Self::default();
            *store.samples.lock().unwrap() = samples;
            store
        }

        pub fn len(&self) -> usize {
            self.samples.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SampleStore for MemoryStore {
        async fn ensure_schema(&self) -> Result<()> {
            self.schema_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_schema.load(Ordering::SeqCst) {
                anyhow::bail!("database unavailable");
            }
            self.table_missing.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn insert_samples(&self, samples: &[ResourceSample]) -> Result<u64> {
            if self.fail_inserts.load(Ordering::SeqCst) {
                anyhow::bail!("insert failed");
            }
            if self.table_missing.load(Ordering::SeqCst) {
                let err = undefined_table();
                heal_missing_table(self, &err).await?;
                return Err(err.into());
            }
            self.samples.lock().unwrap().extend_from_slice(samples);
            Ok(samples.len() as u64)
        }

        async fn recent_samples(
            &self,
            container_id: &str,
            limit: u32,
        ) -> Result<Vec<ResourceSample>> {
            let mut matching: Vec<_> = self
                .samples
                .lock()
                .unwrap()
                .iter()
                .filter(|s| s.container_id == container_id)
                .cloned()
                .collect();
            matching.sort_by(|a, b| b.sampled_at.cmp(&a.sampled_at));
            matching.truncate(limit as usize);
            Ok(matching)
        }

        async fn samples_since(
            &self,
            container_id: &str,
            since: DateTime<Utc>,
        ) -> Result<Vec<ResourceSample>> {
            if self.failing_queries.lock().unwrap().contains(container_id) {
                anyhow::bail!("query failed for {}", container_id);
            }
            let mut matching: Vec<_> = self
                .samples
                .lock()
                .unwrap()
                .iter()
                .filter(|s| s.container_id == container_id && s.sampled_at >= since)
                .cloned()
                .collect();
            matching.sort_by(|a, b| a.sampled_at.cmp(&b.sampled_at));
            Ok(matching)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::{undefined_table, MemoryStore};
    use super::*;
    use std::sync::atomic::Ordering;
    use crate::models::container_id;

    fn sample(pod_uid: &str, container: &str, at: DateTime<Utc>) -> ResourceSample {
        ResourceSample {
            sampled_at: at,
            namespace: "prod".to_string(),
            pod_uid: pod_uid.to_string(),
            pod_name: "web-0".to_string(),
            container_name: container.to_string(),
            container_id: container_id(pod_uid, container),
            cpu_raw: "10m".to_string(),
            memory_raw: "1024".to_string(),
            cpu_millicores: 10,
            memory_bytes: 1024,
        }
    }

    #[test]
    fn test_schema_is_idempotent_ddl() {
        assert!(SCHEMA_STATEMENTS
            .iter()
            .all(|stmt| stmt.contains("IF NOT EXISTS")));
        assert!(SCHEMA_STATEMENTS
            .iter()
            .any(|stmt| stmt.contains("(sampled_at DESC)")));
        assert!(SCHEMA_STATEMENTS
            .iter()
            .any(|stmt| stmt.contains("(container_id)")));
    }

    #[test]
    fn test_to_i64_saturates() {
        assert_eq!(to_i64(42), 42);
        assert_eq!(to_i64(u64::MAX), i64::MAX);
    }

    #[test]
    fn test_undefined_table_detection() {
        assert!(is_undefined_table(&undefined_table()));
        assert!(!is_undefined_table(&sqlx::Error::RowNotFound));
        assert!(!is_undefined_table(&sqlx::Error::PoolTimedOut));
    }

    #[tokio::test]
    async fn test_missing_table_recreates_schema() {
        let store = MemoryStore::new();

        let healed = heal_missing_table(&store, &undefined_table()).await.unwrap();

        assert!(healed);
        assert_eq!(store.schema_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_other_write_errors_leave_schema_alone() {
        let store = MemoryStore::new();

        let healed = heal_missing_table(&store, &sqlx::Error::PoolTimedOut)
            .await
            .unwrap();

        assert!(!healed);
        assert_eq!(store.schema_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_table_heal_failure_is_reported() {
        let store = MemoryStore::new();
        store.fail_schema.store(true, Ordering::SeqCst);

        assert!(heal_missing_table(&store, &undefined_table()).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_store_queries() {
        let now = Utc::now();
        let id = container_id("uid-1", "web");
        let store = MemoryStore::with_samples(vec![
            sample("uid-1", "web", now - chrono::Duration::minutes(10)),
            sample("uid-1", "web", now - chrono::Duration::minutes(2)),
            sample("uid-1", "web", now - chrono::Duration::minutes(1)),
            sample("uid-1", "sidecar", now),
        ]);

        let recent = store.recent_samples(&id, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].sampled_at > recent[1].sampled_at);

        let windowed = store
            .samples_since(&id, now - chrono::Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(windowed.len(), 2);
        assert!(windowed[0].sampled_at < windowed[1].sampled_at);
    }
}
