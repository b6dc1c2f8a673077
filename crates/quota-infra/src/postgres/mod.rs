//! PostgreSQL counter store - counters persisted as rows in `rate_limits`.

mod entity;

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseBackend, DbConn, EntityTrait, QueryFilter, Statement,
};

use quota_core::error::CounterStoreError;
use quota_core::ports::{CounterEntry, CounterStore};

/// One atomic create-or-increment-or-reset statement.
///
/// The reset and increment paths are mutually exclusive branches of the same
/// UPSERT, so concurrent callers race safely through the database's own
/// row-level conflict resolution. Expiry comparisons use the database clock
/// so application instances do not have to agree on the time.
const INCREMENT_SQL: &str = r#"
INSERT INTO rate_limits ("key", count, expires_at)
VALUES ($1, 1, now() + make_interval(secs => $2))
ON CONFLICT ("key") DO UPDATE SET
    count = CASE
        WHEN rate_limits.expires_at <= now() THEN 1
        ELSE rate_limits.count + 1
    END,
    expires_at = CASE
        WHEN rate_limits.expires_at <= now() THEN now() + make_interval(secs => $2)
        ELSE rate_limits.expires_at
    END
RETURNING count
"#;

/// PostgreSQL-backed counter store.
///
/// Counters are shared by every application instance pointing at the same
/// database, at the cost of one round trip per operation. Expect on the
/// order of 1k ops/sec per shared database; use the Redis backend for
/// anything hotter.
///
/// The connection handle is owned by the application, so `close` releases
/// nothing here.
pub struct PostgresCounterStore {
    db: DbConn,
}

impl PostgresCounterStore {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    /// Delete rows whose expiry has passed. Returns the number removed.
    ///
    /// Not self-scheduled: invoke periodically from an external scheduler to
    /// keep the table from accumulating dead rows. Correctness does not
    /// depend on it - expired rows are already invisible to `get` and
    /// restarted by `increment`.
    pub async fn sweep_expired(&self) -> Result<u64, CounterStoreError> {
        let result = self
            .db
            .execute_raw(Statement::from_string(
                DatabaseBackend::Postgres,
                "DELETE FROM rate_limits WHERE expires_at <= now()",
            ))
            .await
            .map_err(|e| CounterStoreError::Connection(e.to_string()))?;

        if result.rows_affected() > 0 {
            tracing::debug!(removed = result.rows_affected(), "Swept expired counter rows");
        }

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CounterStore for PostgresCounterStore {
    async fn get(&self, key: &str) -> Result<Option<CounterEntry>, CounterStoreError> {
        let found = entity::Entity::find_by_id(key)
            .filter(entity::Column::ExpiresAt.gt(Utc::now()))
            .one(&self.db)
            .await
            .map_err(|e| CounterStoreError::operation(key, e))?;

        Ok(found.map(|model| CounterEntry {
            count: model.count,
            expires_at: model.expires_at.into(),
        }))
    }

    async fn increment(&self, key: &str, window: Duration) -> Result<i64, CounterStoreError> {
        let row = self
            .db
            .query_one_raw(Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                INCREMENT_SQL,
                [key.into(), window.as_secs_f64().into()],
            ))
            .await
            .map_err(|e| CounterStoreError::operation(key, e))?
            .ok_or_else(|| CounterStoreError::operation(key, "UPSERT returned no row"))?;

        row.try_get::<i64>("", "count")
            .map_err(|e| CounterStoreError::operation(key, e))
    }

    async fn reset(&self, key: &str) -> Result<(), CounterStoreError> {
        entity::Entity::delete_by_id(key)
            .exec(&self.db)
            .await
            .map_err(|e| CounterStoreError::operation(key, e))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), CounterStoreError> {
        tracing::debug!("Postgres counter store closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Value};
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_increment_returns_upserted_count() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![BTreeMap::from([("count", Value::from(3i64))])]])
            .into_connection();

        let store = PostgresCounterStore::new(db);
        let count = store
            .increment("user:1:signup", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_get_maps_live_row() {
        let now = chrono::Utc::now();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![entity::Model {
                key: "user:1:signup".to_owned(),
                count: 4,
                expires_at: (now + Duration::from_secs(30)).into(),
                created_at: now.into(),
            }]])
            .into_connection();

        let store = PostgresCounterStore::new(db);
        let entry = store.get("user:1:signup").await.unwrap().unwrap();

        assert_eq!(entry.count, 4);
        assert!(entry.expires_at > now);
    }

    #[tokio::test]
    async fn test_get_absent_row_is_none() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<entity::Model>::new()])
            .into_connection();

        let store = PostgresCounterStore::new(db);
        assert!(store.get("never-seen").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset_succeeds_without_matching_row() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();

        let store = PostgresCounterStore::new(db);
        store.reset("missing").await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_reports_removed_rows() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 7,
            }])
            .into_connection();

        let store = PostgresCounterStore::new(db);
        assert_eq!(store.sweep_expired().await.unwrap(), 7);
    }
}
