use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, Sqlite, Transaction};
use tokio::sync::Mutex;
use tracing::{debug, error};

use truthwatch_core::domain::monitor::{MonitorConfigId, MonitoringConfig};
use truthwatch_core::domain::post::PostId;
use truthwatch_core::monitor::{AddOutcome, MonitorStore, StoreError};

use super::RepositoryError;
use crate::DbPool;

const SELECT_CONFIG: &str = "SELECT
        id,
        username,
        filter_keyword,
        last_checked_timestamp,
        last_post_id,
        created_at,
        is_active
     FROM monitoring_configs";

/// SQLite-backed monitoring configuration.
///
/// Writes go through `writer` so that deactivate-then-insert never interleaves
/// with another writer on the same process. The partial unique index on
/// `is_active` backs this up at the schema level.
pub struct SqlMonitorRepository {
    pool: DbPool,
    writer: Mutex<()>,
}

impl SqlMonitorRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, writer: Mutex::new(()) }
    }

    /// Most recent configurations first, active or not.
    #[cfg(test)]
    pub async fn history(&self, limit: u32) -> Result<Vec<MonitoringConfig>, RepositoryError> {
        let rows = sqlx::query(&format!("{SELECT_CONFIG} ORDER BY id DESC LIMIT ?"))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(config_from_row).collect()
    }

    async fn insert_active(
        &self,
        target: &str,
        keyword: &str,
    ) -> Result<MonitorConfigId, RepositoryError> {
        let _guard = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;

        let replaced = sqlx::query("UPDATE monitoring_configs SET is_active = 0 WHERE is_active = 1")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let id = insert_row(&mut tx, target, keyword).await?;
        tx.commit().await?;

        debug!(
            event_name = "store.monitor.config_added",
            config_id = %id,
            replaced,
            "monitoring config inserted"
        );
        Ok(id)
    }

    async fn insert_if_idle(
        &self,
        target: &str,
        keyword: &str,
    ) -> Result<AddOutcome, RepositoryError> {
        let _guard = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;

        let active = sqlx::query(&format!("{SELECT_CONFIG} WHERE is_active = 1 ORDER BY id DESC LIMIT 1"))
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(row) = active {
            tx.rollback().await?;
            return Ok(AddOutcome::AlreadyActive(config_from_row(row)?));
        }

        let id = insert_row(&mut tx, target, keyword).await?;
        tx.commit().await?;

        debug!(
            event_name = "store.monitor.config_added",
            config_id = %id,
            replaced = 0,
            "monitoring config inserted"
        );
        Ok(AddOutcome::Added(id))
    }

    async fn fetch_active(&self) -> Result<Option<MonitoringConfig>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_CONFIG} WHERE is_active = 1 ORDER BY id DESC LIMIT 1"))
            .fetch_optional(&self.pool)
            .await?;

        row.map(config_from_row).transpose()
    }

    async fn write_cursor(
        &self,
        id: Option<MonitorConfigId>,
        post_id: &PostId,
        checked_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let _guard = self.writer.lock().await;
        let query = match id {
            Some(id) => sqlx::query(
                "UPDATE monitoring_configs
                 SET last_post_id = ?, last_checked_timestamp = ?
                 WHERE id = ? AND is_active = 1",
            )
            .bind(post_id.as_str())
            .bind(checked_at.to_rfc3339())
            .bind(id.0),
            None => sqlx::query(
                "UPDATE monitoring_configs
                 SET last_post_id = ?, last_checked_timestamp = ?
                 WHERE is_active = 1",
            )
            .bind(post_id.as_str())
            .bind(checked_at.to_rfc3339()),
        };

        Ok(query.execute(&self.pool).await?.rows_affected() > 0)
    }

    async fn clear_active(&self) -> Result<bool, RepositoryError> {
        let _guard = self.writer.lock().await;
        let affected = sqlx::query("UPDATE monitoring_configs SET is_active = 0 WHERE is_active = 1")
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }
}

#[async_trait::async_trait]
impl MonitorStore for SqlMonitorRepository {
    async fn add_config(&self, target: &str, keyword: &str) -> Result<MonitorConfigId, StoreError> {
        self.insert_active(target, keyword).await.map_err(log_storage("add_config"))
    }

    async fn add_config_if_idle(
        &self,
        target: &str,
        keyword: &str,
    ) -> Result<AddOutcome, StoreError> {
        self.insert_if_idle(target, keyword).await.map_err(log_storage("add_config_if_idle"))
    }

    async fn active_config(&self) -> Result<Option<MonitoringConfig>, StoreError> {
        self.fetch_active().await.map_err(log_storage("active_config"))
    }

    async fn update_last_seen(
        &self,
        post_id: &PostId,
        checked_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.write_cursor(None, post_id, checked_at).await.map_err(log_storage("update_last_seen"))
    }

    async fn update_last_seen_for(
        &self,
        id: MonitorConfigId,
        post_id: &PostId,
        checked_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.write_cursor(Some(id), post_id, checked_at)
            .await
            .map_err(log_storage("update_last_seen_for"))
    }

    async fn deactivate(&self) -> Result<bool, StoreError> {
        self.clear_active().await.map_err(log_storage("deactivate"))
    }
}

async fn insert_row(
    tx: &mut Transaction<'_, Sqlite>,
    target: &str,
    keyword: &str,
) -> Result<MonitorConfigId, RepositoryError> {
    let inserted = sqlx::query(
        "INSERT INTO monitoring_configs (
            username,
            filter_keyword,
            last_checked_timestamp,
            last_post_id,
            created_at,
            is_active
         ) VALUES (?, ?, NULL, NULL, ?, 1)",
    )
    .bind(target)
    .bind(keyword)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut **tx)
    .await?;

    Ok(MonitorConfigId(inserted.last_insert_rowid()))
}

fn log_storage(operation: &'static str) -> impl Fn(RepositoryError) -> StoreError {
    move |repository_error| {
        error!(
            event_name = "store.monitor.failed",
            operation,
            error = %repository_error,
            "monitoring store operation failed"
        );
        StoreError::from(repository_error)
    }
}

fn config_from_row(row: SqliteRow) -> Result<MonitoringConfig, RepositoryError> {
    Ok(MonitoringConfig {
        id: MonitorConfigId(row.try_get("id")?),
        target: row.try_get("username")?,
        keyword: row.try_get("filter_keyword")?,
        last_checked_at: parse_optional_timestamp(
            "last_checked_timestamp",
            row.try_get("last_checked_timestamp")?,
        )?,
        last_seen_post_id: row.try_get::<Option<String>, _>("last_post_id")?.map(PostId),
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        active: row.try_get::<i64, _>("is_active")? != 0,
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use truthwatch_core::domain::post::PostId;
    use truthwatch_core::monitor::MonitorStore;

    use super::SqlMonitorRepository;
    use crate::{connect_with_settings, migrations::run_pending, DbPool};

    async fn migrated_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test]
    async fn round_trips_cursor_and_timestamps() {
        let repo = SqlMonitorRepository::new(migrated_pool().await);
        let id = repo.add_config("someone", "Border").await.expect("add");
        let checked_at = Utc::now();

        assert!(repo
            .update_last_seen_for(id, &PostId("114".to_owned()), checked_at)
            .await
            .expect("update"));

        let active = repo.active_config().await.expect("read").expect("active");
        assert_eq!(active.id, id);
        assert_eq!(active.keyword, "Border");
        assert_eq!(active.last_seen_post_id, Some(PostId("114".to_owned())));
        assert_eq!(
            active.last_checked_at.map(|ts| ts.timestamp_millis()),
            Some(checked_at.timestamp_millis())
        );
    }

    #[tokio::test]
    async fn history_keeps_superseded_rows_inactive() {
        let repo = SqlMonitorRepository::new(migrated_pool().await);
        repo.add_config("first", "a").await.expect("add first");
        repo.add_config("second", "b").await.expect("add second");

        let history = repo.history(10).await.expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].target, "second");
        assert!(history[0].active);
        assert!(!history[1].active);
    }

    #[tokio::test]
    async fn corrupt_timestamp_surfaces_as_storage_error() {
        let pool = migrated_pool().await;
        sqlx::query(
            "INSERT INTO monitoring_configs (username, filter_keyword, created_at, is_active)
             VALUES ('x', 'y', 'yesterday', 1)",
        )
        .execute(&pool)
        .await
        .expect("seed corrupt row");

        let repo = SqlMonitorRepository::new(pool);
        let error = repo.active_config().await.expect_err("decode should fail");
        assert!(error.to_string().contains("created_at"));
    }
}
