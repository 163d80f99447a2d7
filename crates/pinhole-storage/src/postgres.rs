use std::time::Duration;

use async_trait::async_trait;
use jiff::Timestamp;
use pinhole_core::{Result, Stats, Storage, StorageError, UrlRecord};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::debug;

/// Postgres implementation of the storage contract.
///
/// Soft delete is implemented with a `deleted` flag; reads of tombstoned
/// rows report `Gone`. Re-putting an existing id refreshes only the row's
/// timestamp, never its `url`, `user_id`, or `deleted` state, so the first
/// writer of an id wins. The embedded schema migrations run before the
/// engine is handed out and a migration failure is fatal to construction.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

const CONNECT_ATTEMPTS: u32 = 10;
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(2);
const MAX_CONNECTIONS: u32 = 5;

impl PostgresStorage {
    /// Creates an engine from an existing pool after running migrations.
    pub async fn new(pool: PgPool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Connects to `database_url`, waiting for the server to come up, then
    /// runs migrations.
    ///
    /// The database regularly starts alongside this process and is not
    /// accepting connections yet on the first attempt, so connecting
    /// retries on a fixed schedule before giving up.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let mut last_err = StorageError::Unavailable(String::from("postgres never attempted"));

        for attempt in 1..=CONNECT_ATTEMPTS {
            match PgPoolOptions::new()
                .max_connections(MAX_CONNECTIONS)
                .connect(database_url)
                .await
            {
                Ok(pool) => return Self::new(pool).await,
                Err(err) => {
                    debug!(attempt, error = %err, "postgres not ready");
                    last_err = map_sqlx_error(err);
                }
            }
            if attempt < CONNECT_ATTEMPTS {
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
        }
        Err(last_err)
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn now_unix_seconds() -> i64 {
    Timestamp::now().as_second()
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn put(&self, record: UrlRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO urls (id, url, user_id, date)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id)
            DO UPDATE SET date = EXCLUDED.date
            "#,
        )
        .bind(&record.id)
        .bind(&record.url)
        .bind(&record.user_id)
        .bind(now_unix_seconds())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn put_batch(&self, records: Vec<UrlRecord>) -> Result<()> {
        // One transaction: either every row lands or none do.
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let date = now_unix_seconds();

        for record in &records {
            sqlx::query(
                r#"
                INSERT INTO urls (id, url, user_id, date)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (id)
                DO UPDATE SET date = EXCLUDED.date
                "#,
            )
            .bind(&record.id)
            .bind(&record.url)
            .bind(&record.user_id)
            .bind(date)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<String> {
        let row = sqlx::query(
            r#"
            SELECT url, deleted
            FROM urls
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Err(StorageError::NotFound(id.to_string()));
        };

        let deleted: bool = row.try_get("deleted").map_err(map_sqlx_error)?;
        if deleted {
            return Err(StorageError::Gone(id.to_string()));
        }
        row.try_get("url").map_err(map_sqlx_error)
    }

    async fn list_user_urls(&self, base_url: &str, user_id: &str) -> Result<Vec<UrlRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, url, user_id
            FROM urls
            WHERE user_id = $1
              AND deleted = FALSE
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let record = UrlRecord {
                id: row.try_get("id").map_err(map_sqlx_error)?,
                url: row.try_get("url").map_err(map_sqlx_error)?,
                user_id: row.try_get("user_id").map_err(map_sqlx_error)?,
                deleted: false,
            };
            records.push(record.with_base_url(base_url));
        }

        if records.is_empty() {
            return Err(StorageError::NotFound(format!("no URLs for user {user_id}")));
        }
        Ok(records)
    }

    async fn delete_user_urls(&self, ids: &[String], user_id: &str) -> Result<()> {
        // Ownership and liveness are part of the predicate, so foreign and
        // already-deleted ids are skipped inside one statement.
        sqlx::query(
            r#"
            UPDATE urls
            SET deleted = TRUE
            WHERE id = ANY($1)
              AND user_id = $2
              AND deleted = FALSE
            "#,
        )
        .bind(ids)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn stats(&self) -> Result<Stats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS urls, COUNT(DISTINCT user_id) AS users
            FROM urls
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(Stats {
            urls: row.try_get("urls").map_err(map_sqlx_error)?,
            users: row.try_get("users").map_err(map_sqlx_error)?,
        })
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
