//! SQLite-backed storage implementation.
//!
//! Handles connection, migrations and the transactional replace. Callers
//! normally reach this through [`Resilient`](super::Resilient), which adds
//! retries and a circuit breaker.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, QueryBuilder, Row, Sqlite};

use crate::error::{AppError, Result};
use crate::models::UrlRecord;
use crate::storage::PathStore;

/// Rows per multi-row INSERT; two bound parameters each.
const INSERT_BATCH: usize = 400;

/// Handle to the SQLite path database.
#[derive(Clone)]
pub struct SqliteStore {
    pub(crate) pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) the database at `url` and run migrations.
    ///
    /// In-memory URLs are limited to one connection, since every SQLite
    /// connection would otherwise see its own empty database.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::config(format!("Invalid SQLite URL '{url}': {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);

        let max_connections = if url.contains(":memory:") {
            1
        } else {
            max_connections.max(1)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        log::info!("SQLite path store ready ({} max connections)", max_connections);
        Ok(store)
    }

    /// Open a private in-memory database.
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:", 1).await
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS paths (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT UNIQUE NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS urls (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path_id INTEGER NOT NULL REFERENCES paths(id) ON DELETE CASCADE,
                url TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_urls_path_id ON urls (path_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl PathStore for SqliteStore {
    async fn store(&self, path: &str, urls: &[String]) -> Result<()> {
        // Dropping `tx` on any early return rolls the whole replace back.
        let mut tx = self.pool.begin().await?;

        let path_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO paths (path) VALUES (?1)
            ON CONFLICT (path) DO UPDATE SET path = excluded.path
            RETURNING id
            "#,
        )
        .bind(path)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM urls WHERE path_id = ?1")
            .bind(path_id)
            .execute(&mut *tx)
            .await?;

        for chunk in urls.chunks(INSERT_BATCH) {
            let mut insert = QueryBuilder::<Sqlite>::new("INSERT INTO urls (path_id, url) ");
            insert.push_values(chunk, |mut row, url| {
                row.push_bind(path_id).push_bind(url.as_str());
            });
            insert.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        log::debug!("Stored {} URLs for path '{}' (id {})", urls.len(), path, path_id);
        Ok(())
    }

    async fn lookup(&self, path: &str) -> Result<Vec<UrlRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.path_id, u.url
            FROM urls u
            JOIN paths p ON u.path_id = p.id
            WHERE p.path = ?1
            ORDER BY u.id ASC
            "#,
        )
        .bind(path)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(UrlRecord {
                id: row.try_get("id")?,
                path_id: row.try_get("path_id")?,
                url: row.try_get("url")?,
            });
        }
        Ok(out)
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
