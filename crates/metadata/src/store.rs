//! Metadata store trait and the SQLite implementation.

use crate::error::MetadataResult;
use crate::models::{CacheStats, ImageRow, VariantStats};
use crate::repos::ImageRepo;
use async_trait::async_trait;
use darkroom_core::{UrlHash, Variant};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: ImageRepo + Send + Sync {
    /// Create tables and indexes if missing.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    query_timeout: Duration,
}

impl SqliteStore {
    /// Open (creating if needed) a SQLite database and apply the schema.
    ///
    /// `query_timeout_secs` is advisory: slow queries are logged, not cancelled.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let query_timeout = Duration::from_secs(query_timeout_secs.unwrap_or(30));

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        // One connection: SQLite serializes writers anyway, and a single
        // connection avoids "database is locked" under concurrent requests.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            query_timeout,
        };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    fn log_if_slow(&self, operation: &'static str, started: std::time::Instant) {
        let elapsed = started.elapsed();
        if elapsed > self.query_timeout {
            tracing::warn!(
                operation,
                elapsed_ms = elapsed.as_millis() as u64,
                timeout_ms = self.query_timeout.as_millis() as u64,
                "SQLite query exceeded advisory timeout"
            );
        }
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ImageRepo for SqliteStore {
    async fn upsert_image(&self, image: &ImageRow) -> MetadataResult<()> {
        let started = std::time::Instant::now();
        sqlx::query(
            r#"
            INSERT INTO images (url_hash, variant, original_url, object_key, size_bytes, created_at, last_accessed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url_hash, variant) DO UPDATE SET last_accessed_at = excluded.last_accessed_at
            "#,
        )
        .bind(&image.url_hash)
        .bind(&image.variant)
        .bind(&image.original_url)
        .bind(&image.object_key)
        .bind(image.size_bytes)
        .bind(image.created_at)
        .bind(image.last_accessed_at)
        .execute(&self.pool)
        .await?;
        self.log_if_slow("upsert_image", started);
        Ok(())
    }

    async fn touch_image(
        &self,
        url_hash: &UrlHash,
        variant: Variant,
        accessed_at: OffsetDateTime,
    ) -> MetadataResult<()> {
        let started = std::time::Instant::now();
        sqlx::query("UPDATE images SET last_accessed_at = ? WHERE url_hash = ? AND variant = ?")
            .bind(accessed_at)
            .bind(url_hash.to_hex())
            .bind(variant.as_str())
            .execute(&self.pool)
            .await?;
        self.log_if_slow("touch_image", started);
        Ok(())
    }

    async fn get_image(
        &self,
        url_hash: &UrlHash,
        variant: Variant,
    ) -> MetadataResult<Option<ImageRow>> {
        let row = sqlx::query_as::<_, ImageRow>(
            "SELECT url_hash, variant, original_url, object_key, size_bytes, created_at, last_accessed_at
             FROM images WHERE url_hash = ? AND variant = ?",
        )
        .bind(url_hash.to_hex())
        .bind(variant.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_stats(&self) -> MetadataResult<CacheStats> {
        let started = std::time::Instant::now();
        let variants = sqlx::query_as::<_, VariantStats>(
            "SELECT variant, COUNT(*) AS count, COALESCE(SUM(size_bytes), 0) AS total_bytes
             FROM images GROUP BY variant ORDER BY variant",
        )
        .fetch_all(&self.pool)
        .await?;
        self.log_if_slow("get_stats", started);
        Ok(CacheStats::from_variants(variants))
    }
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS images (
    url_hash TEXT NOT NULL,
    variant TEXT NOT NULL,
    original_url TEXT NOT NULL,
    object_key TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    last_accessed_at TEXT NOT NULL,
    PRIMARY KEY (url_hash, variant)
);
CREATE INDEX IF NOT EXISTS idx_images_variant ON images(variant);
CREATE INDEX IF NOT EXISTS idx_images_last_accessed ON images(last_accessed_at);
"#;
