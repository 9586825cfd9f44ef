//! PostgreSQL-based metadata store implementation.

use crate::error::MetadataResult;
use crate::models::{CacheStats, ImageRow, VariantStats};
use crate::repos::ImageRepo;
use crate::store::MetadataStore;
use async_trait::async_trait;
use darkroom_core::config::PgSslMode;
use darkroom_core::{UrlHash, Variant};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use time::OffsetDateTime;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

/// Split the schema into statements, dropping empty and comment-only pieces.
fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .map(str::trim)
        .filter(|statement| {
            statement.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            })
        })
        .collect()
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Connect using a full connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Connect using individual parameters, so the password can come from
    /// its own environment variable.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }
        if let Some(pass) = password {
            opts = opts.password(pass);
        }
        if let Some(mode) = ssl_mode {
            opts = opts.ssl_mode(match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            });
        }

        tracing::info!(
            host,
            port,
            database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL with individual parameters"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{timeout_ms}ms"))]);
            tracing::info!(timeout_ms, "PostgreSQL statement_timeout configured");
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // Prepared statements cannot hold more than one command.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ImageRepo for PostgresStore {
    async fn upsert_image(&self, image: &ImageRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO images (url_hash, variant, original_url, object_key, size_bytes, created_at, last_accessed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (url_hash, variant) DO UPDATE SET last_accessed_at = EXCLUDED.last_accessed_at
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
        Ok(())
    }

    async fn touch_image(
        &self,
        url_hash: &UrlHash,
        variant: Variant,
        accessed_at: OffsetDateTime,
    ) -> MetadataResult<()> {
        sqlx::query("UPDATE images SET last_accessed_at = $1 WHERE url_hash = $2 AND variant = $3")
            .bind(accessed_at)
            .bind(url_hash.to_hex())
            .bind(variant.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_image(
        &self,
        url_hash: &UrlHash,
        variant: Variant,
    ) -> MetadataResult<Option<ImageRow>> {
        let row = sqlx::query_as::<_, ImageRow>(
            "SELECT url_hash, variant, original_url, object_key, size_bytes, created_at, last_accessed_at
             FROM images WHERE url_hash = $1 AND variant = $2",
        )
        .bind(url_hash.to_hex())
        .bind(variant.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_stats(&self) -> MetadataResult<CacheStats> {
        // SUM(BIGINT) is NUMERIC in PostgreSQL; cast back for i64 decoding.
        let variants = sqlx::query_as::<_, VariantStats>(
            "SELECT variant, COUNT(*) AS count, COALESCE(SUM(size_bytes), 0)::BIGINT AS total_bytes
             FROM images GROUP BY variant ORDER BY variant",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(CacheStats::from_variants(variants))
    }
}
