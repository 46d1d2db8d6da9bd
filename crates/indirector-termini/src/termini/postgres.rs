//! PostgreSQL terminus
//!
//! Persistent storage keeping one row per (indirection, name) with the data
//! hash as JSONB. Search filters are evaluated in process.
//!
//! # Setup
//!
//! The table is created on first use:
//! ```sql
//! CREATE TABLE IF NOT EXISTS indirector_instances (...);
//! ```
//!
//! # Configuration
//!
//! `[termini.<indirection>.postgres] database_url = "postgres://..."`, or the
//! `DATABASE_URL` environment variable.

use async_trait::async_trait;
use indirector_core::{Capabilities, Filter, IndirectorError, Instance, Request, Result, Terminus};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use tokio::sync::OnceCell;
use tracing::{error, info};

fn database_error(e: sqlx::Error) -> IndirectorError {
    IndirectorError::terminus(format!("Database error: {}", e))
}

/// Terminus backed by a PostgreSQL table
#[derive(Debug)]
pub struct PostgresTerminus {
    name: String,
    indirection: String,
    pool: PgPool,
    migrated: OnceCell<()>,
}

impl PostgresTerminus {
    /// Create a terminus whose pool connects lazily
    pub fn connect_lazy(
        name: impl Into<String>,
        indirection: impl Into<String>,
        database_url: &str,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect_lazy(database_url)
            .map_err(|e| IndirectorError::terminus(format!("Invalid database URL: {}", e)))?;
        Ok(Self::from_pool(name, indirection, pool))
    }

    /// Create from an existing pool
    pub fn from_pool(name: impl Into<String>, indirection: impl Into<String>, pool: PgPool) -> Self {
        Self {
            name: name.into(),
            indirection: indirection.into(),
            pool,
            migrated: OnceCell::new(),
        }
    }

    /// Create the table if it does not exist yet; runs once per terminus
    async fn ensure_schema(&self) -> Result<()> {
        self.migrated
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS indirector_instances (
                        indirection VARCHAR(255) NOT NULL,
                        name VARCHAR(1024) NOT NULL,
                        data JSONB NOT NULL,
                        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                        PRIMARY KEY (indirection, name)
                    )
                    "#,
                )
                .execute(&self.pool)
                .await
                .map_err(database_error)?;
                info!(indirection = %self.indirection, "Database schema ready");
                Ok::<(), IndirectorError>(())
            })
            .await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Terminus for PostgresTerminus {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    async fn find(&self, request: &Request) -> Result<Option<Instance>> {
        self.ensure_schema().await?;
        let row = sqlx::query(
            "SELECT name, data FROM indirector_instances WHERE indirection = $1 AND name = $2",
        )
        .bind(&self.indirection)
        .bind(request.key())
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(row.map(|r| {
            let Json(data): Json<Value> = r.get("data");
            Instance::new(r.get::<String, _>("name"), data)
        }))
    }

    async fn head(&self, request: &Request) -> Result<bool> {
        self.ensure_schema().await?;
        let row = sqlx::query(
            "SELECT 1 FROM indirector_instances WHERE indirection = $1 AND name = $2",
        )
        .bind(&self.indirection)
        .bind(request.key())
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;
        Ok(row.is_some())
    }

    async fn search(&self, request: &Request) -> Result<Vec<Instance>> {
        self.ensure_schema().await?;
        let filter = Filter::from_params(&request.options().params)?;
        let rows = sqlx::query(
            "SELECT name, data FROM indirector_instances WHERE indirection = $1 ORDER BY name",
        )
        .bind(&self.indirection)
        .fetch_all(&self.pool)
        .await
        .map_err(database_error)?;

        let instances = rows
            .iter()
            .map(|r| {
                let Json(data): Json<Value> = r.get("data");
                Instance::new(r.get::<String, _>("name"), data)
            })
            .collect();
        Ok(filter.apply(instances))
    }

    async fn save(&self, request: &Request) -> Result<Instance> {
        self.ensure_schema().await?;
        let instance = request
            .instance()
            .ok_or_else(|| IndirectorError::Validation("Save requests need an instance".into()))?;

        sqlx::query(
            r#"
            INSERT INTO indirector_instances (indirection, name, data, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (indirection, name) DO UPDATE SET
                data = EXCLUDED.data,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&self.indirection)
        .bind(request.key())
        .bind(Json(&instance.data))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(indirection = %self.indirection, key = %request.key(), error = %e, "Failed to save instance");
            database_error(e)
        })?;

        info!(indirection = %self.indirection, key = %request.key(), "Saved instance in database");
        Ok(instance.clone())
    }

    async fn destroy(&self, request: &Request) -> Result<Option<Instance>> {
        self.ensure_schema().await?;
        let row = sqlx::query(
            "DELETE FROM indirector_instances WHERE indirection = $1 AND name = $2 RETURNING name, data",
        )
        .bind(&self.indirection)
        .bind(request.key())
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;

        let removed = row.map(|r| {
            let Json(data): Json<Value> = r.get("data");
            Instance::new(r.get::<String, _>("name"), data)
        });
        if removed.is_some() {
            info!(indirection = %self.indirection, key = %request.key(), "Removed instance from database");
        }
        Ok(removed)
    }
}
