//! Postgres-backed document store.
//!
//! Each document is one row of `documents`, keyed by (collection, doc_id),
//! with the full document kept in a JSONB `body` column. Writes are whole-body
//! replacements; there is no field-level merge anywhere.

use anyhow::{Context, Result};
use bridge_schemas::{Document, DocumentId};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::debug;

use crate::{
    ensure_same_id, DeleteOutcome, DocumentStore, InsertOutcome, ReplaceOutcome, StoreError,
};

pub const ENV_DB_URL: &str = "BRIDGE_DATABASE_URL";

/// Connect to Postgres using BRIDGE_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url, 10).await
}

pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_documents_table: bool,
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='documents'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_documents_table: exists,
    })
}

// ---------------------------------------------------------------------------
// PgDocumentStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl DocumentStore for PgDocumentStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn insert_one(&self, collection: &str, doc: &Document) -> Result<InsertOutcome, StoreError> {
        // xmax = 0 only for a freshly inserted tuple, so it tells insert from overwrite.
        let (inserted,): (bool,) = sqlx::query_as::<_, (bool,)>(
            r#"
            insert into documents (collection, doc_id, body)
            values ($1, $2, $3)
            on conflict (collection, doc_id)
            do update set body = excluded.body, updated_at_utc = now()
            returning (xmax = 0) as inserted
            "#,
        )
        .bind(collection)
        .bind(doc.id().as_str())
        .bind(doc.to_value())
        .fetch_one(&self.pool)
        .await?;

        Ok(InsertOutcome {
            inserted,
            overwritten: !inserted,
        })
    }

    async fn replace_one(
        &self,
        collection: &str,
        id: &DocumentId,
        doc: &Document,
        upsert: bool,
    ) -> Result<ReplaceOutcome, StoreError> {
        ensure_same_id(id, doc)?;
        let body = doc.to_value();

        let mut tx = self.pool.begin().await?;

        let existing: Option<(Value,)> = sqlx::query_as::<_, (Value,)>(
            r#"
            select body
            from documents
            where collection = $1 and doc_id = $2
            for update
            "#,
        )
        .bind(collection)
        .bind(id.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match existing {
            Some((prev,)) => {
                let modified = prev != body;
                if modified {
                    sqlx::query(
                        r#"
                        update documents
                        set body = $3, updated_at_utc = now()
                        where collection = $1 and doc_id = $2
                        "#,
                    )
                    .bind(collection)
                    .bind(id.as_str())
                    .bind(&body)
                    .execute(&mut *tx)
                    .await?;
                }
                ReplaceOutcome {
                    matched: 1,
                    modified: u64::from(modified),
                    upserted: false,
                }
            }
            None if upsert => {
                // A concurrent insert can win between the select and here; the
                // conflict clause turns that into a plain overwrite.
                sqlx::query(
                    r#"
                    insert into documents (collection, doc_id, body)
                    values ($1, $2, $3)
                    on conflict (collection, doc_id)
                    do update set body = excluded.body, updated_at_utc = now()
                    "#,
                )
                .bind(collection)
                .bind(id.as_str())
                .bind(&body)
                .execute(&mut *tx)
                .await?;
                ReplaceOutcome {
                    matched: 0,
                    modified: 0,
                    upserted: true,
                }
            }
            None => ReplaceOutcome::default(),
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn delete_one(&self, collection: &str, id: &DocumentId) -> Result<DeleteOutcome, StoreError> {
        let res = sqlx::query("delete from documents where collection = $1 and doc_id = $2")
            .bind(collection)
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(DeleteOutcome {
            deleted: res.rows_affected(),
        })
    }

    async fn find_one(&self, collection: &str, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        let row: Option<(Value,)> = sqlx::query_as::<_, (Value,)>(
            "select body from documents where collection = $1 and doc_id = $2",
        )
        .bind(collection)
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Ok(None),
            Some((body,)) => {
                debug!(collection, doc_id = %id, "pg find_one hit");
                Document::from_value(body)
                    .map(Some)
                    .map_err(|e| StoreError::Backend(format!("stored body for '{id}' is invalid: {e}")))
            }
        }
    }
}
