use deadpool_postgres::PoolError;
use thiserror::Error;
use tokio_postgres::Error as PgError;
use tracing::{info, instrument};

use super::{DbPoolError, PgPool};

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("failed to run migration: {0}")]
    Postgres(#[from] PgError),
    #[error("failed to build pool: {0}")]
    PoolBuild(#[from] DbPoolError),
}

struct Migration {
    id: i32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    id: 1,
    description: "graph node/edge tables with natural-key and triple merge keys",
    sql: r#"
CREATE SCHEMA IF NOT EXISTS cg;

CREATE TABLE IF NOT EXISTS cg.schema_migrations (
    id INTEGER PRIMARY KEY,
    description TEXT NOT NULL,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS cg.graph_nodes (
    uid TEXT PRIMARY KEY,
    label TEXT NOT NULL,
    natural_key TEXT NOT NULL,
    attrs JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (label, natural_key)
);

CREATE TABLE IF NOT EXISTS cg.graph_edges (
    eid TEXT PRIMARY KEY,
    from_uid TEXT NOT NULL REFERENCES cg.graph_nodes(uid),
    rel_type TEXT NOT NULL,
    to_uid TEXT NOT NULL REFERENCES cg.graph_nodes(uid),
    attrs JSONB NOT NULL DEFAULT '{}'::jsonb,
    weight DOUBLE PRECISION,
    last_updated TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (from_uid, rel_type, to_uid),
    CONSTRAINT chk_weight_range CHECK (weight IS NULL OR (weight >= 0 AND weight <= 1))
);

CREATE INDEX IF NOT EXISTS idx_graph_nodes_label_uid
    ON cg.graph_nodes(label, uid);
CREATE INDEX IF NOT EXISTS idx_graph_edges_from_rel
    ON cg.graph_edges(from_uid, rel_type);
CREATE INDEX IF NOT EXISTS idx_graph_edges_to_rel
    ON cg.graph_edges(to_uid, rel_type);
"#,
}];

/// Apply pending migrations in order. Idempotent: applied ids are recorded
/// in `cg.schema_migrations` and skipped on the next run.
#[instrument(skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrationError> {
    let client = pool.get().await?;

    client
        .batch_execute(
            "CREATE SCHEMA IF NOT EXISTS cg;
             CREATE TABLE IF NOT EXISTS cg.schema_migrations (
                 id INTEGER PRIMARY KEY,
                 description TEXT NOT NULL,
                 applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
             );",
        )
        .await?;

    for migration in MIGRATIONS {
        let applied = client
            .query_opt(
                "SELECT 1 FROM cg.schema_migrations WHERE id = $1",
                &[&migration.id],
            )
            .await?
            .is_some();
        if applied {
            continue;
        }

        client.batch_execute(migration.sql).await?;
        client
            .execute(
                "INSERT INTO cg.schema_migrations (id, description) VALUES ($1, $2)",
                &[&migration.id, &migration.description],
            )
            .await?;
        info!(id = migration.id, description = migration.description, "migration applied");
    }

    Ok(())
}
