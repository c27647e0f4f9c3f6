//! Local database initialization and schema migrations
//!
//! The device store is a single SQLite file holding two keyed containers:
//! `patients` (document column plus secondary-index columns) and `uploads`
//! (pending media). The schema is versioned; migrations are additive and
//! idempotent so an upgraded app never loses captured data.

use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tbt_common::Result;
use tracing::info;

/// Current schema version. Increment when adding a migration.
const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Open (creating if needed) the device database and bring the schema up to
/// date.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new device database: {}", db_path.display());
    } else {
        info!("Opened existing device database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    // WAL keeps capture writes responsive while a sync reads
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// In-memory database for tests. Single connection: each in-memory SQLite
/// connection is its own database.
pub async fn init_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Get the recorded schema version (0 when the table is missing or empty)
async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations. Safe to call on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)")
        .execute(pool)
        .await?;

    let version = get_schema_version(pool).await?;

    if version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("Migration v1: created patients and uploads tables");
    }

    let final_version = get_schema_version(pool).await?;
    if final_version != CURRENT_SCHEMA_VERSION {
        return Err(tbt_common::Error::Internal(format!(
            "schema version {final_version} after migrations, expected {CURRENT_SCHEMA_VERSION}"
        )));
    }

    Ok(())
}

/// v1: base schema.
///
/// `patients` keeps the full document as JSON plus denormalized columns for
/// the secondary lookups (risk level, creation time, collection date);
/// `uploads` holds pending media with lookups by patient, role, kind and
/// creation time.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS patients (
            patient_id TEXT PRIMARY KEY,
            risk_level TEXT NOT NULL,
            created_at TEXT NOT NULL,
            collection_date TEXT NOT NULL,
            doc TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_patients_risk_level ON patients(risk_level)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_patients_created_at ON patients(created_at)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_patients_collection_date ON patients(collection_date)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS uploads (
            upload_id TEXT PRIMARY KEY,
            patient_id TEXT NOT NULL,
            role TEXT NOT NULL,
            kind TEXT NOT NULL,
            file_name TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            payload BLOB NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_uploads_patient_id ON uploads(patient_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_uploads_role ON uploads(role)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_uploads_kind ON uploads(kind)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_uploads_created_at ON uploads(created_at)")
        .execute(pool)
        .await?;

    Ok(())
}
