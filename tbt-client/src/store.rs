//! Durable local store for patient records and pending uploads
//!
//! Storage failures surface to the caller uncaught: silently dropping a
//! screening record is never acceptable. The caller decides whether to
//! degrade or block submission.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tbt_common::models::{CapturerRole, MediaKind};
use tbt_common::{Error, PatientRecord, Result, UploadRecord, SENTINEL_PATIENT_ID};
use tracing::info;

/// Keyed local storage over the device SQLite database.
#[derive(Clone)]
pub struct LocalStore {
    pool: SqlitePool,
}

impl LocalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// All patient records, in no particular order.
    pub async fn list_all(&self) -> Result<Vec<PatientRecord>> {
        let rows = sqlx::query("SELECT doc FROM patients")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                let doc: String = row.get("doc");
                serde_json::from_str(&doc).map_err(Error::from)
            })
            .collect()
    }

    /// Insert the given records only when the store holds no patients.
    /// Idempotent bootstrap; never overwrites captured data.
    pub async fn seed_if_empty(&self, records: &[PatientRecord]) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM patients")
            .fetch_one(&mut *tx)
            .await?;
        if count > 0 {
            return Ok(false);
        }
        for record in records {
            insert_patient(&mut tx, record).await?;
        }
        tx.commit().await?;
        info!("Seeded {} patient records into empty store", records.len());
        Ok(true)
    }

    /// Atomically replace the whole patient set (full resync). The clear and
    /// re-insert run in one transaction, so a concurrent `upsert` lands
    /// either entirely before or entirely after — never inside.
    pub async fn replace_all(&self, records: &[PatientRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM patients").execute(&mut *tx).await?;
        for record in records {
            insert_patient(&mut tx, record).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Persist a newly captured or edited screening: stamp the provisional
    /// risk score and level from the answers, then upsert. The inference
    /// worker overwrites the stamped fields later; `model_version` stays
    /// unset until it does.
    pub async fn save_screening(&self, record: &mut PatientRecord) -> Result<()> {
        record.refresh_risk();
        self.upsert(record).await
    }

    /// Insert or update a patient record by key.
    pub async fn upsert(&self, record: &PatientRecord) -> Result<()> {
        let doc = serde_json::to_string(record)?;
        sqlx::query(
            r#"
            INSERT INTO patients (patient_id, risk_level, created_at, collection_date, doc)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(patient_id) DO UPDATE SET
                risk_level = excluded.risk_level,
                created_at = excluded.created_at,
                collection_date = excluded.collection_date,
                doc = excluded.doc
            "#,
        )
        .bind(&record.patient_id)
        .bind(record.effective_risk_level().as_str())
        .bind(record.created_at)
        .bind(record.collection_date)
        .bind(doc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add_upload(&self, upload: &UploadRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO uploads
                (upload_id, patient_id, role, kind, file_name, mime_type, payload, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&upload.upload_id)
        .bind(&upload.patient_id)
        .bind(upload.role.as_str())
        .bind(upload.kind.as_str())
        .bind(&upload.file_name)
        .bind(&upload.mime_type)
        .bind(&upload.payload)
        .bind(upload.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reassign every sentinel-keyed upload to the given real patient id in
    /// one atomic step. Returns the number of uploads moved; partial
    /// reassignment is not observable.
    pub async fn reassign_sentinel_uploads(&self, patient_id: &str) -> Result<u64> {
        if patient_id == SENTINEL_PATIENT_ID {
            return Err(Error::InvalidInput(
                "cannot reassign uploads to the sentinel id".into(),
            ));
        }
        let mut tx = self.pool.begin().await?;
        let moved = sqlx::query("UPDATE uploads SET patient_id = ? WHERE patient_id = ?")
            .bind(patient_id)
            .bind(SENTINEL_PATIENT_ID)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        info!("Reassigned {} pending uploads to patient {}", moved, patient_id);
        Ok(moved)
    }

    pub async fn list_uploads(&self) -> Result<Vec<UploadRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT upload_id, patient_id, role, kind, file_name, mime_type, payload, created_at
            FROM uploads ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(upload_from_row).collect()
    }

    pub async fn remove_upload(&self, upload_id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM uploads WHERE upload_id = ?")
            .bind(upload_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("upload {upload_id}")));
        }
        Ok(())
    }

    pub async fn count_uploads(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM uploads")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

async fn insert_patient(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    record: &PatientRecord,
) -> Result<()> {
    let doc = serde_json::to_string(record)?;
    sqlx::query(
        r#"
        INSERT INTO patients (patient_id, risk_level, created_at, collection_date, doc)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.patient_id)
    .bind(record.effective_risk_level().as_str())
    .bind(record.created_at)
    .bind(record.collection_date)
    .bind(doc)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn upload_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<UploadRecord> {
    let role: String = row.get("role");
    let kind: String = row.get("kind");
    let created_at: DateTime<Utc> = row.get("created_at");
    Ok(UploadRecord {
        upload_id: row.get("upload_id"),
        patient_id: row.get("patient_id"),
        role: parse_role(&role)?,
        kind: parse_kind(&kind)?,
        file_name: row.get("file_name"),
        mime_type: row.get("mime_type"),
        payload: row.get("payload"),
        created_at,
    })
}

fn parse_role(raw: &str) -> Result<CapturerRole> {
    match raw {
        "ASHA" => Ok(CapturerRole::Asha),
        "DOCTOR" => Ok(CapturerRole::Doctor),
        "LAB_TECH" => Ok(CapturerRole::LabTech),
        other => Err(Error::Internal(format!("unknown capturer role: {other}"))),
    }
}

fn parse_kind(raw: &str) -> Result<MediaKind> {
    match raw {
        "audio" => Ok(MediaKind::Audio),
        "image" => Ok(MediaKind::Image),
        "report" => Ok(MediaKind::Report),
        other => Err(Error::Internal(format!("unknown media kind: {other}"))),
    }
}
