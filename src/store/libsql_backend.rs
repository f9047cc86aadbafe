//! libSQL backend for [`DispatchStore`]. Supports local file and in-memory
//! databases.
//!
//! Each row carries the queryable columns (status, priority, timestamps)
//! alongside the full record as a JSON payload.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{info, warn};

use crate::dispatch::job::Job;
use crate::dispatch::technician::Technician;
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::DispatchStore;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlBackend {
    // Never read; the connection is only valid while the database is alive.
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        migrations::run_migrations(backend.conn()).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        migrations::run_migrations(backend.conn()).await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Read the `payload` column of every row returned by `sql`, skipping
    /// rows that no longer deserialize.
    async fn load_payloads<T: serde::de::DeserializeOwned>(
        &self,
        sql: &str,
        what: &str,
    ) -> Result<Vec<T>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, ())
            .await
            .map_err(|e| DatabaseError::Query(format!("load {what}: {e}")))?;

        let mut items = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("load {what}: {e}")))?
        {
            let payload: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("load {what} row: {e}")))?;
            match serde_json::from_str(&payload) {
                Ok(item) => items.push(item),
                Err(e) => warn!(error = %e, "Skipping unreadable {what} row"),
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl DispatchStore for LibSqlBackend {
    async fn save_job(&self, job: &Job) -> Result<(), DatabaseError> {
        let payload = serde_json::to_string(job)
            .map_err(|e| DatabaseError::Serialization(format!("job {}: {e}", job.id)))?;

        self.conn()
            .execute(
                "INSERT INTO jobs (id, status, priority, created_at, updated_at, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    status = excluded.status,
                    updated_at = excluded.updated_at,
                    payload = excluded.payload",
                params![
                    job.id.as_str(),
                    job.status.to_string(),
                    job.priority.to_string(),
                    job.created_at.to_rfc3339(),
                    job.updated_at.to_rfc3339(),
                    payload
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_job: {e}")))?;
        Ok(())
    }

    async fn save_technician(&self, technician: &Technician) -> Result<(), DatabaseError> {
        let payload = serde_json::to_string(technician).map_err(|e| {
            DatabaseError::Serialization(format!("technician {}: {e}", technician.id))
        })?;

        self.conn()
            .execute(
                "INSERT INTO technicians (id, available, updated_at, payload)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    available = excluded.available,
                    updated_at = excluded.updated_at,
                    payload = excluded.payload",
                params![
                    technician.id.as_str(),
                    technician.available as i64,
                    Utc::now().to_rfc3339(),
                    payload
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_technician: {e}")))?;
        Ok(())
    }

    async fn load_jobs(&self) -> Result<Vec<Job>, DatabaseError> {
        self.load_payloads("SELECT payload FROM jobs ORDER BY created_at, id", "jobs")
            .await
    }

    async fn load_technicians(&self) -> Result<Vec<Technician>, DatabaseError> {
        self.load_payloads("SELECT payload FROM technicians ORDER BY id", "technicians")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::model::{Category, Classification, Severity, Urgency};
    use crate::dispatch::job::{CustomerInfo, JobId, JobStatus};

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn make_job(seq: u64) -> Job {
        Job::new(
            JobId::from_seq(seq),
            CustomerInfo::new("Mary Smith", "555-0101", "123 Oak St"),
            "Kitchen sink clogged",
            Classification::new(Category::Clog, Severity::Medium, Urgency::Medium, "1 hour"),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn save_and_load_job() {
        let db = test_db().await;
        let job = make_job(1);
        db.save_job(&job).await.unwrap();

        let jobs = db.load_jobs().await.unwrap();
        assert_eq!(jobs, vec![job]);
    }

    #[tokio::test]
    async fn save_job_upserts() {
        let db = test_db().await;
        let mut job = make_job(1);
        db.save_job(&job).await.unwrap();

        job.transition_to(JobStatus::Cancelled, Some("customer called".into()), Utc::now())
            .unwrap();
        db.save_job(&job).await.unwrap();

        let jobs = db.load_jobs().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Cancelled);
        assert_eq!(jobs[0].transitions.len(), 1);
    }

    #[tokio::test]
    async fn technicians_load_by_id() {
        let db = test_db().await;
        db.save_technician(&Technician::new("T002", "Sarah", &["drain"], "Uptown"))
            .await
            .unwrap();
        let mut john = Technician::new("T001", "John", &["leak"], "Downtown");
        db.save_technician(&john).await.unwrap();
        john.location = "Midtown".into();
        db.save_technician(&john).await.unwrap();

        let techs = db.load_technicians().await.unwrap();
        assert_eq!(techs.len(), 2);
        assert_eq!(techs[0].id.as_str(), "T001");
        assert_eq!(techs[0].location, "Midtown");
    }

    #[tokio::test]
    async fn unreadable_rows_are_skipped() {
        let db = test_db().await;
        db.save_job(&make_job(1)).await.unwrap();
        db.conn()
            .execute(
                "INSERT INTO jobs (id, status, priority, created_at, updated_at, payload)
                 VALUES ('JOB-0002', 'pending', 'low', '2030-01-01', '2030-01-01', 'not json')",
                (),
            )
            .await
            .unwrap();

        assert_eq!(db.load_jobs().await.unwrap().len(), 1);
    }
}
