//! `DispatchStore` trait: the persistence seam behind the dispatcher.

use async_trait::async_trait;

use crate::dispatch::job::Job;
use crate::dispatch::technician::Technician;
use crate::error::DatabaseError;

/// Backend-agnostic store for jobs and technicians.
///
/// Writes are upserts keyed by id. The dispatcher calls them while holding
/// its board lock, so the stored sequence of writes matches the in-memory one.
#[async_trait]
pub trait DispatchStore: Send + Sync {
    /// Insert or replace a job.
    async fn save_job(&self, job: &Job) -> Result<(), DatabaseError>;

    /// Insert or replace a technician.
    async fn save_technician(&self, technician: &Technician) -> Result<(), DatabaseError>;

    /// Every stored job, oldest first.
    async fn load_jobs(&self) -> Result<Vec<Job>, DatabaseError>;

    /// Every stored technician, by id.
    async fn load_technicians(&self) -> Result<Vec<Technician>, DatabaseError>;
}
