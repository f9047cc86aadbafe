//! Job and technician registries: the canonical owners of scheduler state.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::classify::model::Classification;
use crate::dispatch::job::{CustomerInfo, Job, JobId, JobStatus, PriorityTier};
use crate::dispatch::queue::{PriorityQueue, QueueEntry};
use crate::dispatch::technician::{
    Technician, TechnicianId, completion_after, parse_duration_hours,
};
use crate::error::DispatchError;

/// Owns every job and the queue of pending ones.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: HashMap<JobId, Job>,
    queue: PriorityQueue,
    last_seq: u64,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from stored jobs. PENDING jobs are re-queued and id
    /// allocation continues after the highest stored sequence.
    pub fn from_jobs(jobs: Vec<Job>) -> Self {
        let mut registry = Self::new();
        for job in jobs {
            registry.last_seq = registry.last_seq.max(job.id.seq().unwrap_or(0));
            if job.status == JobStatus::Pending {
                registry.queue.push(QueueEntry::for_job(&job));
            }
            registry.jobs.insert(job.id.clone(), job);
        }
        registry
    }

    /// Register a classified job and enqueue it.
    pub fn submit(
        &mut self,
        customer: CustomerInfo,
        description: impl Into<String>,
        classification: Classification,
        now: DateTime<Utc>,
    ) -> Result<&Job, DispatchError> {
        classification.validate()?;

        self.last_seq += 1;
        let id = JobId::from_seq(self.last_seq);
        let job = Job::new(id.clone(), customer, description, classification, now);
        self.queue.push(QueueEntry::for_job(&job));

        Ok(self.jobs.entry(id).or_insert(job))
    }

    pub fn find(&self, id: &JobId) -> Result<&Job, DispatchError> {
        self.jobs
            .get(id)
            .ok_or_else(|| DispatchError::JobNotFound { id: id.clone() })
    }

    fn find_mut(&mut self, id: &JobId) -> Result<&mut Job, DispatchError> {
        self.jobs
            .get_mut(id)
            .ok_or_else(|| DispatchError::JobNotFound { id: id.clone() })
    }

    /// Apply a state-machine transition. The job is unchanged on error.
    ///
    /// Moves into PENDING or ASSIGNED must keep the queue and technician
    /// back-reference in step, so they only happen through
    /// [`assign`](Self::assign) and [`requeue_assigned`](Self::requeue_assigned).
    pub fn transition(
        &mut self,
        id: &JobId,
        status: JobStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<&Job, DispatchError> {
        let job = self.find_mut(id)?;
        if matches!(status, JobStatus::Pending | JobStatus::Assigned) {
            return Err(DispatchError::IllegalTransition {
                id: id.clone(),
                from: job.status,
                to: status,
            });
        }
        job.transition_to(status, reason, now)?;
        Ok(job)
    }

    /// PENDING -> ASSIGNED, recording the technician back-reference.
    pub fn assign(
        &mut self,
        id: &JobId,
        technician: &TechnicianId,
        now: DateTime<Utc>,
    ) -> Result<&Job, DispatchError> {
        let job = self.find_mut(id)?;
        job.transition_to(JobStatus::Assigned, None, now)?;
        job.assigned_technician = Some(technician.clone());
        Ok(job)
    }

    /// ASSIGNED -> PENDING and back onto the queue in its old place.
    pub fn requeue_assigned(
        &mut self,
        id: &JobId,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<&Job, DispatchError> {
        let job = self.find_mut(id)?;
        if job.status != JobStatus::Assigned {
            return Err(DispatchError::IllegalTransition {
                id: id.clone(),
                from: job.status,
                to: JobStatus::Pending,
            });
        }
        job.transition_to(JobStatus::Pending, Some(reason.into()), now)?;
        let entry = QueueEntry::for_job(job);
        self.queue.push(entry);
        self.find(id)
    }

    /// Put a PENDING job back on the queue after it was popped but not assigned.
    pub fn push_back(&mut self, id: &JobId) -> Result<(), DispatchError> {
        let job = self.find(id)?;
        if job.status != JobStatus::Pending {
            return Err(DispatchError::IllegalTransition {
                id: id.clone(),
                from: job.status,
                to: JobStatus::Pending,
            });
        }
        let entry = QueueEntry::for_job(job);
        self.queue.push(entry);
        Ok(())
    }

    /// Pop the next entry whose job is still PENDING, discarding stale ones.
    pub fn pop_next_pending(&mut self) -> Result<JobId, DispatchError> {
        loop {
            let entry = self.queue.pop_highest()?;
            match self.jobs.get(&entry.job_id) {
                Some(job) if job.status == JobStatus::Pending => return Ok(entry.job_id),
                Some(job) => {
                    debug!(job_id = %entry.job_id, status = %job.status, "Discarding stale queue entry");
                }
                None => {
                    debug!(job_id = %entry.job_id, "Discarding queue entry for unknown job");
                }
            }
        }
    }

    /// Up to `n` PENDING jobs in dispatch order.
    pub fn peek_pending(&self, n: usize) -> Vec<&Job> {
        self.queue
            .snapshot()
            .into_iter()
            .filter_map(|entry| self.jobs.get(&entry.job_id))
            .filter(|job| job.status == JobStatus::Pending)
            .take(n)
            .collect()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// All jobs in allocation order.
    pub fn all(&self) -> Vec<&Job> {
        let mut jobs: Vec<&Job> = self.jobs.values().collect();
        jobs.sort_by_key(|j| (j.id.seq().unwrap_or(u64::MAX), j.id.clone()));
        jobs
    }

    pub fn by_status(&self, status: JobStatus) -> Vec<&Job> {
        self.all().into_iter().filter(|j| j.status == status).collect()
    }

    pub fn by_priority(&self, tier: PriorityTier) -> Vec<&Job> {
        self.all().into_iter().filter(|j| j.priority == tier).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Owns the technician roster. Iteration is by id, so listings are
/// deterministic for a given state.
#[derive(Debug, Default)]
pub struct TechnicianRegistry {
    technicians: BTreeMap<TechnicianId, Technician>,
}

impl TechnicianRegistry {
    pub fn new(roster: Vec<Technician>) -> Self {
        Self {
            technicians: roster.into_iter().map(|t| (t.id.clone(), t)).collect(),
        }
    }

    pub fn get(&self, id: &TechnicianId) -> Result<&Technician, DispatchError> {
        self.technicians
            .get(id)
            .ok_or_else(|| DispatchError::TechnicianNotFound { id: id.clone() })
    }

    fn get_mut(&mut self, id: &TechnicianId) -> Result<&mut Technician, DispatchError> {
        self.technicians
            .get_mut(id)
            .ok_or_else(|| DispatchError::TechnicianNotFound { id: id.clone() })
    }

    pub fn list(&self) -> Vec<&Technician> {
        self.technicians.values().collect()
    }

    pub fn list_available(&self) -> Vec<&Technician> {
        self.technicians.values().filter(|t| t.available).collect()
    }

    pub fn available_count(&self) -> usize {
        self.technicians.values().filter(|t| t.available).count()
    }

    /// The technician currently holding `job_id`, if any.
    pub fn holder_of(&self, job_id: &JobId) -> Option<&Technician> {
        self.technicians
            .values()
            .find(|t| t.current_job.as_ref() == Some(job_id))
    }

    /// Take a job. Estimated completion is `now` plus the first integer in
    /// `estimate` as hours, or `default_hours`.
    pub fn mark_busy(
        &mut self,
        id: &TechnicianId,
        job_id: &JobId,
        estimate: &str,
        default_hours: f64,
        now: DateTime<Utc>,
    ) -> Result<&Technician, DispatchError> {
        let tech = self.get_mut(id)?;
        if !tech.available || tech.current_job.is_some() {
            return Err(DispatchError::TechnicianUnavailable {
                id: id.clone(),
                current_job: tech.current_job.clone(),
            });
        }

        let hours = parse_duration_hours(estimate, default_hours);
        let completion = completion_after(now, hours).ok_or_else(|| {
            DispatchError::InvalidClassification {
                reason: format!("estimated duration {estimate:?} ({hours} hours) is out of range"),
            }
        })?;
        tech.available = false;
        tech.current_job = Some(job_id.clone());
        tech.estimated_completion = Some(completion);
        Ok(tech)
    }

    /// Release the held job. Returns the job that was held.
    pub fn mark_free(&mut self, id: &TechnicianId) -> Result<JobId, DispatchError> {
        let tech = self.get_mut(id)?;
        let job_id = tech
            .current_job
            .take()
            .ok_or_else(|| DispatchError::NoActiveJob { id: id.clone() })?;
        tech.available = true;
        tech.estimated_completion = None;
        Ok(job_id)
    }

    /// Clear a technician whose flags disagree with its held job.
    pub(crate) fn force_available(&mut self, id: &TechnicianId) -> Result<(), DispatchError> {
        let tech = self.get_mut(id)?;
        tech.available = true;
        tech.current_job = None;
        tech.estimated_completion = None;
        Ok(())
    }

    pub fn update_location(
        &mut self,
        id: &TechnicianId,
        location: impl Into<String>,
    ) -> Result<&Technician, DispatchError> {
        let tech = self.get_mut(id)?;
        tech.location = location.into();
        Ok(tech)
    }

    pub fn len(&self) -> usize {
        self.technicians.len()
    }

    pub fn is_empty(&self) -> bool {
        self.technicians.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::model::{Category, Severity, Urgency};

    fn classification(urgency: Urgency) -> Classification {
        Classification::new(Category::Leak, Severity::Medium, urgency, "1-3 hours")
    }

    fn submit(reg: &mut JobRegistry, urgency: Urgency) -> JobId {
        reg.submit(CustomerInfo::default(), "leak", classification(urgency), Utc::now())
            .unwrap()
            .id
            .clone()
    }

    #[test]
    fn submit_allocates_monotonic_ids() {
        let mut reg = JobRegistry::new();
        let a = submit(&mut reg, Urgency::Low);
        let b = submit(&mut reg, Urgency::High);
        assert_eq!(a.as_str(), "JOB-0001");
        assert_eq!(b.as_str(), "JOB-0002");
        assert_eq!(reg.find(&b).unwrap().priority, PriorityTier::High);
        assert_eq!(reg.find(&a).unwrap().status, JobStatus::Pending);
        assert_eq!(reg.queue_len(), 2);
    }

    #[test]
    fn submit_rejects_invalid_classification() {
        let mut reg = JobRegistry::new();
        let bad = Classification::new(Category::Leak, Severity::Low, Urgency::Low, " ");
        let err = reg
            .submit(CustomerInfo::default(), "leak", bad, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidClassification { .. }));
        assert!(reg.is_empty());
        assert_eq!(reg.queue_len(), 0);
    }

    #[test]
    fn find_unknown_is_not_found() {
        let reg = JobRegistry::new();
        assert!(matches!(
            reg.find(&JobId::from_seq(42)),
            Err(DispatchError::JobNotFound { .. })
        ));
    }

    #[test]
    fn cancelled_entry_is_skipped() {
        let mut reg = JobRegistry::new();
        let a = submit(&mut reg, Urgency::Emergency);
        let b = submit(&mut reg, Urgency::Low);
        reg.transition(&a, JobStatus::Cancelled, None, Utc::now())
            .unwrap();

        assert_eq!(reg.pop_next_pending().unwrap(), b);
        assert!(matches!(reg.pop_next_pending(), Err(DispatchError::Empty)));
    }

    #[test]
    fn requeue_restores_queue_position() {
        let mut reg = JobRegistry::new();
        let a = submit(&mut reg, Urgency::Medium);
        let b = submit(&mut reg, Urgency::Medium);
        let tech = TechnicianId::from("T001");

        assert_eq!(reg.pop_next_pending().unwrap(), a);
        reg.assign(&a, &tech, Utc::now()).unwrap();
        reg.requeue_assigned(&a, "rollback", Utc::now()).unwrap();

        assert!(reg.find(&a).unwrap().assigned_technician.is_none());
        assert_eq!(reg.pop_next_pending().unwrap(), a);
        assert_eq!(reg.pop_next_pending().unwrap(), b);
    }

    #[test]
    fn transition_refuses_queue_bound_targets() {
        let mut reg = JobRegistry::new();
        let a = submit(&mut reg, Urgency::Medium);
        let now = Utc::now();

        let err = reg
            .transition(&a, JobStatus::Assigned, None, now)
            .unwrap_err();
        assert!(matches!(err, DispatchError::IllegalTransition { to: JobStatus::Assigned, .. }));
        assert_eq!(reg.find(&a).unwrap().status, JobStatus::Pending);

        reg.assign(&a, &TechnicianId::from("T001"), now).unwrap();
        let err = reg
            .transition(&a, JobStatus::Pending, None, now)
            .unwrap_err();
        assert!(matches!(err, DispatchError::IllegalTransition { to: JobStatus::Pending, .. }));
        let job = reg.find(&a).unwrap();
        assert_eq!(job.status, JobStatus::Assigned);
        assert_eq!(job.assigned_technician, Some(TechnicianId::from("T001")));
    }

    #[test]
    fn requeue_only_from_assigned() {
        let mut reg = JobRegistry::new();
        let a = submit(&mut reg, Urgency::Medium);
        assert!(matches!(
            reg.requeue_assigned(&a, "nope", Utc::now()),
            Err(DispatchError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn peek_pending_skips_stale() {
        let mut reg = JobRegistry::new();
        let a = submit(&mut reg, Urgency::High);
        let b = submit(&mut reg, Urgency::Low);
        reg.transition(&a, JobStatus::Cancelled, None, Utc::now())
            .unwrap();
        let next: Vec<JobId> = reg.peek_pending(5).iter().map(|j| j.id.clone()).collect();
        assert_eq!(next, vec![b]);
        // stale entry still physically queued until popped
        assert_eq!(reg.queue_len(), 2);
    }

    #[test]
    fn from_jobs_continues_ids_and_requeues_pending() {
        let mut reg = JobRegistry::new();
        submit(&mut reg, Urgency::Low);
        let b = submit(&mut reg, Urgency::High);
        reg.assign(&b, &TechnicianId::from("T001"), Utc::now()).unwrap();
        let jobs: Vec<Job> = reg.all().into_iter().cloned().collect();

        let mut restored = JobRegistry::from_jobs(jobs);
        assert_eq!(restored.queue_len(), 1);
        let c = submit(&mut restored, Urgency::Low);
        assert_eq!(c.as_str(), "JOB-0003");
    }

    fn roster() -> TechnicianRegistry {
        TechnicianRegistry::new(vec![
            Technician::new("T002", "Sarah", &["drain"], "Uptown"),
            Technician::new("T001", "John", &["leak"], "Downtown"),
        ])
    }

    #[test]
    fn list_available_is_ordered_by_id() {
        let reg = roster();
        let ids: Vec<&str> = reg.list_available().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["T001", "T002"]);
    }

    #[test]
    fn mark_busy_twice_fails() {
        let mut reg = roster();
        let tech = TechnicianId::from("T001");
        let now = Utc::now();
        reg.mark_busy(&tech, &JobId::from_seq(1), "1-3 hours", 2.0, now)
            .unwrap();
        let t = reg.get(&tech).unwrap();
        assert!(!t.available);
        assert_eq!(t.estimated_completion, completion_after(now, 1.0));

        let err = reg
            .mark_busy(&tech, &JobId::from_seq(2), "1 hour", 2.0, now)
            .unwrap_err();
        match err {
            DispatchError::TechnicianUnavailable { current_job, .. } => {
                assert_eq!(current_job, Some(JobId::from_seq(1)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(reg.available_count(), 1);
    }

    #[test]
    fn mark_busy_with_unrepresentable_completion_fails() {
        let mut reg = roster();
        let tech = TechnicianId::from("T001");
        let now = Utc::now();

        // oversized figure falls back to the default
        let t = reg
            .mark_busy(&tech, &JobId::from_seq(1), "99999999999 hours", 2.0, now)
            .unwrap();
        assert_eq!(t.estimated_completion, completion_after(now, 2.0));
        reg.mark_free(&tech).unwrap();

        let err = reg
            .mark_busy(&tech, &JobId::from_seq(2), "a while", f64::INFINITY, now)
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidClassification { .. }));
        let t = reg.get(&tech).unwrap();
        assert!(t.available);
        assert!(t.current_job.is_none());
    }

    #[test]
    fn mark_free_restores_availability() {
        let mut reg = roster();
        let tech = TechnicianId::from("T002");
        reg.mark_busy(&tech, &JobId::from_seq(1), "soon", 2.0, Utc::now())
            .unwrap();
        assert_eq!(reg.holder_of(&JobId::from_seq(1)).unwrap().id, tech);

        assert_eq!(reg.mark_free(&tech).unwrap(), JobId::from_seq(1));
        let t = reg.get(&tech).unwrap();
        assert!(t.available);
        assert!(t.current_job.is_none());
        assert!(t.estimated_completion.is_none());
    }

    #[test]
    fn mark_free_without_job_is_no_active_job() {
        let mut reg = roster();
        assert!(matches!(
            reg.mark_free(&TechnicianId::from("T001")),
            Err(DispatchError::NoActiveJob { .. })
        ));
    }

    #[test]
    fn unknown_technician_is_not_found() {
        let mut reg = roster();
        assert!(matches!(
            reg.update_location(&TechnicianId::from("T999"), "Eastside"),
            Err(DispatchError::TechnicianNotFound { .. })
        ));
    }
}
