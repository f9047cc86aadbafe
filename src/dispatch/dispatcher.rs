//! The dispatch service.
//!
//! All scheduler state lives in one [`DispatchBoard`] behind a single
//! `RwLock`. Every operation that touches a job and a technician together
//! (assignment, completion, cancellation) runs under one write guard, so
//! a half-applied assignment is never observable. Classification happens
//! before the lock is taken; the store is written while it is held.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::classify::model::{Classification, ClassificationRequest};
use crate::classify::oracle::{ClassificationOracle, classify_with_fallback};
use crate::config::DispatchConfig;
use crate::dispatch::job::{CustomerInfo, Job, JobId, JobStatus, PriorityTier};
use crate::dispatch::matcher::{MatchPolicy, Matcher};
use crate::dispatch::registry::{JobRegistry, TechnicianRegistry};
use crate::dispatch::report::{DispatchSummary, JobReport};
use crate::dispatch::technician::{Technician, TechnicianId};
use crate::error::{DispatchError, Error, Result};
use crate::store::DispatchStore;

/// Scheduler state guarded as one unit.
#[derive(Debug, Default)]
pub struct DispatchBoard {
    pub jobs: JobRegistry,
    pub technicians: TechnicianRegistry,
}

/// Broadcast to subscribers whenever scheduler state changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchEvent {
    JobSubmitted {
        job_id: JobId,
        priority: PriorityTier,
        category: String,
    },
    JobAssigned {
        job_id: JobId,
        technician_id: TechnicianId,
        score: u32,
    },
    JobStarted {
        job_id: JobId,
        technician_id: TechnicianId,
    },
    JobCompleted {
        job_id: JobId,
        technician_id: TechnicianId,
    },
    JobCancelled {
        job_id: JobId,
        released_technician: Option<TechnicianId>,
    },
    JobRequeued {
        job_id: JobId,
        reason: String,
    },
}

/// Why a dispatch pass stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassStop {
    /// No pending jobs remain.
    #[default]
    QueueEmpty,
    /// Every technician is busy.
    NoTechnicians,
    /// The matcher found no candidate; the job went back on the queue.
    NoMatch,
}

/// One assignment made by a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub job_id: JobId,
    pub technician_id: TechnicianId,
    pub score: u32,
}

/// Outcome of a single dispatch pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassReport {
    pub pass_id: Uuid,
    pub assignments: Vec<Assignment>,
    /// Jobs left queued because no skilled technician was free.
    pub deferred: Vec<JobId>,
    pub stopped: PassStop,
}

/// Result of `complete_job`.
#[derive(Debug, Clone, Serialize)]
pub struct Completion {
    pub job: Job,
    /// The follow-up pass, when re-dispatch on completion is enabled.
    pub redispatch: Option<PassReport>,
}

pub struct Dispatcher {
    config: DispatchConfig,
    matcher: Matcher,
    oracle: Arc<dyn ClassificationOracle>,
    store: Option<Arc<dyn DispatchStore>>,
    board: RwLock<DispatchBoard>,
    events: broadcast::Sender<DispatchEvent>,
}

impl Dispatcher {
    /// In-memory dispatcher over a fixed roster.
    pub fn new(
        config: DispatchConfig,
        oracle: Arc<dyn ClassificationOracle>,
        roster: Vec<Technician>,
    ) -> Self {
        let board = DispatchBoard {
            jobs: JobRegistry::new(),
            technicians: TechnicianRegistry::new(roster),
        };
        Self::from_parts(config, oracle, None, board)
    }

    fn from_parts(
        config: DispatchConfig,
        oracle: Arc<dyn ClassificationOracle>,
        store: Option<Arc<dyn DispatchStore>>,
        board: DispatchBoard,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            matcher: Matcher::new(config.match_policy),
            config,
            oracle,
            store,
            board: RwLock::new(board),
            events,
        }
    }

    /// Rebuild a dispatcher from `store`.
    ///
    /// Seeds `roster` when the store has no technicians, re-queues PENDING
    /// jobs, and repairs pairings a crash may have broken: a technician
    /// holding a job that is not active is freed, and an ASSIGNED job its
    /// technician does not hold goes back to PENDING.
    pub async fn restore(
        config: DispatchConfig,
        oracle: Arc<dyn ClassificationOracle>,
        store: Arc<dyn DispatchStore>,
        roster: Vec<Technician>,
    ) -> Result<Self> {
        let mut technicians = store.load_technicians().await?;
        if technicians.is_empty() {
            info!(count = roster.len(), "Seeding technician roster");
            for tech in &roster {
                store.save_technician(tech).await?;
            }
            technicians = roster;
        }

        let jobs = store.load_jobs().await?;
        let mut board = DispatchBoard {
            jobs: JobRegistry::from_jobs(jobs),
            technicians: TechnicianRegistry::new(technicians),
        };

        let (dirty_jobs, dirty_techs) =
            reconcile(&mut board, config.default_duration_hours, Utc::now())?;
        for id in &dirty_jobs {
            store.save_job(board.jobs.find(id)?).await?;
        }
        for id in &dirty_techs {
            store.save_technician(board.technicians.get(id)?).await?;
        }

        info!(
            jobs = board.jobs.len(),
            pending = board.jobs.by_status(JobStatus::Pending).len(),
            technicians = board.technicians.len(),
            repaired = dirty_jobs.len() + dirty_techs.len(),
            "Dispatcher restored"
        );

        Ok(Self::from_parts(config, oracle, Some(store), board))
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn match_policy(&self) -> MatchPolicy {
        self.matcher.policy()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: DispatchEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // ── Submission ──────────────────────────────────────────────────

    /// Classify `description` and register the job. Oracle trouble never
    /// fails the submission; the conservative fallback is used instead.
    pub async fn submit(&self, customer: CustomerInfo, description: &str) -> Result<Job> {
        let request = ClassificationRequest::new(description, customer.clone());
        let outcome =
            classify_with_fallback(self.oracle.as_ref(), &request, self.config.min_confidence)
                .await;
        self.submit_classified(customer, description, outcome.into_classification())
            .await
    }

    /// Register a job whose classification is already known.
    pub async fn submit_classified(
        &self,
        customer: CustomerInfo,
        description: &str,
        classification: Classification,
    ) -> Result<Job> {
        let mut board = self.board.write().await;
        let job = board
            .jobs
            .submit(customer, description, classification, Utc::now())?
            .clone();

        info!(
            job_id = %job.id,
            priority = %job.priority,
            category = %job.classification.category,
            "Job submitted"
        );
        self.persist_job(&job).await;
        self.emit(DispatchEvent::JobSubmitted {
            job_id: job.id.clone(),
            priority: job.priority,
            category: job.classification.category.to_string(),
        });
        Ok(job)
    }

    // ── Dispatch ────────────────────────────────────────────────────

    /// Drain the queue against available technicians.
    pub async fn dispatch_pass(&self) -> Result<PassReport> {
        let mut board = self.board.write().await;
        self.run_pass(&mut board).await
    }

    async fn run_pass(&self, board: &mut DispatchBoard) -> Result<PassReport> {
        let mut report = PassReport {
            pass_id: Uuid::new_v4(),
            ..Default::default()
        };

        let outcome = self.drain_queue(board, &mut report).await;

        for id in &report.deferred {
            if let Err(e) = board.jobs.push_back(id) {
                error!(job_id = %id, error = %e, "Failed to return deferred job to queue");
            }
        }

        match outcome {
            Ok(stopped) => {
                report.stopped = stopped;
                if !report.assignments.is_empty() || !report.deferred.is_empty() {
                    info!(
                        pass_id = %report.pass_id,
                        assigned = report.assignments.len(),
                        deferred = report.deferred.len(),
                        stopped = ?stopped,
                        "Dispatch pass finished"
                    );
                }
                Ok(report)
            }
            Err(e) => {
                warn!(
                    pass_id = %report.pass_id,
                    assigned = report.assignments.len(),
                    error = %e,
                    "Dispatch pass aborted"
                );
                Err(e)
            }
        }
    }

    async fn drain_queue(
        &self,
        board: &mut DispatchBoard,
        report: &mut PassReport,
    ) -> Result<PassStop> {
        loop {
            if board.technicians.available_count() == 0 {
                return Ok(PassStop::NoTechnicians);
            }

            let job_id = match board.jobs.pop_next_pending() {
                Ok(id) => id,
                Err(DispatchError::Empty) => return Ok(PassStop::QueueEmpty),
                Err(e) => return Err(e.into()),
            };

            let choice = {
                let job = board.jobs.find(&job_id)?;
                let available = board.technicians.list_available();
                self.matcher.select(job, &available)
            };

            let Some(choice) = choice else {
                if self.matcher.policy() == MatchPolicy::RequireSkillMatch {
                    debug!(job_id = %job_id, "No skilled technician free, deferring");
                    report.deferred.push(job_id);
                    continue;
                }
                board.jobs.push_back(&job_id)?;
                return Ok(PassStop::NoMatch);
            };

            let now = Utc::now();
            if let Err(e) = self.commit_assignment(board, &job_id, &choice.technician_id, now) {
                if board.jobs.find(&job_id)?.status == JobStatus::Pending {
                    board.jobs.push_back(&job_id)?;
                }
                return Err(e.into());
            }

            if let Err(e) = self
                .persist_assignment(board, &job_id, &choice.technician_id)
                .await
            {
                self.roll_back_assignment(board, &job_id, &choice.technician_id, &e, now)?;
                return Err(e);
            }

            info!(
                job_id = %job_id,
                technician_id = %choice.technician_id,
                score = choice.score,
                skill_match = choice.skill_match,
                "Job assigned"
            );
            self.emit(DispatchEvent::JobAssigned {
                job_id: job_id.clone(),
                technician_id: choice.technician_id.clone(),
                score: choice.score,
            });
            report.assignments.push(Assignment {
                job_id,
                technician_id: choice.technician_id,
                score: choice.score,
            });
        }
    }

    /// Mark the technician busy and the job ASSIGNED, or neither.
    fn commit_assignment(
        &self,
        board: &mut DispatchBoard,
        job_id: &JobId,
        tech_id: &TechnicianId,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), DispatchError> {
        let estimate = board.jobs.find(job_id)?.classification.estimated_duration.clone();
        board.technicians.mark_busy(
            tech_id,
            job_id,
            &estimate,
            self.config.default_duration_hours,
            now,
        )?;

        if let Err(e) = board.jobs.assign(job_id, tech_id, now) {
            board.technicians.mark_free(tech_id).map_err(|rollback| {
                error!(
                    job_id = %job_id,
                    technician_id = %tech_id,
                    error = %rollback,
                    "Failed to undo technician reservation"
                );
                DispatchError::InvariantViolation(format!(
                    "technician {tech_id} left busy after failed assignment of {job_id}: {rollback}"
                ))
            })?;
            return Err(e);
        }
        Ok(())
    }

    /// Undo a committed assignment whose write failed: ASSIGNED -> PENDING,
    /// technician freed.
    fn roll_back_assignment(
        &self,
        board: &mut DispatchBoard,
        job_id: &JobId,
        tech_id: &TechnicianId,
        cause: &Error,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), DispatchError> {
        let reason = format!("assignment not persisted: {cause}");
        board.jobs.requeue_assigned(job_id, reason.clone(), now)?;
        board.technicians.mark_free(tech_id)?;
        warn!(job_id = %job_id, technician_id = %tech_id, error = %cause, "Assignment rolled back");
        self.emit(DispatchEvent::JobRequeued {
            job_id: job_id.clone(),
            reason,
        });
        Ok(())
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// ASSIGNED -> IN_PROGRESS.
    pub async fn start_job(&self, job_id: &JobId) -> Result<Job> {
        let mut board = self.board.write().await;
        let job = board
            .jobs
            .transition(job_id, JobStatus::InProgress, None, Utc::now())?
            .clone();

        info!(job_id = %job.id, "Job started");
        self.persist_job(&job).await;
        if let Some(tech) = job.assigned_technician.clone() {
            self.emit(DispatchEvent::JobStarted {
                job_id: job.id.clone(),
                technician_id: tech,
            });
        }
        Ok(job)
    }

    /// Complete the job `technician_id` holds and free the technician.
    /// An ASSIGNED job is started implicitly. With `redispatch_on_completion`
    /// a pass follows; its failure is logged and leaves `redispatch` empty.
    pub async fn complete_job(&self, technician_id: &TechnicianId) -> Result<Completion> {
        let mut board = self.board.write().await;

        let job_id = board
            .technicians
            .get(technician_id)?
            .current_job
            .clone()
            .ok_or_else(|| DispatchError::NoActiveJob {
                id: technician_id.clone(),
            })?;

        let status = board.jobs.find(&job_id)?.status;
        if !status.is_active() {
            error!(job_id = %job_id, technician_id = %technician_id, status = %status, "Technician holds an inactive job");
            return Err(DispatchError::InvariantViolation(format!(
                "technician {technician_id} holds {job_id} which is {status}"
            ))
            .into());
        }

        let now = Utc::now();
        if status == JobStatus::Assigned {
            board.jobs.transition(
                &job_id,
                JobStatus::InProgress,
                Some("started on completion".to_string()),
                now,
            )?;
        }
        let job = board
            .jobs
            .transition(&job_id, JobStatus::Completed, None, now)?
            .clone();
        board.technicians.mark_free(technician_id)?;

        info!(job_id = %job_id, technician_id = %technician_id, "Job completed");
        self.persist_job(&job).await;
        self.persist_technician(&board, technician_id).await;
        self.emit(DispatchEvent::JobCompleted {
            job_id,
            technician_id: technician_id.clone(),
        });

        // The completion is already committed; a failed follow-up pass only
        // loses the redispatch report. The sweep retries the queue later.
        let redispatch = if self.config.redispatch_on_completion {
            match self.run_pass(&mut board).await {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(
                        job_id = %job.id,
                        technician_id = %technician_id,
                        error = %e,
                        "Redispatch after completion failed"
                    );
                    None
                }
            }
        } else {
            None
        };

        Ok(Completion { job, redispatch })
    }

    /// Cancel a PENDING or ASSIGNED job. An assigned technician is freed in
    /// the same critical section.
    pub async fn cancel_job(&self, job_id: &JobId) -> Result<Job> {
        let mut board = self.board.write().await;

        let held_by = {
            let job = board.jobs.find(job_id)?;
            match job.status {
                JobStatus::Assigned => job.assigned_technician.clone(),
                _ => None,
            }
        };

        // Verify the pairing before mutating anything.
        if let Some(ref tech_id) = held_by {
            let holder = board.technicians.get(tech_id)?.current_job.as_ref();
            if holder != Some(job_id) {
                return Err(DispatchError::InvariantViolation(format!(
                    "job {job_id} names {tech_id} but the technician holds {holder:?}"
                ))
                .into());
            }
        }

        let job = board
            .jobs
            .transition(job_id, JobStatus::Cancelled, None, Utc::now())?
            .clone();
        if let Some(ref tech_id) = held_by {
            board.technicians.mark_free(tech_id)?;
        }

        info!(job_id = %job_id, released = ?held_by, "Job cancelled");
        self.persist_job(&job).await;
        if let Some(ref tech_id) = held_by {
            self.persist_technician(&board, tech_id).await;
        }
        self.emit(DispatchEvent::JobCancelled {
            job_id: job_id.clone(),
            released_technician: held_by,
        });
        Ok(job)
    }

    pub async fn update_location(
        &self,
        technician_id: &TechnicianId,
        location: &str,
    ) -> Result<Technician> {
        let mut board = self.board.write().await;
        let tech = board
            .technicians
            .update_location(technician_id, location)?
            .clone();
        debug!(technician_id = %technician_id, location = %location, "Technician location updated");
        self.persist_technician(&board, technician_id).await;
        Ok(tech)
    }

    // ── Reads ───────────────────────────────────────────────────────

    pub async fn find_job(&self, job_id: &JobId) -> Result<Job> {
        let board = self.board.read().await;
        Ok(board.jobs.find(job_id)?.clone())
    }

    pub async fn list_jobs(&self) -> Vec<Job> {
        let board = self.board.read().await;
        board.jobs.all().into_iter().cloned().collect()
    }

    pub async fn list_jobs_by_status(&self, status: JobStatus) -> Vec<Job> {
        let board = self.board.read().await;
        board.jobs.by_status(status).into_iter().cloned().collect()
    }

    pub async fn list_jobs_by_priority(&self, tier: PriorityTier) -> Vec<Job> {
        let board = self.board.read().await;
        board.jobs.by_priority(tier).into_iter().cloned().collect()
    }

    pub async fn list_technicians(&self) -> Vec<Technician> {
        let board = self.board.read().await;
        board.technicians.list().into_iter().cloned().collect()
    }

    pub async fn find_technician(&self, technician_id: &TechnicianId) -> Result<Technician> {
        let board = self.board.read().await;
        Ok(board.technicians.get(technician_id)?.clone())
    }

    /// The next `n` jobs a pass would consider, in order.
    pub async fn next_jobs(&self, n: usize) -> Vec<Job> {
        let board = self.board.read().await;
        board.jobs.peek_pending(n).into_iter().cloned().collect()
    }

    pub async fn summary(&self) -> DispatchSummary {
        let board = self.board.read().await;
        DispatchSummary::collect(&board.jobs, &board.technicians)
    }

    pub async fn report(&self) -> Vec<JobReport> {
        let board = self.board.read().await;
        JobReport::collect(&board.jobs, &board.technicians)
    }

    // ── Persistence ─────────────────────────────────────────────────

    async fn persist_assignment(
        &self,
        board: &DispatchBoard,
        job_id: &JobId,
        tech_id: &TechnicianId,
    ) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        store.save_job(board.jobs.find(job_id)?).await?;
        store
            .save_technician(board.technicians.get(tech_id)?)
            .await?;
        Ok(())
    }

    /// Lifecycle writes other than assignment are logged on failure; the
    /// in-memory state stays authoritative and restart reconciliation
    /// repairs any mismatch.
    async fn persist_job(&self, job: &Job) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_job(job).await {
                warn!(job_id = %job.id, error = %e, "Failed to persist job");
            }
        }
    }

    async fn persist_technician(&self, board: &DispatchBoard, tech_id: &TechnicianId) {
        let (Some(store), Ok(tech)) = (&self.store, board.technicians.get(tech_id)) else {
            return;
        };
        if let Err(e) = store.save_technician(tech).await {
            warn!(technician_id = %tech_id, error = %e, "Failed to persist technician");
        }
    }
}

/// Repair job/technician pairings after a restart. Returns the ids that
/// changed.
fn reconcile(
    board: &mut DispatchBoard,
    default_hours: f64,
    now: DateTime<Utc>,
) -> std::result::Result<(Vec<JobId>, Vec<TechnicianId>), DispatchError> {
    let mut dirty_jobs = Vec::new();
    let mut dirty_techs = Vec::new();

    // Technicians whose held job is missing, inactive, or names someone else.
    let orphaned: Vec<TechnicianId> = board
        .technicians
        .list()
        .into_iter()
        .filter(|tech| match &tech.current_job {
            None => !tech.available,
            Some(job_id) => match board.jobs.find(job_id) {
                Ok(job) => {
                    !job.status.is_active() || job.assigned_technician.as_ref() != Some(&tech.id)
                }
                Err(_) => true,
            },
        })
        .map(|tech| tech.id.clone())
        .collect();

    for id in orphaned {
        warn!(technician_id = %id, "Releasing technician with no active job");
        board.technicians.force_available(&id)?;
        dirty_techs.push(id);
    }

    let unheld: Vec<(JobId, JobStatus, Option<TechnicianId>)> = board
        .jobs
        .all()
        .into_iter()
        .filter(|job| job.status.is_active())
        .filter(|job| {
            job.assigned_technician
                .as_ref()
                .and_then(|t| board.technicians.get(t).ok())
                .and_then(|t| t.current_job.as_ref())
                != Some(&job.id)
        })
        .map(|job| (job.id.clone(), job.status, job.assigned_technician.clone()))
        .collect();

    for (job_id, status, tech_id) in unheld {
        match status {
            JobStatus::Assigned => {
                warn!(job_id = %job_id, "Re-queueing assigned job with no holder");
                board
                    .jobs
                    .requeue_assigned(&job_id, "restart reconciliation", now)?;
                dirty_jobs.push(job_id);
            }
            _ => {
                // IN_PROGRESS cannot go back to PENDING; re-attach if the
                // technician is free.
                let Some(tech_id) = tech_id else {
                    error!(job_id = %job_id, "In-progress job has no technician");
                    continue;
                };
                let estimate = board.jobs.find(&job_id)?.classification.estimated_duration.clone();
                match board.technicians.mark_busy(&tech_id, &job_id, &estimate, default_hours, now) {
                    Ok(_) => {
                        warn!(job_id = %job_id, technician_id = %tech_id, "Re-attached in-progress job");
                        dirty_techs.push(tech_id);
                    }
                    Err(e) => {
                        error!(job_id = %job_id, technician_id = %tech_id, error = %e, "Cannot re-attach in-progress job");
                    }
                }
            }
        }
    }

    Ok((dirty_jobs, dirty_techs))
}

/// Spawn the background dispatch sweep. Picks up work whenever a pass is
/// not triggered by a submission or completion.
pub fn spawn_dispatch_loop(dispatcher: Arc<Dispatcher>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Dispatch loop started (interval: {}s)", interval.as_secs());

        let mut tick = tokio::time::interval(interval);
        loop {
            tick.tick().await;
            match dispatcher.dispatch_pass().await {
                Ok(report) if !report.assignments.is_empty() => {
                    debug!(pass_id = %report.pass_id, assigned = report.assignments.len(), "Sweep assigned jobs");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Dispatch sweep failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::model::{Category, Severity, Urgency};
    use crate::classify::keywords::KeywordOracle;
    use crate::error::DatabaseError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn dispatcher(roster: Vec<Technician>) -> Dispatcher {
        Dispatcher::new(
            DispatchConfig::default(),
            Arc::new(KeywordOracle::new()),
            roster,
        )
    }

    /// Store whose technician writes fail while `fail_technicians` is set.
    #[derive(Default)]
    struct FlakyStore {
        fail_technicians: AtomicBool,
    }

    #[async_trait]
    impl DispatchStore for FlakyStore {
        async fn save_job(&self, _job: &Job) -> std::result::Result<(), DatabaseError> {
            Ok(())
        }

        async fn save_technician(
            &self,
            _technician: &Technician,
        ) -> std::result::Result<(), DatabaseError> {
            if self.fail_technicians.load(Ordering::SeqCst) {
                return Err(DatabaseError::Query("disk full".into()));
            }
            Ok(())
        }

        async fn load_jobs(&self) -> std::result::Result<Vec<Job>, DatabaseError> {
            Ok(Vec::new())
        }

        async fn load_technicians(&self) -> std::result::Result<Vec<Technician>, DatabaseError> {
            Ok(Vec::new())
        }
    }

    fn dispatcher_with_store(store: Arc<FlakyStore>, roster: Vec<Technician>) -> Dispatcher {
        Dispatcher::from_parts(
            DispatchConfig::default(),
            Arc::new(KeywordOracle::new()),
            Some(store as Arc<dyn DispatchStore>),
            DispatchBoard {
                jobs: JobRegistry::new(),
                technicians: TechnicianRegistry::new(roster),
            },
        )
    }

    fn classification(category: Category, urgency: Urgency) -> Classification {
        Classification::new(category, Severity::High, urgency, "1-3 hours")
    }

    #[tokio::test]
    async fn commit_is_all_or_nothing() {
        let d = dispatcher(vec![Technician::new("T001", "A", &["leak"], "X")]);
        let job = d
            .submit_classified(
                CustomerInfo::default(),
                "leak",
                classification(Category::Leak, Urgency::Low),
            )
            .await
            .unwrap();
        d.cancel_job(&job.id).await.unwrap();

        let mut board = d.board.write().await;
        let err = d
            .commit_assignment(&mut board, &job.id, &TechnicianId::from("T001"), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DispatchError::IllegalTransition { .. }));
        assert_eq!(board.technicians.available_count(), 1);
    }

    #[tokio::test]
    async fn unpersisted_assignment_is_rolled_back() {
        let store = Arc::new(FlakyStore::default());
        let d = dispatcher_with_store(
            Arc::clone(&store),
            vec![Technician::new("T001", "A", &["leak"], "X")],
        );
        let mut rx = d.subscribe();
        let job = d
            .submit_classified(
                CustomerInfo::default(),
                "leak",
                classification(Category::Leak, Urgency::High),
            )
            .await
            .unwrap();

        store.fail_technicians.store(true, Ordering::SeqCst);
        let err = d.dispatch_pass().await.unwrap_err();
        assert!(matches!(err, Error::Database(_)));

        let after = d.find_job(&job.id).await.unwrap();
        assert_eq!(after.status, JobStatus::Pending);
        assert!(after.assigned_technician.is_none());
        let tech = d.find_technician(&TechnicianId::from("T001")).await.unwrap();
        assert!(tech.available);
        assert!(tech.current_job.is_none());
        assert_eq!(d.next_jobs(5).await.len(), 1);

        assert!(matches!(rx.recv().await.unwrap(), DispatchEvent::JobSubmitted { .. }));
        match rx.recv().await.unwrap() {
            DispatchEvent::JobRequeued { job_id, reason } => {
                assert_eq!(job_id, job.id);
                assert!(reason.contains("disk full"));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // once writes succeed the job is dispatched normally
        store.fail_technicians.store(false, Ordering::SeqCst);
        let report = d.dispatch_pass().await.unwrap();
        assert_eq!(report.assignments.len(), 1);
        assert_eq!(report.assignments[0].job_id, job.id);
    }

    #[tokio::test]
    async fn completion_stands_when_redispatch_fails() {
        let store = Arc::new(FlakyStore::default());
        let d = dispatcher_with_store(
            Arc::clone(&store),
            vec![Technician::new("T001", "A", &["leak"], "X")],
        );
        let tech_id = TechnicianId::from("T001");
        let first = d
            .submit_classified(
                CustomerInfo::default(),
                "leak",
                classification(Category::Leak, Urgency::High),
            )
            .await
            .unwrap();
        d.dispatch_pass().await.unwrap();
        let second = d
            .submit_classified(
                CustomerInfo::default(),
                "drip",
                classification(Category::Leak, Urgency::Low),
            )
            .await
            .unwrap();

        store.fail_technicians.store(true, Ordering::SeqCst);
        let completion = d.complete_job(&tech_id).await.unwrap();
        assert_eq!(completion.job.id, first.id);
        assert_eq!(completion.job.status, JobStatus::Completed);
        assert!(completion.redispatch.is_none());

        assert_eq!(d.find_job(&second.id).await.unwrap().status, JobStatus::Pending);
        assert_eq!(d.next_jobs(5).await.len(), 1);
        assert!(d.find_technician(&tech_id).await.unwrap().available);

        // retrying the completion is a caller error, not a second completion
        assert!(matches!(
            d.complete_job(&tech_id).await,
            Err(Error::Dispatch(DispatchError::NoActiveJob { .. }))
        ));
    }

    #[tokio::test]
    async fn reconcile_repairs_broken_pairs() {
        let mut board = DispatchBoard {
            jobs: JobRegistry::new(),
            technicians: TechnicianRegistry::new(vec![
                Technician::new("T001", "A", &["leak"], "X"),
                Technician::new("T002", "B", &["leak"], "Y"),
            ]),
        };
        let now = Utc::now();
        let a = board
            .jobs
            .submit(CustomerInfo::default(), "a", classification(Category::Leak, Urgency::Low), now)
            .unwrap()
            .id
            .clone();
        let b = board
            .jobs
            .submit(CustomerInfo::default(), "b", classification(Category::Leak, Urgency::Low), now)
            .unwrap()
            .id
            .clone();

        // a: assigned to T001 but T001 never marked busy.
        board.jobs.assign(&a, &TechnicianId::from("T001"), now).unwrap();
        // T002 busy with b, but b is still pending.
        board
            .technicians
            .mark_busy(&TechnicianId::from("T002"), &b, "1 hour", 2.0, now)
            .unwrap();

        let (jobs, techs) = reconcile(&mut board, 2.0, now).unwrap();
        assert_eq!(jobs, vec![a.clone()]);
        assert_eq!(techs, vec![TechnicianId::from("T002")]);
        assert_eq!(board.jobs.find(&a).unwrap().status, JobStatus::Pending);
        assert_eq!(board.technicians.available_count(), 2);
    }

    #[tokio::test]
    async fn events_are_broadcast() {
        let d = dispatcher(vec![Technician::new("T001", "A", &["pipe", "emergency"], "X")]);
        let mut rx = d.subscribe();

        let job = d
            .submit_classified(
                CustomerInfo::default(),
                "burst",
                classification(Category::Pipe, Urgency::Emergency),
            )
            .await
            .unwrap();
        d.dispatch_pass().await.unwrap();

        assert!(matches!(rx.recv().await.unwrap(), DispatchEvent::JobSubmitted { .. }));
        match rx.recv().await.unwrap() {
            DispatchEvent::JobAssigned { job_id, score, .. } => {
                assert_eq!(job_id, job.id);
                assert_eq!(score, 30);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = DispatchEvent::JobRequeued {
            job_id: JobId::from_seq(3),
            reason: "rollback".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "job_requeued");
        assert_eq!(json["job_id"], "JOB-0003");
    }
}
