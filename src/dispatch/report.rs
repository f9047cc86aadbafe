//! Read-only snapshots: dashboard counters and the per-job export row.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dispatch::job::{Job, JobStatus, PriorityTier};
use crate::dispatch::registry::{JobRegistry, TechnicianRegistry};
use crate::dispatch::technician::Technician;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub assigned: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub cancelled: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PriorityCounts {
    pub emergency: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// Dashboard counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub total_jobs: usize,
    pub by_status: StatusCounts,
    /// Counts over open (non-terminal) jobs only.
    pub open_by_priority: PriorityCounts,
    pub technicians_total: usize,
    pub technicians_available: usize,
    pub technicians_busy: usize,
}

impl DispatchSummary {
    pub fn collect(jobs: &JobRegistry, technicians: &TechnicianRegistry) -> Self {
        let mut summary = Self {
            total_jobs: jobs.len(),
            technicians_total: technicians.len(),
            technicians_available: technicians.available_count(),
            ..Default::default()
        };
        summary.technicians_busy = summary.technicians_total - summary.technicians_available;

        for job in jobs.all() {
            let counts = &mut summary.by_status;
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Assigned => counts.assigned += 1,
                JobStatus::InProgress => counts.in_progress += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Cancelled => counts.cancelled += 1,
            }

            if job.status.is_terminal() {
                continue;
            }
            let open = &mut summary.open_by_priority;
            match job.priority {
                PriorityTier::Emergency => open.emergency += 1,
                PriorityTier::High => open.high += 1,
                PriorityTier::Medium => open.medium += 1,
                PriorityTier::Low => open.low += 1,
            }
        }

        summary
    }
}

/// One exported job, flattened for spreadsheets and dashboards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    pub job_id: String,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_address: Option<String>,
    pub description: String,
    pub category: String,
    pub severity: String,
    pub urgency: String,
    pub priority: PriorityTier,
    pub status: JobStatus,
    pub assigned_technician: Option<String>,
    pub technician_name: Option<String>,
    pub estimated_duration: String,
    pub required_tools: Vec<String>,
    pub recommended_parts: Vec<String>,
    pub safety_notes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobReport {
    pub fn from_job(job: &Job, technician: Option<&Technician>) -> Self {
        let c = &job.classification;
        Self {
            job_id: job.id.to_string(),
            customer_name: job.customer.name.clone(),
            customer_phone: job.customer.phone.clone(),
            customer_address: job.customer.address.clone(),
            description: job.description.clone(),
            category: c.category.to_string(),
            severity: c.severity.to_string(),
            urgency: c.urgency.to_string(),
            priority: job.priority,
            status: job.status,
            assigned_technician: job.assigned_technician.as_ref().map(|t| t.to_string()),
            technician_name: technician.map(|t| t.name.clone()),
            estimated_duration: c.estimated_duration.clone(),
            required_tools: c.required_tools.clone(),
            recommended_parts: c.recommended_parts.clone(),
            safety_notes: c.safety_notes.clone(),
            created_at: job.created_at,
            assigned_at: job.assigned_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }

    /// Build the full export, in job allocation order.
    pub fn collect(jobs: &JobRegistry, technicians: &TechnicianRegistry) -> Vec<Self> {
        jobs.all()
            .into_iter()
            .map(|job| {
                let tech = job
                    .assigned_technician
                    .as_ref()
                    .and_then(|id| technicians.get(id).ok());
                Self::from_job(job, tech)
            })
            .collect()
    }
}
