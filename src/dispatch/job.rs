//! Job model and lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::model::{Classification, Urgency};
use crate::dispatch::technician::TechnicianId;
use crate::error::DispatchError;

/// Maximum number of status transitions kept per job.
const MAX_TRANSITIONS: usize = 50;

/// Stable job identifier, allocated monotonically as `JOB-0001`, `JOB-0002`, ...
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Identifier for the `seq`-th job.
    pub fn from_seq(seq: u64) -> Self {
        Self(format!("JOB-{seq:04}"))
    }

    /// Sequence number encoded in the id, if it has the `JOB-n` shape.
    pub fn seq(&self) -> Option<u64> {
        self.0.strip_prefix("JOB-")?.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the priority queue.
    Pending,
    /// Paired with a technician who has not started yet.
    Assigned,
    /// Technician is on site.
    InProgress,
    /// Work finished.
    Completed,
    /// Withdrawn before work started.
    Cancelled,
}

impl JobStatus {
    /// Check if this status allows moving to `target`.
    ///
    /// `Assigned -> Pending` is the re-queue edge; only the dispatcher takes it.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        use JobStatus::*;

        matches!(
            (self, target),
            (Pending, Assigned) | (Pending, Cancelled) |
            (Assigned, InProgress) | (Assigned, Cancelled) | (Assigned, Pending) |
            (InProgress, Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Holding (or about to hold) a technician.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Assigned | Self::InProgress)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "assigned" => Some(Self::Assigned),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Dispatch priority. Declaration order is dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    Emergency,
    High,
    Medium,
    Low,
}

impl PriorityTier {
    /// Numeric rank: EMERGENCY = 1 through LOW = 4.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Emergency => 1,
            Self::High => 2,
            Self::Medium => 3,
            Self::Low => 4,
        }
    }

    pub fn from_urgency(urgency: Urgency) -> Self {
        match urgency {
            Urgency::Emergency => Self::Emergency,
            Urgency::High => Self::High,
            Urgency::Low => Self::Low,
            Urgency::Medium => Self::Medium,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "emergency" => Some(Self::Emergency),
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

impl std::fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Emergency => "emergency",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        };
        write!(f, "{s}")
    }
}

/// Customer contact details. Opaque to the scheduler except `address`,
/// which the matcher reads for location proximity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl CustomerInfo {
    pub fn new(
        name: impl Into<String>,
        phone: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            phone: Some(phone.into()),
            address: Some(address.into()),
        }
    }

    pub fn address_or_empty(&self) -> &str {
        self.address.as_deref().unwrap_or("")
    }
}

/// A recorded status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: JobStatus,
    pub to: JobStatus,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A service request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub customer: CustomerInfo,
    pub description: String,
    pub classification: Classification,
    /// Derived once from `classification.urgency` at creation.
    pub priority: PriorityTier,
    pub status: JobStatus,
    /// Back-reference to the technician holding this job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_technician: Option<TechnicianId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub transitions: Vec<StatusTransition>,
}

impl Job {
    /// Create a pending job. Priority is fixed here and never recomputed.
    pub fn new(
        id: JobId,
        customer: CustomerInfo,
        description: impl Into<String>,
        classification: Classification,
        created_at: DateTime<Utc>,
    ) -> Self {
        let priority = PriorityTier::from_urgency(classification.urgency);
        Self {
            id,
            customer,
            description: description.into(),
            classification,
            priority,
            status: JobStatus::Pending,
            assigned_technician: None,
            created_at,
            updated_at: created_at,
            assigned_at: None,
            started_at: None,
            completed_at: None,
            transitions: Vec::new(),
        }
    }

    /// Move to `target`, recording the transition. Leaves the job untouched
    /// when the move is not permitted.
    pub fn transition_to(
        &mut self,
        target: JobStatus,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        if !self.status.can_transition_to(target) {
            return Err(DispatchError::IllegalTransition {
                id: self.id.clone(),
                from: self.status,
                to: target,
            });
        }

        self.transitions.push(StatusTransition {
            from: self.status,
            to: target,
            at,
            reason,
        });
        if self.transitions.len() > MAX_TRANSITIONS {
            let excess = self.transitions.len() - MAX_TRANSITIONS;
            self.transitions.drain(..excess);
        }

        self.status = target;
        self.updated_at = at;

        match target {
            JobStatus::Assigned => self.assigned_at = Some(at),
            JobStatus::InProgress => self.started_at = Some(at),
            JobStatus::Completed | JobStatus::Cancelled => self.completed_at = Some(at),
            JobStatus::Pending => {
                self.assigned_technician = None;
                self.assigned_at = None;
            }
        }

        Ok(())
    }

    pub fn category(&self) -> &str {
        self.classification.category.as_str()
    }

    pub fn address(&self) -> &str {
        self.customer.address_or_empty()
    }
}
