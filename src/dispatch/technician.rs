//! Technician model and duration parsing.

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::dispatch::job::JobId;

/// Hours assumed when a duration string carries no integer.
pub const DEFAULT_DURATION_HOURS: f64 = 2.0;

/// Longest estimate taken at face value. Larger figures fall back to the
/// default.
pub const MAX_DURATION_HOURS: f64 = 24.0 * 7.0;

/// Skill tag that marks a technician as emergency-qualified.
pub const EMERGENCY_SKILL: &str = "emergency";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TechnicianId(String);

impl TechnicianId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TechnicianId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TechnicianId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for TechnicianId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A field worker.
///
/// `available == false` exactly when `current_job` is set. Only
/// [`TechnicianRegistry`](crate::dispatch::registry::TechnicianRegistry)
/// mutates these two fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technician {
    pub id: TechnicianId,
    pub name: String,
    /// Category names (and optionally `"emergency"`).
    pub skills: Vec<String>,
    /// Coarse location descriptor, e.g. "Downtown".
    pub location: String,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_job: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<DateTime<Utc>>,
}

fn default_available() -> bool {
    true
}

impl Technician {
    pub fn new(
        id: impl Into<TechnicianId>,
        name: impl Into<String>,
        skills: &[&str],
        location: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            skills: skills.iter().map(|s| s.to_string()).collect(),
            location: location.into(),
            available: true,
            current_job: None,
            estimated_completion: None,
        }
    }

    pub fn has_skill(&self, skill: &str) -> bool {
        self.skills.iter().any(|s| s.eq_ignore_ascii_case(skill))
    }

    pub fn is_emergency_qualified(&self) -> bool {
        self.has_skill(EMERGENCY_SKILL)
    }

    /// Whether the availability flag agrees with the held job.
    pub fn is_consistent(&self) -> bool {
        self.available == self.current_job.is_none()
    }
}

fn first_integer() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").unwrap())
}

/// Hour estimate from a human duration string: the first integer token,
/// or `default_hours` when there is none or it exceeds
/// [`MAX_DURATION_HOURS`]. "1-3 hours" yields 1.0 and "30 minutes - 2 hours"
/// yields 30.0; the heuristic is lossy on purpose.
pub fn parse_duration_hours(estimate: &str, default_hours: f64) -> f64 {
    first_integer()
        .find(estimate)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|hours| *hours <= MAX_DURATION_HOURS)
        .unwrap_or(default_hours)
}

/// `now + hours`, rounded to whole seconds. `None` when `hours` is negative,
/// not finite, or lands outside the representable date range.
pub fn completion_after(now: DateTime<Utc>, hours: f64) -> Option<DateTime<Utc>> {
    if !hours.is_finite() || hours < 0.0 {
        return None;
    }
    // `as` saturates, and try_seconds rejects the saturated value.
    Duration::try_seconds((hours * 3600.0).round() as i64)
        .and_then(|delta| now.checked_add_signed(delta))
}
