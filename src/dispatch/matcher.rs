//! Technician scoring and selection.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dispatch::job::{Job, PriorityTier};
use crate::dispatch::technician::{Technician, TechnicianId};

pub const SKILL_MATCH_SCORE: u32 = 10;
pub const EMERGENCY_SKILL_SCORE: u32 = 20;
pub const EMERGENCY_ANY_SCORE: u32 = 5;
pub const LOCATION_MATCH_SCORE: u32 = 5;

/// Location tokens shorter than this are ignored ("st", "n").
const MIN_LOCATION_TOKEN: usize = 3;

/// Whether a technician without the job's category skill may take a
/// non-emergency job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Best available candidate wins, skill match or not.
    #[default]
    AnyAvailable,
    /// Non-emergency jobs stay queued until a skilled technician is free.
    RequireSkillMatch,
}

impl MatchPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "any_available" => Some(Self::AnyAvailable),
            "require_skill_match" => Some(Self::RequireSkillMatch),
            _ => None,
        }
    }
}

impl std::fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AnyAvailable => write!(f, "any_available"),
            Self::RequireSkillMatch => write!(f, "require_skill_match"),
        }
    }
}

/// The matcher's pick for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchChoice {
    pub technician_id: TechnicianId,
    pub score: u32,
    pub skill_match: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Matcher {
    policy: MatchPolicy,
}

impl Matcher {
    pub fn new(policy: MatchPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Score one candidate for `job`.
    pub fn score(&self, job: &Job, tech: &Technician) -> u32 {
        let mut score = 0;

        if tech.has_skill(job.category()) {
            score += SKILL_MATCH_SCORE;
        }

        if job.priority == PriorityTier::Emergency {
            score += if tech.is_emergency_qualified() {
                EMERGENCY_SKILL_SCORE
            } else {
                EMERGENCY_ANY_SCORE
            };
        }

        if location_matches(&tech.location, job.address()) {
            score += LOCATION_MATCH_SCORE;
        }

        score
    }

    /// Pick the best candidate: highest score, ties to the lexically
    /// greatest id. `None` when there are no eligible candidates, which
    /// means "retry later".
    pub fn select(&self, job: &Job, available: &[&Technician]) -> Option<MatchChoice> {
        let choice = available
            .iter()
            .filter(|t| t.available)
            .map(|t| MatchChoice {
                technician_id: t.id.clone(),
                score: self.score(job, t),
                skill_match: t.has_skill(job.category()),
            })
            .filter(|c| self.eligible(job, c))
            .max_by(|a, b| {
                a.score
                    .cmp(&b.score)
                    .then_with(|| a.technician_id.cmp(&b.technician_id))
            });

        if let Some(ref c) = choice {
            debug!(
                job_id = %job.id,
                technician_id = %c.technician_id,
                score = c.score,
                candidates = available.len(),
                "Matcher selected technician"
            );
        }
        choice
    }

    fn eligible(&self, job: &Job, choice: &MatchChoice) -> bool {
        match self.policy {
            MatchPolicy::AnyAvailable => true,
            MatchPolicy::RequireSkillMatch => {
                choice.skill_match || job.priority == PriorityTier::Emergency
            }
        }
    }
}

/// True when any word of the technician's location appears in the
/// job address, case-insensitively.
fn location_matches(location: &str, address: &str) -> bool {
    let address = address.to_lowercase();
    location
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() >= MIN_LOCATION_TOKEN)
        .any(|token| address.contains(token))
}
