//! Configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::dispatch::matcher::MatchPolicy;
use crate::dispatch::technician::{DEFAULT_DURATION_HOURS, Technician};
use crate::error::ConfigError;

/// Scheduler policy.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Oracle results below this confidence are replaced by the fallback.
    pub min_confidence: f32,
    /// Whether unskilled technicians may take routine work.
    pub match_policy: MatchPolicy,
    /// Run a dispatch pass right after a technician completes a job.
    pub redispatch_on_completion: bool,
    /// Background sweep interval.
    pub sweep_interval: Duration,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
    /// Hours assumed when an estimate has no integer in it.
    pub default_duration_hours: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.25,
            match_policy: MatchPolicy::AnyAvailable,
            redispatch_on_completion: true,
            sweep_interval: Duration::from_secs(30),
            event_capacity: 256,
            default_duration_hours: DEFAULT_DURATION_HOURS,
        }
    }
}

impl DispatchConfig {
    /// Defaults overridden by `DISPATCH_*` environment variables.
    ///
    /// Unparseable numbers fall back to defaults; an unknown match policy
    /// is an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let min_confidence: f32 = std::env::var("DISPATCH_MIN_CONFIDENCE")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|c: &f32| (0.0..=1.0).contains(c))
            .unwrap_or(defaults.min_confidence);

        let match_policy = match std::env::var("DISPATCH_MATCH_POLICY") {
            Ok(raw) => MatchPolicy::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "DISPATCH_MATCH_POLICY".to_string(),
                message: format!(
                    "'{raw}' is not one of any_available, require_skill_match"
                ),
            })?,
            Err(_) => defaults.match_policy,
        };

        let redispatch_on_completion = std::env::var("DISPATCH_REDISPATCH_ON_COMPLETION")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.redispatch_on_completion);

        let sweep_secs: u64 = std::env::var("DISPATCH_SWEEP_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|s| *s > 0)
            .unwrap_or(defaults.sweep_interval.as_secs());

        Ok(Self {
            min_confidence,
            match_policy,
            redispatch_on_completion,
            sweep_interval: Duration::from_secs(sweep_secs),
            ..defaults
        })
    }
}

/// Service binary settings.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub http_port: u16,
    pub db_path: PathBuf,
    /// Remote classifier base URL. The offline keyword oracle is used when unset.
    pub oracle_url: Option<String>,
    pub oracle_api_key: Option<SecretString>,
    /// JSON array of technicians used to seed an empty database.
    pub roster_path: Option<PathBuf>,
    /// Daily rolling log files go here when set; stdout otherwise.
    pub log_dir: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        let http_port: u16 = std::env::var("DISPATCH_HTTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8090);

        let db_path = std::env::var("DISPATCH_DB_PATH")
            .unwrap_or_else(|_| "./data/dispatch.db".to_string())
            .into();

        let non_empty = |key: &str| std::env::var(key).ok().filter(|s| !s.trim().is_empty());

        Self {
            http_port,
            db_path,
            oracle_url: non_empty("DISPATCH_ORACLE_URL"),
            oracle_api_key: non_empty("DISPATCH_ORACLE_API_KEY").map(SecretString::from),
            roster_path: non_empty("DISPATCH_ROSTER_PATH").map(PathBuf::from),
            log_dir: non_empty("DISPATCH_LOG_DIR").map(PathBuf::from),
        }
    }
}

/// Starting crew used when no roster file is given.
pub fn default_roster() -> Vec<Technician> {
    vec![
        Technician::new("T001", "Mike Johnson", &["leak", "clog", "faucet"], "Downtown"),
        Technician::new("T002", "Sarah Williams", &["water_heater", "pipe", "sewer"], "Northside"),
        Technician::new("T003", "David Chen", &["toilet", "drain", "garbage_disposal"], "Southside"),
        Technician::new("T004", "Lisa Rodriguez", &["emergency", "leak", "pipe"], "Eastside"),
    ]
}

/// Read a JSON array of technicians.
pub fn load_roster(path: &Path) -> Result<Vec<Technician>, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    let roster: Vec<Technician> = serde_json::from_str(&raw)
        .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;

    let mut seen = std::collections::HashSet::new();
    for tech in &roster {
        if !seen.insert(tech.id.clone()) {
            return Err(ConfigError::InvalidValue {
                key: "roster".to_string(),
                message: format!("duplicate technician id {}", tech.id),
            });
        }
    }
    Ok(roster)
}
