//! Classification data model: categories, severities, urgencies, and the
//! typed record produced by a classification oracle.

use serde::{Deserialize, Serialize};

use crate::dispatch::job::CustomerInfo;
use crate::error::DispatchError;

/// Kind of plumbing issue. Technicians list these (by `as_str()`) as skills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Leak,
    Clog,
    WaterHeater,
    Faucet,
    Toilet,
    Drain,
    Pipe,
    Sewer,
    GarbageDisposal,
    WaterPressure,
    Other,
}

impl Category {
    /// Every category, in declaration order.
    pub const ALL: [Category; 11] = [
        Category::Leak,
        Category::Clog,
        Category::WaterHeater,
        Category::Faucet,
        Category::Toilet,
        Category::Drain,
        Category::Pipe,
        Category::Sewer,
        Category::GarbageDisposal,
        Category::WaterPressure,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Leak => "leak",
            Self::Clog => "clog",
            Self::WaterHeater => "water_heater",
            Self::Faucet => "faucet",
            Self::Toilet => "toilet",
            Self::Drain => "drain",
            Self::Pipe => "pipe",
            Self::Sewer => "sewer",
            Self::GarbageDisposal => "garbage_disposal",
            Self::WaterPressure => "water_pressure",
            Self::Other => "other",
        }
    }

    /// Parse a category name. Unrecognized names map to `Other`.
    pub fn parse_lenient(s: &str) -> Self {
        let needle = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == needle)
            .unwrap_or(Self::Other)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How bad the problem is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Parse a severity name. Unrecognized names map to `Medium`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            "critical" => Self::Critical,
            _ => Self::Medium,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// How soon the customer needs someone on site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Emergency,
}

impl Urgency {
    /// Parse an urgency name. Unrecognized names map to `Medium`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            "emergency" => Self::Emergency,
            _ => Self::Medium,
        }
    }
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Emergency => "emergency",
        };
        f.write_str(s)
    }
}

/// A classified issue, as attached to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: Category,
    /// Oracle confidence in `[0.0, 1.0]`.
    pub confidence: f32,
    pub severity: Severity,
    pub urgency: Urgency,
    /// Human duration estimate such as "1-3 hours".
    pub estimated_duration: String,
    #[serde(default)]
    pub required_tools: Vec<String>,
    #[serde(default)]
    pub recommended_parts: Vec<String>,
    #[serde(default)]
    pub safety_notes: Vec<String>,
}

impl Classification {
    /// Build a classification with empty tool/part/safety lists.
    pub fn new(
        category: Category,
        severity: Severity,
        urgency: Urgency,
        estimated_duration: impl Into<String>,
    ) -> Self {
        Self {
            category,
            confidence: 1.0,
            severity,
            urgency,
            estimated_duration: estimated_duration.into(),
            required_tools: Vec::new(),
            recommended_parts: Vec::new(),
            safety_notes: Vec::new(),
        }
    }

    /// Conservative classification used whenever the oracle cannot be trusted.
    pub fn fallback() -> Self {
        Self {
            category: Category::Other,
            confidence: 0.5,
            severity: Severity::Medium,
            urgency: Urgency::Medium,
            estimated_duration: "1-2 hours".to_string(),
            required_tools: vec!["Basic tools".to_string()],
            recommended_parts: vec!["Standard parts".to_string()],
            safety_notes: vec!["Follow safety procedures".to_string()],
        }
    }

    /// Builder: set confidence (clamped to `[0.0, 1.0]`).
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Builder: set required tools.
    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.required_tools = tools;
        self
    }

    /// Builder: set safety notes.
    pub fn with_safety_notes(mut self, notes: Vec<String>) -> Self {
        self.safety_notes = notes;
        self
    }

    /// Check the fields a job cannot be scheduled without.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.estimated_duration.trim().is_empty() {
            return Err(DispatchError::InvalidClassification {
                reason: "estimated_duration is empty".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(DispatchError::InvalidClassification {
                reason: format!("confidence {} out of range", self.confidence),
            });
        }
        Ok(())
    }
}

/// Classification payload as it arrives over the wire. Every field is
/// optional here; `TryFrom` decides which absences are fatal.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawClassification {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub urgency: Option<String>,
    #[serde(default)]
    pub estimated_duration: Option<String>,
    #[serde(default)]
    pub required_tools: Vec<String>,
    #[serde(default)]
    pub recommended_parts: Vec<String>,
    #[serde(default)]
    pub safety_notes: Vec<String>,
}

impl TryFrom<RawClassification> for Classification {
    type Error = DispatchError;

    fn try_from(raw: RawClassification) -> Result<Self, Self::Error> {
        let missing = |field: &str| DispatchError::InvalidClassification {
            reason: format!("missing required field '{field}'"),
        };

        let category = raw.category.ok_or_else(|| missing("category"))?;
        let urgency = raw.urgency.ok_or_else(|| missing("urgency"))?;
        let estimated_duration = raw
            .estimated_duration
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| missing("estimated_duration"))?;

        let classification = Classification {
            category: Category::parse_lenient(&category),
            confidence: raw.confidence.unwrap_or(1.0).clamp(0.0, 1.0),
            severity: raw
                .severity
                .as_deref()
                .map(Severity::parse_lenient)
                .unwrap_or(Severity::Medium),
            urgency: Urgency::parse_lenient(&urgency),
            estimated_duration,
            required_tools: raw.required_tools,
            recommended_parts: raw.recommended_parts,
            safety_notes: raw.safety_notes,
        };
        classification.validate()?;
        Ok(classification)
    }
}

/// Input handed to a classification oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationRequest {
    pub description: String,
    #[serde(default)]
    pub customer: CustomerInfo,
}

impl ClassificationRequest {
    pub fn new(description: impl Into<String>, customer: CustomerInfo) -> Self {
        Self {
            description: description.into(),
            customer,
        }
    }
}

/// Result of classifying with fallback: either the oracle's answer or the
/// conservative mapping plus the reason the oracle was not used.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationOutcome {
    Classified(Classification),
    Fallback {
        classification: Classification,
        reason: String,
    },
}

impl ClassificationOutcome {
    pub fn classification(&self) -> &Classification {
        match self {
            Self::Classified(c) => c,
            Self::Fallback { classification, .. } => classification,
        }
    }

    pub fn into_classification(self) -> Classification {
        match self {
            Self::Classified(c) => c,
            Self::Fallback { classification, .. } => classification,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}
