//! Offline keyword classifier.
//!
//! Scores each category by keyword hits in the normalized description.
//! Urgency and severity are decided by the first matching keyword group,
//! checked from most to least urgent. Used when no remote classifier is
//! configured.

use async_trait::async_trait;
use regex::Regex;

use crate::classify::model::{
    Category, Classification, ClassificationRequest, Severity, Urgency,
};
use crate::classify::oracle::ClassificationOracle;
use crate::error::OracleError;

const URGENCY_KEYWORDS: &[(Urgency, &[&str])] = &[
    (
        Urgency::Emergency,
        &["emergency", "flooding", "burst", "overflow", "critical", "right now"],
    ),
    (Urgency::High, &["urgent", "immediate", "right away"]),
    (Urgency::Medium, &["soon", "asap", "quickly", "prompt"]),
    (
        Urgency::Low,
        &["when convenient", "no rush", "sometime", "non urgent"],
    ),
];

const SEVERITY_KEYWORDS: &[(Severity, &[&str])] = &[
    (
        Severity::Critical,
        &["emergency", "flooding", "burst", "overflow", "urgent", "critical"],
    ),
    (Severity::High, &["major", "significant", "serious", "bad", "severe"]),
    (Severity::Medium, &["moderate", "noticeable", "consistent"]),
    (Severity::Low, &["slow", "minor", "small", "slight", "drip"]),
];

const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (Category::Leak, &["leak", "drip", "wet", "moisture", "puddle"]),
    (Category::Clog, &["clog", "blocked", "slow drain", "backup", "won t drain"]),
    (Category::WaterHeater, &["hot water", "heater", "warm", "temperature", "heating"]),
    (Category::Faucet, &["faucet", "tap", "handle", "spout", "aerator"]),
    (Category::Toilet, &["toilet", "flush", "bowl", "tank"]),
    (Category::Drain, &["drain", "sink", "tub", "shower", "basin"]),
    (Category::Pipe, &["pipe", "fitting", "joint", "burst", "frozen"]),
    (Category::Sewer, &["sewer", "main line", "septic", "smell"]),
    (Category::GarbageDisposal, &["disposal", "grinder", "garbage", "food waste"]),
    (Category::WaterPressure, &["pressure", "low flow", "weak flow"]),
];

/// Per-category dispatch hints.
struct CategoryProfile {
    duration: &'static str,
    tools: &'static [&'static str],
    parts: &'static [&'static str],
    safety: &'static [&'static str],
}

fn profile(category: Category) -> CategoryProfile {
    match category {
        Category::Leak => CategoryProfile {
            duration: "1-3 hours",
            tools: &["pipe wrench", "plumber's tape", "soldering torch", "pipe cutter"],
            parts: &["pipe fittings", "soldering materials", "pipe sections"],
            safety: &["Turn off water supply before repairs", "Check for electrical hazards near water"],
        },
        Category::Clog => CategoryProfile {
            duration: "30 minutes - 2 hours",
            tools: &["plunger", "drain snake", "auger", "chemical cleaner"],
            parts: &["drain cleaner", "replacement drain parts"],
            safety: &["Use appropriate PPE when using chemicals", "Avoid harsh chemicals on older pipes"],
        },
        Category::WaterHeater => CategoryProfile {
            duration: "2-4 hours",
            tools: &["multimeter", "thermostat", "element wrench", "pipe wrench"],
            parts: &["thermostat", "heating element", "anode rod"],
            safety: &["Turn off power/gas before service", "Check for gas leaks"],
        },
        Category::Faucet => CategoryProfile {
            duration: "1-2 hours",
            tools: &["faucet wrench", "screwdriver", "plumber's tape", "cartridge puller"],
            parts: &["faucet cartridge", "o-rings", "aerator", "handle"],
            safety: &["Turn off water supply", "Check for hot water scalding"],
        },
        Category::Toilet => CategoryProfile {
            duration: "1-2 hours",
            tools: &["toilet auger", "wax ring", "closet bolts", "tank repair kit"],
            parts: &["flapper", "fill valve", "flush valve", "wax ring"],
            safety: &["Turn off water supply", "Use proper lifting techniques"],
        },
        Category::Drain => CategoryProfile {
            duration: "30 minutes - 2 hours",
            tools: &["drain snake", "plunger", "chemical cleaner", "auger"],
            parts: &["drain trap", "drain pipe", "cleanout plug"],
            safety: &["Use appropriate PPE", "Ventilate area when using chemicals"],
        },
        Category::Pipe => CategoryProfile {
            duration: "2-4 hours",
            tools: &["pipe wrench", "pipe cutter", "soldering torch", "fittings"],
            parts: &["pipe sections", "fittings", "soldering materials"],
            safety: &["Turn off water supply", "Check for gas leaks if near gas lines"],
        },
        Category::Sewer => CategoryProfile {
            duration: "2-6 hours",
            tools: &["sewer snake", "camera", "rooter", "hydro jet"],
            parts: &["sewer pipe", "cleanout cap", "root treatment"],
            safety: &["Use appropriate PPE", "Ventilate area", "Check for gas buildup"],
        },
        Category::GarbageDisposal => CategoryProfile {
            duration: "1-2 hours",
            tools: &["hex wrench", "allen wrench", "replacement parts"],
            parts: &["disposal unit", "mounting hardware"],
            safety: &["Turn off power before service", "Never put hand in disposal"],
        },
        Category::WaterPressure => CategoryProfile {
            duration: "1-3 hours",
            tools: &["pressure gauge", "pressure regulator", "pipe wrench"],
            parts: &["pressure regulator", "pressure gauge"],
            safety: &["Check for burst pipes", "Monitor for leaks after adjustment"],
        },
        Category::Other => CategoryProfile {
            duration: "1-2 hours",
            tools: &["Basic tools"],
            parts: &["Standard parts"],
            safety: &["Follow safety procedures"],
        },
    }
}

fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Keyword-based oracle that needs no network.
pub struct KeywordOracle {
    punctuation: Regex,
    whitespace: Regex,
}

impl KeywordOracle {
    pub fn new() -> Self {
        Self {
            punctuation: Regex::new(r"[^\w\s]").unwrap(),
            whitespace: Regex::new(r"\s+").unwrap(),
        }
    }

    /// Lowercase, replace punctuation with spaces, and collapse whitespace.
    fn normalize(&self, text: &str) -> String {
        let lower = text.to_lowercase();
        let stripped = self.punctuation.replace_all(&lower, " ");
        self.whitespace.replace_all(&stripped, " ").trim().to_string()
    }

    /// Classify synchronously. Exposed for callers outside an async context.
    pub fn classify_text(&self, description: &str) -> Classification {
        let text = self.normalize(description);

        let (category, hits) = CATEGORY_KEYWORDS
            .iter()
            .map(|(category, words)| {
                let hits = words.iter().filter(|w| text.contains(*w)).count();
                (*category, hits)
            })
            // `max_by_key` keeps the last maximum; fold keeps the first.
            .fold((Category::Other, 0usize), |best, candidate| {
                if candidate.1 > best.1 { candidate } else { best }
            });

        let urgency = URGENCY_KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| text.contains(w)))
            .map(|(u, _)| *u)
            .unwrap_or(Urgency::Medium);

        let severity = SEVERITY_KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| text.contains(w)))
            .map(|(s, _)| *s)
            .unwrap_or(Severity::Medium);

        let confidence = hits as f32 / (hits as f32 + 1.0);
        let p = profile(category);

        Classification {
            category,
            confidence,
            severity,
            urgency,
            estimated_duration: p.duration.to_string(),
            required_tools: to_owned_list(p.tools),
            recommended_parts: to_owned_list(p.parts),
            safety_notes: to_owned_list(p.safety),
        }
    }
}

impl Default for KeywordOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClassificationOracle for KeywordOracle {
    fn name(&self) -> &str {
        "keywords"
    }

    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<Classification, OracleError> {
        if request.description.trim().is_empty() {
            return Err(OracleError::InvalidResponse {
                reason: "empty description".to_string(),
            });
        }
        Ok(self.classify_text(&request.description))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation() {
        let oracle = KeywordOracle::new();
        assert_eq!(
            oracle.normalize("EMERGENCY!  Pipe burst,   water everywhere!"),
            "emergency pipe burst water everywhere"
        );
    }

    #[test]
    fn burst_pipe_is_emergency() {
        let oracle = KeywordOracle::new();
        let c = oracle.classify_text("EMERGENCY! Pipe burst in basement, water everywhere!");
        assert_eq!(c.category, Category::Pipe);
        assert_eq!(c.urgency, Urgency::Emergency);
        assert_eq!(c.severity, Severity::Critical);
        assert_eq!(c.estimated_duration, "2-4 hours");
        assert!(c.confidence > 0.5);
    }

    #[test]
    fn clogged_sink_is_clog() {
        let oracle = KeywordOracle::new();
        let c = oracle.classify_text("Kitchen sink is clogged and water won't drain");
        assert_eq!(c.category, Category::Clog);
        assert_eq!(c.urgency, Urgency::Medium);
        assert!(c.required_tools.contains(&"plunger".to_string()));
    }

    #[test]
    fn no_hot_water_is_water_heater() {
        let oracle = KeywordOracle::new();
        let c = oracle.classify_text("No hot water coming from the shower, heater is cold");
        assert_eq!(c.category, Category::WaterHeater);
    }

    #[test]
    fn no_rush_is_low_urgency() {
        let oracle = KeywordOracle::new();
        let c = oracle.classify_text("Faucet handle is loose, no rush");
        assert_eq!(c.category, Category::Faucet);
        assert_eq!(c.urgency, Urgency::Low);
    }

    #[test]
    fn unknown_text_has_zero_confidence() {
        let oracle = KeywordOracle::new();
        let c = oracle.classify_text("something weird is happening");
        assert_eq!(c.category, Category::Other);
        assert_eq!(c.confidence, 0.0);
    }

    #[tokio::test]
    async fn empty_description_is_rejected() {
        let oracle = KeywordOracle::new();
        let req = ClassificationRequest::new("   ", Default::default());
        assert!(oracle.classify(&req).await.is_err());
    }
}
