//! Oracle trait and the fallback policy that keeps dispatch independent of
//! classifier availability.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::classify::model::{Classification, ClassificationOutcome, ClassificationRequest};
use crate::error::OracleError;

/// Maps a free-text issue description to a typed classification.
#[async_trait]
pub trait ClassificationOracle: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Classify one issue.
    async fn classify(&self, request: &ClassificationRequest)
    -> Result<Classification, OracleError>;
}

/// Classify through `oracle`, substituting [`Classification::fallback`] on
/// any oracle error, invalid payload, or confidence below `min_confidence`.
pub async fn classify_with_fallback(
    oracle: &dyn ClassificationOracle,
    request: &ClassificationRequest,
    min_confidence: f32,
) -> ClassificationOutcome {
    let result = oracle
        .classify(request)
        .await
        .and_then(|classification| {
            classification
                .validate()
                .map_err(|e| OracleError::InvalidResponse {
                    reason: e.to_string(),
                })?;
            if classification.confidence < min_confidence {
                return Err(OracleError::LowConfidence {
                    confidence: classification.confidence,
                    threshold: min_confidence,
                });
            }
            Ok(classification)
        });

    match result {
        Ok(classification) => {
            debug!(
                oracle = oracle.name(),
                category = %classification.category,
                urgency = %classification.urgency,
                confidence = classification.confidence,
                "Issue classified"
            );
            ClassificationOutcome::Classified(classification)
        }
        Err(e) => {
            warn!(
                oracle = oracle.name(),
                error = %e,
                "Classification unusable, applying conservative fallback"
            );
            ClassificationOutcome::Fallback {
                classification: Classification::fallback(),
                reason: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::model::{Category, Severity, Urgency};
    use crate::dispatch::job::CustomerInfo;

    struct FixedOracle(Result<Classification, String>);

    #[async_trait]
    impl ClassificationOracle for FixedOracle {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn classify(
            &self,
            _request: &ClassificationRequest,
        ) -> Result<Classification, OracleError> {
            self.0
                .clone()
                .map_err(|reason| OracleError::Unavailable { reason })
        }
    }

    fn request() -> ClassificationRequest {
        ClassificationRequest::new("Pipe burst in basement", CustomerInfo::default())
    }

    #[tokio::test]
    async fn confident_result_passes_through() {
        let c = Classification::new(Category::Pipe, Severity::Critical, Urgency::Emergency, "2-4 hours")
            .with_confidence(0.9);
        let oracle = FixedOracle(Ok(c.clone()));
        let outcome = classify_with_fallback(&oracle, &request(), 0.25).await;
        assert_eq!(outcome, ClassificationOutcome::Classified(c));
    }

    #[tokio::test]
    async fn oracle_failure_falls_back() {
        let oracle = FixedOracle(Err("connection refused".into()));
        let outcome = classify_with_fallback(&oracle, &request(), 0.25).await;
        assert!(outcome.is_fallback());
        assert_eq!(outcome.classification().urgency, Urgency::Medium);
        assert_eq!(outcome.classification().category, Category::Other);
    }

    #[tokio::test]
    async fn low_confidence_falls_back() {
        let c = Classification::new(Category::Leak, Severity::Low, Urgency::Low, "1 hour")
            .with_confidence(0.1);
        let oracle = FixedOracle(Ok(c));
        let outcome = classify_with_fallback(&oracle, &request(), 0.25).await;
        match outcome {
            ClassificationOutcome::Fallback { reason, .. } => {
                assert!(reason.contains("below threshold"));
            }
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_payload_falls_back() {
        let c = Classification::new(Category::Leak, Severity::Low, Urgency::Low, "");
        let oracle = FixedOracle(Ok(c));
        let outcome = classify_with_fallback(&oracle, &request(), 0.0).await;
        assert!(outcome.is_fallback());
    }
}
