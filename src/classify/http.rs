//! HTTP client for a remote classification service exposing `POST /classify`.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classify::model::{Classification, ClassificationRequest, RawClassification};
use crate::classify::oracle::ClassificationOracle;
use crate::error::OracleError;

/// Request timeout for the remote classifier.
const CLASSIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Body sent to `/classify`.
#[derive(Debug, Serialize)]
struct ClassifyBody<'a> {
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone_number: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<&'a str>,
}

/// Response envelope returned by `/classify`.
#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    #[serde(default)]
    request_id: Option<String>,
    classification: RawClassification,
    #[serde(default)]
    processing_time_ms: Option<f64>,
    #[serde(default)]
    model_version: Option<String>,
}

/// Oracle backed by a remote classifier service.
pub struct HttpOracle {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl HttpOracle {
    /// Create a client for the service at `base_url` (e.g. `http://localhost:8000`).
    pub fn new(base_url: impl Into<String>, api_key: Option<SecretString>) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(CLASSIFY_TIMEOUT)
            .build()
            .map_err(|e| OracleError::Http(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/classify", self.base_url)
    }
}

#[async_trait]
impl ClassificationOracle for HttpOracle {
    fn name(&self) -> &str {
        "http"
    }

    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<Classification, OracleError> {
        let body = ClassifyBody {
            description: &request.description,
            customer_name: request.customer.name.as_deref(),
            phone_number: request.customer.phone.as_deref(),
            address: request.customer.address.as_deref(),
        };

        let mut builder = self.client.post(self.endpoint()).json(&body);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await.map_err(|e| OracleError::Unavailable {
            reason: format!("request failed: {e}"),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::Unavailable {
                reason: format!("classifier returned HTTP {status}"),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| OracleError::Http(format!("failed to read body: {e}")))?;
        let parsed: ClassifyResponse = serde_json::from_str(&text)?;

        debug!(
            request_id = parsed.request_id.as_deref().unwrap_or("-"),
            model_version = parsed.model_version.as_deref().unwrap_or("-"),
            processing_time_ms = parsed.processing_time_ms.unwrap_or_default(),
            "Remote classification received"
        );

        Classification::try_from(parsed.classification).map_err(|e| OracleError::InvalidResponse {
            reason: e.to_string(),
        })
    }
}
