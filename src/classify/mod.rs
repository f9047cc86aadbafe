//! Issue classification: the typed model, the oracle seam, and two oracles.

pub mod http;
pub mod keywords;
pub mod model;
pub mod oracle;

pub use http::HttpOracle;
pub use keywords::KeywordOracle;
pub use model::{
    Category, Classification, ClassificationOutcome, ClassificationRequest, RawClassification,
    Severity, Urgency,
};
pub use oracle::{ClassificationOracle, classify_with_fallback};
