//! # veritas-core
//!
//! Response validation and hallucination detection for structured API
//! responses.
//!
//! This crate decides whether a payload fetched from an integration layer
//! (a CI/CD or workflow API) can be trusted by downstream automation:
//! - Is it shaped like the response kind it claims to be?
//! - Do its values look real, or fabricated and stale?
//! - Does the response as a whole behave like a real one?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same payload, context, level and instant always produce the same result
//! 2. **Explainable**: Every point of lost confidence is backed by a named issue
//! 3. **Total**: Data-quality problems become results, never errors or panics
//! 4. **Self-tuning**: Strictness follows the validator's own recent track record
//!
//! ## Example
//!
//! ```rust,ignore
//! use veritas_core::{ResponseContext, ValidationOrchestrator};
//! use serde_json::json;
//!
//! let orchestrator = ValidationOrchestrator::default();
//! let payload = json!({"id": 42, "name": "CI", "status": "completed", "created_at": "2025-01-01T00:00:00Z"});
//! let result = orchestrator.validate_response(&payload, None, "workflow_run", &ResponseContext::new());
//!
//! if !result.is_valid() {
//!     for issue in result.issues() {
//!         eprintln!("{}", issue);
//!     }
//! }
//! ```

pub mod config;
pub mod detectors;
pub mod orchestrator;
pub mod policy;
pub mod profile;
pub mod types;
pub mod validator;

// Re-export main types at crate root
pub use config::{ConfigError, ValidatorConfig};
pub use detectors::{BehavioralAnalyzer, Detector, Feature, FeatureAnomalyDetector, SchemaDetector};
pub use orchestrator::{ValidationOrchestrator, ValidationOrchestratorBuilder};
pub use policy::{AdaptiveStrictnessPolicy, PolicySnapshot, PolicyState};
pub use profile::{ProfileRegistry, ResponseProfile};
pub use types::{
    DetectorFinding, IssueSource, ResponseContext, ValidationIssue, ValidationLevel,
    ValidationRequest, ValidationResult,
};
pub use validator::ResponseValidator;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;

/// Errors raised at the API boundary.
///
/// These are programming errors; bad payloads are reported through
/// [`ValidationResult`] instead.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Unknown validation level: {0}")]
    UnknownLevel(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Validate one payload with default configuration and no history.
///
/// The payload is judged against the built-in profile for `kind`, at the
/// current instant. The level is the default one unless the context marks a
/// critical or high-performance operation.
pub fn validate(payload: &Value, kind: &str, context: &ResponseContext) -> ValidationResult {
    let profiles = ProfileRegistry::builtin();
    let level = PolicyState::default().adapt(ValidationLevel::default(), context);
    let request = ValidationRequest {
        payload,
        kind,
        profile: profiles.resolve(kind),
        context,
        level,
        now: Utc::now(),
    };
    ResponseValidator::default().evaluate(&request, request.level)
}
