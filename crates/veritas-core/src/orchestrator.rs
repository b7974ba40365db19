//! Validation orchestrator: routes payloads by kind and owns the policy.
//!
//! The orchestrator is the only component that records results. The policy
//! lock is held across the full adapt, validate, record sequence, so
//! concurrent callers always see a history that matches the levels they
//! were judged at.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::ValidatorConfig;
use crate::policy::{AdaptiveStrictnessPolicy, PolicySnapshot};
use crate::profile::{ProfileRegistry, ResponseProfile};
use crate::types::{ResponseContext, ValidationLevel, ValidationRequest, ValidationResult};
use crate::validator::ResponseValidator;
use crate::ValidationError;

/// Source of the evaluation instant.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Validates responses and keeps the strictness history.
pub struct ValidationOrchestrator {
    validator: ResponseValidator,
    policy: AdaptiveStrictnessPolicy,
    profiles: ProfileRegistry,
    default_level: ValidationLevel,
    batch_tolerance: f64,
    clock: Clock,
}

impl ValidationOrchestrator {
    /// Create an orchestrator from a configuration.
    pub fn new(config: ValidatorConfig) -> Result<Self, ValidationError> {
        Self::builder().config(config).build()
    }

    pub fn builder() -> ValidationOrchestratorBuilder {
        ValidationOrchestratorBuilder::new()
    }

    /// Validate a single response at the default level.
    pub fn validate_response(
        &self,
        payload: &Value,
        request_params: Option<&Value>,
        kind: &str,
        context: &ResponseContext,
    ) -> ValidationResult {
        self.validate_response_with_level(payload, request_params, kind, context, self.default_level)
    }

    /// Validate a single response at an explicit requested level.
    pub fn validate_response_with_level(
        &self,
        payload: &Value,
        request_params: Option<&Value>,
        kind: &str,
        context: &ResponseContext,
        level: ValidationLevel,
    ) -> ValidationResult {
        let profile = self.profiles.resolve(kind);
        let request = ValidationRequest {
            payload,
            kind,
            profile,
            context,
            level,
            now: (self.clock)(),
        };

        let mut state = self.policy.lock();
        let mut result = self.validator.validate(&request, &state);
        if let Some(params) = request_params {
            result = result.with_metadata("request_params", params.clone());
        }
        state.record(result.clone());
        drop(state);

        tracing::debug!(
            response_type = kind,
            is_valid = result.is_valid(),
            confidence = result.confidence(),
            "Response validated"
        );
        result
    }

    /// Validate each item of a list independently and fold the outcomes.
    ///
    /// The list is valid when its invalid fraction is within the batch
    /// tolerance. Items are judged without the fetch's response time; the
    /// list as a whole is analyzed behaviorally for reporting only.
    pub fn validate_list(
        &self,
        items: &[Value],
        kind: &str,
        context: &ResponseContext,
    ) -> ValidationResult {
        let profile = self.profiles.resolve(kind);
        let item_profile = profile.item_profile();
        let item_context = context.without_timing();
        let now = (self.clock)();

        let mut state = self.policy.lock();
        let level = state.adapt(self.default_level, context);
        let threshold = self.validator.threshold(level);

        let mut issues = Vec::new();
        let mut invalid = 0usize;
        let mut confidence_sum = 0.0;

        for (i, item) in items.iter().enumerate() {
            let request = ValidationRequest {
                payload: item,
                kind,
                profile: &item_profile,
                context: &item_context,
                level: self.default_level,
                now,
            };
            let result = self.validator.evaluate(&request, level);
            if !result.is_valid() {
                invalid += 1;
            }
            confidence_sum += result.confidence();

            let prefix = format!("item[{}]", i);
            issues.extend(result.issues().iter().map(|issue| issue.with_prefix(&prefix)));
        }

        let records: Vec<Option<&Map<String, Value>>> = items.iter().map(Value::as_object).collect();
        let collection = self
            .validator
            .behavior()
            .analyze_records(&records, &item_profile, context);
        issues.extend(collection.issues);

        let (is_valid, confidence, invalid_fraction) = if items.is_empty() {
            (true, 1.0, 0.0)
        } else {
            let fraction = invalid as f64 / items.len() as f64;
            (
                fraction <= self.batch_tolerance,
                confidence_sum / items.len() as f64,
                fraction,
            )
        };

        let mut metadata = BTreeMap::new();
        metadata.insert("validation_level".to_string(), json!(level));
        metadata.insert("requested_level".to_string(), json!(self.default_level));
        metadata.insert("threshold".to_string(), json!(threshold));
        metadata.insert("item_count".to_string(), json!(items.len()));
        metadata.insert("invalid_count".to_string(), json!(invalid));
        metadata.insert("invalid_fraction".to_string(), json!(invalid_fraction));
        metadata.insert("batch_tolerance".to_string(), json!(self.batch_tolerance));
        metadata.insert(
            "collection_behavior_score".to_string(),
            json!(collection.score),
        );
        metadata.insert("validation_count".to_string(), json!(state.len()));
        metadata.insert("response_type".to_string(), json!(kind));
        metadata.insert("profile".to_string(), json!(profile.kind));
        if !context.extra.is_empty() {
            metadata.insert("context".to_string(), json!(context.extra));
        }

        let result = ValidationResult::new(is_valid, confidence, issues, metadata, level);
        state.record(result.clone());
        drop(state);

        tracing::debug!(
            response_type = kind,
            items = items.len(),
            invalid,
            is_valid,
            "List validated"
        );
        result
    }

    pub fn policy(&self) -> &AdaptiveStrictnessPolicy {
        &self.policy
    }

    pub fn snapshot(&self) -> PolicySnapshot {
        self.policy.snapshot()
    }

    pub fn profiles(&self) -> &ProfileRegistry {
        &self.profiles
    }

    pub fn validator(&self) -> &ResponseValidator {
        &self.validator
    }

    pub fn default_level(&self) -> ValidationLevel {
        self.default_level
    }
}

impl Default for ValidationOrchestrator {
    fn default() -> Self {
        let config = ValidatorConfig::default();
        Self {
            validator: ResponseValidator::new(&config),
            policy: AdaptiveStrictnessPolicy::new(config.adaptation.clone()),
            profiles: ProfileRegistry::builtin(),
            default_level: config.default_level,
            batch_tolerance: config.batch_tolerance,
            clock: system_clock(),
        }
    }
}

/// Builder for creating a validation orchestrator.
pub struct ValidationOrchestratorBuilder {
    config: ValidatorConfig,
    default_level: Option<ValidationLevel>,
    clock: Option<Clock>,
    profiles: Vec<ResponseProfile>,
}

impl ValidationOrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: ValidatorConfig::default(),
            default_level: None,
            clock: None,
            profiles: Vec::new(),
        }
    }

    /// Set the configuration.
    pub fn config(mut self, config: ValidatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the configured default level.
    pub fn default_level(mut self, level: ValidationLevel) -> Self {
        self.default_level = Some(level);
        self
    }

    /// Override the default level by name.
    pub fn default_level_name(self, name: &str) -> Result<Self, ValidationError> {
        let level = name.parse()?;
        Ok(self.default_level(level))
    }

    /// Set the source of the evaluation instant.
    pub fn clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Register a response profile, replacing any built-in of the same kind.
    pub fn profile(mut self, profile: ResponseProfile) -> Self {
        self.profiles.push(profile);
        self
    }

    /// Build the orchestrator.
    pub fn build(self) -> Result<ValidationOrchestrator, ValidationError> {
        self.config.validate()?;

        let mut profiles = ProfileRegistry::builtin();
        for profile in self.config.profiles.iter().cloned().chain(self.profiles) {
            profiles.register(profile);
        }

        Ok(ValidationOrchestrator {
            validator: ResponseValidator::new(&self.config),
            policy: AdaptiveStrictnessPolicy::new(self.config.adaptation.clone()),
            profiles,
            default_level: self.default_level.unwrap_or(self.config.default_level),
            batch_tolerance: self.config.batch_tolerance,
            clock: self.clock.unwrap_or_else(system_clock),
        })
    }
}

impl Default for ValidationOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn orchestrator() -> ValidationOrchestrator {
        ValidationOrchestrator::builder()
            .clock(fixed_now)
            .build()
            .unwrap()
    }

    fn run(id: u64) -> Value {
        json!({
            "id": id,
            "name": format!("build-{}", id),
            "status": "completed",
            "conclusion": if id % 2 == 0 { "success" } else { "failure" },
            "run_number": id,
            "created_at": "2025-05-31T10:00:00Z"
        })
    }

    #[test]
    fn test_validate_response_records_history() {
        let orch = orchestrator();
        let result = orch.validate_response(&run(1), None, "workflow_run", &ResponseContext::new());
        assert!(result.is_valid());
        assert_eq!(orch.snapshot().history_len, 1);
        assert_eq!(result.metadata()["validation_count"], json!(0));

        let second = orch.validate_response(&run(2), None, "workflow_run", &ResponseContext::new());
        assert_eq!(second.metadata()["validation_count"], json!(1));
    }

    #[test]
    fn test_request_params_in_metadata() {
        let orch = orchestrator();
        let params = json!({"owner": "acme", "repo": "api"});
        let result = orch.validate_response(&run(1), Some(&params), "workflow_run", &ResponseContext::new());
        assert_eq!(result.metadata()["request_params"], params);
        assert_eq!(result.metadata()["response_type"], json!("workflow_run"));
    }

    #[test]
    fn test_unknown_kind_uses_generic_profile() {
        let orch = orchestrator();
        let result = orch.validate_response(
            &json!({"id": 7, "title": "hello"}),
            None,
            "mystery_kind",
            &ResponseContext::new(),
        );
        assert!(result.is_valid());
        assert_eq!(result.metadata()["profile"], json!("generic"));
        assert_eq!(result.metadata()["response_type"], json!("mystery_kind"));
    }

    #[test]
    fn test_explicit_level() {
        let orch = orchestrator();
        let result = orch.validate_response_with_level(
            &run(1),
            None,
            "workflow_run",
            &ResponseContext::new(),
            ValidationLevel::Strict,
        );
        assert_eq!(result.validation_level(), ValidationLevel::Strict);
    }

    #[test]
    fn test_validate_list_all_valid() {
        let orch = orchestrator();
        let items: Vec<Value> = (1..=4).map(run).collect();
        let result = orch.validate_list(&items, "workflow_runs", &ResponseContext::new());
        assert!(result.is_valid(), "{:?}", result.issues());
        assert_eq!(result.metadata()["item_count"], json!(4));
        assert_eq!(result.metadata()["invalid_count"], json!(0));
        assert_eq!(orch.snapshot().history_len, 1);
    }

    #[test]
    fn test_validate_list_tolerance_is_inclusive() {
        let orch = orchestrator();
        let mut items: Vec<Value> = (1..=4).map(run).collect();
        items.push(json!({"id": "bogus", "name": "x", "status": "completed", "created_at": "2030-01-01"}));
        let result = orch.validate_list(&items, "workflow_run", &ResponseContext::new());
        assert_eq!(result.metadata()["invalid_count"], json!(1));
        assert!(result.is_valid());
        assert!(result.issues().iter().any(|i| i.message.starts_with("item[4]: ")));
    }

    #[test]
    fn test_validate_list_beyond_tolerance() {
        let orch = orchestrator();
        let items = vec![run(1), json!(null), json!(3)];
        let result = orch.validate_list(&items, "workflow_run", &ResponseContext::new());
        assert!(!result.is_valid());
        assert_eq!(result.metadata()["invalid_count"], json!(2));
    }

    #[test]
    fn test_empty_list_is_valid() {
        let orch = orchestrator();
        let result = orch.validate_list(&[], "workflow_runs", &ResponseContext::new());
        assert!(result.is_valid());
        assert_eq!(result.confidence(), 1.0);
        assert!(result.issues().is_empty());
    }

    #[test]
    fn test_list_timing_applies_to_collection_only() {
        let orch = orchestrator();
        let items: Vec<Value> = (1..=3).map(run).collect();
        let ctx = ResponseContext::new().with_response_time(10.0);
        let result = orch.validate_list(&items, "workflow_run", &ctx);
        assert_eq!(result.confidence(), 1.0);
        assert!(result.mentions("suspiciously fast"));
        assert!(!result.mentions("item[0]: suspiciously fast"));
        assert_eq!(result.metadata()["collection_behavior_score"], json!(0.3));
        assert!(result.is_valid());
    }

    #[test]
    fn test_builder_profiles_and_levels() {
        let orch = ValidationOrchestrator::builder()
            .default_level_name("strict")
            .unwrap()
            .profile(ResponseProfile::new("invoice").required(&["number", "amount"]))
            .clock(fixed_now)
            .build()
            .unwrap();
        assert_eq!(orch.default_level(), ValidationLevel::Strict);
        assert!(orch.profiles().contains("invoice"));

        let result = orch.validate_response(&json!({"number": 1}), None, "invoice", &ResponseContext::new());
        assert!(result.mentions("missing required field 'amount'"));
    }

    #[test]
    fn test_builder_rejects_unknown_level() {
        let err = ValidationOrchestrator::builder().default_level_name("lenient");
        assert!(matches!(err, Err(ValidationError::UnknownLevel(_))));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let config = ValidatorConfig {
            batch_tolerance: 1.5,
            ..ValidatorConfig::default()
        };
        let err = ValidationOrchestrator::new(config).err();
        assert!(matches!(err, Some(ValidationError::Config(ConfigError::Invalid(_)))));
    }

    #[test]
    fn test_orchestrator_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ValidationOrchestrator>();
    }
}
