//! ResponseValidator: combines detector findings into one result.
//!
//! The combination rules are fixed:
//! 1. Suspicion is the weighted sum of the three detector scores, clamped
//! 2. Confidence is one minus suspicion
//! 3. A result is valid only if confidence meets the level's threshold AND
//!    no detector raised a hard issue
//!
//! Only the weights and thresholds are configurable.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::config::{LevelThresholds, ScoreWeights, ValidatorConfig};
use crate::detectors::{
    BehavioralAnalyzer, Detector, FeatureAnomalyDetector, RecordSet, SchemaDetector,
};
use crate::policy::PolicyState;
use crate::types::{
    clamp_unit, json_type_name, DetectorFinding, IssueSource, ValidationIssue, ValidationLevel,
    ValidationRequest, ValidationResult,
};

/// Composes the schema, feature and behavioral detectors.
#[derive(Debug, Clone, Default)]
pub struct ResponseValidator {
    schema: SchemaDetector,
    feature: FeatureAnomalyDetector,
    behavior: BehavioralAnalyzer,
    weights: ScoreWeights,
    thresholds: LevelThresholds,
}

impl ResponseValidator {
    pub fn new(config: &ValidatorConfig) -> Self {
        Self {
            schema: SchemaDetector::new(config.schema.clone()),
            feature: FeatureAnomalyDetector::new(config.feature.clone()),
            behavior: BehavioralAnalyzer::new(config.behavior.clone()),
            weights: config.weights.clone(),
            thresholds: config.thresholds.clone(),
        }
    }

    /// Adapt the requested level against `state`, then evaluate.
    ///
    /// Recording the result is left to the caller.
    pub fn validate(&self, request: &ValidationRequest<'_>, state: &PolicyState) -> ValidationResult {
        let effective = state.adapt(request.level, request.context);
        self.evaluate(request, effective)
            .with_metadata("validation_count", json!(state.len()))
    }

    /// Evaluate a request at a fixed level, without touching history.
    pub fn evaluate(&self, request: &ValidationRequest<'_>, level: ValidationLevel) -> ValidationResult {
        let threshold = self.threshold(level);

        if RecordSet::from_payload(request.payload, request.profile).is_none() {
            tracing::warn!(
                response_type = request.kind,
                found = json_type_name(request.payload),
                "Malformed payload rejected"
            );
            let issue = ValidationIssue::hard(
                IssueSource::Schema,
                format!(
                    "malformed payload: expected an object or array, found {}",
                    json_type_name(request.payload)
                ),
            );
            let scores = Scores {
                schema: 1.0,
                feature: 0.0,
                behavior: 0.0,
            };
            return ValidationResult::new(
                false,
                0.0,
                vec![issue],
                self.metadata(request, level, threshold, &scores),
                level,
            );
        }

        let detectors: [&dyn Detector; 3] = [&self.schema, &self.feature, &self.behavior];
        let findings: Vec<DetectorFinding> = detectors.iter().map(|d| d.inspect(request)).collect();

        let scores = Scores::from_findings(&findings);
        let suspicion = clamp_unit(
            self.weights.schema * scores.schema
                + self.weights.feature * scores.feature
                + self.weights.behavior * scores.behavior,
        );
        let confidence = 1.0 - suspicion;
        let vetoed = findings.iter().any(DetectorFinding::has_hard_issue);
        let is_valid = confidence >= threshold && !vetoed;

        tracing::debug!(
            response_type = request.kind,
            level = %level,
            schema = scores.schema,
            feature = scores.feature,
            behavior = scores.behavior,
            confidence,
            vetoed,
            is_valid,
            "Response evaluated"
        );

        let issues = findings.into_iter().flat_map(|f| f.issues).collect();
        ValidationResult::new(
            is_valid,
            confidence,
            issues,
            self.metadata(request, level, threshold, &scores),
            level,
        )
    }

    /// Minimum confidence accepted at `level`.
    pub fn threshold(&self, level: ValidationLevel) -> f64 {
        self.thresholds.for_level(level)
    }

    pub fn schema(&self) -> &SchemaDetector {
        &self.schema
    }

    pub fn feature(&self) -> &FeatureAnomalyDetector {
        &self.feature
    }

    pub fn behavior(&self) -> &BehavioralAnalyzer {
        &self.behavior
    }

    fn metadata(
        &self,
        request: &ValidationRequest<'_>,
        level: ValidationLevel,
        threshold: f64,
        scores: &Scores,
    ) -> BTreeMap<String, Value> {
        let mut metadata = BTreeMap::new();
        metadata.insert("validation_level".into(), json!(level));
        metadata.insert("requested_level".into(), json!(request.level));
        metadata.insert("threshold".into(), json!(threshold));
        metadata.insert("schema_score".into(), json!(scores.schema));
        metadata.insert("feature_score".into(), json!(scores.feature));
        metadata.insert("behavior_score".into(), json!(scores.behavior));
        metadata.insert("response_type".into(), json!(request.kind));
        metadata.insert("profile".into(), json!(request.profile.kind));

        if !request.context.extra.is_empty() {
            let extra: Map<String, Value> = request
                .context
                .extra
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            metadata.insert("context".into(), Value::Object(extra));
        }
        metadata
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Scores {
    schema: f64,
    feature: f64,
    behavior: f64,
}

impl Scores {
    fn from_findings(findings: &[DetectorFinding]) -> Self {
        let mut scores = Self::default();
        for finding in findings {
            match finding.source {
                IssueSource::Schema => scores.schema = finding.score,
                IssueSource::Feature => scores.feature = finding.score,
                IssueSource::Behavioral => scores.behavior = finding.score,
            }
        }
        scores
    }
}
