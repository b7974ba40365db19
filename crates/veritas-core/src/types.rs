//! Core types shared by detectors, the strictness policy and the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::profile::ResponseProfile;
use crate::ValidationError;

/// Validation strictness, ordered from most lenient to most strict.
///
/// The ordering is load-bearing: acceptance thresholds rise monotonically
/// with the level and adaptation moves along it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    Basic,
    #[default]
    Standard,
    Strict,
    Paranoid,
}

impl ValidationLevel {
    /// All levels, least strict first.
    pub const ALL: [ValidationLevel; 4] = [
        ValidationLevel::Basic,
        ValidationLevel::Standard,
        ValidationLevel::Strict,
        ValidationLevel::Paranoid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationLevel::Basic => "basic",
            ValidationLevel::Standard => "standard",
            ValidationLevel::Strict => "strict",
            ValidationLevel::Paranoid => "paranoid",
        }
    }
}

impl fmt::Display for ValidationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationLevel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(ValidationLevel::Basic),
            "standard" => Ok(ValidationLevel::Standard),
            "strict" => Ok(ValidationLevel::Strict),
            "paranoid" => Ok(ValidationLevel::Paranoid),
            _ => Err(ValidationError::UnknownLevel(s.to_string())),
        }
    }
}

/// Which detector raised an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSource {
    Schema,
    Feature,
    Behavioral,
}

impl fmt::Display for IssueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueSource::Schema => write!(f, "schema"),
            IssueSource::Feature => write!(f, "feature"),
            IssueSource::Behavioral => write!(f, "behavioral"),
        }
    }
}

/// A single detected anomaly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Detector that raised the issue
    pub source: IssueSource,

    /// Human-readable description
    pub message: String,

    /// Hard issues veto acceptance regardless of confidence
    #[serde(default)]
    pub hard: bool,
}

impl ValidationIssue {
    /// A soft issue: contributes suspicion but does not veto.
    pub fn soft(source: IssueSource, message: impl Into<String>) -> Self {
        Self {
            source,
            message: message.into(),
            hard: false,
        }
    }

    /// A hard issue: forces `is_valid = false`.
    pub fn hard(source: IssueSource, message: impl Into<String>) -> Self {
        Self {
            source,
            message: message.into(),
            hard: true,
        }
    }

    /// Qualify the message with a location such as `item[3]`.
    pub fn with_prefix(&self, prefix: &str) -> Self {
        Self {
            source: self.source,
            message: format!("{}: {}", prefix, self.message),
            hard: self.hard,
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.source, self.message)
    }
}

/// Suspicion score and issues produced by one detector.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorFinding {
    pub source: IssueSource,

    /// Suspicion in [0, 1]
    pub score: f64,

    pub issues: Vec<ValidationIssue>,
}

impl DetectorFinding {
    pub fn empty(source: IssueSource) -> Self {
        Self {
            source,
            score: 0.0,
            issues: Vec::new(),
        }
    }

    /// Add a soft issue and its suspicion increment.
    pub fn flag(&mut self, weight: f64, message: impl Into<String>) {
        self.score = clamp_unit(self.score + weight);
        self.issues.push(ValidationIssue::soft(self.source, message));
    }

    /// Add a hard issue and its suspicion increment.
    pub fn veto(&mut self, weight: f64, message: impl Into<String>) {
        self.score = clamp_unit(self.score + weight);
        self.issues.push(ValidationIssue::hard(self.source, message));
    }

    pub fn has_hard_issue(&self) -> bool {
        self.issues.iter().any(|i| i.hard)
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Clamp to [0, 1], mapping NaN to 0.
pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Caller-supplied context for a validation call.
///
/// Only `response_time`, `critical_operation` and `high_performance` carry
/// meaning; everything else is kept in `extra` and echoed into metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseContext {
    /// Round-trip time of the upstream call, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time: Option<f64>,

    #[serde(default)]
    pub critical_operation: bool,

    #[serde(default)]
    pub high_performance: bool,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ResponseContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response_time(mut self, millis: f64) -> Self {
        self.response_time = Some(millis);
        self
    }

    pub fn critical(mut self) -> Self {
        self.critical_operation = true;
        self
    }

    pub fn high_performance(mut self) -> Self {
        self.high_performance = true;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Build a context from a loosely-typed JSON map.
    ///
    /// Recognized keys holding the wrong type are dropped rather than
    /// rejected; a non-object value yields an empty context.
    pub fn from_value(value: &Value) -> Self {
        let mut context = Self::default();
        let Some(map) = value.as_object() else {
            if !value.is_null() {
                tracing::debug!(kind = json_type_name(value), "Ignoring non-object context");
            }
            return context;
        };

        for (key, v) in map {
            match key.as_str() {
                "response_time" => match v.as_f64() {
                    Some(ms) => context.response_time = Some(ms),
                    None => tracing::debug!(value = %v, "Ignoring non-numeric response_time"),
                },
                "critical_operation" => match v.as_bool() {
                    Some(flag) => context.critical_operation = flag,
                    None => tracing::debug!(value = %v, "Ignoring non-boolean critical_operation"),
                },
                "high_performance" => match v.as_bool() {
                    Some(flag) => context.high_performance = flag,
                    None => tracing::debug!(value = %v, "Ignoring non-boolean high_performance"),
                },
                _ => {
                    context.extra.insert(key.clone(), v.clone());
                }
            }
        }

        context
    }

    /// Same context without timing information.
    pub fn without_timing(&self) -> Self {
        Self {
            response_time: None,
            ..self.clone()
        }
    }
}

/// Everything a detector needs to inspect one payload.
#[derive(Debug, Clone, Copy)]
pub struct ValidationRequest<'a> {
    pub payload: &'a Value,

    /// Response kind as requested by the caller
    pub kind: &'a str,

    /// Resolved profile for `kind` (possibly the generic fallback)
    pub profile: &'a ResponseProfile,

    pub context: &'a ResponseContext,

    /// Level requested before adaptation
    pub level: ValidationLevel,

    /// Evaluation instant used for future/stale timestamp checks
    pub now: DateTime<Utc>,
}

/// The authoritative outcome of validating one payload.
///
/// Built once and never mutated; fields are only readable through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    is_valid: bool,
    confidence: f64,
    issues: Vec<ValidationIssue>,
    metadata: BTreeMap<String, Value>,
    validation_level: ValidationLevel,
}

impl ValidationResult {
    pub fn new(
        is_valid: bool,
        confidence: f64,
        issues: Vec<ValidationIssue>,
        metadata: BTreeMap<String, Value>,
        validation_level: ValidationLevel,
    ) -> Self {
        Self {
            is_valid,
            confidence: clamp_unit(confidence),
            issues,
            metadata,
            validation_level,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    /// The effective level the result was judged at.
    pub fn validation_level(&self) -> ValidationLevel {
        self.validation_level
    }

    pub fn has_hard_issue(&self) -> bool {
        self.issues.iter().any(|i| i.hard)
    }

    /// True if any issue message contains `needle` (case-insensitive).
    pub fn mentions(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.issues
            .iter()
            .any(|i| i.message.to_lowercase().contains(&needle))
    }

    /// Attach a metadata entry while the result is still being assembled.
    pub(crate) fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.is_valid { "VALID" } else { "INVALID" };
        write!(
            f,
            "{} (confidence {:.2}, level {}, {} issue(s))",
            verdict,
            self.confidence,
            self.validation_level,
            self.issues.len()
        )
    }
}

/// JSON type name for diagnostics.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_level_ordering() {
        assert!(ValidationLevel::Basic < ValidationLevel::Standard);
        assert!(ValidationLevel::Standard < ValidationLevel::Strict);
        assert!(ValidationLevel::Strict < ValidationLevel::Paranoid);
        assert_eq!(ValidationLevel::default(), ValidationLevel::Standard);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("STRICT".parse::<ValidationLevel>().unwrap(), ValidationLevel::Strict);
        assert_eq!(" basic ".parse::<ValidationLevel>().unwrap(), ValidationLevel::Basic);
        assert!(matches!(
            "lenient".parse::<ValidationLevel>(),
            Err(ValidationError::UnknownLevel(_))
        ));
    }

    #[test]
    fn test_finding_clamps_score() {
        let mut finding = DetectorFinding::empty(IssueSource::Schema);
        finding.flag(0.7, "first");
        finding.veto(0.7, "second");
        assert_eq!(finding.score, 1.0);
        assert!(finding.has_hard_issue());
        assert_eq!(finding.issues.len(), 2);
    }

    #[test]
    fn test_context_from_value() {
        let context = ResponseContext::from_value(&json!({
            "response_time": 25,
            "critical_operation": true,
            "high_performance": "yes",
            "trace_id": "abc"
        }));

        assert_eq!(context.response_time, Some(25.0));
        assert!(context.critical_operation);
        assert!(!context.high_performance);
        assert_eq!(context.extra.get("trace_id"), Some(&json!("abc")));
    }

    #[test]
    fn test_context_from_non_object() {
        assert_eq!(ResponseContext::from_value(&json!([1, 2])), ResponseContext::default());
    }

    #[test]
    fn test_result_clamps_confidence() {
        let result = ValidationResult::new(
            true,
            1.7,
            vec![],
            BTreeMap::new(),
            ValidationLevel::Basic,
        );
        assert_eq!(result.confidence(), 1.0);

        let result = ValidationResult::new(
            false,
            f64::NAN,
            vec![],
            BTreeMap::new(),
            ValidationLevel::Basic,
        );
        assert_eq!(result.confidence(), 0.0);
    }

    #[test]
    fn test_issue_display_and_prefix() {
        let issue = ValidationIssue::hard(IssueSource::Schema, "field 'created_at' is in the future");
        assert_eq!(
            issue.to_string(),
            "[schema] field 'created_at' is in the future"
        );
        let prefixed = issue.with_prefix("item[2]");
        assert!(prefixed.message.starts_with("item[2]: "));
        assert!(prefixed.hard);
    }
}
