//! Schema Detector
//!
//! **Question**: Does every record carry the declared fields, types and values?
//!
//! | Check | Increment | Hard |
//! |-------|-----------|------|
//! | required field absent or null | `missing_field` | no |
//! | numeric field holds a non-number | `type_mismatch` | yes |
//! | numeric field holds a numeric string | `numeric_string` | no |
//! | temporal field does not parse | `unparsable_timestamp` | no |
//! | temporal field lies in the future | `future_timestamp` | yes |
//! | enumerated field outside its value set | `unknown_enum_value` | no |
//! | ordered timestamps out of order | `temporal_order` | no |
//!
//! Unknown enum values only add partial suspicion so upstream schema drift
//! (a new status value) does not sink an otherwise healthy payload.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::config::SchemaConfig;
use crate::profile::ResponseProfile;
use crate::types::{
    json_type_name, DetectorFinding, IssueSource, ValidationIssue, ValidationRequest,
};

use super::patterns::{future_horizon, parse_timestamp};
use super::{field_present, Detector, RecordSet};

/// Structural, type and value checks against a response profile.
#[derive(Debug, Clone, Default)]
pub struct SchemaDetector {
    config: SchemaConfig,
}

impl SchemaDetector {
    pub fn new(config: SchemaConfig) -> Self {
        Self { config }
    }

    /// Validate a payload against a profile.
    ///
    /// Per-record suspicion is capped at 1.0; across records the highest
    /// per-record suspicion is reported.
    pub fn validate(
        &self,
        payload: &Value,
        profile: &ResponseProfile,
        now: DateTime<Utc>,
    ) -> DetectorFinding {
        let mut finding = DetectorFinding::empty(IssueSource::Schema);

        let Some(set) = RecordSet::from_payload(payload, profile) else {
            finding.veto(
                1.0,
                format!(
                    "malformed payload: expected an object or array, found {}",
                    json_type_name(payload)
                ),
            );
            return finding;
        };

        if set.missing_collection {
            let field = profile.collection_field.as_deref().unwrap_or_default();
            finding.veto(
                1.0,
                format!("collection field '{}' is missing or not an array", field),
            );
            return finding;
        }

        let tolerance = self.config.future_tolerance_secs;
        let horizon = future_horizon(now, tolerance).unwrap_or_else(|| {
            tracing::warn!(tolerance_secs = tolerance, "Clock-skew tolerance out of range");
            finding.issues.push(ValidationIssue::soft(
                IssueSource::Schema,
                format!(
                    "clock-skew tolerance of {}s is out of range; future checks use none",
                    tolerance
                ),
            ));
            now
        });

        let mut worst: f64 = 0.0;
        for (index, record) in set.records.iter().enumerate() {
            let record_finding = match record {
                Some(map) => self.check_record(map, profile, horizon),
                None => {
                    let mut malformed = DetectorFinding::empty(IssueSource::Schema);
                    malformed.veto(1.0, "record is not an object");
                    malformed
                }
            };

            worst = worst.max(record_finding.score);
            for issue in record_finding.issues {
                let message = set.locate(index, &issue.message);
                finding.issues.push(ValidationIssue {
                    message,
                    ..issue
                });
            }
        }

        finding.score = worst;
        tracing::debug!(
            detector = "schema",
            kind = %profile.kind,
            records = set.len(),
            score = finding.score,
            issues = finding.issues.len(),
            "Schema check complete"
        );
        finding
    }

    /// Check a single record.
    fn check_record(
        &self,
        record: &Map<String, Value>,
        profile: &ResponseProfile,
        horizon: DateTime<Utc>,
    ) -> DetectorFinding {
        let mut finding = DetectorFinding::empty(IssueSource::Schema);

        for field in &profile.required_fields {
            if field_present(record, field).is_none() {
                finding.flag(
                    self.config.missing_field,
                    format!("missing required field '{}'", field),
                );
            }
        }

        for field in &profile.numeric_fields {
            self.check_numeric(record, field, &mut finding);
        }

        for field in &profile.temporal_fields {
            self.check_temporal(record, field, horizon, &mut finding);
        }

        for (field, allowed) in &profile.enum_fields {
            self.check_enum(record, field, allowed, &mut finding);
        }

        for (earlier, later) in &profile.temporal_order {
            let first = field_present(record, earlier)
                .and_then(Value::as_str)
                .and_then(parse_timestamp);
            let second = field_present(record, later)
                .and_then(Value::as_str)
                .and_then(parse_timestamp);

            if let (Some(first), Some(second)) = (first, second) {
                if second < first {
                    finding.flag(
                        self.config.temporal_order,
                        format!("'{}' precedes '{}'", later, earlier),
                    );
                }
            }
        }

        finding
    }

    fn check_numeric(&self, record: &Map<String, Value>, field: &str, finding: &mut DetectorFinding) {
        let Some(value) = field_present(record, field) else {
            return;
        };

        match value {
            Value::Number(_) => {}
            Value::String(s) if s.trim().parse::<f64>().is_ok() => {
                finding.flag(
                    self.config.numeric_string,
                    format!("numeric field '{}' encoded as string", field),
                );
            }
            other => {
                finding.veto(
                    self.config.type_mismatch,
                    format!(
                        "type mismatch: field '{}' expected number, found {}",
                        field,
                        json_type_name(other)
                    ),
                );
            }
        }
    }

    fn check_temporal(
        &self,
        record: &Map<String, Value>,
        field: &str,
        horizon: DateTime<Utc>,
        finding: &mut DetectorFinding,
    ) {
        let Some(value) = field_present(record, field) else {
            return;
        };

        match value.as_str().and_then(parse_timestamp) {
            Some(ts) if ts > horizon => {
                finding.veto(
                    self.config.future_timestamp,
                    format!(
                        "field '{}' is in the future ({})",
                        field,
                        ts.to_rfc3339()
                    ),
                );
            }
            Some(_) => {}
            None => {
                finding.flag(
                    self.config.unparsable_timestamp,
                    format!("field '{}' is not a valid timestamp: {}", field, value),
                );
            }
        }
    }

    fn check_enum(
        &self,
        record: &Map<String, Value>,
        field: &str,
        allowed: &[String],
        finding: &mut DetectorFinding,
    ) {
        let Some(value) = field_present(record, field) else {
            return;
        };

        let known = value
            .as_str()
            .map(|s| allowed.iter().any(|a| a.eq_ignore_ascii_case(s.trim())))
            .unwrap_or(false);

        if !known {
            finding.flag(
                self.config.unknown_enum_value,
                format!("field '{}' has unrecognized value {}", field, value),
            );
        }
    }
}

impl Detector for SchemaDetector {
    fn source(&self) -> IssueSource {
        IssueSource::Schema
    }

    fn inspect(&self, request: &ValidationRequest<'_>) -> DetectorFinding {
        self.validate(request.payload, request.profile, request.now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileRegistry;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        parse_timestamp("2025-06-01T12:00:00Z").unwrap()
    }

    fn workflow_run() -> ResponseProfile {
        ProfileRegistry::builtin().resolve("workflow_run").clone()
    }

    #[test]
    fn test_clean_record_passes() {
        let payload = json!({
            "id": 123456789,
            "name": "CI Pipeline",
            "status": "completed",
            "conclusion": "success",
            "created_at": "2025-06-01T11:00:00Z"
        });

        let finding = SchemaDetector::default().validate(&payload, &workflow_run(), now());
        assert!(finding.is_clean(), "unexpected issues: {:?}", finding.issues);
        assert_eq!(finding.score, 0.0);
    }

    #[test]
    fn test_missing_fields_add_suspicion() {
        let payload = json!({"id": 1, "status": "completed"});
        let finding = SchemaDetector::default().validate(&payload, &workflow_run(), now());

        assert_eq!(finding.issues.len(), 2);
        assert!((finding.score - 0.5).abs() < 1e-9);
        assert!(!finding.has_hard_issue());
        assert!(finding.issues[0].message.contains("'name'"));
    }

    #[test]
    fn test_null_counts_as_missing() {
        let payload = json!({
            "id": 1, "name": null, "status": "completed", "created_at": "2025-06-01T11:00:00Z"
        });
        let finding = SchemaDetector::default().validate(&payload, &workflow_run(), now());
        assert_eq!(finding.issues.len(), 1);
        assert!(finding.issues[0].message.contains("missing required field 'name'"));
    }

    #[test]
    fn test_type_mismatch_is_hard() {
        let payload = json!({
            "id": "not_a_number", "name": "x", "status": "completed",
            "created_at": "2025-06-01T11:00:00Z"
        });
        let finding = SchemaDetector::default().validate(&payload, &workflow_run(), now());
        assert!(finding.has_hard_issue());
        assert!(finding.issues[0].message.contains("type mismatch"));
    }

    #[test]
    fn test_numeric_string_is_soft() {
        let payload = json!({
            "id": "42", "name": "x", "status": "completed",
            "created_at": "2025-06-01T11:00:00Z"
        });
        let finding = SchemaDetector::default().validate(&payload, &workflow_run(), now());
        assert!(!finding.has_hard_issue());
        assert_eq!(finding.issues.len(), 1);
    }

    #[test]
    fn test_future_timestamp_is_hard() {
        let payload = json!({
            "id": 1, "name": "x", "status": "completed",
            "created_at": "2025-06-02T12:00:00Z"
        });
        let finding = SchemaDetector::default().validate(&payload, &workflow_run(), now());
        assert!(finding.has_hard_issue());
        assert!(finding.issues[0].message.contains("future"));
        assert!((finding.score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_clock_skew_tolerated() {
        let payload = json!({
            "id": 1, "name": "x", "status": "completed",
            "created_at": "2025-06-01T12:02:00Z"
        });
        let finding = SchemaDetector::default().validate(&payload, &workflow_run(), now());
        assert!(finding.is_clean());
    }

    #[test]
    fn test_unparsable_timestamp_is_soft() {
        let payload = json!({
            "id": 1, "name": "x", "status": "completed", "created_at": "last tuesday"
        });
        let finding = SchemaDetector::default().validate(&payload, &workflow_run(), now());
        assert!(!finding.has_hard_issue());
        assert!(finding.issues[0].message.contains("not a valid timestamp"));
    }

    #[test]
    fn test_unknown_enum_is_partial() {
        let payload = json!({
            "id": 1, "name": "x", "status": "teleported",
            "created_at": "2025-06-01T11:00:00Z"
        });
        let finding = SchemaDetector::default().validate(&payload, &workflow_run(), now());
        assert_eq!(finding.issues.len(), 1);
        assert!((finding.score - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_temporal_order() {
        let payload = json!({
            "id": 1, "name": "x", "status": "completed",
            "created_at": "2025-06-01T11:00:00Z",
            "updated_at": "2025-06-01T10:00:00Z"
        });
        let finding = SchemaDetector::default().validate(&payload, &workflow_run(), now());
        assert_eq!(finding.issues.len(), 1);
        assert!(finding.issues[0].message.contains("'updated_at' precedes 'created_at'"));
    }

    #[test]
    fn test_malformed_payload() {
        let finding = SchemaDetector::default().validate(&json!(42), &workflow_run(), now());
        assert_eq!(finding.score, 1.0);
        assert!(finding.has_hard_issue());
        assert!(finding.issues[0].message.contains("malformed payload"));
    }

    #[test]
    fn test_array_reports_worst_record() {
        let payload = json!([
            {"id": 1, "name": "a", "status": "completed", "created_at": "2025-06-01T11:00:00Z"},
            {"id": 2, "status": "completed", "created_at": "2025-06-01T11:00:00Z"}
        ]);
        let finding = SchemaDetector::default().validate(&payload, &workflow_run(), now());
        assert!((finding.score - 0.25).abs() < 1e-9);
        assert_eq!(finding.issues.len(), 1);
        assert!(finding.issues[0].message.starts_with("items[1]: "));
    }

    #[test]
    fn test_missing_collection_field() {
        let profile = ProfileRegistry::builtin().resolve("workflow_runs").clone();
        let finding = SchemaDetector::default().validate(&json!({"total_count": 3}), &profile, now());
        assert!(finding.has_hard_issue());
        assert!(finding.issues[0].message.contains("workflow_runs"));
    }

    #[test]
    fn test_generic_profile_is_minimal() {
        let profile = ResponseProfile::generic();
        let finding = SchemaDetector::default().validate(&json!({"id": "abc"}), &profile, now());
        assert!(finding.is_clean());
    }

    #[test]
    fn test_out_of_range_tolerance_does_not_panic() {
        let detector = SchemaDetector::new(SchemaConfig {
            future_tolerance_secs: 10_000_000_000_000,
            ..SchemaConfig::default()
        });
        let payload = json!({
            "id": 1,
            "name": "build",
            "status": "completed",
            "created_at": "2025-06-01T12:01:00Z"
        });

        let finding = detector.validate(&payload, &workflow_run(), now());
        assert!(finding.issues[0].message.contains("clock-skew tolerance"));
        assert!(!finding.issues[0].hard);
        assert!(finding.issues.iter().any(|i| i.message.contains("in the future")));
    }

    #[test]
    fn test_compact_offset_is_a_valid_timestamp() {
        let payload = json!({
            "id": 1,
            "name": "build",
            "status": "completed",
            "created_at": "2025-06-01T10:00:00+0000",
            "updated_at": "2025-06-01T10:30Z"
        });
        let finding = SchemaDetector::default().validate(&payload, &workflow_run(), now());
        assert!(finding.is_clean(), "unexpected issues: {:?}", finding.issues);
    }
}
