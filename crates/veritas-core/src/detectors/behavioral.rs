//! Behavioral Analyzer
//!
//! **Question**: Does the response as a whole behave like a real one?
//!
//! Heuristics are independent and additive, capped at 1.0:
//! - **Timing**: answers that arrive implausibly fast (cached or synthesized)
//!   or implausibly slow.
//! - **Volume**: more records than the profile expects.
//! - **Repetition**: several records sharing the same identity.
//! - **Distribution**: a categorical field collapsed to a single value
//!   across many records.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::BehaviorConfig;
use crate::profile::ResponseProfile;
use crate::types::{DetectorFinding, IssueSource, ResponseContext, ValidationRequest};

use super::{field_present, Detector, RecordSet};

/// Timing, volume, repetition and distribution heuristics.
#[derive(Debug, Clone, Default)]
pub struct BehavioralAnalyzer {
    config: BehaviorConfig,
}

impl BehavioralAnalyzer {
    pub fn new(config: BehaviorConfig) -> Self {
        Self { config }
    }

    /// Analyze a payload in its calling context.
    pub fn analyze(
        &self,
        payload: &Value,
        profile: &ResponseProfile,
        context: &ResponseContext,
    ) -> DetectorFinding {
        let records = RecordSet::from_payload(payload, profile)
            .map(|set| set.records)
            .unwrap_or_default();
        self.analyze_records(&records, profile, context)
    }

    /// Analyze an already-split set of records.
    pub fn analyze_records(
        &self,
        records: &[Option<&Map<String, Value>>],
        profile: &ResponseProfile,
        context: &ResponseContext,
    ) -> DetectorFinding {
        let mut finding = DetectorFinding::empty(IssueSource::Behavioral);

        self.check_timing(context, &mut finding);
        self.check_volume(records.len(), profile, &mut finding);

        let objects: Vec<&Map<String, Value>> = records.iter().filter_map(|r| *r).collect();
        self.check_repetition(&objects, profile, &mut finding);
        self.check_distribution(&objects, profile, &mut finding);

        tracing::debug!(
            detector = "behavioral",
            items = records.len(),
            score = finding.score,
            issues = finding.issues.len(),
            "Behavioral analysis complete"
        );
        finding
    }

    fn check_timing(&self, context: &ResponseContext, finding: &mut DetectorFinding) {
        let Some(millis) = context.response_time else {
            return;
        };

        if millis < self.config.fast_response_ms {
            finding.flag(
                self.config.fast_weight,
                format!(
                    "suspiciously fast response: {}ms (< {}ms)",
                    millis, self.config.fast_response_ms
                ),
            );
        } else if millis > self.config.slow_response_ms {
            finding.flag(
                self.config.slow_weight,
                format!(
                    "suspiciously slow response: {}ms (> {}ms)",
                    millis, self.config.slow_response_ms
                ),
            );
        }
    }

    fn check_volume(&self, count: usize, profile: &ResponseProfile, finding: &mut DetectorFinding) {
        let limit = profile.max_items.unwrap_or(self.config.max_items);
        if count > limit {
            finding.flag(
                self.config.volume_weight,
                format!("large response volume: {} items (> {})", count, limit),
            );
        }
    }

    /// Fire when enough records share one identity signature.
    ///
    /// Records carrying none of the identity fields are skipped so sparse
    /// payloads do not collapse into one empty signature.
    fn check_repetition(
        &self,
        records: &[&Map<String, Value>],
        profile: &ResponseProfile,
        finding: &mut DetectorFinding,
    ) {
        if profile.identity_fields.is_empty() || records.len() < self.config.repetition_threshold {
            return;
        }

        let mut groups: BTreeMap<String, usize> = BTreeMap::new();
        for record in records {
            let parts: Vec<Option<&Value>> = profile
                .identity_fields
                .iter()
                .map(|field| field_present(record, field))
                .collect();
            if parts.iter().all(Option::is_none) {
                continue;
            }

            let signature = parts
                .iter()
                .map(|p| p.map(Value::to_string).unwrap_or_default())
                .collect::<Vec<_>>()
                .join("\u{1f}");
            *groups.entry(signature).or_insert(0) += 1;
        }

        let largest = groups.values().copied().max().unwrap_or(0);
        if largest >= self.config.repetition_threshold {
            finding.flag(
                self.config.repetition_weight,
                format!(
                    "repetitive patterns: {} items share the same {}",
                    largest,
                    profile.identity_fields.join("/")
                ),
            );
        }
    }

    fn check_distribution(
        &self,
        records: &[&Map<String, Value>],
        profile: &ResponseProfile,
        finding: &mut DetectorFinding,
    ) {
        let mut collapsed = Vec::new();

        for field in &profile.categorical_fields {
            let values: Vec<&Value> = records
                .iter()
                .filter_map(|record| field_present(record, field))
                .collect();
            if values.len() < self.config.distribution_min_items {
                continue;
            }

            let distinct: BTreeSet<String> = values.iter().map(|v| v.to_string()).collect();
            if distinct.len() == 1 {
                let only = distinct.iter().next().cloned().unwrap_or_default();
                collapsed.push(format!("{}={} across {} items", field, only, values.len()));
            }
        }

        if !collapsed.is_empty() {
            finding.flag(
                self.config.distribution_weight,
                format!("unrealistic distribution: {}", collapsed.join(", ")),
            );
        }
    }
}

impl Detector for BehavioralAnalyzer {
    fn source(&self) -> IssueSource {
        IssueSource::Behavioral
    }

    fn inspect(&self, request: &ValidationRequest<'_>) -> DetectorFinding {
        self.analyze(request.payload, request.profile, request.context)
    }
}
