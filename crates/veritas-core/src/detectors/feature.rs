//! Feature Anomaly Detector
//!
//! **Question**: Do the values themselves look fabricated or stale?
//!
//! Every value in the payload is classified into a [`Feature`] and handed to
//! the extractor for its shape. Extracted features feed a fixed set of
//! heuristics; each heuristic contributes its weight once per payload, with
//! one issue listing every path where it fired.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::config::{FeatureConfig, FeatureWeights};
use crate::profile::ResponseProfile;
use crate::types::{DetectorFinding, IssueSource, ValidationRequest};

use super::patterns::{contains_placeholder, future_horizon, is_timestamp_shaped, parse_timestamp};
use super::{child_path, field_present, index_path, Detector, RecordSet};

/// Paths listed per issue before the rest are summarized.
const MAX_LISTED_PATHS: usize = 5;

/// A payload value, tagged by the shape its features are extracted from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Feature<'a> {
    Text(&'a str),
    Number(f64),
    /// A timestamp-shaped string, parsable or not
    Temporal(&'a str),
    Structural(&'a Map<String, Value>),
    List(&'a [Value]),
    /// Null or boolean; nothing to extract
    Absent,
}

impl<'a> Feature<'a> {
    pub fn classify(value: &'a Value) -> Self {
        match value {
            Value::String(s) if is_timestamp_shaped(s) => Feature::Temporal(s),
            Value::String(s) => Feature::Text(s),
            Value::Number(n) => n.as_f64().map(Feature::Number).unwrap_or(Feature::Absent),
            Value::Object(map) => Feature::Structural(map),
            Value::Array(items) => Feature::List(items),
            Value::Null | Value::Bool(_) => Feature::Absent,
        }
    }
}

/// Features of a string value.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFeatures {
    pub length: usize,
    pub word_count: usize,
    pub unique_ratio: f64,
    pub letters: usize,
    pub uppercase_ratio: f64,
    /// Non-whitespace characters
    pub visible_chars: usize,
    pub digit_ratio: f64,
    /// Longest run of one word repeated back to back
    pub longest_run: usize,
    pub placeholder: bool,
}

impl TextFeatures {
    pub fn extract(text: &str) -> Self {
        let words: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();
        let unique = words.iter().collect::<std::collections::BTreeSet<_>>().len();

        let letters = text.chars().filter(|c| c.is_alphabetic()).count();
        let uppercase = text.chars().filter(|c| c.is_uppercase()).count();
        let visible_chars = text.chars().filter(|c| !c.is_whitespace()).count();
        let digits = text.chars().filter(|c| c.is_ascii_digit()).count();

        let mut longest_run = usize::from(!words.is_empty());
        let mut run = longest_run;
        for pair in words.windows(2) {
            run = if pair[0] == pair[1] { run + 1 } else { 1 };
            longest_run = longest_run.max(run);
        }

        Self {
            length: text.chars().count(),
            word_count: words.len(),
            unique_ratio: ratio(unique, words.len()),
            letters,
            uppercase_ratio: ratio(uppercase, letters),
            visible_chars,
            digit_ratio: ratio(digits, visible_chars),
            longest_run,
            placeholder: contains_placeholder(text),
        }
    }

    /// Prose rather than a code, slug or hash.
    pub fn is_free_text(&self) -> bool {
        self.word_count >= 2
    }
}

/// Features of a numeric value. Context for structural rules only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericFeatures {
    pub value: f64,
    pub is_zero: bool,
    pub is_negative: bool,
    /// Order of magnitude; 0 for zero
    pub magnitude: i32,
}

impl NumericFeatures {
    pub fn extract(value: f64) -> Self {
        let magnitude = if value == 0.0 || !value.is_finite() {
            0
        } else {
            value.abs().log10().floor() as i32
        };
        Self {
            value,
            is_zero: value == 0.0,
            is_negative: value < 0.0,
            magnitude,
        }
    }
}

/// Features of a timestamp-shaped string, judged at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemporalFeatures {
    pub parsed: Option<DateTime<Utc>>,
    pub is_future: bool,
    pub is_ancient: bool,
}

impl TemporalFeatures {
    pub fn extract(raw: &str, now: DateTime<Utc>, config: &FeatureConfig) -> Self {
        let parsed = parse_timestamp(raw);
        let horizon = future_horizon(now, config.future_tolerance_secs).unwrap_or(now);
        Self {
            parsed,
            is_future: parsed.is_some_and(|ts| ts > horizon),
            is_ancient: parsed.is_some_and(|ts| ts < config.oldest_plausible),
        }
    }
}

/// Features of an object.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralFeatures {
    pub field_count: usize,
    pub nested_depth: usize,
    /// Declared required fields absent or null; empty unless the object is a record
    pub missing_required: Vec<String>,
    pub numeric_fields: usize,
    pub zeroed_fields: usize,
    /// Identifier-like keys holding negative numbers
    pub negative_identifiers: Vec<String>,
}

impl StructuralFeatures {
    pub fn extract(map: &Map<String, Value>, required: Option<&[String]>) -> Self {
        let numbers: Vec<(&String, NumericFeatures)> = map
            .iter()
            .filter_map(|(key, value)| {
                value
                    .as_f64()
                    .map(|n| (key, NumericFeatures::extract(n)))
            })
            .collect();

        let missing_required = required
            .unwrap_or_default()
            .iter()
            .filter(|field| field_present(map, field).is_none())
            .cloned()
            .collect();

        Self {
            field_count: map.len(),
            nested_depth: depth_of(map.values()),
            missing_required,
            numeric_fields: numbers.len(),
            zeroed_fields: numbers.iter().filter(|(_, n)| n.is_zero).count(),
            negative_identifiers: numbers
                .iter()
                .filter(|(key, n)| n.is_negative && is_identifier_key(key))
                .map(|(key, _)| key.to_string())
                .collect(),
        }
    }
}

/// Heuristics the detector can fire, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Heuristic {
    FutureTimestamp,
    UnparsableTimestamp,
    AncientTimestamp,
    MissingFields,
    EmptyRecord,
    ExcessiveNesting,
    ZeroedNumbers,
    NegativeIdentifier,
    PlaceholderText,
    LowVocabulary,
    StutteringText,
    ShoutingText,
    DigitHeavyText,
}

impl Heuristic {
    fn weight(self, weights: &FeatureWeights) -> f64 {
        match self {
            Heuristic::FutureTimestamp => weights.future_timestamp,
            Heuristic::UnparsableTimestamp => weights.unparsable_timestamp,
            Heuristic::AncientTimestamp => weights.ancient_timestamp,
            Heuristic::MissingFields => weights.missing_fields,
            Heuristic::EmptyRecord => weights.empty_record,
            Heuristic::ExcessiveNesting => weights.excessive_nesting,
            Heuristic::ZeroedNumbers => weights.zeroed_numbers,
            Heuristic::NegativeIdentifier => weights.negative_identifier,
            Heuristic::PlaceholderText => weights.placeholder_text,
            Heuristic::LowVocabulary => weights.low_vocabulary,
            Heuristic::StutteringText => weights.stuttering_text,
            Heuristic::ShoutingText => weights.shouting_text,
            Heuristic::DigitHeavyText => weights.digit_heavy_text,
        }
    }
}

impl fmt::Display for Heuristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Heuristic::FutureTimestamp => "future timestamp",
            Heuristic::UnparsableTimestamp => "unparsable timestamp",
            Heuristic::AncientTimestamp => "implausibly old timestamp",
            Heuristic::MissingFields => "multiple required fields missing",
            Heuristic::EmptyRecord => "empty record",
            Heuristic::ExcessiveNesting => "excessive nesting",
            Heuristic::ZeroedNumbers => "zeroed numeric fields",
            Heuristic::NegativeIdentifier => "negative identifier or counter",
            Heuristic::PlaceholderText => "placeholder text",
            Heuristic::LowVocabulary => "low vocabulary diversity",
            Heuristic::StutteringText => "stuttering text",
            Heuristic::ShoutingText => "shouting text",
            Heuristic::DigitHeavyText => "digit-heavy text",
        };
        f.write_str(label)
    }
}

/// Type-dispatched feature extraction and scoring.
#[derive(Debug, Clone, Default)]
pub struct FeatureAnomalyDetector {
    config: FeatureConfig,
}

impl FeatureAnomalyDetector {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Score every value in `payload`.
    pub fn detect(
        &self,
        payload: &Value,
        profile: &ResponseProfile,
        now: DateTime<Utc>,
    ) -> DetectorFinding {
        let records: HashSet<*const Map<String, Value>> = RecordSet::from_payload(payload, profile)
            .map(|set| set.objects().map(|r| r as *const Map<String, Value>).collect())
            .unwrap_or_default();

        let mut walk = Walk {
            config: &self.config,
            required: &profile.required_fields,
            records: &records,
            now,
            hits: BTreeMap::new(),
        };
        walk.visit(payload, "");

        let mut finding = DetectorFinding::empty(IssueSource::Feature);
        for (heuristic, paths) in &walk.hits {
            finding.flag(
                heuristic.weight(&self.config.weights),
                format!("{} at {}", heuristic, summarize(paths)),
            );
        }

        tracing::debug!(
            detector = "feature",
            heuristics = walk.hits.len(),
            score = finding.score,
            "Feature analysis complete"
        );
        finding
    }
}

impl Detector for FeatureAnomalyDetector {
    fn source(&self) -> IssueSource {
        IssueSource::Feature
    }

    fn inspect(&self, request: &ValidationRequest<'_>) -> DetectorFinding {
        self.detect(request.payload, request.profile, request.now)
    }
}

/// One traversal of a payload, collecting the paths each heuristic fired at.
struct Walk<'a> {
    config: &'a FeatureConfig,
    required: &'a [String],
    /// Identity of the objects that are records
    records: &'a HashSet<*const Map<String, Value>>,
    now: DateTime<Utc>,
    hits: BTreeMap<Heuristic, Vec<String>>,
}

impl Walk<'_> {
    fn hit(&mut self, heuristic: Heuristic, path: &str) {
        let path = if path.is_empty() { "$" } else { path };
        self.hits.entry(heuristic).or_default().push(path.to_string());
    }

    fn visit(&mut self, value: &Value, path: &str) {
        match Feature::classify(value) {
            Feature::Text(text) => self.text(text, path),
            Feature::Temporal(raw) => self.temporal(raw, path),
            Feature::Structural(map) => self.structural(map, path),
            Feature::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.visit(item, &index_path(path, i));
                }
            }
            // Numbers are judged in the context of their enclosing object.
            Feature::Number(_) | Feature::Absent => {}
        }
    }

    fn text(&mut self, text: &str, path: &str) {
        let f = TextFeatures::extract(text);
        let c = self.config;

        if f.placeholder {
            self.hit(Heuristic::PlaceholderText, path);
        }
        if f.word_count >= c.min_words_for_diversity && f.unique_ratio < c.min_unique_word_ratio {
            self.hit(Heuristic::LowVocabulary, path);
        }
        if c.stutter_run > 1 && f.longest_run >= c.stutter_run {
            self.hit(Heuristic::StutteringText, path);
        }
        if !f.is_free_text() {
            return;
        }
        if f.letters >= c.shouting_min_letters && f.uppercase_ratio > c.shouting_ratio {
            self.hit(Heuristic::ShoutingText, path);
        }
        if f.visible_chars >= c.digit_min_chars && f.digit_ratio > c.digit_ratio {
            self.hit(Heuristic::DigitHeavyText, path);
        }
    }

    fn temporal(&mut self, raw: &str, path: &str) {
        let f = TemporalFeatures::extract(raw, self.now, self.config);
        if f.parsed.is_none() {
            self.hit(Heuristic::UnparsableTimestamp, path);
        } else if f.is_future {
            self.hit(Heuristic::FutureTimestamp, path);
        } else if f.is_ancient {
            self.hit(Heuristic::AncientTimestamp, path);
        }
    }

    fn structural(&mut self, map: &Map<String, Value>, path: &str) {
        let is_record = self.records.contains(&(map as *const Map<String, Value>));
        let required = is_record.then_some(self.required);
        let f = StructuralFeatures::extract(map, required);
        let c = self.config;

        if is_record {
            if f.field_count == 0 {
                self.hit(Heuristic::EmptyRecord, path);
            } else if f.missing_required.len() >= c.missing_fields_threshold {
                let label = if path.is_empty() { "$" } else { path };
                self.hits
                    .entry(Heuristic::MissingFields)
                    .or_default()
                    .push(format!("{} ({})", label, f.missing_required.join(", ")));
            }
            if f.nested_depth > c.max_nesting_depth {
                self.hit(Heuristic::ExcessiveNesting, path);
            }
        }

        if f.numeric_fields >= c.zeroed_numbers_min && f.zeroed_fields == f.numeric_fields {
            self.hit(Heuristic::ZeroedNumbers, path);
        }
        for key in &f.negative_identifiers {
            self.hit(Heuristic::NegativeIdentifier, &child_path(path, key));
        }

        for (key, child) in map {
            self.visit(child, &child_path(path, key));
        }
    }
}

/// Depth of the deepest container below a set of values.
fn depth_of<'a>(values: impl Iterator<Item = &'a Value>) -> usize {
    1 + values
        .map(|value| match value {
            Value::Object(map) => depth_of(map.values()),
            Value::Array(items) => depth_of(items.iter()),
            _ => 0,
        })
        .max()
        .unwrap_or(0)
}

/// `id`, `*_id`, `*_number` and `*_count` keys.
fn is_identifier_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key == "id" || key.ends_with("_id") || key.ends_with("_number") || key.ends_with("_count")
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn summarize(paths: &[String]) -> String {
    if paths.len() <= MAX_LISTED_PATHS {
        return paths.join(", ");
    }
    format!(
        "{} (+{} more)",
        paths[..MAX_LISTED_PATHS].join(", "),
        paths.len() - MAX_LISTED_PATHS
    )
}
