//! Tunable policy constants.
//!
//! Every threshold, weight and increment used by the detectors lives here
//! with its default. The defaults are starting points pending calibration
//! against real traffic, not correctness requirements.
//!
//! Configuration documents (YAML or JSON) are checked against an embedded
//! JSON Schema before deserialization, then semantically validated.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

use crate::profile::ResponseProfile;
use crate::types::ValidationLevel;

/// Embedded configuration schema (loaded at compile time).
const CONFIG_SCHEMA_JSON: &str = include_str!("../schema/validator-config.schema.json");

/// Compiled JSON Schema validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Largest clock skew a detector may tolerate, one day.
pub const MAX_FUTURE_TOLERANCE_SECS: i64 = 86_400;

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Config schema could not be loaded: {0}")]
    SchemaUnavailable(String),

    #[error("Config does not match schema: {}", .0.join("; "))]
    SchemaViolation(Vec<String>),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Relative weight of each detector in the combined suspicion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub schema: f64,
    pub feature: f64,
    pub behavior: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            schema: 0.5,
            feature: 0.3,
            behavior: 0.2,
        }
    }
}

/// Minimum confidence accepted at each level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelThresholds {
    pub basic: f64,
    pub standard: f64,
    pub strict: f64,
    pub paranoid: f64,
}

impl LevelThresholds {
    pub fn for_level(&self, level: ValidationLevel) -> f64 {
        match level {
            ValidationLevel::Basic => self.basic,
            ValidationLevel::Standard => self.standard,
            ValidationLevel::Strict => self.strict,
            ValidationLevel::Paranoid => self.paranoid,
        }
    }
}

impl Default for LevelThresholds {
    fn default() -> Self {
        Self {
            basic: 0.3,
            standard: 0.5,
            strict: 0.7,
            paranoid: 0.85,
        }
    }
}

/// Suspicion increments for structural checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub missing_field: f64,
    pub type_mismatch: f64,
    /// Numbers delivered as numeric strings ("42")
    pub numeric_string: f64,
    pub unparsable_timestamp: f64,
    pub future_timestamp: f64,
    pub unknown_enum_value: f64,
    pub temporal_order: f64,
    /// Clock skew tolerated before a timestamp counts as future, at most
    /// [`MAX_FUTURE_TOLERANCE_SECS`]
    pub future_tolerance_secs: i64,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            missing_field: 0.25,
            type_mismatch: 0.4,
            numeric_string: 0.1,
            unparsable_timestamp: 0.3,
            future_timestamp: 0.6,
            unknown_enum_value: 0.1,
            temporal_order: 0.3,
            future_tolerance_secs: 300,
        }
    }
}

/// Timing, volume and shape heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    pub fast_response_ms: f64,
    pub slow_response_ms: f64,
    /// Default volume threshold when a profile sets none
    pub max_items: usize,
    /// Near-duplicate group size that counts as repetition
    pub repetition_threshold: usize,
    /// Items carrying a categorical field before its spread is judged
    pub distribution_min_items: usize,

    pub fast_weight: f64,
    pub slow_weight: f64,
    pub volume_weight: f64,
    pub repetition_weight: f64,
    pub distribution_weight: f64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            fast_response_ms: 50.0,
            slow_response_ms: 10_000.0,
            max_items: 100,
            repetition_threshold: 4,
            distribution_min_items: 10,
            fast_weight: 0.3,
            slow_weight: 0.2,
            volume_weight: 0.2,
            repetition_weight: 0.3,
            distribution_weight: 0.2,
        }
    }
}

/// Weights for each feature heuristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureWeights {
    pub low_vocabulary: f64,
    pub placeholder_text: f64,
    pub stuttering_text: f64,
    pub shouting_text: f64,
    pub digit_heavy_text: f64,
    pub future_timestamp: f64,
    pub unparsable_timestamp: f64,
    pub ancient_timestamp: f64,
    pub missing_fields: f64,
    pub excessive_nesting: f64,
    pub empty_record: f64,
    pub zeroed_numbers: f64,
    pub negative_identifier: f64,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self {
            low_vocabulary: 0.2,
            placeholder_text: 0.3,
            stuttering_text: 0.2,
            shouting_text: 0.1,
            digit_heavy_text: 0.1,
            future_timestamp: 0.5,
            unparsable_timestamp: 0.2,
            ancient_timestamp: 0.2,
            missing_fields: 0.3,
            excessive_nesting: 0.2,
            empty_record: 0.3,
            zeroed_numbers: 0.2,
            negative_identifier: 0.2,
        }
    }
}

/// Feature-extraction thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub min_words_for_diversity: usize,
    pub min_unique_word_ratio: f64,
    /// Consecutive repeats of one word that count as stuttering
    pub stutter_run: usize,
    pub shouting_ratio: f64,
    pub shouting_min_letters: usize,
    pub digit_ratio: f64,
    pub digit_min_chars: usize,
    pub missing_fields_threshold: usize,
    pub max_nesting_depth: usize,
    pub zeroed_numbers_min: usize,
    /// Timestamps before this instant are treated as stale defaults
    pub oldest_plausible: DateTime<Utc>,
    /// Same bound as [`SchemaConfig::future_tolerance_secs`]
    pub future_tolerance_secs: i64,
    pub weights: FeatureWeights,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            min_words_for_diversity: 5,
            min_unique_word_ratio: 0.3,
            stutter_run: 3,
            shouting_ratio: 0.7,
            shouting_min_letters: 10,
            digit_ratio: 0.6,
            digit_min_chars: 8,
            missing_fields_threshold: 2,
            max_nesting_depth: 8,
            zeroed_numbers_min: 3,
            oldest_plausible: Utc
                .with_ymd_and_hms(2000, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
            future_tolerance_secs: 300,
            weights: FeatureWeights::default(),
        }
    }
}

/// Strictness adaptation policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptationConfig {
    /// Results kept in the history window
    pub history_capacity: usize,
    /// Results needed before adaptation kicks in
    pub min_history: usize,
    /// Most recent results the success rate is computed over
    pub recent_window: usize,
    /// Success rate at or above which strictness relaxes
    pub relax_at: f64,
    /// Success rate at or below which strictness escalates
    pub escalate_at: f64,
    pub relaxed_level: ValidationLevel,
    pub escalated_level: ValidationLevel,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            history_capacity: 50,
            min_history: 10,
            recent_window: 10,
            relax_at: 0.9,
            escalate_at: 0.5,
            relaxed_level: ValidationLevel::Basic,
            escalated_level: ValidationLevel::Paranoid,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Level requested when the caller does not name one
    pub default_level: ValidationLevel,
    /// Largest invalid fraction a batch may carry and still pass
    pub batch_tolerance: f64,
    pub weights: ScoreWeights,
    pub thresholds: LevelThresholds,
    pub schema: SchemaConfig,
    pub behavior: BehaviorConfig,
    pub feature: FeatureConfig,
    pub adaptation: AdaptationConfig,
    /// Extra or overriding response profiles
    pub profiles: Vec<ResponseProfile>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            default_level: ValidationLevel::Standard,
            batch_tolerance: 0.2,
            weights: ScoreWeights::default(),
            thresholds: LevelThresholds::default(),
            schema: SchemaConfig::default(),
            behavior: BehaviorConfig::default(),
            feature: FeatureConfig::default(),
            adaptation: AdaptationConfig::default(),
            profiles: Vec::new(),
        }
    }
}

impl ValidatorConfig {
    /// Parse a YAML configuration document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Self::from_value(serde_json::Value::Null);
        }
        let value: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Load a configuration file; `.json` files are parsed as JSON, anything
    /// else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
    }

    fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        // An empty YAML document parses as null; treat it as all defaults.
        let value = if value.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            value
        };

        validate_config_schema(&value).map_err(ConfigError::SchemaViolation)?;

        let config: ValidatorConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Check semantic constraints the schema cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let tolerances = [
            ("schema.future_tolerance_secs", self.schema.future_tolerance_secs),
            ("feature.future_tolerance_secs", self.feature.future_tolerance_secs),
        ];
        for (name, secs) in tolerances {
            if !(0..=MAX_FUTURE_TOLERANCE_SECS).contains(&secs) {
                return Err(ConfigError::Invalid(format!(
                    "{} must lie in [0, {}], got {}",
                    name, MAX_FUTURE_TOLERANCE_SECS, secs
                )));
            }
        }

        let weights = [
            ("weights.schema", self.weights.schema),
            ("weights.feature", self.weights.feature),
            ("weights.behavior", self.weights.behavior),
        ];
        for (name, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{} must be a non-negative number, got {}",
                    name, weight
                )));
            }
        }

        let thresholds = [
            self.thresholds.basic,
            self.thresholds.standard,
            self.thresholds.strict,
            self.thresholds.paranoid,
        ];
        if thresholds.iter().any(|t| !(0.0..=1.0).contains(t)) {
            return Err(ConfigError::Invalid(
                "thresholds must lie in [0, 1]".to_string(),
            ));
        }
        if thresholds.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(ConfigError::Invalid(
                "thresholds must not decrease from basic to paranoid".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.batch_tolerance) {
            return Err(ConfigError::Invalid(
                "batch_tolerance must lie in [0, 1]".to_string(),
            ));
        }

        let adaptation = &self.adaptation;
        if adaptation.history_capacity == 0 || adaptation.recent_window == 0 {
            return Err(ConfigError::Invalid(
                "adaptation.history_capacity and adaptation.recent_window must be positive"
                    .to_string(),
            ));
        }
        if adaptation.recent_window > adaptation.history_capacity {
            return Err(ConfigError::Invalid(format!(
                "adaptation.recent_window ({}) exceeds history_capacity ({})",
                adaptation.recent_window, adaptation.history_capacity
            )));
        }
        if adaptation.escalate_at >= adaptation.relax_at {
            return Err(ConfigError::Invalid(
                "adaptation.escalate_at must be below adaptation.relax_at".to_string(),
            ));
        }

        if self.behavior.fast_response_ms >= self.behavior.slow_response_ms {
            return Err(ConfigError::Invalid(
                "behavior.fast_response_ms must be below behavior.slow_response_ms".to_string(),
            ));
        }

        for profile in &self.profiles {
            if profile.kind.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "profiles must name a non-empty kind".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Get or initialize the compiled schema validator.
fn get_validator() -> Result<&'static jsonschema::Validator, ConfigError> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = match serde_json::from_str(CONFIG_SCHEMA_JSON) {
            Ok(v) => v,
            Err(e) => return Err(format!("Invalid schema JSON: {}", e)),
        };

        match jsonschema::options().build(&schema_value) {
            Ok(v) => Ok(v),
            Err(e) => Err(format!("Failed to compile schema: {}", e)),
        }
    });

    match result {
        Ok(v) => Ok(v),
        Err(e) => Err(ConfigError::SchemaUnavailable(e.clone())),
    }
}

/// Validate a configuration document against the embedded schema.
///
/// Returns every violation found, formatted as `"<error> at <path>"`.
pub fn validate_config_schema(config_json: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e.to_string()])?;

    let errors: Vec<String> = validator
        .iter_errors(config_json)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
