//! The three detectors that score a payload.
//!
//! Each detector answers one question about a payload and reports a
//! suspicion score in [0, 1] plus the issues that produced it:
//!
//! | Detector | Question |
//! |----------|----------|
//! | [`SchemaDetector`] | Does every record carry the declared fields, types and values? |
//! | [`FeatureAnomalyDetector`] | Do the values themselves look fabricated or stale? |
//! | [`BehavioralAnalyzer`] | Does the response as a whole behave like a real one? |
//!
//! Detectors are independent: none sees another's findings.

pub mod behavioral;
pub mod feature;
pub mod patterns;
pub mod schema;

pub use behavioral::BehavioralAnalyzer;
pub use feature::{Feature, FeatureAnomalyDetector};
pub use schema::SchemaDetector;

use serde_json::{Map, Value};

use crate::profile::ResponseProfile;
use crate::types::{DetectorFinding, IssueSource, ValidationRequest};

/// Trait implemented by all detectors.
pub trait Detector: Send + Sync {
    /// The detector's issue source tag.
    fn source(&self) -> IssueSource;

    /// Inspect a payload and report suspicion.
    ///
    /// Must not panic on any payload shape; anything that cannot be
    /// evaluated becomes a bounded suspicion increment plus an issue.
    fn inspect(&self, request: &ValidationRequest<'_>) -> DetectorFinding;
}

/// The records a payload carries, per the profile's view of its shape.
#[derive(Debug)]
pub(crate) struct RecordSet<'a> {
    /// Records in payload order; `None` marks a non-object element.
    pub records: Vec<Option<&'a Map<String, Value>>>,

    /// Whether issue text should name record positions.
    pub indexed: bool,

    /// The profile declares a collection field the payload lacks.
    pub missing_collection: bool,
}

impl<'a> RecordSet<'a> {
    /// Split a payload into records.
    ///
    /// Returns `None` for payloads with no recognizable shape (null or a
    /// bare scalar).
    pub fn from_payload(payload: &'a Value, profile: &ResponseProfile) -> Option<Self> {
        match payload {
            Value::Array(items) => Some(Self::indexed(items)),
            Value::Object(map) => match profile.collection_field.as_deref() {
                Some(field) => match map.get(field) {
                    Some(Value::Array(items)) => Some(Self::indexed(items)),
                    _ => Some(Self {
                        records: Vec::new(),
                        indexed: true,
                        missing_collection: true,
                    }),
                },
                None => Some(Self {
                    records: vec![Some(map)],
                    indexed: false,
                    missing_collection: false,
                }),
            },
            _ => None,
        }
    }

    fn indexed(items: &'a [Value]) -> Self {
        Self {
            records: items.iter().map(Value::as_object).collect(),
            indexed: true,
            missing_collection: false,
        }
    }

    /// Object records only.
    pub fn objects(&self) -> impl Iterator<Item = &'a Map<String, Value>> + '_ {
        self.records.iter().filter_map(|r| *r)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Issue text for the record at `index`.
    pub fn locate(&self, index: usize, message: &str) -> String {
        if self.indexed {
            format!("items[{}]: {}", index, message)
        } else {
            message.to_string()
        }
    }
}

/// A field is missing if absent or explicitly null.
pub(crate) fn field_present<'a>(record: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    record.get(field).filter(|v| !v.is_null())
}

/// Join a child key onto a JSON path.
pub(crate) fn child_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

/// Join an array index onto a JSON path.
pub(crate) fn index_path(parent: &str, index: usize) -> String {
    if parent.is_empty() {
        format!("items[{}]", index)
    } else {
        format!("{}[{}]", parent, index)
    }
}
