//! Response profiles: the kind-specific view of what a payload should contain.
//!
//! A profile names the fields a response kind must carry and how they are
//! typed. Detectors never hard-code field names; they read them from the
//! profile resolved for the request. Unknown kinds resolve to a generic
//! profile with a minimal required set instead of failing.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Name of the fallback profile used for unknown kinds.
pub const GENERIC_KIND: &str = "generic";

const WORKFLOW_STATUSES: &[&str] = &[
    "queued",
    "in_progress",
    "completed",
    "waiting",
    "requested",
    "pending",
    "action_required",
];

const WORKFLOW_CONCLUSIONS: &[&str] = &[
    "success",
    "failure",
    "cancelled",
    "skipped",
    "timed_out",
    "action_required",
    "neutral",
    "stale",
    "startup_failure",
];

const PIPELINE_STATUSES: &[&str] = &[
    "created",
    "waiting_for_resource",
    "preparing",
    "pending",
    "running",
    "success",
    "failed",
    "canceled",
    "skipped",
    "manual",
    "scheduled",
];

/// Kind-specific expectations for a response payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseProfile {
    /// Response kind this profile applies to (e.g. "workflow_run")
    pub kind: String,

    /// Fields every record must carry (absent or null counts as missing)
    #[serde(default)]
    pub required_fields: Vec<String>,

    /// Fields that must hold JSON numbers when present
    #[serde(default)]
    pub numeric_fields: Vec<String>,

    /// Fields that must hold past timestamps when present
    #[serde(default)]
    pub temporal_fields: Vec<String>,

    /// Fields restricted to a known value set
    #[serde(default)]
    pub enum_fields: BTreeMap<String, Vec<String>>,

    /// Fields that together identify a record, for repetition checks
    #[serde(default)]
    pub identity_fields: Vec<String>,

    /// Low-cardinality fields checked for collapsed distributions
    #[serde(default)]
    pub categorical_fields: Vec<String>,

    /// Timestamp pairs where the first must not be later than the second
    #[serde(default)]
    pub temporal_order: Vec<(String, String)>,

    /// Array field holding the records when the payload is a wrapper object
    #[serde(default)]
    pub collection_field: Option<String>,

    /// Volume threshold override; falls back to the behavior config
    #[serde(default)]
    pub max_items: Option<usize>,
}

impl ResponseProfile {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            required_fields: Vec::new(),
            numeric_fields: Vec::new(),
            temporal_fields: Vec::new(),
            enum_fields: BTreeMap::new(),
            identity_fields: Vec::new(),
            categorical_fields: Vec::new(),
            temporal_order: Vec::new(),
            collection_field: None,
            max_items: None,
        }
    }

    pub fn required(mut self, fields: &[&str]) -> Self {
        self.required_fields = to_strings(fields);
        self
    }

    pub fn numeric(mut self, fields: &[&str]) -> Self {
        self.numeric_fields = to_strings(fields);
        self
    }

    pub fn temporal(mut self, fields: &[&str]) -> Self {
        self.temporal_fields = to_strings(fields);
        self
    }

    pub fn enumerated(mut self, field: &str, values: &[&str]) -> Self {
        self.enum_fields.insert(field.to_string(), to_strings(values));
        self
    }

    pub fn identity(mut self, fields: &[&str]) -> Self {
        self.identity_fields = to_strings(fields);
        self
    }

    pub fn categorical(mut self, fields: &[&str]) -> Self {
        self.categorical_fields = to_strings(fields);
        self
    }

    pub fn ordered(mut self, earlier: &str, later: &str) -> Self {
        self.temporal_order
            .push((earlier.to_string(), later.to_string()));
        self
    }

    pub fn collection(mut self, field: &str) -> Self {
        self.collection_field = Some(field.to_string());
        self
    }

    pub fn max_items(mut self, max: usize) -> Self {
        self.max_items = Some(max);
        self
    }

    /// The profile that applies to a single record of this kind.
    ///
    /// For wrapper kinds such as `workflow_runs` this drops the collection
    /// field so each element can be validated on its own.
    pub fn item_profile(&self) -> Cow<'_, ResponseProfile> {
        if self.collection_field.is_none() {
            Cow::Borrowed(self)
        } else {
            let mut item = self.clone();
            item.collection_field = None;
            Cow::Owned(item)
        }
    }

    /// Minimal profile for kinds nobody declared.
    pub fn generic() -> Self {
        Self::new(GENERIC_KIND)
            .required(&["id"])
            .temporal(&["created_at", "updated_at", "started_at", "completed_at"])
            .identity(&["id"])
            .categorical(&["status", "conclusion"])
            .ordered("created_at", "updated_at")
    }

    fn workflow_run(kind: &str) -> Self {
        Self::new(kind)
            .required(&["id", "name", "status", "created_at"])
            .numeric(&["id", "run_number", "run_attempt", "workflow_id"])
            .temporal(&["created_at", "updated_at", "run_started_at"])
            .enumerated("status", WORKFLOW_STATUSES)
            .enumerated("conclusion", WORKFLOW_CONCLUSIONS)
            .identity(&["name", "head_sha", "run_number"])
            .categorical(&["status", "conclusion"])
            .ordered("created_at", "updated_at")
    }

    /// Profiles shipped with the crate.
    pub fn builtin() -> Vec<ResponseProfile> {
        vec![
            Self::workflow_run("workflow_run"),
            Self::workflow_run("workflow_runs").collection("workflow_runs"),
            Self::new("job")
                .required(&["id", "name", "status", "started_at"])
                .numeric(&["id", "run_id", "run_attempt"])
                .temporal(&["started_at", "completed_at", "created_at"])
                .enumerated("status", WORKFLOW_STATUSES)
                .enumerated("conclusion", WORKFLOW_CONCLUSIONS)
                .identity(&["name", "run_id", "run_attempt"])
                .categorical(&["status", "conclusion"])
                .ordered("started_at", "completed_at"),
            Self::new("pipeline")
                .required(&["id", "status", "ref", "created_at"])
                .numeric(&["id", "iid", "project_id"])
                .temporal(&["created_at", "updated_at", "started_at", "finished_at"])
                .enumerated("status", PIPELINE_STATUSES)
                .identity(&["sha", "ref", "iid"])
                .categorical(&["status", "source"])
                .ordered("created_at", "updated_at")
                .ordered("started_at", "finished_at"),
            Self::new("deployment")
                .required(&["id", "environment", "created_at"])
                .numeric(&["id"])
                .temporal(&["created_at", "updated_at"])
                .identity(&["sha", "environment", "ref"])
                .categorical(&["environment"])
                .ordered("created_at", "updated_at"),
            Self::new("repository")
                .required(&["id", "name", "full_name", "created_at"])
                .numeric(&["id", "stargazers_count", "forks_count", "open_issues_count"])
                .temporal(&["created_at", "updated_at", "pushed_at"])
                .enumerated("visibility", &["public", "private", "internal"])
                .identity(&["full_name"])
                .ordered("created_at", "updated_at"),
            Self::new("release")
                .required(&["id", "tag_name", "created_at"])
                .numeric(&["id"])
                .temporal(&["created_at", "published_at"])
                .identity(&["tag_name"])
                .ordered("created_at", "published_at"),
        ]
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Normalize a kind name: trimmed, lowercase, `-` and spaces as `_`.
pub fn normalize_kind(kind: &str) -> String {
    kind.trim()
        .to_ascii_lowercase()
        .replace(['-', ' '], "_")
}

/// Lookup table from response kind to profile.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, ResponseProfile>,
    fallback: ResponseProfile,
}

impl ProfileRegistry {
    /// Registry holding only the generic fallback.
    pub fn empty() -> Self {
        Self {
            profiles: BTreeMap::new(),
            fallback: ResponseProfile::generic(),
        }
    }

    /// Registry holding the built-in profiles.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for profile in ResponseProfile::builtin() {
            registry.register(profile);
        }
        registry
    }

    /// Add or replace a profile. Registering `generic` replaces the fallback.
    pub fn register(&mut self, mut profile: ResponseProfile) {
        let key = normalize_kind(&profile.kind);
        profile.kind = key.clone();
        if key == GENERIC_KIND {
            self.fallback = profile;
        } else {
            self.profiles.insert(key, profile);
        }
    }

    pub fn get(&self, kind: &str) -> Option<&ResponseProfile> {
        self.profiles.get(&normalize_kind(kind))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.get(kind).is_some()
    }

    /// Resolve a kind, falling back to the generic profile.
    pub fn resolve(&self, kind: &str) -> &ResponseProfile {
        match self.get(kind) {
            Some(profile) => profile,
            None => {
                tracing::warn!(kind = %kind, "Unknown response kind, using generic profile");
                &self.fallback
            }
        }
    }

    pub fn fallback(&self) -> &ResponseProfile {
        &self.fallback
    }

    /// Registered kinds in sorted order (excluding the fallback).
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
