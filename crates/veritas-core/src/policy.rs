//! Adaptive strictness.
//!
//! The policy keeps a bounded window of recent results and moves the
//! validation level along it: sustained success relaxes strictness, sustained
//! failure escalates it. Caller overrides always win.

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::config::AdaptationConfig;
use crate::types::{ResponseContext, ValidationLevel, ValidationResult};

/// History window plus the adaptation rules that read it.
///
/// Not synchronized; [`AdaptiveStrictnessPolicy`] owns the lock.
#[derive(Debug, Clone)]
pub struct PolicyState {
    config: AdaptationConfig,
    window: VecDeque<ValidationResult>,
}

impl PolicyState {
    pub fn new(config: AdaptationConfig) -> Self {
        let capacity = config.history_capacity.max(1);
        Self {
            config,
            window: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a result, evicting the oldest beyond capacity.
    pub fn record(&mut self, result: ValidationResult) {
        let capacity = self.capacity();
        while self.window.len() >= capacity {
            self.window.pop_front();
        }
        self.window.push_back(result);
    }

    /// Effective level for a request.
    ///
    /// Precedence: critical operation, then high performance, then history.
    pub fn adapt(&self, requested: ValidationLevel, context: &ResponseContext) -> ValidationLevel {
        if context.critical_operation {
            return ValidationLevel::Paranoid;
        }
        if context.high_performance {
            return ValidationLevel::Basic;
        }
        if self.window.len() < self.config.min_history {
            return requested;
        }

        let rate = self.recent_success_rate().unwrap_or(1.0);
        let effective = if rate >= self.config.relax_at {
            self.config.relaxed_level
        } else if rate <= self.config.escalate_at {
            self.config.escalated_level
        } else {
            requested
        };

        if effective != requested {
            tracing::info!(
                requested = %requested,
                effective = %effective,
                success_rate = rate,
                "Validation level adapted from history"
            );
        }
        effective
    }

    /// Valid fraction over the most recent window; `None` when empty.
    pub fn recent_success_rate(&self) -> Option<f64> {
        let take = self.config.recent_window.min(self.window.len());
        if take == 0 {
            return None;
        }
        let valid = self
            .window
            .iter()
            .rev()
            .take(take)
            .filter(|r| r.is_valid())
            .count();
        Some(valid as f64 / take as f64)
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.config.history_capacity.max(1)
    }

    /// Results oldest first.
    pub fn history(&self) -> impl Iterator<Item = &ValidationResult> {
        self.window.iter()
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }

    pub fn snapshot(&self) -> PolicySnapshot {
        PolicySnapshot {
            history_len: self.len(),
            capacity: self.capacity(),
            recent_success_rate: self.recent_success_rate(),
        }
    }
}

impl Default for PolicyState {
    fn default() -> Self {
        Self::new(AdaptationConfig::default())
    }
}

/// Point-in-time view of the policy for telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub history_len: usize,
    pub capacity: usize,
    pub recent_success_rate: Option<f64>,
}

/// Thread-safe strictness policy shared by an orchestrator.
#[derive(Debug, Default)]
pub struct AdaptiveStrictnessPolicy {
    state: Mutex<PolicyState>,
}

impl AdaptiveStrictnessPolicy {
    pub fn new(config: AdaptationConfig) -> Self {
        Self {
            state: Mutex::new(PolicyState::new(config)),
        }
    }

    /// Hold the policy for a full adapt, validate, record sequence.
    pub fn lock(&self) -> MutexGuard<'_, PolicyState> {
        self.state.lock()
    }

    pub fn adapt(&self, requested: ValidationLevel, context: &ResponseContext) -> ValidationLevel {
        self.state.lock().adapt(requested, context)
    }

    pub fn record(&self, result: ValidationResult) {
        self.state.lock().record(result);
    }

    pub fn snapshot(&self) -> PolicySnapshot {
        self.state.lock().snapshot()
    }

    /// Forget all history.
    pub fn clear(&self) {
        self.state.lock().clear();
        tracing::debug!("Validation history cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn result(valid: bool) -> ValidationResult {
        ValidationResult::new(
            valid,
            if valid { 0.9 } else { 0.1 },
            Vec::new(),
            BTreeMap::new(),
            ValidationLevel::Standard,
        )
    }

    fn filled(outcomes: impl IntoIterator<Item = bool>) -> PolicyState {
        let mut state = PolicyState::default();
        for valid in outcomes {
            state.record(result(valid));
        }
        state
    }

    #[test]
    fn test_short_history_keeps_requested() {
        let state = filled([true; 9]);
        let ctx = ResponseContext::new();
        assert_eq!(state.adapt(ValidationLevel::Strict, &ctx), ValidationLevel::Strict);
    }

    #[test]
    fn test_sustained_success_relaxes() {
        let state = filled([true; 10]);
        let ctx = ResponseContext::new();
        assert_eq!(state.adapt(ValidationLevel::Strict, &ctx), ValidationLevel::Basic);
    }

    #[test]
    fn test_sustained_failure_escalates() {
        let state = filled([false; 10]);
        let ctx = ResponseContext::new();
        assert_eq!(state.adapt(ValidationLevel::Basic, &ctx), ValidationLevel::Paranoid);
    }

    #[test]
    fn test_middle_band_keeps_requested() {
        let state = filled((0..10).map(|i| i % 10 < 7));
        assert_eq!(state.recent_success_rate(), Some(0.7));
        let ctx = ResponseContext::new();
        assert_eq!(state.adapt(ValidationLevel::Strict, &ctx), ValidationLevel::Strict);
    }

    #[test]
    fn test_only_recent_window_counts() {
        let state = filled((0..30).map(|i| i < 20));
        assert_eq!(state.recent_success_rate(), Some(0.0));
        let ctx = ResponseContext::new();
        assert_eq!(state.adapt(ValidationLevel::Standard, &ctx), ValidationLevel::Paranoid);
    }

    #[test]
    fn test_override_precedence() {
        let state = filled([true; 10]);
        let both = ResponseContext::new().critical().high_performance();
        assert_eq!(state.adapt(ValidationLevel::Basic, &both), ValidationLevel::Paranoid);

        let fast = ResponseContext::new().high_performance();
        let failing = filled([false; 10]);
        assert_eq!(failing.adapt(ValidationLevel::Strict, &fast), ValidationLevel::Basic);
    }

    #[test]
    fn test_snapshot_and_clear() {
        let policy = AdaptiveStrictnessPolicy::default();
        assert_eq!(policy.snapshot().recent_success_rate, None);

        policy.record(result(true));
        policy.record(result(false));
        let snap = policy.snapshot();
        assert_eq!(snap.history_len, 2);
        assert_eq!(snap.capacity, 50);
        assert_eq!(snap.recent_success_rate, Some(0.5));

        policy.clear();
        assert_eq!(policy.snapshot().history_len, 0);
    }

    #[test]
    fn test_eviction_keeps_newest() {
        let mut state = filled([false; 50]);
        state.record(result(true));
        assert_eq!(state.len(), 50);
        assert!(state.history().last().unwrap().is_valid());
        assert_eq!(state.history().filter(|r| r.is_valid()).count(), 1);
    }

    proptest! {
        #[test]
        fn prop_window_never_exceeds_capacity(
            capacity in 1usize..64,
            outcomes in proptest::collection::vec(any::<bool>(), 0..200),
        ) {
            let mut state = PolicyState::new(AdaptationConfig {
                history_capacity: capacity,
                recent_window: capacity,
                ..AdaptationConfig::default()
            });
            for (i, valid) in outcomes.iter().enumerate() {
                state.record(result(*valid));
                prop_assert_eq!(state.len(), (i + 1).min(capacity));
            }
        }

        #[test]
        fn prop_success_rate_is_a_fraction(
            outcomes in proptest::collection::vec(any::<bool>(), 1..100),
        ) {
            let state = filled(outcomes);
            let rate = state.recent_success_rate().unwrap();
            prop_assert!((0.0..=1.0).contains(&rate));
        }
    }
}
