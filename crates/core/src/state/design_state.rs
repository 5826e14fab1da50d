//! # Shared Design State
//!
//! Versioned, single-owner mutable model of the evolving design. All
//! writers go through the update methods here; every committed mutation
//! bumps the version by exactly one, appends exactly one change record,
//! and pushes a notification to every subscriber.
//!
//! Update methods never panic across the API boundary: merges happen on a
//! copy that is swapped in only on success, and internal failures are
//! logged and reported as `false` with the prior state untouched.

use crate::model::{
    Change, Constraints, Decision, Design, DesignPatch, PropertyLock, ValidationResult,
};
use crate::state::history::{ChangeTrail, DEFAULT_CAPACITY};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Default advisory lock lifetime
pub const DEFAULT_LOCK_TTL_SECS: i64 = 300;

/// What kind of mutation a notification describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateEventKind {
    DesignUpdated,
    ConstraintsUpdated,
    DecisionRecorded,
    ValidationStored,
    PropertyLocked,
    PropertyUnlocked,
    Reset,
}

/// Notification pushed to subscribers after every committed mutation
#[derive(Debug, Clone, Serialize)]
pub struct StateEvent {
    pub kind: StateEventKind,
    pub agent: String,
    pub version: u64,
    pub property_path: Option<String>,
}

/// Immutable point-in-time view handed to agents and collaborators
#[derive(Debug, Clone, Serialize)]
pub struct DesignSnapshot {
    pub design: Design,
    pub constraints: Constraints,
    pub decisions: HashMap<String, Decision>,
    pub validation_results: HashMap<String, ValidationResult>,
    pub locks: HashMap<String, PropertyLock>,
    pub history: Vec<Change>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

type Subscriber = Box<dyn Fn(&StateEvent) + Send + Sync>;

/// The single-owner state record; use [`SharedDesignState`] to share it
pub struct DesignState {
    design: Design,
    constraints: Constraints,
    decisions: HashMap<String, Decision>,
    validation_results: HashMap<String, ValidationResult>,
    locks: HashMap<String, PropertyLock>,
    trail: ChangeTrail,
    version: u64,
    created_at: DateTime<Utc>,
    subscribers: HashMap<String, Subscriber>,
    lock_ttl: Duration,
}

impl DesignState {
    pub fn new(history_capacity: usize, lock_ttl_secs: i64) -> Self {
        Self {
            design: Design::default(),
            constraints: Constraints::default(),
            decisions: HashMap::new(),
            validation_results: HashMap::new(),
            locks: HashMap::new(),
            trail: ChangeTrail::with_capacity(history_capacity),
            version: 0,
            created_at: Utc::now(),
            subscribers: HashMap::new(),
            lock_ttl: Duration::seconds(lock_ttl_secs.max(0)),
        }
    }

    pub fn snapshot(&self) -> DesignSnapshot {
        DesignSnapshot {
            design: self.design.clone(),
            constraints: self.constraints.clone(),
            decisions: self.decisions.clone(),
            validation_results: self.validation_results.clone(),
            locks: self.locks.clone(),
            history: self.trail.iter().cloned().collect(),
            version: self.version,
            created_at: self.created_at,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Shallow-merge `patch` into the design. An empty patch is a no-op
    /// and commits nothing.
    pub fn update_design(&mut self, agent: &str, patch: &DesignPatch, reason: Option<&str>) -> bool {
        if patch.is_empty() {
            return true;
        }
        let previous = match serde_json::to_value(&self.design) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(%agent, %error, "design update aborted: snapshot failed");
                return false;
            }
        };

        let mut next = self.design.clone();
        next.merge(patch);
        next.updated_at = Utc::now();
        let new_value = match serde_json::to_value(&next) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(%agent, %error, "design update aborted: serialization failed");
                return false;
            }
        };

        self.design = next;
        self.commit(
            agent,
            previous,
            new_value,
            "design",
            reason,
            StateEventKind::DesignUpdated,
        );
        true
    }

    /// Recursively merge `patch` into the constraint categories. Additive:
    /// unrelated existing keys are never erased. Empty patches commit
    /// nothing.
    pub fn update_constraints(
        &mut self,
        agent: &str,
        patch: &Constraints,
        reason: Option<&str>,
    ) -> bool {
        if patch.is_empty() {
            return true;
        }
        let previous = match serde_json::to_value(&self.constraints) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(%agent, %error, "constraint update aborted: snapshot failed");
                return false;
            }
        };

        let mut next = self.constraints.clone();
        next.merge(patch);
        let new_value = match serde_json::to_value(&next) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(%agent, %error, "constraint update aborted: serialization failed");
                return false;
            }
        };

        self.constraints = next;
        self.commit(
            agent,
            previous,
            new_value,
            "constraints",
            reason,
            StateEventKind::ConstraintsUpdated,
        );
        true
    }

    /// Upsert one validation slot per agent
    pub fn set_validation_result(&mut self, agent: &str, result: ValidationResult) {
        let previous = self
            .validation_results
            .get(agent)
            .and_then(|r| serde_json::to_value(r).ok())
            .unwrap_or(Value::Null);
        let new_value = serde_json::to_value(&result).unwrap_or(Value::Null);
        let path = format!("validation_results.{}", agent);

        self.validation_results.insert(agent.to_string(), result);
        self.commit(
            agent,
            previous,
            new_value,
            &path,
            None,
            StateEventKind::ValidationStored,
        );
    }

    /// Upsert a decision keyed by `agent_type`; no per-key history is kept
    pub fn record_decision(
        &mut self,
        agent: &str,
        decision_type: &str,
        value: Value,
        reasoning: &str,
        confidence: f64,
    ) {
        let key = format!("{}_{}", agent, decision_type);
        let previous = self
            .decisions
            .get(&key)
            .and_then(|d| serde_json::to_value(d).ok())
            .unwrap_or(Value::Null);

        let decision = Decision {
            agent: agent.to_string(),
            decision_type: decision_type.to_string(),
            value,
            reasoning: reasoning.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            timestamp: Utc::now(),
        };
        let new_value = serde_json::to_value(&decision).unwrap_or(Value::Null);
        let path = format!("decisions.{}", key);

        self.decisions.insert(key, decision);
        self.commit(
            agent,
            previous,
            new_value,
            &path,
            Some(reasoning),
            StateEventKind::DecisionRecorded,
        );
    }

    /// Existing decision for `agent` + `decision_type`, if any
    pub fn decision(&self, agent: &str, decision_type: &str) -> Option<&Decision> {
        self.decisions.get(&format!("{}_{}", agent, decision_type))
    }

    /// Take an advisory claim on `property`; returns the lock id. A fresh
    /// claim replaces any prior holder; this is set membership, not
    /// mutual exclusion.
    pub fn lock(&mut self, agent: &str, property: &str) -> String {
        let now = Utc::now();
        let lock = PropertyLock {
            id: crate::bus::unique_id(),
            agent: agent.to_string(),
            property: property.to_string(),
            acquired_at: now,
            expires_at: now + self.lock_ttl,
        };
        let id = lock.id.clone();
        let previous = self
            .locks
            .get(property)
            .and_then(|l| serde_json::to_value(l).ok())
            .unwrap_or(Value::Null);
        let new_value = serde_json::to_value(&lock).unwrap_or(Value::Null);
        let path = format!("locks.{}", property);

        self.locks.insert(property.to_string(), lock);
        self.commit(
            agent,
            previous,
            new_value,
            &path,
            None,
            StateEventKind::PropertyLocked,
        );
        id
    }

    /// Release the claim on `property`; a no-op if none is held
    pub fn unlock(&mut self, agent: &str, property: &str) -> bool {
        let Some(lock) = self.locks.remove(property) else {
            return false;
        };
        let previous = serde_json::to_value(&lock).unwrap_or(Value::Null);
        let path = format!("locks.{}", property);
        self.commit(
            agent,
            previous,
            Value::Null,
            &path,
            None,
            StateEventKind::PropertyUnlocked,
        );
        true
    }

    /// Whether a non-expired advisory claim exists on `property`
    pub fn is_locked(&self, property: &str) -> bool {
        self.locks
            .get(property)
            .map(|lock| !lock.is_expired(Utc::now()))
            .unwrap_or(false)
    }

    /// Register a notification callback under `id`, replacing any prior
    /// callback registered with the same id
    pub fn subscribe(&mut self, id: &str, callback: Subscriber) {
        self.subscribers.insert(id.to_string(), callback);
    }

    pub fn unsubscribe(&mut self, id: &str) -> bool {
        self.subscribers.remove(id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Restore the empty template: defaults back, decisions / validation /
    /// locks / history cleared, version bumped, every subscriber notified
    /// once. The cleared trail is the documented exception to the
    /// one-change-per-mutation invariant.
    pub fn reset(&mut self) {
        self.design = Design::default();
        self.constraints = Constraints::default();
        self.decisions.clear();
        self.validation_results.clear();
        self.locks.clear();
        self.trail.clear();
        self.version += 1;

        let event = StateEvent {
            kind: StateEventKind::Reset,
            agent: "system".to_string(),
            version: self.version,
            property_path: None,
        };
        self.notify(&event);
    }

    fn commit(
        &mut self,
        agent: &str,
        previous_value: Value,
        new_value: Value,
        property_path: &str,
        reason: Option<&str>,
        kind: StateEventKind,
    ) {
        self.trail.push(Change {
            agent: agent.to_string(),
            timestamp: Utc::now(),
            previous_value,
            new_value,
            property_path: property_path.to_string(),
            reason: reason.map(str::to_string),
        });
        self.version += 1;

        let event = StateEvent {
            kind,
            agent: agent.to_string(),
            version: self.version,
            property_path: Some(property_path.to_string()),
        };
        self.notify(&event);
    }

    /// Deliver `event` to every subscriber. A panicking subscriber is
    /// logged and must not block delivery to the rest.
    fn notify(&self, event: &StateEvent) {
        for (id, callback) in &self.subscribers {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                tracing::warn!(subscriber = %id, "state subscriber panicked during notification");
            }
        }
    }
}

/// Cloneable handle to the one state instance of a session
///
/// Explicitly constructed and injected (no hidden global); the mutex guard
/// is never held across an await.
#[derive(Clone)]
pub struct SharedDesignState {
    inner: Arc<Mutex<DesignState>>,
}

impl Default for SharedDesignState {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_LOCK_TTL_SECS)
    }
}

impl SharedDesignState {
    pub fn new(history_capacity: usize, lock_ttl_secs: i64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(DesignState::new(history_capacity, lock_ttl_secs))),
        }
    }

    fn guard(&self) -> MutexGuard<'_, DesignState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> DesignSnapshot {
        self.guard().snapshot()
    }

    pub fn version(&self) -> u64 {
        self.guard().version()
    }

    /// Most recent change-trail entries, newest last
    pub fn recent_changes(&self, count: usize) -> Vec<Change> {
        self.guard().trail.recent(count)
    }

    pub fn update_design(&self, agent: &str, patch: &DesignPatch, reason: Option<&str>) -> bool {
        self.guard().update_design(agent, patch, reason)
    }

    pub fn update_constraints(
        &self,
        agent: &str,
        patch: &Constraints,
        reason: Option<&str>,
    ) -> bool {
        self.guard().update_constraints(agent, patch, reason)
    }

    pub fn set_validation_result(&self, agent: &str, result: ValidationResult) {
        self.guard().set_validation_result(agent, result)
    }

    pub fn record_decision(
        &self,
        agent: &str,
        decision_type: &str,
        value: Value,
        reasoning: &str,
        confidence: f64,
    ) {
        self.guard()
            .record_decision(agent, decision_type, value, reasoning, confidence)
    }

    pub fn decision_value(&self, agent: &str, decision_type: &str) -> Option<Value> {
        self.guard()
            .decision(agent, decision_type)
            .map(|d| d.value.clone())
    }

    pub fn lock(&self, agent: &str, property: &str) -> String {
        self.guard().lock(agent, property)
    }

    pub fn unlock(&self, agent: &str, property: &str) -> bool {
        self.guard().unlock(agent, property)
    }

    pub fn is_locked(&self, property: &str) -> bool {
        self.guard().is_locked(property)
    }

    pub fn subscribe<F>(&self, id: &str, callback: F)
    where
        F: Fn(&StateEvent) + Send + Sync + 'static,
    {
        self.guard().subscribe(id, Box::new(callback))
    }

    pub fn unsubscribe(&self, id: &str) -> bool {
        self.guard().unsubscribe(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.guard().subscriber_count()
    }

    pub fn reset(&self) {
        self.guard().reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Dimensions;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn patch_with_type(furniture_type: &str) -> DesignPatch {
        DesignPatch {
            furniture_type: Some(furniture_type.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_update_bumps_version_and_appends_one_change() {
        let state = SharedDesignState::default();
        let before = state.snapshot();

        assert!(state.update_design("dimension", &patch_with_type("bookshelf"), Some("intent")));

        let after = state.snapshot();
        assert_eq!(after.version, before.version + 1);
        assert_eq!(after.history.len(), before.history.len() + 1);
        let change = after.history.last().unwrap();
        assert_eq!(change.property_path, "design");
        assert_eq!(change.reason.as_deref(), Some("intent"));
    }

    #[test]
    fn test_empty_constraint_patch_leaves_state_unchanged() {
        let state = SharedDesignState::default();
        let before = state.snapshot();

        assert!(state.update_constraints("material", &Constraints::default(), None));

        let after = state.snapshot();
        assert_eq!(after.version, before.version);
        assert_eq!(after.history.len(), before.history.len());
    }

    #[test]
    fn test_constraint_merge_never_erases_other_categories() {
        let state = SharedDesignState::default();
        let mut dimensional = Constraints::default();
        dimensional
            .dimensional
            .insert("max_height".to_string(), json!(84));
        state.update_constraints("dimension", &dimensional, None);

        let mut budget = Constraints::default();
        budget.budget.insert("max_total_cost".to_string(), json!(300));
        state.update_constraints("material", &budget, None);

        let snapshot = state.snapshot();
        assert_eq!(
            snapshot.constraints.dimensional.get("max_height"),
            Some(&json!(84))
        );
        assert_eq!(snapshot.constraints.max_total_cost(), Some(300.0));
    }

    #[test]
    fn test_lock_visibility() {
        let state = SharedDesignState::default();
        assert!(!state.is_locked("dimensions"));

        state.lock("dimension", "dimensions");
        assert!(state.is_locked("dimensions"));

        assert!(state.unlock("dimension", "dimensions"));
        assert!(!state.is_locked("dimensions"));
    }

    #[test]
    fn test_expired_lock_reads_as_unlocked() {
        let state = SharedDesignState::new(DEFAULT_CAPACITY, 0);
        state.lock("dimension", "dimensions");
        assert!(!state.is_locked("dimensions"));
    }

    #[test]
    fn test_decision_upsert_keeps_single_entry_per_key() {
        let state = SharedDesignState::default();
        state.record_decision("harmonizer", "joinery", json!("dovetail"), "first", 0.8);
        state.record_decision("harmonizer", "joinery", json!("pocket-hole"), "revised", 0.9);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.decisions.len(), 1);
        assert_eq!(
            state.decision_value("harmonizer", "joinery"),
            Some(json!("pocket-hole"))
        );
    }

    #[test]
    fn test_panicking_subscriber_does_not_block_others() {
        let state = SharedDesignState::default();
        let delivered = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&delivered);

        state.subscribe("panicky", |_| panic!("subscriber bug"));
        state.subscribe("counter", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        state.update_design("dimension", &patch_with_type("desk"), None);
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reset_restores_defaults_and_notifies_each_subscriber_once() {
        let state = SharedDesignState::default();
        state.update_design("dimension", &patch_with_type("bookshelf"), None);
        state.update_design(
            "dimension",
            &DesignPatch {
                dimensions: Some(Dimensions::new(36.0, 72.0, 12.0)),
                ..Default::default()
            },
            None,
        );
        state.record_decision("harmonizer", "joinery", json!("dado"), "carcass", 0.7);
        state.lock("dimension", "dimensions");
        let version_before = state.version();

        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let first_counter = Arc::clone(&first);
        let second_counter = Arc::clone(&second);
        state.subscribe("first", move |event| {
            assert_eq!(event.kind, StateEventKind::Reset);
            first_counter.fetch_add(1, Ordering::SeqCst);
        });
        state.subscribe("second", move |_| {
            second_counter.fetch_add(1, Ordering::SeqCst);
        });

        state.reset();

        let snapshot = state.snapshot();
        assert!(snapshot.design.furniture_type.is_none());
        assert!(snapshot.design.dimensions.is_none());
        assert!(snapshot.decisions.is_empty());
        assert!(snapshot.validation_results.is_empty());
        assert!(snapshot.locks.is_empty());
        assert!(snapshot.history.is_empty());
        assert_eq!(snapshot.version, version_before + 1);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }
}
