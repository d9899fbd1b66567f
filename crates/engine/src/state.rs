//! Generic lifecycle state shared by runs, jobs, and steps.
//!
//! Every runnable entity composes a [`LifecycleState`] value instead of
//! inheriting from a base type. Transitions are monotonic: pending → running
//! → exactly one terminal state, validated by a single shared routine.
//! Alongside the status, the state carries a free-form result message and a
//! closed named-slot store for typed values (outputs, env, captured output
//! lines, the subprocess exit code).

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::error::EngineError;

/// Generates a process-unique, human-scannable id like `step-1f2a9c04`.
pub fn short_id(kind: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{kind}-{}", &hex[..8])
}

/// Lifecycle status of a runnable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Created but not yet started.
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Success,
    /// Finished with a failure.
    Failed,
    /// Did not execute.
    Skipped,
}

impl Status {
    /// True once the entity can no longer transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Success | Status::Failed | Status::Skipped)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Pending => "pending",
            Status::Running => "running",
            Status::Success => "success",
            Status::Failed => "failed",
            Status::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// Closed set of well-known slot names in the state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    /// Key/value outputs reported through the output exchange file.
    Outputs,
    /// Key/value environment reported through the env exchange file.
    Env,
    /// Captured stdout line sequence.
    Stdout,
    /// Captured stderr line sequence.
    Stderr,
    /// Exit code of the action subprocess.
    ExitCode,
}

impl StateKey {
    /// Snapshot field name for this slot.
    pub fn as_str(self) -> &'static str {
        match self {
            StateKey::Outputs => "outputs",
            StateKey::Env => "env",
            StateKey::Stdout => "stdout",
            StateKey::Stderr => "stderr",
            StateKey::ExitCode => "exit_code",
        }
    }
}

/// Value shapes a slot may hold.
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    /// Ordered name → value mapping.
    Variables(IndexMap<String, String>),
    /// Buffered output lines.
    Lines(Vec<String>),
    /// Subprocess exit code.
    Code(i32),
}

impl StateValue {
    fn to_json(&self) -> Value {
        match self {
            StateValue::Variables(variables) => {
                Value::Object(variables.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect())
            }
            StateValue::Lines(lines) => json!(lines),
            StateValue::Code(code) => json!(code),
        }
    }
}

/// Composed lifecycle state machine.
#[derive(Debug)]
pub struct LifecycleState {
    status: Status,
    result: String,
    slots: HashMap<StateKey, StateValue>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    stops: u32,
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleState {
    /// A fresh state in `pending`.
    pub fn new() -> Self {
        Self {
            status: Status::Pending,
            result: String::new(),
            slots: HashMap::new(),
            started_at: None,
            finished_at: None,
            stops: 0,
        }
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Free-form result message recorded by the terminal transition.
    pub fn result(&self) -> &str {
        &self.result
    }

    /// Shared transition validation: `operation` may only move the state from
    /// one of `allowed_from` into `to`.
    fn transition(&mut self, to: Status, operation: &'static str, allowed_from: &[Status]) -> Result<(), EngineError> {
        if !allowed_from.contains(&self.status) {
            return Err(EngineError::InvalidTransition {
                operation,
                status: self.status,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Transitions pending → running.
    pub fn start(&mut self) -> Result<(), EngineError> {
        self.transition(Status::Running, "start", &[Status::Pending])?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Terminal bookkeeping, run exactly once per `start()` on every exit
    /// path. Idempotent so the scoped-cleanup guarantee holds even when the
    /// owning entity double-invokes it defensively.
    pub fn stop(&mut self) {
        if self.finished_at.is_none() {
            self.finished_at = Some(Utc::now());
            self.stops += 1;
        }
    }

    /// Number of times `stop()` has taken effect. At most 1.
    pub fn stop_count(&self) -> u32 {
        self.stops
    }

    /// Transitions running → success.
    pub fn succeed(&mut self) -> Result<(), EngineError> {
        self.transition(Status::Success, "succeed", &[Status::Running])
    }

    /// Transitions running → failed, recording the reason.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), EngineError> {
        self.transition(Status::Failed, "fail", &[Status::Running])?;
        self.result = reason.into();
        Ok(())
    }

    /// Transitions pending or running → skipped, recording the reason.
    pub fn skip(&mut self, reason: impl Into<String>) -> Result<(), EngineError> {
        self.transition(Status::Skipped, "skip", &[Status::Pending, Status::Running])?;
        self.result = reason.into();
        Ok(())
    }

    /// Reads a slot, or `None` when it was never written.
    pub fn get_state(&self, key: StateKey) -> Option<&StateValue> {
        self.slots.get(&key)
    }

    /// Writes a slot.
    pub fn set_state(&mut self, key: StateKey, value: StateValue) {
        self.slots.insert(key, value);
    }

    /// Convenience accessor for variable-map slots; empty when unset.
    pub fn variables(&self, key: StateKey) -> IndexMap<String, String> {
        match self.slots.get(&key) {
            Some(StateValue::Variables(variables)) => variables.clone(),
            _ => IndexMap::new(),
        }
    }

    /// Convenience accessor for line-sequence slots; empty when unset.
    pub fn lines(&self, key: StateKey) -> Vec<String> {
        match self.slots.get(&key) {
            Some(StateValue::Lines(lines)) => lines.clone(),
            _ => Vec::new(),
        }
    }

    /// Recorded subprocess exit code, if any.
    pub fn exit_code(&self) -> Option<i32> {
        match self.slots.get(&StateKey::ExitCode) {
            Some(StateValue::Code(code)) => Some(*code),
            _ => None,
        }
    }

    /// Snapshot of the base fields plus every written slot. Entities merge
    /// their own fields on top of this.
    pub fn combined_state(&self) -> Map<String, Value> {
        let mut snapshot = Map::new();
        snapshot.insert("status".into(), json!(self.status));
        snapshot.insert("result".into(), json!(self.result));
        snapshot.insert("started_at".into(), json!(self.started_at));
        snapshot.insert("finished_at".into(), json!(self.finished_at));
        for (key, value) in &self.slots {
            snapshot.insert(key.as_str().into(), value.to_json());
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_lifecycle_is_monotonic() {
        let mut state = LifecycleState::new();
        assert_eq!(state.status(), Status::Pending);
        state.start().expect("start");
        assert_eq!(state.status(), Status::Running);
        state.succeed().expect("succeed");
        assert!(state.status().is_terminal());
    }

    #[test]
    fn start_twice_is_an_invalid_transition() {
        let mut state = LifecycleState::new();
        state.start().expect("start");
        let error = state.start().expect_err("second start must fail");
        assert!(matches!(error, EngineError::InvalidTransition { operation: "start", .. }));
    }

    #[test]
    fn terminal_states_cannot_be_reentered() {
        let mut state = LifecycleState::new();
        state.start().expect("start");
        state.fail("boom").expect("fail");
        assert!(state.succeed().is_err());
        assert!(state.skip("later").is_err());
        assert_eq!(state.result(), "boom");
    }

    #[test]
    fn skip_is_allowed_from_pending() {
        let mut state = LifecycleState::new();
        state.skip("condition was falsy").expect("skip");
        assert_eq!(state.status(), Status::Skipped);
        assert_eq!(state.result(), "condition was falsy");
    }

    #[test]
    fn succeed_requires_running() {
        let mut state = LifecycleState::new();
        assert!(state.succeed().is_err());
    }

    #[test]
    fn stop_takes_effect_once() {
        let mut state = LifecycleState::new();
        state.start().expect("start");
        state.succeed().expect("succeed");
        state.stop();
        state.stop();
        assert_eq!(state.stop_count(), 1);
    }

    #[test]
    fn slot_store_round_trips_typed_values() {
        let mut state = LifecycleState::new();
        let mut outputs = IndexMap::new();
        outputs.insert("OUT1".to_string(), "hello".to_string());
        state.set_state(StateKey::Outputs, StateValue::Variables(outputs));
        state.set_state(StateKey::Stdout, StateValue::Lines(vec!["line".into()]));
        state.set_state(StateKey::ExitCode, StateValue::Code(3));

        assert_eq!(state.variables(StateKey::Outputs)["OUT1"], "hello");
        assert_eq!(state.lines(StateKey::Stdout), vec!["line".to_string()]);
        assert_eq!(state.exit_code(), Some(3));
        assert!(state.get_state(StateKey::Env).is_none());
    }

    #[test]
    fn combined_state_merges_slots_with_base_fields() {
        let mut state = LifecycleState::new();
        state.start().expect("start");
        state.fail("Action failed with code 2").expect("fail");
        state.set_state(StateKey::ExitCode, StateValue::Code(2));

        let snapshot = state.combined_state();
        assert_eq!(snapshot["status"], json!("failed"));
        assert_eq!(snapshot["result"], json!("Action failed with code 2"));
        assert_eq!(snapshot["exit_code"], json!(2));
    }

    #[test]
    fn short_ids_are_unique_and_prefixed() {
        let first = short_id("step");
        let second = short_id("step");
        assert!(first.starts_with("step-"));
        assert_ne!(first, second);
    }
}
