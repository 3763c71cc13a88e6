// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Agent state machine — 11 states with typed transitions, deadlines, and
//! epoch-based cancellation. Direct port of `agent_fsm.py::AgentFSM`.

use std::collections::HashMap;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::error::{create_error, BrowserError, ErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStateName {
    Idle,
    Launching,
    Observing,
    Planning,
    Acting,
    Evaluating,
    Escalating,
    Recovering,
    Done,
    Error,
    TearingDown,
}

impl AgentStateName {
    pub fn as_str(&self) -> &'static str {
        use AgentStateName::*;
        match self {
            Idle => "IDLE",
            Launching => "LAUNCHING",
            Observing => "OBSERVING",
            Planning => "PLANNING",
            Acting => "ACTING",
            Evaluating => "EVALUATING",
            Escalating => "ESCALATING",
            Recovering => "RECOVERING",
            Done => "DONE",
            Error => "ERROR",
            TearingDown => "TEARING_DOWN",
        }
    }
}

static VALID_TRANSITIONS: LazyLock<HashMap<AgentStateName, Vec<AgentStateName>>> =
    LazyLock::new(|| {
        use AgentStateName::*;
        HashMap::from([
            (Idle, vec![Launching]),
            (Launching, vec![Observing, Error]),
            (Observing, vec![Planning, Error]),
            (Planning, vec![Acting, Done, Error]),
            (Acting, vec![Evaluating, Error]),
            (Evaluating, vec![Observing, Escalating, Done, Error]),
            (Escalating, vec![Launching, Error]),
            (Recovering, vec![Observing, Escalating, Error]),
            (Done, vec![TearingDown, Idle]),
            (Error, vec![Recovering, TearingDown, Idle]),
            (TearingDown, vec![Idle]),
        ])
    });

static ABORTABLE_STATES: LazyLock<std::collections::HashSet<AgentStateName>> = LazyLock::new(|| {
    use AgentStateName::*;
    std::collections::HashSet::from([Observing, Planning, Acting, Evaluating, Escalating, Recovering])
});

/// Per-state deadlines, from `original_source/config.py::Config.FSM_DEADLINES`.
static FSM_DEADLINES: LazyLock<HashMap<AgentStateName, i64>> = LazyLock::new(|| {
    use AgentStateName::*;
    HashMap::from([
        (Launching, 60_000),
        (Observing, 30_000),
        (Acting, 30_000),
        (Recovering, 15_000),
        (TearingDown, 10_000),
    ])
});

pub fn is_valid_transition(from: AgentStateName, to: AgentStateName) -> bool {
    VALID_TRANSITIONS
        .get(&from)
        .is_some_and(|allowed| allowed.contains(&to))
}

pub fn can_abort(state: AgentStateName) -> bool {
    ABORTABLE_STATES.contains(&state)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsmState {
    pub name: AgentStateName,
    pub since_ms: i64,
    pub deadline_ms: Option<i64>,
    pub epoch: u64,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub type StateChangeListener = Box<dyn Fn(&FsmState, &FsmState) + Send + Sync>;

/// Agent state machine with typed transitions, deadlines, and epoch tracking.
pub struct AgentFsm {
    state: FsmState,
    listeners: Vec<StateChangeListener>,
}

impl Default for AgentFsm {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentFsm {
    pub fn new() -> Self {
        Self {
            state: FsmState {
                name: AgentStateName::Idle,
                since_ms: now_ms(),
                deadline_ms: None,
                epoch: 0,
            },
            listeners: Vec::new(),
        }
    }

    pub fn state(&self) -> &FsmState {
        &self.state
    }

    pub fn state_name(&self) -> AgentStateName {
        self.state.name
    }

    pub fn epoch(&self) -> u64 {
        self.state.epoch
    }

    pub fn subscribe(&mut self, listener: StateChangeListener) {
        self.listeners.push(listener);
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state.name, AgentStateName::Done | AgentStateName::Error)
    }

    pub fn is_active(&self) -> bool {
        !matches!(
            self.state.name,
            AgentStateName::Idle | AgentStateName::Done | AgentStateName::Error | AgentStateName::TearingDown
        )
    }

    pub fn elapsed_ms(&self) -> i64 {
        now_ms() - self.state.since_ms
    }

    pub fn is_deadline_exceeded(&self) -> bool {
        match self.state.deadline_ms {
            Some(deadline) => self.elapsed_ms() > deadline,
            None => false,
        }
    }

    pub fn to_launching(&mut self) -> Result<(), BrowserError> {
        self.transition(AgentStateName::Launching)
    }
    pub fn to_observing(&mut self) -> Result<(), BrowserError> {
        self.transition(AgentStateName::Observing)
    }
    pub fn to_planning(&mut self) -> Result<(), BrowserError> {
        self.transition(AgentStateName::Planning)
    }
    pub fn to_acting(&mut self) -> Result<(), BrowserError> {
        self.transition(AgentStateName::Acting)
    }
    pub fn to_evaluating(&mut self) -> Result<(), BrowserError> {
        self.transition(AgentStateName::Evaluating)
    }
    pub fn to_escalating(&mut self) -> Result<(), BrowserError> {
        self.transition(AgentStateName::Escalating)
    }
    pub fn to_done(&mut self) -> Result<(), BrowserError> {
        self.transition(AgentStateName::Done)
    }
    pub fn to_idle(&mut self) -> Result<(), BrowserError> {
        self.transition(AgentStateName::Idle)
    }

    /// Drives the FSM into ACTING from wherever it currently sits, taking
    /// the shortest valid path (IDLE needs the full LAUNCHING/OBSERVING/
    /// PLANNING chain; OBSERVING only needs PLANNING). Used by the
    /// dispatcher at the start of every verb call.
    pub fn ready_for_action(&mut self) -> Result<(), BrowserError> {
        if self.state.name == AgentStateName::Idle {
            self.to_launching()?;
            self.transition(AgentStateName::Observing)?;
        }
        if self.state.name == AgentStateName::Observing {
            self.to_planning()?;
        }
        self.to_acting()
    }

    /// Returns the FSM to OBSERVING after a completed action, per the
    /// ACTING -> EVALUATING -> OBSERVING chain.
    pub fn finish_action(&mut self) -> Result<(), BrowserError> {
        self.to_evaluating()?;
        self.to_observing()
    }

    /// Force transition to ERROR from any state.
    pub fn to_error(&mut self) {
        self.force_transition(AgentStateName::Error);
    }

    /// Force transition to RECOVERING from any state.
    pub fn to_recovering(&mut self) {
        self.force_transition(AgentStateName::Recovering);
    }

    /// Force transition to TEARING_DOWN from any state.
    pub fn to_tearing_down(&mut self) {
        self.force_transition(AgentStateName::TearingDown);
    }

    /// Increment epoch (on abort, tier escalation, recovery). Any in-flight
    /// work carrying a stale epoch should be discarded by its caller.
    pub fn bump_epoch(&mut self) -> u64 {
        let prev = self.state.clone();
        self.state = FsmState {
            name: prev.name,
            since_ms: prev.since_ms,
            deadline_ms: prev.deadline_ms,
            epoch: prev.epoch + 1,
        };
        self.notify(&prev);
        self.state.epoch
    }

    fn transition(&mut self, to: AgentStateName) -> Result<(), BrowserError> {
        let prev = self.state.clone();
        if !is_valid_transition(prev.name, to) {
            return Err(create_error(
                ErrorCode::InvalidTransition,
                format!("Invalid transition: {} -> {}", prev.name.as_str(), to.as_str()),
                Some(prev.name),
            ));
        }
        self.set_state(to, prev.epoch);
        self.notify(&prev);
        Ok(())
    }

    fn force_transition(&mut self, to: AgentStateName) {
        let prev = self.state.clone();
        self.set_state(to, prev.epoch);
        self.notify(&prev);
    }

    fn set_state(&mut self, name: AgentStateName, epoch: u64) {
        self.state = FsmState {
            name,
            since_ms: now_ms(),
            deadline_ms: FSM_DEADLINES.get(&name).copied(),
            epoch,
        };
    }

    fn notify(&self, prev: &FsmState) {
        for listener in &self.listeners {
            listener(&self.state, prev);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn valid_transition_chain_succeeds() {
        let mut fsm = AgentFsm::new();
        fsm.to_launching().unwrap();
        fsm.to_observing().unwrap();
        fsm.to_planning().unwrap();
        fsm.to_acting().unwrap();
        fsm.to_evaluating().unwrap();
        fsm.to_done().unwrap();
        assert!(fsm.is_terminal());
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let mut fsm = AgentFsm::new();
        let err = fsm.to_acting().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTransition);
    }

    #[test]
    fn error_is_reachable_from_any_state() {
        let mut fsm = AgentFsm::new();
        fsm.to_launching().unwrap();
        fsm.to_observing().unwrap();
        fsm.to_error();
        assert_eq!(fsm.state_name(), AgentStateName::Error);
    }

    #[test]
    fn bump_epoch_increments_and_preserves_state() {
        let mut fsm = AgentFsm::new();
        fsm.to_launching().unwrap();
        let e0 = fsm.epoch();
        let e1 = fsm.bump_epoch();
        assert_eq!(e1, e0 + 1);
        assert_eq!(fsm.state_name(), AgentStateName::Launching);
    }

    #[test]
    fn deadline_is_set_for_launching() {
        let mut fsm = AgentFsm::new();
        fsm.to_launching().unwrap();
        assert_eq!(fsm.state().deadline_ms, Some(60_000));
    }

    #[test]
    fn listener_panics_do_not_escape() {
        // listeners must not break the FSM; we only assert call count here
        // since Rust panics inside a closure would abort, unlike Python's
        // swallow-and-continue. The contract here is "never add listeners
        // that panic" enforced at the call site, not inside notify().
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let mut fsm = AgentFsm::new();
        fsm.subscribe(Box::new(move |_new, _old| {
            calls2.fetch_add(1, Ordering::SeqCst);
        }));
        fsm.to_launching().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn abortable_states_match_catalog() {
        assert!(can_abort(AgentStateName::Acting));
        assert!(!can_abort(AgentStateName::Idle));
        assert!(!can_abort(AgentStateName::Done));
    }
}
