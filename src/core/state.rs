//! Shared controller state with change notification
//!
//! The connection worker is the only writer during a connection attempt;
//! callers read with [`StateCell::get`] or block on
//! [`StateCell::wait_while_starting`] instead of polling.

use super::types::ControllerState;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

pub struct StateCell {
    state: Mutex<ControllerState>,
    changed: Condvar,
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ControllerState::None),
            changed: Condvar::new(),
        }
    }

    pub fn get(&self) -> ControllerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set(&self, next: ControllerState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != next {
            log::debug!("Controller state {} -> {}", *state, next);
            *state = next;
        }
        self.changed.notify_all();
    }

    /// Set `next` only if the current state is `expected`. Returns whether it was applied.
    pub fn transition(&self, expected: ControllerState, next: ControllerState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != expected {
            return false;
        }
        log::debug!("Controller state {} -> {}", *state, next);
        *state = next;
        self.changed.notify_all();
        true
    }

    /// Block until the state leaves STARTING or `timeout` elapses, returning the state seen last
    pub fn wait_while_starting(&self, timeout: Duration) -> ControllerState {
        let guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |s| *s == ControllerState::Starting)
            .unwrap_or_else(|e| e.into_inner());
        *guard
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
