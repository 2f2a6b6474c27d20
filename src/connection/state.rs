// src/connection/state.rs

//! The lock-free liveness state machine of a connection.

use std::sync::atomic::{AtomicU8, Ordering};

/// Liveness state of a connection. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnState {
    Active = 0,
    Inspect = 1,
    NotActive = 2,
    Closed = 3,
}

impl ConnState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnState::Active => "active",
            ConnState::Inspect => "inspect",
            ConnState::NotActive => "not-active",
            ConnState::Closed => "closed",
        }
    }

    /// Outbound writes are only allowed while the peer is considered alive.
    pub fn is_writable(self) -> bool {
        matches!(self, ConnState::Active | ConnState::Inspect)
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnState::Active,
            1 => ConnState::Inspect,
            2 => ConnState::NotActive,
            _ => ConnState::Closed,
        }
    }
}

/// What one keepalive tick did to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aging {
    /// Active became Inspect.
    Inspected,
    /// Inspect became NotActive; the caller raises a NotActive signal.
    Demoted,
    /// Nothing changed (already NotActive, or Closed).
    Unchanged,
}

/// A `ConnState` stored in an atomic byte. Every transition is a single
/// compare-and-swap, so concurrent ticks, reads, and stops never step on
/// each other and `Closed` is never left once entered.
#[derive(Debug)]
pub struct AtomicState(AtomicU8);

impl Default for AtomicState {
    fn default() -> Self {
        Self::new(ConnState::Active)
    }
}

impl AtomicState {
    pub fn new(state: ConnState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> ConnState {
        ConnState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves `from` to `to` only if the current state is `from`.
    pub fn transition(&self, from: ConnState, to: ConnState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Records inbound activity: Inspect or NotActive go back to Active.
    /// Returns true if the state changed.
    pub fn mark_active(&self) -> bool {
        let mut current = self.load();
        loop {
            match current {
                ConnState::Active | ConnState::Closed => return false,
                ConnState::Inspect | ConnState::NotActive => {
                    match self.0.compare_exchange(
                        current as u8,
                        ConnState::Active as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => return true,
                        Err(actual) => current = ConnState::from_u8(actual),
                    }
                }
            }
        }
    }

    /// Applies one keepalive tick.
    pub fn age(&self) -> Aging {
        match self.load() {
            ConnState::Active if self.transition(ConnState::Active, ConnState::Inspect) => {
                Aging::Inspected
            }
            ConnState::Inspect if self.transition(ConnState::Inspect, ConnState::NotActive) => {
                Aging::Demoted
            }
            _ => Aging::Unchanged,
        }
    }

    /// Enters `Closed`. Returns false if the state was already `Closed`.
    pub fn close(&self) -> bool {
        self.0.swap(ConnState::Closed as u8, Ordering::AcqRel) != ConnState::Closed as u8
    }

    pub fn is_closed(&self) -> bool {
        self.load() == ConnState::Closed
    }
}
