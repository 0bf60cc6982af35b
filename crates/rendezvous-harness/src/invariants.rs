//! Runtime invariants checked between simulation steps.
//!
//! Invariants are properties that must always hold between runtime steps.
//! The checks run against a [`RuntimeSnapshot`] extracted from a simulated
//! [`Runtime`], so property tests can assert them after every event of an
//! arbitrary sequence.

use std::collections::HashSet;

use rendezvous_app::Runtime;
use rendezvous_client::ConnectionStatus;
use rendezvous_core::{SocketId, SocketState};

use crate::{SimDriver, SimEnv};

/// Outcome of one check.
pub type InvariantResult = Result<(), Violation>;

/// A broken invariant.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Which invariant failed
    pub invariant: &'static str,
    /// What the snapshot showed
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// Observable state of a simulated client between steps.
#[derive(Debug, Clone)]
pub struct RuntimeSnapshot {
    /// Session status
    pub status: ConnectionStatus,
    /// Socket state reported by the manager
    pub socket_state: SocketState,
    /// Socket the manager considers current
    pub manager_socket: Option<SocketId>,
    /// Socket the driver considers live
    pub driver_socket: Option<SocketId>,
    /// Reconnect attempts used
    pub reconnect_attempts: u32,
    /// Attempt limit
    pub max_reconnect_attempts: u32,
    /// Retained log entries
    pub log_len: usize,
    /// Log capacity
    pub log_capacity: usize,
    /// Ids of the open conversation's messages, newest first
    pub message_ids: Vec<String>,
}

impl RuntimeSnapshot {
    /// Capture the runtime's observable state.
    pub fn capture(runtime: &Runtime<SimDriver, SimEnv>) -> Self {
        let connection = runtime.connection();
        let log = runtime.session().log();
        Self {
            status: runtime.status(),
            socket_state: connection.socket_state(),
            manager_socket: connection.socket(),
            driver_socket: runtime.driver().live_socket(),
            reconnect_attempts: connection.reconnect_attempts(),
            max_reconnect_attempts: connection.config().max_reconnect_attempts,
            log_len: log.len(),
            log_capacity: log.capacity(),
            message_ids: runtime
                .conversation()
                .map(|c| c.messages().iter().map(|m| m.id.to_string()).collect())
                .unwrap_or_default(),
        }
    }
}

/// An invariant that can be checked against a snapshot.
pub trait Invariant: Send + Sync {
    /// Short identifier used in violation reports.
    fn name(&self) -> &'static str;

    /// Inspect one snapshot.
    fn check(&self, state: &RuntimeSnapshot) -> InvariantResult;
}

/// An open socket is the one the driver holds.
pub struct SingleLiveSocket;

impl Invariant for SingleLiveSocket {
    fn name(&self) -> &'static str {
        "single_live_socket"
    }

    fn check(&self, state: &RuntimeSnapshot) -> InvariantResult {
        if state.socket_state == SocketState::Open && state.manager_socket != state.driver_socket {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "manager uses {:?} but driver holds {:?}",
                    state.manager_socket, state.driver_socket
                ),
            });
        }
        if state.socket_state == SocketState::Disconnected && state.manager_socket.is_some() {
            return Err(Violation {
                invariant: self.name(),
                message: format!("disconnected manager still tracks {:?}", state.manager_socket),
            });
        }
        Ok(())
    }
}

/// Reconnect attempts never exceed the limit.
pub struct BoundedReconnects;

impl Invariant for BoundedReconnects {
    fn name(&self) -> &'static str {
        "bounded_reconnects"
    }

    fn check(&self, state: &RuntimeSnapshot) -> InvariantResult {
        if state.reconnect_attempts > state.max_reconnect_attempts {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "{} attempts, limit {}",
                    state.reconnect_attempts, state.max_reconnect_attempts
                ),
            });
        }
        Ok(())
    }
}

/// The event log never exceeds its capacity.
pub struct LogWithinCapacity;

impl Invariant for LogWithinCapacity {
    fn name(&self) -> &'static str {
        "log_within_capacity"
    }

    fn check(&self, state: &RuntimeSnapshot) -> InvariantResult {
        if state.log_len > state.log_capacity {
            return Err(Violation {
                invariant: self.name(),
                message: format!("{} entries, capacity {}", state.log_len, state.log_capacity),
            });
        }
        Ok(())
    }
}

/// No message id is listed twice.
pub struct UniqueMessages;

impl Invariant for UniqueMessages {
    fn name(&self) -> &'static str {
        "unique_messages"
    }

    fn check(&self, state: &RuntimeSnapshot) -> InvariantResult {
        let mut seen = HashSet::new();
        for id in &state.message_ids {
            if !seen.insert(id) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("{id} listed twice in {:?}", state.message_ids),
                });
            }
        }
        Ok(())
    }
}

/// `Connected` implies a socket that has completed its handshake.
pub struct StatusMatchesSocket;

impl Invariant for StatusMatchesSocket {
    fn name(&self) -> &'static str {
        "status_matches_socket"
    }

    fn check(&self, state: &RuntimeSnapshot) -> InvariantResult {
        let socket_up = matches!(state.socket_state, SocketState::Open | SocketState::Closing);
        if state.status == ConnectionStatus::Connected && !socket_up {
            return Err(Violation {
                invariant: self.name(),
                message: format!("status Connected with socket {:?}", state.socket_state),
            });
        }
        Ok(())
    }
}

/// Set of invariants run together.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// No invariants.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Registry with every invariant in this module.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(SingleLiveSocket);
        registry.add(BoundedReconnects);
        registry.add(LogWithinCapacity);
        registry.add(UniqueMessages);
        registry.add(StatusMatchesSocket);
        registry
    }

    /// Register `invariant`.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants, collecting every violation.
    pub fn check_all(&self, state: &RuntimeSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// How many invariants are registered.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}
