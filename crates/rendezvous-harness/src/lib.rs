//! Deterministic simulation harness for the Rendezvous client.
//!
//! Virtual-clock [`Environment`](rendezvous_core::env::Environment) and a
//! scripted [`Driver`](rendezvous_app::Driver) so the production
//! [`Runtime`](rendezvous_app::Runtime) can be tested end to end without
//! sockets, HTTP or real time.
//!
//! # Invariant Testing
//!
//! The `invariants` module extracts a [`RuntimeSnapshot`] after each step and
//! checks behavioral properties against it. Use
//! [`InvariantRegistry::standard()`] in property tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod scenario;
pub mod sim_driver;
pub mod sim_env;
pub mod sim_server;

pub use invariants::{
    BoundedReconnects, Invariant, InvariantRegistry, InvariantResult, LogWithinCapacity,
    RuntimeSnapshot, SingleLiveSocket, StatusMatchesSocket, UniqueMessages, Violation,
};
pub use scenario::{MAX_SETTLE_STEPS, SIM_BASE_URL, Scenario, SimResult, SimRuntime, run_for, settle};
pub use sim_driver::{RenderRecord, SimDriver, SimDriverError, SocketPolicy, SocketRecord};
pub use sim_env::{DEFAULT_EPOCH_MILLIS, SimEnv, SimInstant};
pub use sim_server::{SimServer, SimTokenStore, new_message_event};
