//! Application layer for Rendezvous
//!
//! A generic runtime that owns the connection manager, the session
//! coordinator and the open conversation, and drives them from a
//! platform-specific [`Driver`]. The same orchestration code runs in the
//! terminal client and in deterministic simulation.
//!
//! # Components
//!
//! - [`Driver`]: trait for platform-specific I/O
//! - [`DriverEvent`], [`UserInput`]: everything a driver reports back
//! - [`Runtime`]: generic orchestration loop
//! - [`View`]: read-only snapshot handed to the driver for rendering

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod driver;
mod error;
mod event;
mod runtime;
mod view;

pub use driver::Driver;
pub use error::RuntimeError;
pub use event::{DriverEvent, UserInput};
pub use runtime::{IDLE_INTERVAL, Runtime, RuntimeConfig};
pub use view::{Notice, View};
