//! Driver trait for abstracting I/O operations.
//!
//! The [`Driver`] trait decouples the runtime from sockets, HTTP and the
//! terminal. Each frontend implements it; the generic
//! [`Runtime`](crate::Runtime) handles all orchestration.

use std::future::Future;

use rendezvous_client::{ApiRequest, TokenRequest};
use rendezvous_core::ConnectionAction;

use crate::{DriverEvent, View};

/// Platform I/O for the runtime.
///
/// Socket opens, REST calls and token lookups are started by the runtime and
/// finish later; their outcomes come back through
/// [`poll_event`](Driver::poll_event) in whatever order they complete.
///
/// # Implementations
///
/// - **CLI**: tokio-tungstenite sockets, reqwest REST, stdin/stdout
/// - **Simulation**: scripted sockets and REST under test control
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Instant type of the environment the driver runs in.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = std::time::Duration>;

    /// Next ready event, or `None` if nothing is ready. Must not block.
    fn poll_event(&mut self) -> impl Future<Output = Result<Option<DriverEvent>, Self::Error>> + Send;

    /// Execute a socket action.
    ///
    /// `Open` starts a connection attempt whose outcome is reported as
    /// `SocketOpened` or `SocketOpenFailed`.
    ///
    /// # Errors
    ///
    /// Returns an error only for driver-level failures; a socket that cannot
    /// be reached is reported as an event instead.
    fn execute(&mut self, action: ConnectionAction) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Start reading the token store; answer with `DriverEvent::TokenLoaded`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup cannot be started.
    fn request_token(&mut self, request: TokenRequest) -> Result<(), Self::Error>;

    /// Start a REST request; answer with `DriverEvent::Api`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be started.
    fn submit(&mut self, request: ApiRequest) -> Result<(), Self::Error>;

    /// Render the current state.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    fn render(&mut self, view: &View<'_, Self::Instant>) -> Result<(), Self::Error>;

    /// Release resources.
    fn stop(&mut self);
}
