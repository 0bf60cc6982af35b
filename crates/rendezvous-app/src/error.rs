//! Runtime errors.

use thiserror::Error;

/// Errors that stop the runtime loop.
///
/// Connection and REST failures are not errors here; they flow through the
/// state machines as status changes and notices.
#[derive(Error, Debug)]
pub enum RuntimeError<E: std::error::Error + 'static> {
    /// The driver failed
    #[error("driver error: {0}")]
    Driver(#[source] E),
}

impl<E: std::error::Error + 'static> RuntimeError<E> {
    /// Wrap a driver error.
    pub fn driver(error: E) -> Self {
        Self::Driver(error)
    }
}
