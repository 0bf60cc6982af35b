//! Ordered handler registries with failure isolation.

use std::panic::{self, AssertUnwindSafe};

use crate::error::HandlerError;

/// Boxed handler callback.
pub type Handler<T> = Box<dyn FnMut(&T) -> Result<(), HandlerError> + Send>;

/// Identity of a registered handler, returned by `add` and accepted by
/// `remove`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

/// Source of [`HandlerId`]s.
///
/// Registries that share one source hand out distinct ids, so removing an id
/// from the wrong registry is a no-op rather than removing someone else's
/// handler.
#[derive(Debug, Default)]
pub struct HandlerIds {
    next: u64,
}

impl HandlerIds {
    /// Fresh source starting at 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id.
    pub fn next_id(&mut self) -> HandlerId {
        self.next += 1;
        HandlerId(self.next)
    }
}

/// Handlers for one notification kind, invoked in registration order.
///
/// A handler that returns an error or panics is logged and skipped; the
/// remaining handlers still run.
pub struct HandlerRegistry<T> {
    name: &'static str,
    handlers: Vec<(HandlerId, Handler<T>)>,
}

impl<T> HandlerRegistry<T> {
    /// Create an empty registry. `name` labels log lines.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self { name, handlers: Vec::new() }
    }

    /// Append a handler under an id drawn from `ids`.
    pub fn add<F>(&mut self, ids: &mut HandlerIds, handler: F) -> HandlerId
    where
        F: FnMut(&T) -> Result<(), HandlerError> + Send + 'static,
    {
        let id = ids.next_id();
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Remove a handler by identity. Returns false if it was not registered.
    pub fn remove(&mut self, id: HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(existing, _)| *existing != id);
        self.handlers.len() != before
    }

    /// Whether `id` is registered here.
    #[must_use]
    pub fn contains(&self, id: HandlerId) -> bool {
        self.handlers.iter().any(|(existing, _)| *existing == id)
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Invoke every handler with `value`, in registration order.
    ///
    /// Returns how many handlers failed.
    pub fn notify(&mut self, value: &T) -> usize {
        let name = self.name;
        let mut failures = 0;

        for (id, handler) in &mut self.handlers {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(value))) {
                Ok(Ok(())) => {},
                Ok(Err(error)) => {
                    failures += 1;
                    tracing::warn!(registry = name, handler = id.0, %error, "handler failed");
                },
                Err(_) => {
                    failures += 1;
                    tracing::error!(registry = name, handler = id.0, "handler panicked");
                },
            }
        }

        failures
    }
}

impl<T> std::fmt::Debug for HandlerRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("name", &self.name)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
