//! Event Dispatcher - Per-event handler registry.
//!
//! Handlers run in registration order. Emission iterates over a snapshot of
//! the handler list, so subscribing or unsubscribing from inside a handler
//! takes effect from the next emission.
//!
//! A handler that returns `Err` or panics is logged and skipped; the
//! remaining handlers still run and nothing propagates to the code that
//! mutated the tree.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use tracing::error;

use crate::error::HandlerResult;
use crate::types::{Event, EventType};

/// Shared handler function.
pub type EventHandler = Rc<dyn Fn(&Event<'_>) -> HandlerResult>;

/// Identifies one registered handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(usize);

struct HandlerRegistry {
    handlers: HashMap<EventType, Vec<(HandlerId, EventHandler)>>,
    next_id: usize,
}

impl HandlerRegistry {
    fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            next_id: 0,
        }
    }

    fn next_id(&mut self) -> HandlerId {
        let id = self.next_id;
        self.next_id += 1;
        HandlerId(id)
    }

    fn remove(&mut self, event_type: EventType, id: HandlerId) -> bool {
        let Some(handlers) = self.handlers.get_mut(&event_type) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            self.handlers.remove(&event_type);
        }
        removed
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Handle to one registered handler.
///
/// Dropping it leaves the handler registered; call [`Subscription::unsubscribe`].
#[derive(Clone, Debug)]
pub struct Subscription {
    event_type: EventType,
    id: HandlerId,
    registry: Weak<RefCell<HandlerRegistry>>,
}

impl Subscription {
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Remove the handler. Returns false if it was already removed.
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.borrow_mut().remove(self.event_type, self.id),
            None => false,
        }
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handlers.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

#[derive(Debug)]
pub struct Dispatcher {
    registry: Rc<RefCell<HandlerRegistry>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            registry: Rc::new(RefCell::new(HandlerRegistry::new())),
        }
    }

    /// Register `handler` for `event_type`.
    pub fn on<F>(&self, event_type: EventType, handler: F) -> Subscription
    where
        F: Fn(&Event<'_>) -> HandlerResult + 'static,
    {
        let id = {
            let mut registry = self.registry.borrow_mut();
            let id = registry.next_id();
            registry
                .handlers
                .entry(event_type)
                .or_default()
                .push((id, Rc::new(handler)));
            id
        };
        Subscription {
            event_type,
            id,
            registry: Rc::downgrade(&self.registry),
        }
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn off(&self, event_type: EventType, id: HandlerId) -> bool {
        self.registry.borrow_mut().remove(event_type, id)
    }

    /// Remove every handler.
    pub fn clear(&self) {
        self.registry.borrow_mut().handlers.clear();
    }

    pub fn handler_count(&self, event_type: EventType) -> usize {
        self.registry
            .borrow()
            .handlers
            .get(&event_type)
            .map_or(0, Vec::len)
    }

    /// Invoke every handler registered for the event's type.
    ///
    /// Returns the number of handlers that failed.
    pub fn emit(&self, event: &Event<'_>) -> usize {
        let event_type = event.event_type();
        let snapshot: Vec<(HandlerId, EventHandler)> = self
            .registry
            .borrow()
            .handlers
            .get(&event_type)
            .cloned()
            .unwrap_or_default();

        let mut failures = 0;
        for (id, handler) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failures += 1;
                    error!(event = %event_type, handler = ?id, error = %err, "event handler failed");
                }
                Err(payload) => {
                    failures += 1;
                    error!(
                        event = %event_type,
                        handler = ?id,
                        error = panic_message(payload.as_ref()),
                        "event handler panicked"
                    );
                }
            }
        }
        failures
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

// =============================================================================
// Tests
// =============================================================================
