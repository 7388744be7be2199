//! Reconciler - Observe a root and emit keyed add/remove/change events.
//!
//! # Example
//!
//! ```ignore
//! use keyed_sync::{frame, tree, Options, Reconciler};
//!
//! let root = tree::Node::element("ul");
//! let reconciler = Reconciler::create(&root, Options::new("data-id").with_watch(["data-v"]))?;
//!
//! reconciler.on_add(|entries| {
//!     for entry in entries {
//!         println!("add {}", entry.key);
//!     }
//!     Ok(())
//! })?;
//! reconciler.scan(); // existing children
//!
//! root.set_inner_markup(r#"<li data-id="1" data-v="a"></li>"#)?;
//! tree::deliver_mutations(); // prints "add 1"
//! ```

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use spark_signals::{signal, Signal};
use tracing::debug;

use super::diff::{DiffEngine, Reconciliation};
use super::dispatch::{Dispatcher, HandlerId, Subscription};
use super::extract::{collect_keyed_descendants, keyed_entries};
use super::observer::TreeObserver;
use super::options::Options;
use super::scheduler::{FlushMode, Scheduler};
use crate::error::{ConfigurationError, HandlerResult, SubscriptionError};
use crate::tree::{MutationRecord, Node, WeakNode};
use crate::types::{AttributeChange, Event, EventType, KeyedEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Active,
    Disconnected,
}

struct Inner {
    root: WeakNode,
    engine: DiffEngine,
    dispatcher: Dispatcher,
    scheduler: Scheduler,
    observer: RefCell<Option<TreeObserver>>,
    state: Cell<State>,
    connected: Signal<bool>,
}

impl Inner {
    fn is_active(&self) -> bool {
        self.state.get() == State::Active
    }

    fn on_burst(self: &Rc<Self>, records: Vec<MutationRecord>) {
        if !self.is_active() {
            return;
        }
        let weak = Rc::downgrade(self);
        let on_frame = move || {
            if let Some(inner) = weak.upgrade() {
                let records = inner.scheduler.take_pending();
                inner.flush(&records);
            }
        };
        if let Some(records) = self.scheduler.admit(records, on_frame) {
            self.flush(&records);
        }
    }

    fn flush(&self, records: &[MutationRecord]) {
        if !self.is_active() || records.is_empty() {
            return;
        }
        let result = self.engine.diff(records);
        debug!(
            records = records.len(),
            added = result.added.len(),
            removed = result.removed.len(),
            changed = result.changed.len(),
            "flush"
        );
        self.emit_all(result);
    }

    fn emit_all(&self, result: Reconciliation) {
        let Reconciliation {
            added,
            removed,
            changed,
        } = result;
        if !added.is_empty() && self.is_active() {
            self.dispatcher.emit(&Event::Add(&added));
        }
        if !removed.is_empty() && self.is_active() {
            self.dispatcher.emit(&Event::Remove(&removed));
        }
        if !changed.is_empty() && self.is_active() {
            self.dispatcher.emit(&Event::Change(&changed));
        }
    }

    fn disconnect(&self) {
        if self.state.replace(State::Disconnected) == State::Disconnected {
            return;
        }
        if let Some(observer) = self.observer.borrow_mut().take() {
            observer.disconnect();
        }
        self.scheduler.cancel();
        self.dispatcher.clear();
        self.connected.set(false);
        debug!(key = self.engine.key(), "disconnected");
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Keyed reconciliation of one observed root.
///
/// Clones share the same instance. The instance disconnects when the last
/// clone is dropped or when [`Reconciler::disconnect`] is called. A handler
/// that captures a clone keeps the instance alive until `disconnect`.
#[derive(Clone)]
pub struct Reconciler {
    inner: Rc<Inner>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("key", &self.inner.engine.key())
            .field("watch", &self.inner.engine.watch())
            .field("mode", &self.inner.scheduler.mode())
            .field("state", &self.inner.state.get())
            .finish()
    }
}

impl Reconciler {
    /// Start observing `root`.
    ///
    /// Fails when `root` is not an element or the key is blank.
    pub fn create(root: &Node, options: Options) -> Result<Self, ConfigurationError> {
        if !root.is_element() {
            return Err(ConfigurationError::InvalidRoot);
        }
        options.validate()?;
        let flush_mode = options.flush_mode();
        let Options { key, watch, .. } = options;

        let inner = Rc::new_cyclic(|weak: &Weak<Inner>| {
            let weak = weak.clone();
            let observer = TreeObserver::observe(root, &watch, move |records| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_burst(records);
                }
            });
            Inner {
                root: root.downgrade(),
                engine: DiffEngine::new(key, watch),
                dispatcher: Dispatcher::new(),
                scheduler: Scheduler::new(flush_mode),
                observer: RefCell::new(Some(observer)),
                state: Cell::new(State::Active),
                connected: signal(true),
            }
        });

        debug!(key = inner.engine.key(), watch = ?inner.engine.watch(), mode = ?flush_mode, "reconciler created");
        Ok(Self { inner })
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Subscribe to `"add"`, `"remove"` or `"change"`.
    pub fn on<F>(&self, event: &str, handler: F) -> Result<Subscription, SubscriptionError>
    where
        F: Fn(&Event<'_>) -> HandlerResult + 'static,
    {
        if !self.inner.is_active() {
            return Err(SubscriptionError::Disconnected);
        }
        let event_type: EventType = event.parse()?;
        Ok(self.inner.dispatcher.on(event_type, handler))
    }

    pub fn on_add<F>(&self, handler: F) -> Result<Subscription, SubscriptionError>
    where
        F: Fn(&[KeyedEntry]) -> HandlerResult + 'static,
    {
        self.on(EventType::Add.as_str(), move |event| handler(event.entries()))
    }

    pub fn on_remove<F>(&self, handler: F) -> Result<Subscription, SubscriptionError>
    where
        F: Fn(&[KeyedEntry]) -> HandlerResult + 'static,
    {
        self.on(EventType::Remove.as_str(), move |event| handler(event.entries()))
    }

    pub fn on_change<F>(&self, handler: F) -> Result<Subscription, SubscriptionError>
    where
        F: Fn(&[AttributeChange]) -> HandlerResult + 'static,
    {
        self.on(EventType::Change.as_str(), move |event| handler(event.changes()))
    }

    /// Remove a handler. Unknown event names and ids are ignored.
    pub fn off(&self, event: &str, id: HandlerId) -> bool {
        match event.parse::<EventType>() {
            Ok(event_type) => self.inner.dispatcher.off(event_type, id),
            Err(_) => false,
        }
    }

    pub fn handler_count(&self, event_type: EventType) -> usize {
        self.inner.dispatcher.handler_count(event_type)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Emit one `add` for every keyed descendant of the root, in document order.
    ///
    /// Nothing is emitted when there are none, the root was dropped or the
    /// reconciler is disconnected.
    pub fn scan(&self) {
        if !self.inner.is_active() {
            return;
        }
        let Some(root) = self.inner.root.upgrade() else {
            return;
        };
        let key = self.inner.engine.key();
        let entries = keyed_entries(collect_keyed_descendants(&root, key), key);
        debug!(entries = entries.len(), "scan");
        if !entries.is_empty() {
            self.inner.dispatcher.emit(&Event::Add(&entries));
        }
    }

    /// Stop observing, cancel any pending frame, drop queued bursts and
    /// remove every handler. Idempotent.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_active()
    }

    /// Connection state as a signal, for reactive consumers.
    pub fn connected_signal(&self) -> Signal<bool> {
        self.inner.connected.clone()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn key(&self) -> &str {
        self.inner.engine.key()
    }

    pub fn watch(&self) -> &[String] {
        self.inner.engine.watch()
    }

    pub fn flush_mode(&self) -> FlushMode {
        self.inner.scheduler.mode()
    }

    pub fn root(&self) -> Option<Node> {
        self.inner.root.upgrade()
    }

    /// Bursts waiting for the next frame.
    pub fn pending_bursts(&self) -> usize {
        self.inner.scheduler.pending_bursts()
    }
}

// =============================================================================
// Tests
// =============================================================================
