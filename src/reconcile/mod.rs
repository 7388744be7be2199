//! Reconcile Module - From raw mutation bursts to keyed events.
//!
//! Data flows one way:
//!
//! ```text
//! Tree → records → TreeObserver → Scheduler → DiffEngine (extract) → Dispatcher → handlers
//! ```
//!
//! - [`extract`] - Key extraction over nodes and subtrees
//! - [`diff`] - Classification into add/remove/change
//! - [`dispatch`] - Handler registry with isolated failures
//! - [`scheduler`] - Immediate or once-per-frame flushing
//! - [`observer`] - The mutation observer registration
//! - [`Reconciler`] - The public facade

pub mod diff;
pub mod dispatch;
pub mod extract;
pub mod observer;
mod options;
mod reconciler;
pub mod scheduler;

pub use diff::{DiffEngine, Reconciliation};
pub use dispatch::{Dispatcher, EventHandler, HandlerId, Subscription};
pub use extract::{collect_keyed, collect_keyed_descendants};
pub use observer::TreeObserver;
pub use options::Options;
pub use reconciler::Reconciler;
pub use scheduler::{FlushMode, Scheduler};
