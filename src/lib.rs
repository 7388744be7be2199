//! # keyed-sync
//!
//! Keyed reconciliation of swapped markup trees.
//!
//! Hypermedia-style apps replace whole subtrees at a time, while external
//! imperative objects (map markers, chart series, ...) must mirror what the
//! tree contains without being rebuilt on every swap. keyed-sync observes a
//! subtree, identifies elements by a key attribute and turns raw mutation
//! bursts into three events:
//!
//! - `add` - keyed elements that are genuinely new
//! - `remove` - keyed elements that are genuinely gone
//! - `change` - the same entity re-rendered with different watched attributes
//!
//! ## Architecture
//!
//! ```text
//! tree::Node mutations → MutationObserver → Scheduler → DiffEngine → Dispatcher → handlers
//! ```
//!
//! Everything is single-threaded. Mutation records are delivered when the host
//! calls [`tree::deliver_mutations`]; batched reconcilers flush when the host
//! calls [`frame::run_frame`].
//!
//! Connection state is exposed as a [spark-signals](https://github.com/RLabs-Inc/spark-signals)
//! `Signal`, and [`Mirror`] keeps its live keys in a `ReactiveSet`.
//!
//! ## Modules
//!
//! - [`tree`] - Observed node tree, mutation observers, markup parsing
//! - [`frame`] - Frame clock for batched flushing
//! - [`reconcile`] - Key extraction, diffing, dispatch, scheduling, [`Reconciler`]
//! - [`mirror`] - Plain-data registry driven by a reconciler
//! - [`types`] - Event payloads
//! - [`error`] - Error types

pub mod error;
pub mod frame;
pub mod mirror;
pub mod reconcile;
pub mod tree;
pub mod types;

// Re-export commonly used items
pub use types::*;

pub use error::{
    ConfigurationError, Error, HandlerError, HandlerResult, MarkupError, Result, SubscriptionError,
    TreeError,
};

pub use mirror::{EntitySnapshot, Mirror};

pub use reconcile::{HandlerId, Options, Reconciler, Subscription};

pub use tree::{deliver_mutations, Node, NodeType};

pub use frame::{cancel_frame, request_frame, run_frame, FrameId};
