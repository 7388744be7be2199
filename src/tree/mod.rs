//! Tree Module - The observed node tree.
//!
//! - `node` - Node handles and mutations
//! - `observer` - Mutation records, observers and delivery
//! - [`markup`] - Markup fragment parsing

pub mod markup;
mod node;
mod observer;

pub use markup::parse_fragment;
pub use node::{Node, NodeType, WeakNode};
pub use observer::{
    deliver_mutations, pending_observers, reset_mutation_queue, MutationKind, MutationObserver,
    MutationRecord, ObserveFlags, ObserveOptions,
};
