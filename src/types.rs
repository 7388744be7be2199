//! Core types for keyed-sync.
//!
//! These are the payloads handed to subscribers. They hold live node handles
//! for inspection; the key is read from the node when the entry is built.

use std::fmt;
use std::str::FromStr;

use crate::error::SubscriptionError;
use crate::tree::Node;

// =============================================================================
// Payloads
// =============================================================================

/// A node carrying the key attribute, paired with the key's value.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedEntry {
    pub node: Node,
    pub key: String,
}

impl KeyedEntry {
    pub fn new(node: Node, key: impl Into<String>) -> Self {
        Self {
            node,
            key: key.into(),
        }
    }
}

/// A watched attribute whose value differs for one logical entity.
///
/// `from` and `to` are `None` when the attribute is absent. An absent
/// attribute is never equal to an empty one.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeChange {
    /// The entity's current node.
    pub node: Node,
    pub key: String,
    pub attribute: String,
    pub from: Option<String>,
    pub to: Option<String>,
}

// =============================================================================
// Event Types
// =============================================================================

/// The three event kinds a reconciler emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Add,
    Remove,
    Change,
}

impl EventType {
    /// All event types, in emission order.
    pub const fn all() -> [EventType; 3] {
        [EventType::Add, EventType::Remove, EventType::Change]
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            EventType::Add => "add",
            EventType::Remove => "remove",
            EventType::Change => "change",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = SubscriptionError;

    /// Exact, case-sensitive match.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(EventType::Add),
            "remove" => Ok(EventType::Remove),
            "change" => Ok(EventType::Change),
            other => Err(SubscriptionError::InvalidEvent(other.to_string())),
        }
    }
}

/// One emission, borrowed for the duration of the handler call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event<'a> {
    Add(&'a [KeyedEntry]),
    Remove(&'a [KeyedEntry]),
    Change(&'a [AttributeChange]),
}

impl<'a> Event<'a> {
    pub fn event_type(&self) -> EventType {
        match self {
            Event::Add(_) => EventType::Add,
            Event::Remove(_) => EventType::Remove,
            Event::Change(_) => EventType::Change,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Event::Add(entries) | Event::Remove(entries) => entries.len(),
            Event::Change(changes) => changes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries of an `add` or `remove` event; empty for `change`.
    pub fn entries(&self) -> &'a [KeyedEntry] {
        match *self {
            Event::Add(entries) | Event::Remove(entries) => entries,
            Event::Change(_) => &[],
        }
    }

    /// Changes of a `change` event; empty otherwise.
    pub fn changes(&self) -> &'a [AttributeChange] {
        match *self {
            Event::Change(changes) => changes,
            _ => &[],
        }
    }
}
