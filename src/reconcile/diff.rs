//! Diff Engine - Classify mutation records into add, remove and change.
//!
//! Records are replayed in order while tracking, per key, the entity's
//! lineage: the node it had before the records (`before`) and the node it has
//! after them (`after`).
//!
//! | before | after | result                                   |
//! |--------|-------|------------------------------------------|
//! | none   | some  | add                                      |
//! | some   | none  | remove                                   |
//! | some   | some  | change for each watched attribute that differs |
//! | none   | none  | nothing (added and removed again)        |
//!
//! Within one child-list record removals are replayed before additions, so a
//! bulk swap that removes `<li data-id=1>` and inserts a fresh
//! `<li data-id=1>` is one entity whose node was replaced. Several records
//! (several bursts, when batching) collapse the same way: a remove in one
//! burst followed by a re-add in the next is a swap, not a remove plus add.
//!
//! Each direct attribute record on a keyed element becomes one change on its
//! own, from the record's old value to the element's current value. It is
//! reported even when the same records also remove or replace the element.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use super::extract::{collect_keyed, keyed_entries};
use crate::tree::{MutationKind, MutationRecord, Node};
use crate::types::{AttributeChange, KeyedEntry};

/// Outcome of one diff pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    pub added: Vec<KeyedEntry>,
    pub removed: Vec<KeyedEntry>,
    pub changed: Vec<AttributeChange>,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// One key's history across the replayed records.
struct Lineage {
    key: String,
    before: Option<Node>,
    after: Option<Node>,
    /// Nodes inserted under this key during the replay.
    inserted: HashSet<Node>,
    first_added: usize,
    first_removed: usize,
}

impl Lineage {
    fn new(key: String) -> Self {
        Self {
            key,
            before: None,
            after: None,
            inserted: HashSet::new(),
            first_added: usize::MAX,
            first_removed: usize::MAX,
        }
    }

    fn removed(&mut self, node: Node, seq: usize) {
        if self.after.as_ref() == Some(&node) {
            self.after = None;
        }
        // Only a node that existed before the replay can be the old node.
        if self.before.is_none() && !self.inserted.contains(&node) {
            self.before = Some(node);
            self.first_removed = seq;
        }
    }

    fn added(&mut self, node: Node, seq: usize) {
        if self.first_added == usize::MAX {
            self.first_added = seq;
        }
        self.inserted.insert(node.clone());
        self.after = Some(node);
    }
}

/// Classifies mutation records for one key attribute and watch list.
#[derive(Debug, Clone)]
pub struct DiffEngine {
    key: String,
    watch: Vec<String>,
}

impl DiffEngine {
    pub fn new(key: impl Into<String>, watch: Vec<String>) -> Self {
        Self {
            key: key.into(),
            watch,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn watch(&self) -> &[String] {
        &self.watch
    }

    fn is_watched(&self, attribute: &str) -> bool {
        self.watch.iter().any(|w| w == attribute)
    }

    /// Keyed entries under `nodes`, warning when two different nodes share a key.
    fn extract(&self, nodes: &[Node]) -> Vec<KeyedEntry> {
        let entries = keyed_entries(collect_keyed(nodes, &self.key), &self.key);
        let mut seen: HashMap<&str, &Node> = HashMap::with_capacity(entries.len());
        for entry in &entries {
            if let Some(previous) = seen.insert(entry.key.as_str(), &entry.node) {
                if *previous != entry.node {
                    warn!(key = %entry.key, attribute = %self.key, "duplicate key, last node wins");
                }
            }
        }
        entries
    }

    /// Classify `records`, in the order they were recorded.
    pub fn diff(&self, records: &[MutationRecord]) -> Reconciliation {
        let mut lineages: Vec<Lineage> = Vec::new();
        let mut by_key: HashMap<String, usize> = HashMap::new();
        let mut result = Reconciliation::default();
        let mut seq = 0;

        let mut lineage = |lineages: &mut Vec<Lineage>, key: &str| -> usize {
            *by_key.entry(key.to_string()).or_insert_with(|| {
                lineages.push(Lineage::new(key.to_string()));
                lineages.len() - 1
            })
        };

        for record in records {
            match &record.kind {
                MutationKind::ChildList { added, removed } => {
                    for entry in self.extract(removed) {
                        let index = lineage(&mut lineages, &entry.key);
                        lineages[index].removed(entry.node, seq);
                        seq += 1;
                    }
                    for entry in self.extract(added) {
                        let index = lineage(&mut lineages, &entry.key);
                        lineages[index].added(entry.node, seq);
                        seq += 1;
                    }
                }
                MutationKind::Attributes { name, old_value } => {
                    if !self.is_watched(name) {
                        continue;
                    }
                    let Some(key) = record.target.get_attribute(&self.key) else {
                        continue;
                    };
                    result.changed.push(AttributeChange {
                        node: record.target.clone(),
                        key,
                        attribute: name.clone(),
                        from: old_value.clone(),
                        to: record.target.get_attribute(name),
                    });
                }
            }
        }

        let mut added: Vec<(usize, KeyedEntry)> = Vec::new();
        let mut removed: Vec<(usize, KeyedEntry)> = Vec::new();
        let mut swapped: Vec<(usize, AttributeChange)> = Vec::new();

        for lineage in &lineages {
            match (&lineage.before, &lineage.after) {
                (None, Some(node)) => {
                    added.push((lineage.first_added, KeyedEntry::new(node.clone(), &lineage.key)));
                }
                (Some(node), None) => {
                    removed.push((lineage.first_removed, KeyedEntry::new(node.clone(), &lineage.key)));
                }
                (Some(old), Some(new)) if old != new => {
                    for attribute in &self.watch {
                        let from = old.get_attribute(attribute);
                        let to = new.get_attribute(attribute);
                        if from != to {
                            swapped.push((
                                lineage.first_added,
                                AttributeChange {
                                    node: new.clone(),
                                    key: lineage.key.clone(),
                                    attribute: attribute.clone(),
                                    from,
                                    to,
                                },
                            ));
                        }
                    }
                }
                _ => {}
            }
        }

        added.sort_by_key(|(seq, _)| *seq);
        removed.sort_by_key(|(seq, _)| *seq);
        swapped.sort_by_key(|(seq, _)| *seq);

        result.added = added.into_iter().map(|(_, e)| e).collect();
        result.removed = removed.into_iter().map(|(_, e)| e).collect();
        result.changed.extend(swapped.into_iter().map(|(_, c)| c));
        result
    }
}
