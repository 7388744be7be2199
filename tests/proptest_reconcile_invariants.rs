//! Property-based invariants for reconciliation.
//!
//! For any sequence of swaps, appends, removals and attribute edits (with
//! unique keys):
//!
//! 1. A mirror fed by add/remove/change holds exactly the keyed nodes of the
//!    final tree, with their current watched values.
//! 2. The same holds when bursts are batched per frame.
//! 3. Cumulative adds minus cumulative removes equals the live key count.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

use keyed_sync::reconcile::collect_keyed_descendants;
use keyed_sync::tree::{deliver_mutations, reset_mutation_queue, Node};
use keyed_sync::{frame, Mirror, Options, Reconciler};
use proptest::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    /// Replace all content with these (key, value) items.
    Swap(BTreeMap<u8, u8>),
    Append(u8, u8),
    Remove(u8),
    Set(u8, u8),
    /// Run a frame (only matters when batching).
    Frame,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        proptest::collection::btree_map(0u8..8, 0u8..3, 0..6).prop_map(Op::Swap),
        (0u8..8, 0u8..3).prop_map(|(k, v)| Op::Append(k, v)),
        (0u8..8).prop_map(Op::Remove),
        (0u8..8, 0u8..3).prop_map(|(k, v)| Op::Set(k, v)),
        Just(Op::Frame),
    ]
}

fn find(root: &Node, key: u8) -> Option<Node> {
    let key = key.to_string();
    collect_keyed_descendants(root, "data-id")
        .into_iter()
        .find(|n| n.get_attribute("data-id").as_deref() == Some(key.as_str()))
}

fn apply(root: &Node, op: &Op) {
    match op {
        Op::Swap(items) => {
            let markup: String = items
                .iter()
                .map(|(k, v)| format!(r#"<li data-id="{k}" data-v="{v}"><span>{k}</span></li>"#))
                .collect();
            root.set_inner_markup(&markup).unwrap();
        }
        Op::Append(k, v) => {
            if find(root, *k).is_none() {
                let node = Node::element("li")
                    .with_attribute("data-id", k.to_string())
                    .with_attribute("data-v", v.to_string());
                root.append_child(&node).unwrap();
            }
        }
        Op::Remove(k) => {
            if let Some(node) = find(root, *k) {
                node.remove();
            }
        }
        Op::Set(k, v) => {
            if let Some(node) = find(root, *k) {
                node.set_attribute("data-v", v.to_string()).unwrap();
            }
        }
        Op::Frame => {
            frame::run_frame();
        }
    }
    deliver_mutations();
}

/// Keyed nodes of the tree as key → data-v.
fn tree_state(root: &Node) -> BTreeMap<String, Option<String>> {
    collect_keyed_descendants(root, "data-id")
        .into_iter()
        .filter_map(|n| Some((n.get_attribute("data-id")?, n.get_attribute("data-v"))))
        .collect()
}

fn mirror_state(mirror: &Mirror) -> BTreeMap<String, Option<String>> {
    mirror
        .keys()
        .into_iter()
        .filter_map(|key| {
            let snapshot = mirror.get(&key)?;
            let value = snapshot.attributes.get("data-v").cloned().flatten();
            Some((key, value))
        })
        .collect()
}

fn run(ops: &[Op], batch: bool) -> (BTreeMap<String, Option<String>>, BTreeMap<String, Option<String>>, i64, usize) {
    reset_mutation_queue();
    frame::reset_frames();

    let root = Node::element("ul");
    let reconciler =
        Reconciler::create(&root, Options::new("data-id").with_watch(["data-v"]).with_batch(batch)).unwrap();
    let mirror = Mirror::attach(&reconciler).unwrap();

    let balance = Rc::new(Cell::new(0i64));
    let adds = balance.clone();
    reconciler
        .on_add(move |entries| {
            adds.set(adds.get() + entries.len() as i64);
            Ok(())
        })
        .unwrap();
    let removes = balance.clone();
    reconciler
        .on_remove(move |entries| {
            removes.set(removes.get() - entries.len() as i64);
            Ok(())
        })
        .unwrap();

    for op in ops {
        apply(&root, op);
    }
    frame::run_frame();

    let live = mirror.live_keys().len();
    (tree_state(&root), mirror_state(&mirror), balance.get(), live)
}

// ═════════════════════════════════════════════════════════════════════════
// 1-3. Mirror tracks the tree
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn mirror_matches_tree(ops in proptest::collection::vec(op_strategy(), 1..24)) {
        let (tree, mirror, balance, live) = run(&ops, false);
        prop_assert_eq!(&mirror, &tree);
        prop_assert_eq!(balance, tree.len() as i64);
        prop_assert_eq!(live, tree.len());
    }

    #[test]
    fn batched_mirror_matches_tree(ops in proptest::collection::vec(op_strategy(), 1..24)) {
        let (tree, mirror, balance, live) = run(&ops, true);
        prop_assert_eq!(&mirror, &tree);
        prop_assert_eq!(balance, tree.len() as i64);
        prop_assert_eq!(live, tree.len());
    }
}
