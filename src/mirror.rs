//! Mirror - Plain-data registry kept in sync with a reconciler.
//!
//! The typical consumer of add/remove/change events: an external registry
//! keyed by entity that must track the tree without holding on to nodes.
//! Each entity is a snapshot of its watched attribute values.
//!
//! A `change` refreshes the entity from the node that carries its key in the
//! observed tree when the event is handled. Direct changes may name a node
//! that was replaced or removed in the same flush, so the event's own values
//! are used only once the root is gone.
//!
//! Live keys are also kept in a [`ReactiveSet`], so deriveds and effects
//! that iterate over it re-run when entities come and go.
//!
//! # Example
//!
//! ```ignore
//! let reconciler = Reconciler::create(&root, Options::new("data-id").with_watch(["data-lat"]))?;
//! let mirror = Mirror::attach(&reconciler)?;
//! reconciler.scan();
//!
//! assert_eq!(mirror.keys(), vec!["1", "2"]);
//! println!("{}", mirror.to_json()?);
//! ```

use std::cell::{Ref, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use serde::Serialize;
use spark_signals::{batch, ReactiveSet};

use crate::error::SubscriptionError;
use crate::reconcile::{collect_keyed_descendants, Reconciler, Subscription};
use crate::tree::{Node, WeakNode};

/// Watched attribute values of one entity. `None` is an absent attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitySnapshot {
    pub key: String,
    pub attributes: BTreeMap<String, Option<String>>,
}

impl EntitySnapshot {
    fn capture(node: &Node, key: &str, watch: &[String]) -> Self {
        Self {
            key: key.to_string(),
            attributes: watch
                .iter()
                .map(|name| (name.clone(), node.get_attribute(name)))
                .collect(),
        }
    }
}

struct MirrorState {
    root: WeakNode,
    key: String,
    watch: Vec<String>,
    entities: RefCell<BTreeMap<String, EntitySnapshot>>,
    keys: RefCell<ReactiveSet<String>>,
}

impl MirrorState {
    /// Keyed nodes currently under the root, by key. `None` once the root is dropped.
    fn live_nodes(&self) -> Option<HashMap<String, Node>> {
        let root = self.root.upgrade()?;
        Some(
            collect_keyed_descendants(&root, &self.key)
                .into_iter()
                .filter_map(|node| Some((node.get_attribute(&self.key)?, node)))
                .collect(),
        )
    }

    /// Apply key membership changes to the reactive set. Runs after the
    /// entity map is released, so reactions may read the mirror.
    fn publish(&self, inserted: &[&str], removed: &[&str]) {
        batch(|| {
            let mut keys = self.keys.borrow_mut();
            for key in inserted {
                keys.insert((*key).to_string());
            }
            for key in removed {
                keys.remove(*key);
            }
        });
    }
}

pub struct Mirror {
    state: Rc<MirrorState>,
    subscriptions: Vec<Subscription>,
}

impl Mirror {
    /// Subscribe to all three events of `reconciler`.
    pub fn attach(reconciler: &Reconciler) -> Result<Self, SubscriptionError> {
        let state = Rc::new(MirrorState {
            root: reconciler.root().map(|root| root.downgrade()).unwrap_or_default(),
            key: reconciler.key().to_string(),
            watch: reconciler.watch().to_vec(),
            entities: RefCell::new(BTreeMap::new()),
            keys: RefCell::new(ReactiveSet::new()),
        });

        let on_add = {
            let state = state.clone();
            reconciler.on_add(move |entries| {
                {
                    let mut entities = state.entities.borrow_mut();
                    for entry in entries {
                        let snapshot = EntitySnapshot::capture(&entry.node, &entry.key, &state.watch);
                        entities.insert(entry.key.clone(), snapshot);
                    }
                }
                let added: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
                state.publish(&added, &[]);
                Ok(())
            })?
        };

        let on_remove = {
            let state = state.clone();
            reconciler.on_remove(move |entries| {
                {
                    let mut entities = state.entities.borrow_mut();
                    for entry in entries {
                        entities.remove(&entry.key);
                    }
                }
                let removed: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
                state.publish(&[], &removed);
                Ok(())
            })?
        };

        let on_change = {
            let state = state.clone();
            reconciler.on_change(move |changes| {
                let live = state.live_nodes();
                let mut entities = state.entities.borrow_mut();
                for change in changes {
                    // Entities removed in the same flush stay removed.
                    let Some(snapshot) = entities.get_mut(&change.key) else {
                        continue;
                    };
                    match &live {
                        Some(nodes) => {
                            if let Some(node) = nodes.get(&change.key) {
                                *snapshot = EntitySnapshot::capture(node, &change.key, &state.watch);
                            }
                        }
                        None => {
                            snapshot
                                .attributes
                                .insert(change.attribute.clone(), change.to.clone());
                        }
                    }
                }
                Ok(())
            })?
        };

        Ok(Self {
            state,
            subscriptions: vec![on_add, on_remove, on_change],
        })
    }

    /// Live keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.state.entities.borrow().keys().cloned().collect()
    }

    pub fn get(&self, key: &str) -> Option<EntitySnapshot> {
        self.state.entities.borrow().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.entities.borrow().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.state.entities.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reactive view of the live keys.
    pub fn live_keys(&self) -> Ref<'_, ReactiveSet<String>> {
        self.state.keys.borrow()
    }

    /// Every entity as a JSON array, sorted by key.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let entities = self.state.entities.borrow();
        serde_json::to_string(&entities.values().collect::<Vec<_>>())
    }

    /// Unsubscribe. The snapshot taken so far stays readable.
    pub fn detach(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
    }

    pub fn is_attached(&self) -> bool {
        !self.subscriptions.is_empty()
    }
}

impl std::fmt::Debug for Mirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mirror")
            .field("entities", &self.len())
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame;
    use crate::reconcile::Options;
    use crate::tree::{deliver_mutations, reset_mutation_queue};
    use spark_signals::effect_sync;

    fn setup() -> (Node, Reconciler, Mirror) {
        reset_mutation_queue();
        frame::reset_frames();
        let root = Node::element("ul");
        let reconciler = Reconciler::create(&root, Options::new("data-id").with_watch(["data-v"])).unwrap();
        let mirror = Mirror::attach(&reconciler).unwrap();
        (root, reconciler, mirror)
    }

    #[test]
    fn test_tracks_add_change_remove() {
        let (root, _reconciler, mirror) = setup();

        root.set_inner_markup(r#"<li data-id="1" data-v="a"></li><li data-id="2"></li>"#).unwrap();
        deliver_mutations();
        assert_eq!(mirror.keys(), vec!["1", "2"]);
        assert!(mirror.live_keys().contains(&"1".to_string()));
        assert_eq!(
            mirror.get("2").map(|s| s.attributes),
            Some(BTreeMap::from([("data-v".to_string(), None)]))
        );

        root.set_inner_markup(r#"<li data-id="1" data-v="b"></li>"#).unwrap();
        deliver_mutations();
        assert_eq!(mirror.keys(), vec!["1"]);
        assert!(!mirror.live_keys().contains(&"2".to_string()));
        assert_eq!(
            mirror.get("1").and_then(|s| s.attributes.get("data-v").cloned().flatten()),
            Some("b".to_string())
        );
    }

    #[test]
    fn test_to_json() {
        let (root, reconciler, mirror) = setup();
        root.append_child(&Node::element("li").with_attribute("data-id", "7").with_attribute("data-v", "x"))
            .unwrap();
        deliver_mutations();
        drop(reconciler);

        let json: serde_json::Value = serde_json::from_str(&mirror.to_json().unwrap()).unwrap();
        assert_eq!(json, serde_json::json!([{"key": "7", "attributes": {"data-v": "x"}}]));
    }

    #[test]
    fn test_detach_stops_updates() {
        let (root, reconciler, mut mirror) = setup();
        mirror.detach();
        assert!(!mirror.is_attached());
        assert_eq!(reconciler.handler_count(crate::types::EventType::Add), 0);

        root.append_child(&Node::element("li").with_attribute("data-id", "1")).unwrap();
        deliver_mutations();
        assert!(mirror.is_empty());
    }

    #[test]
    fn test_effect_reads_mirror_while_it_updates() {
        let (root, _reconciler, mirror) = setup();
        let mirror = Rc::new(mirror);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let stop = {
            let mirror = mirror.clone();
            let seen = seen.clone();
            effect_sync(move || {
                let live = mirror.live_keys().len();
                seen.borrow_mut().push((live, mirror.len()));
            })
        };

        root.set_inner_markup(r#"<li data-id="1"></li><li data-id="2"></li>"#).unwrap();
        deliver_mutations();
        assert_eq!(mirror.keys(), vec!["1", "2"]);
        assert_eq!(seen.borrow().last(), Some(&(2, 2)));

        root.set_inner_markup(r#"<li data-id="2"></li>"#).unwrap();
        deliver_mutations();
        assert_eq!(mirror.keys(), vec!["2"]);
        assert_eq!(seen.borrow().last(), Some(&(1, 1)));

        stop();
    }

    #[test]
    fn test_change_refreshes_from_current_node() {
        reset_mutation_queue();
        frame::reset_frames();
        let root = Node::element("ul");
        let options = Options::new("data-id").with_watch(["data-v"]).with_batch(true);
        let reconciler = Reconciler::create(&root, options).unwrap();
        let mirror = Mirror::attach(&reconciler).unwrap();

        root.set_inner_markup(r#"<li data-id="1" data-v="0"></li>"#).unwrap();
        deliver_mutations();
        frame::run_frame();

        // Replaced, edited, then replaced by a node matching the first one.
        root.set_inner_markup(r#"<li data-id="1" data-v="1"></li>"#).unwrap();
        deliver_mutations();
        root.children()[0].set_attribute("data-v", "2").unwrap();
        deliver_mutations();
        root.set_inner_markup(r#"<li data-id="1" data-v="0"></li>"#).unwrap();
        deliver_mutations();
        frame::run_frame();

        assert_eq!(
            mirror.get("1").and_then(|s| s.attributes.get("data-v").cloned().flatten()),
            Some("0".to_string())
        );
    }

    #[test]
    fn test_change_with_removal_does_not_resurrect() {
        let (root, _reconciler, mirror) = setup();
        let item = Node::element("li").with_attribute("data-id", "1").with_attribute("data-v", "a");
        root.append_child(&item).unwrap();
        deliver_mutations();

        item.set_attribute("data-v", "b").unwrap();
        item.remove();
        deliver_mutations();
        assert!(mirror.is_empty());
        assert!(!mirror.live_keys().contains("1"));
    }
}
