//! Mutation Observation - Records, observers and delivery.
//!
//! Mutations are recorded synchronously while the tree changes and delivered
//! later, in one burst per observer, when the host calls
//! [`deliver_mutations`]. This is the microtask checkpoint of the tree: an
//! observer never sees a half-applied change.
//!
//! # Matching
//!
//! A mutation on `target` is offered to every registration on `target` and,
//! when the registration has [`ObserveFlags::SUBTREE`], on any ancestor of
//! `target`. Each observer receives at most one record per mutation.
//!
//! # Example
//!
//! ```ignore
//! use keyed_sync::tree::{deliver_mutations, MutationObserver, Node, ObserveOptions};
//!
//! let root = Node::element("div");
//! let observer = MutationObserver::new(|records| {
//!     println!("{} records", records.len());
//! });
//! observer.observe(&root, ObserveOptions::child_list().subtree());
//!
//! root.append_child(&Node::element("p"))?;
//! deliver_mutations(); // prints "1 records"
//! ```

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use bitflags::bitflags;
use tracing::trace;

use super::node::{Node, WeakNode};

// =============================================================================
// Types
// =============================================================================

bitflags! {
    /// What an observer registration listens to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ObserveFlags: u8 {
        /// Child insertions and removals.
        const CHILD_LIST = 1 << 0;
        /// Attribute changes.
        const ATTRIBUTES = 1 << 1;
        /// Also match mutations on descendants of the observed node.
        const SUBTREE = 1 << 2;
        /// Include the previous attribute value in attribute records.
        const ATTRIBUTE_OLD_VALUE = 1 << 3;
    }
}

/// Options for [`MutationObserver::observe`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObserveOptions {
    pub flags: ObserveFlags,
    /// Restrict attribute records to these names. `None` means all attributes.
    pub attribute_filter: Option<Vec<String>>,
}

impl ObserveOptions {
    /// Observe child insertions and removals.
    pub fn child_list() -> Self {
        Self {
            flags: ObserveFlags::CHILD_LIST,
            attribute_filter: None,
        }
    }

    /// Also observe descendants.
    pub fn subtree(mut self) -> Self {
        self.flags |= ObserveFlags::SUBTREE;
        self
    }

    /// Observe the named attributes, with old values.
    pub fn attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags |= ObserveFlags::ATTRIBUTES | ObserveFlags::ATTRIBUTE_OLD_VALUE;
        self.attribute_filter = Some(names.into_iter().map(Into::into).collect());
        self
    }

    // An attribute filter or old-value request implies attribute observation.
    fn normalized(mut self) -> Self {
        if self.attribute_filter.is_some() || self.flags.contains(ObserveFlags::ATTRIBUTE_OLD_VALUE) {
            self.flags |= ObserveFlags::ATTRIBUTES;
        }
        self
    }

    fn wants_attribute(&self, name: &str) -> bool {
        self.flags.contains(ObserveFlags::ATTRIBUTES)
            && self
                .attribute_filter
                .as_ref()
                .is_none_or(|filter| filter.iter().any(|f| f == name))
    }
}

/// What changed.
#[derive(Clone, Debug, PartialEq)]
pub enum MutationKind {
    /// Children were inserted into and/or removed from the target.
    ChildList { added: Vec<Node>, removed: Vec<Node> },
    /// An attribute of the target was set or removed.
    Attributes {
        name: String,
        old_value: Option<String>,
    },
}

/// One structural or attribute mutation.
#[derive(Clone, Debug, PartialEq)]
pub struct MutationRecord {
    pub target: Node,
    pub kind: MutationKind,
}

impl MutationRecord {
    pub fn added_nodes(&self) -> &[Node] {
        match &self.kind {
            MutationKind::ChildList { added, .. } => added,
            MutationKind::Attributes { .. } => &[],
        }
    }

    pub fn removed_nodes(&self) -> &[Node] {
        match &self.kind {
            MutationKind::ChildList { removed, .. } => removed,
            MutationKind::Attributes { .. } => &[],
        }
    }
}

/// Registration of one observer on one node.
pub(crate) struct Registration {
    observer: Weak<ObserverInner>,
    options: ObserveOptions,
}

type Callback = Rc<dyn Fn(Vec<MutationRecord>)>;

struct ObserverInner {
    id: u64,
    callback: Callback,
    queue: RefCell<Vec<MutationRecord>>,
    targets: RefCell<Vec<WeakNode>>,
}

// =============================================================================
// Pending Queue
// =============================================================================

thread_local! {
    /// Observers with queued records, in the order they first received one.
    static PENDING: RefCell<Vec<Rc<ObserverInner>>> = const { RefCell::new(Vec::new()) };

    /// Counter for observer ids.
    static NEXT_OBSERVER_ID: Cell<u64> = const { Cell::new(0) };

    /// Set while `deliver_mutations` runs.
    static DELIVERING: Cell<bool> = const { Cell::new(false) };
}

fn mark_pending(observer: Rc<ObserverInner>) {
    PENDING.with(|pending| {
        let mut pending = pending.borrow_mut();
        if !pending.iter().any(|o| o.id == observer.id) {
            pending.push(observer);
        }
    });
}

/// Queue a record for every observer interested in a mutation of `target`.
pub(super) fn queue_mutation(target: &Node, kind: MutationKind) {
    let attribute_name = match &kind {
        MutationKind::Attributes { name, .. } => Some(name.clone()),
        MutationKind::ChildList { .. } => None,
    };

    // (observer, wants old value)
    let mut interested: Vec<(Rc<ObserverInner>, bool)> = Vec::new();
    let mut current = Some(target.clone());
    while let Some(node) = current {
        let is_target = node.same_node(target);
        {
            let mut data = node.data().borrow_mut();
            data.registrations.retain(|r| r.observer.strong_count() > 0);
            for registration in &data.registrations {
                let options = &registration.options;
                if !is_target && !options.flags.contains(ObserveFlags::SUBTREE) {
                    continue;
                }
                let matches = match &attribute_name {
                    Some(name) => options.wants_attribute(name),
                    None => options.flags.contains(ObserveFlags::CHILD_LIST),
                };
                if !matches {
                    continue;
                }
                let Some(observer) = registration.observer.upgrade() else {
                    continue;
                };
                let wants_old = options.flags.contains(ObserveFlags::ATTRIBUTE_OLD_VALUE);
                match interested.iter_mut().find(|(o, _)| o.id == observer.id) {
                    Some((_, old)) => *old |= wants_old,
                    None => interested.push((observer, wants_old)),
                }
            }
        }
        current = node.parent();
    }

    for (observer, wants_old) in interested {
        let kind = match &kind {
            MutationKind::Attributes { name, old_value } => MutationKind::Attributes {
                name: name.clone(),
                old_value: if wants_old { old_value.clone() } else { None },
            },
            other => other.clone(),
        };
        observer.queue.borrow_mut().push(MutationRecord {
            target: target.clone(),
            kind,
        });
        mark_pending(observer);
    }
}

struct DeliveryGuard;

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        DELIVERING.with(|d| d.set(false));
    }
}

/// Deliver all queued records, one burst per observer, until none remain.
///
/// Callbacks may mutate the tree; records they cause are delivered in the same
/// call. Re-entrant calls from inside a callback return immediately.
///
/// Returns the number of records delivered.
pub fn deliver_mutations() -> usize {
    if DELIVERING.with(|d| d.replace(true)) {
        return 0;
    }
    let _guard = DeliveryGuard;

    let mut delivered = 0;
    loop {
        let pending = PENDING.with(|p| std::mem::take(&mut *p.borrow_mut()));
        if pending.is_empty() {
            break;
        }
        for observer in pending {
            let records = observer.queue.take();
            if records.is_empty() {
                continue;
            }
            delivered += records.len();
            trace!(observer = observer.id, records = records.len(), "delivering mutation records");
            let callback = observer.callback.clone();
            callback(records);
        }
    }
    delivered
}

/// Number of observers with undelivered records.
pub fn pending_observers() -> usize {
    PENDING.with(|p| p.borrow().iter().filter(|o| !o.queue.borrow().is_empty()).count())
}

/// Drop every undelivered record (for testing).
pub fn reset_mutation_queue() {
    let pending = PENDING.with(|p| std::mem::take(&mut *p.borrow_mut()));
    for observer in pending {
        observer.queue.borrow_mut().clear();
    }
}

// =============================================================================
// Mutation Observer
// =============================================================================

/// Receives bursts of [`MutationRecord`]s for the nodes it observes.
///
/// Dropping the observer disconnects it.
pub struct MutationObserver {
    inner: Rc<ObserverInner>,
}

impl MutationObserver {
    /// Create an observer. `callback` runs from [`deliver_mutations`].
    pub fn new(callback: impl Fn(Vec<MutationRecord>) + 'static) -> Self {
        let id = NEXT_OBSERVER_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });
        Self {
            inner: Rc::new(ObserverInner {
                id,
                callback: Rc::new(callback),
                queue: RefCell::new(Vec::new()),
                targets: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Start observing `target`. Observing the same node again replaces the options.
    pub fn observe(&self, target: &Node, options: ObserveOptions) {
        let options = options.normalized();
        let weak = Rc::downgrade(&self.inner);
        {
            let mut data = target.data().borrow_mut();
            if let Some(existing) = data
                .registrations
                .iter_mut()
                .find(|r| Weak::ptr_eq(&r.observer, &weak))
            {
                existing.options = options;
                return;
            }
            data.registrations.push(Registration {
                observer: weak,
                options,
            });
        }
        self.inner.targets.borrow_mut().push(target.downgrade());
    }

    /// Take undelivered records without invoking the callback.
    pub fn take_records(&self) -> Vec<MutationRecord> {
        self.inner.queue.take()
    }

    /// Stop observing every node and drop undelivered records.
    pub fn disconnect(&self) {
        let weak = Rc::downgrade(&self.inner);
        let targets = std::mem::take(&mut *self.inner.targets.borrow_mut());
        for target in targets.iter().filter_map(WeakNode::upgrade) {
            target
                .data()
                .borrow_mut()
                .registrations
                .retain(|r| !Weak::ptr_eq(&r.observer, &weak));
        }
        self.inner.queue.borrow_mut().clear();
        PENDING.with(|p| p.borrow_mut().retain(|o| o.id != self.inner.id));
    }
}

impl Drop for MutationObserver {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for MutationObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationObserver")
            .field("id", &self.inner.id)
            .field("queued", &self.inner.queue.borrow().len())
            .field("targets", &self.inner.targets.borrow().len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Rc<RefCell<Vec<Vec<MutationRecord>>>>, impl Fn(Vec<MutationRecord>) + 'static) {
        reset_mutation_queue();
        let bursts: Rc<RefCell<Vec<Vec<MutationRecord>>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = bursts.clone();
        (bursts, move |records| sink.borrow_mut().push(records))
    }

    #[test]
    fn test_records_wait_for_delivery() {
        let (bursts, callback) = setup();
        let root = Node::element("div");
        let observer = MutationObserver::new(callback);
        observer.observe(&root, ObserveOptions::child_list());

        root.append_child(&Node::element("p")).unwrap();
        root.append_child(&Node::element("p")).unwrap();
        assert!(bursts.borrow().is_empty());
        assert_eq!(pending_observers(), 1);

        assert_eq!(deliver_mutations(), 2);
        assert_eq!(bursts.borrow().len(), 1);
        assert_eq!(bursts.borrow()[0].len(), 2);
        assert_eq!(pending_observers(), 0);
    }

    #[test]
    fn test_subtree_flag() {
        let (bursts, callback) = setup();
        let root = Node::element("div");
        let inner = Node::element("section");
        root.append_child(&inner).unwrap();

        let shallow = MutationObserver::new(callback);
        shallow.observe(&root, ObserveOptions::child_list());
        inner.append_child(&Node::element("p")).unwrap();
        deliver_mutations();
        assert!(bursts.borrow().is_empty());

        shallow.observe(&root, ObserveOptions::child_list().subtree());
        inner.append_child(&Node::element("p")).unwrap();
        deliver_mutations();
        assert_eq!(bursts.borrow().len(), 1);
        assert_eq!(bursts.borrow()[0][0].target, inner);
    }

    #[test]
    fn test_attribute_filter_and_old_value() {
        let (bursts, callback) = setup();
        let root = Node::element("div");
        let item = Node::element("li").with_attribute("data-v", "old");
        root.append_child(&item).unwrap();

        let observer = MutationObserver::new(callback);
        observer.observe(&root, ObserveOptions::default().subtree().attributes(["data-v"]));

        item.set_attribute("data-other", "x").unwrap();
        item.set_attribute("data-v", "new").unwrap();
        deliver_mutations();

        let bursts = bursts.borrow();
        assert_eq!(bursts.len(), 1);
        assert_eq!(bursts[0].len(), 1);
        assert_eq!(
            bursts[0][0].kind,
            MutationKind::Attributes {
                name: "data-v".into(),
                old_value: Some("old".into()),
            }
        );
    }

    #[test]
    fn test_child_list_not_requested() {
        let (bursts, callback) = setup();
        let root = Node::element("div");
        let observer = MutationObserver::new(callback);
        observer.observe(&root, ObserveOptions::default().attributes(["data-v"]));

        root.append_child(&Node::element("p")).unwrap();
        deliver_mutations();
        assert!(bursts.borrow().is_empty());
    }

    #[test]
    fn test_replace_children_single_record() {
        let (bursts, callback) = setup();
        let root = Node::element("div");
        root.append_child(&Node::element("a")).unwrap();

        let observer = MutationObserver::new(callback);
        observer.observe(&root, ObserveOptions::child_list().subtree());
        root.replace_children([Node::element("b"), Node::element("c")]).unwrap();
        deliver_mutations();

        let bursts = bursts.borrow();
        assert_eq!(bursts[0].len(), 1);
        assert_eq!(bursts[0][0].removed_nodes().len(), 1);
        assert_eq!(bursts[0][0].added_nodes().len(), 2);
    }

    #[test]
    fn test_take_records_and_disconnect() {
        let (bursts, callback) = setup();
        let root = Node::element("div");
        let observer = MutationObserver::new(callback);
        observer.observe(&root, ObserveOptions::child_list());

        root.append_child(&Node::element("p")).unwrap();
        assert_eq!(observer.take_records().len(), 1);
        assert_eq!(deliver_mutations(), 0);

        observer.disconnect();
        root.append_child(&Node::element("p")).unwrap();
        assert_eq!(deliver_mutations(), 0);
        assert!(bursts.borrow().is_empty());
    }

    #[test]
    fn test_drop_disconnects() {
        let (bursts, callback) = setup();
        let root = Node::element("div");
        {
            let observer = MutationObserver::new(callback);
            observer.observe(&root, ObserveOptions::child_list());
        }
        root.append_child(&Node::element("p")).unwrap();
        assert_eq!(deliver_mutations(), 0);
        assert!(bursts.borrow().is_empty());
    }

    #[test]
    fn test_mutation_from_callback_delivered_in_same_call() {
        reset_mutation_queue();
        let root = Node::element("div");
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        let root_clone = root.clone();
        let observer = MutationObserver::new(move |records| {
            count_clone.set(count_clone.get() + records.len());
            if count_clone.get() == 1 {
                root_clone.append_child(&Node::element("echo")).unwrap();
            }
        });
        observer.observe(&root, ObserveOptions::child_list());

        root.append_child(&Node::element("p")).unwrap();
        assert_eq!(deliver_mutations(), 2);
        assert_eq!(count.get(), 2);
    }
}
