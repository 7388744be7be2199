//! Tree Observer - One mutation observer registration per reconciler.

use crate::tree::{MutationObserver, MutationRecord, Node, ObserveOptions};

/// Observer options for a root: child lists across the subtree always, plus
/// the watched attributes with old values when any are watched.
pub fn options_for(watch: &[String]) -> ObserveOptions {
    let options = ObserveOptions::child_list().subtree();
    if watch.is_empty() {
        options
    } else {
        options.attributes(watch.iter().cloned())
    }
}

/// Forwards every mutation burst under a root to a callback.
#[derive(Debug)]
pub struct TreeObserver {
    observer: MutationObserver,
}

impl TreeObserver {
    pub fn observe<F>(root: &Node, watch: &[String], on_burst: F) -> Self
    where
        F: Fn(Vec<MutationRecord>) + 'static,
    {
        let observer = MutationObserver::new(on_burst);
        observer.observe(root, options_for(watch));
        Self { observer }
    }

    /// Stop observing and drop undelivered records.
    pub fn disconnect(&self) {
        self.observer.disconnect();
    }
}
