use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use tracing::debug;

use crate::tree::{ComponentId, ComponentInstance};

/// Re-render side channel. Boundaries hand restored components to the
/// scheduler instead of calling into reconciliation directly; batching
/// and ordering across calls is the scheduler's contract.
pub trait RenderScheduler: Send + Sync {
    fn enqueue_rerender(&self, component: ComponentInstance);
}

/// Order-preserving queue that drops duplicate enqueues of the same
/// component instance until the queue is drained.
pub struct WorkQueue {
    inner: Mutex<QueueInner>,
}

struct QueueInner {
    queued: SmallVec<[ComponentInstance; 4]>,
    seen: FxHashSet<ComponentId>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self { inner: Mutex::new(QueueInner { queued: SmallVec::new(), seen: FxHashSet::default() }) }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().queued.is_empty()
    }

    /// Takes the queued work in enqueue order, clearing the dedup set.
    pub fn drain(&self) -> Vec<ComponentInstance> {
        let mut inner = self.inner.lock();
        inner.seen.clear();
        inner.queued.drain(..).collect()
    }
}

impl RenderScheduler for WorkQueue {
    fn enqueue_rerender(&self, component: ComponentInstance) {
        let mut inner = self.inner.lock();
        if !inner.seen.insert(component.id.clone()) {
            debug!(component = %component.id, "re-render already queued");
            return;
        }
        inner.queued.push(component);
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{ComponentDef, Props, RenderOutcome, VNode};
    use std::sync::Arc;

    struct Noop;

    impl ComponentDef for Noop {
        fn name(&self) -> &str {
            "Noop"
        }

        fn render(&self, _props: &Props) -> RenderOutcome {
            RenderOutcome::Ready(VNode::null())
        }
    }

    fn instance() -> ComponentInstance {
        ComponentInstance::new(Arc::new(Noop), Props::default())
    }

    #[test]
    fn test_enqueue_preserves_order() {
        let queue = WorkQueue::new();
        let first = instance();
        let second = instance();

        queue.enqueue_rerender(first.clone());
        queue.enqueue_rerender(second.clone());

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].id, first.id);
        assert_eq!(drained[1].id, second.id);
    }

    #[test]
    fn test_duplicate_enqueues_are_dropped() {
        let queue = WorkQueue::new();
        let target = instance();

        queue.enqueue_rerender(target.clone());
        queue.enqueue_rerender(target.clone());
        assert_eq!(queue.len(), 1);

        // draining resets dedup, later episodes can queue the same target
        queue.drain();
        queue.enqueue_rerender(target);
        assert_eq!(queue.len(), 1);
    }
}
