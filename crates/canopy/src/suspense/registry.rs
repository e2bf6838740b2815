use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use super::{AsyncToken, BoundaryId, SuspenseBoundary};
use crate::tree::ComponentInstance;

/// Live boundaries plus the render-time stack used to resolve which
/// boundary is nearest to a signaling descendant. Engines push a
/// boundary when they enter its subtree and pop when they leave;
/// suspensions route to the innermost entry.
pub struct BoundaryRegistry {
    boundaries: DashMap<BoundaryId, SuspenseBoundary>,
    stack: Mutex<Vec<BoundaryId>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total_boundaries: usize,
    pub showing_fallback: usize,
    pub outstanding_tokens: usize,
    pub stack_depth: usize,
}

impl BoundaryRegistry {
    pub fn new() -> Self {
        Self { boundaries: DashMap::new(), stack: Mutex::new(Vec::new()) }
    }

    pub fn register(&self, boundary: &SuspenseBoundary) {
        self.boundaries.insert(boundary.id().clone(), boundary.clone());
    }

    pub fn unregister(&self, id: &BoundaryId) {
        self.boundaries.remove(id);
        self.stack.lock().retain(|entry| entry != id);
    }

    pub fn enter(&self, id: &BoundaryId) {
        if !self.boundaries.contains_key(id) {
            warn!(boundary = %id, "entering unregistered boundary");
            return;
        }
        self.stack.lock().push(id.clone());
    }

    pub fn exit(&self) -> Option<BoundaryId> {
        self.stack.lock().pop()
    }

    pub fn current(&self) -> Option<SuspenseBoundary> {
        let stack = self.stack.lock();
        let id = stack.last()?;
        self.boundaries.get(id).map(|entry| entry.value().clone())
    }

    /// Delivers a suspension to the nearest boundary. Returns whether
    /// one was found; an unrouted suspension means there is no boundary
    /// above the signaling point and the caller must surface it.
    pub fn route(&self, token: AsyncToken, component: ComponentInstance) -> bool {
        match self.current() {
            Some(boundary) => {
                debug!(
                    boundary = %boundary.id(),
                    component = %component.id,
                    "routing suspension to nearest boundary"
                );
                boundary.on_descendant_suspended(token, component);
                true
            }
            None => {
                warn!(component = %component.id, "suspension with no boundary above it");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        let mut showing_fallback = 0;
        let mut outstanding_tokens = 0;
        for entry in self.boundaries.iter() {
            let stats = entry.value().stats();
            if stats.showing_fallback {
                showing_fallback += 1;
            }
            outstanding_tokens += stats.outstanding;
        }
        RegistryStats {
            total_boundaries: self.boundaries.len(),
            showing_fallback,
            outstanding_tokens,
            stack_depth: self.stack.lock().len(),
        }
    }
}

impl Default for BoundaryRegistry {
    fn default() -> Self {
        Self::new()
    }
}
